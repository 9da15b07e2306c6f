use super::inode::{Inode, InodeId};

/// Attributes reported for an inode by `lookup`, `getattr` and `create`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileAttributes {
    pub fileid: InodeId,
    pub mode: u32,
    pub size: u64,
}

/// One position of a directory iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub fileid: InodeId,
    pub name: Vec<u8>,
    /// Full mode of the entry's target, kind bits included.
    pub mode: u32,
}

pub struct InodeWithId<'a> {
    pub inode: &'a Inode,
    pub id: InodeId,
}

impl From<InodeWithId<'_>> for FileAttributes {
    fn from(inode_with_id: InodeWithId<'_>) -> Self {
        FileAttributes {
            fileid: inode_with_id.id,
            mode: inode_with_id.inode.mode(),
            size: inode_with_id.inode.size(),
        }
    }
}
