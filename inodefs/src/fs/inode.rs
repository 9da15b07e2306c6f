use serde::{Deserialize, Serialize};

pub type InodeId = u32;

/// Every tenant's root directory lives at this id.
pub const ROOT_ID: InodeId = 1000;

pub const S_IFMT: u32 = 0o170000;
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;

pub const ROOT_MODE: u32 = S_IFDIR | 0o777;

pub fn is_dir_mode(mode: u32) -> bool {
    mode & S_IFMT == S_IFDIR
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInode {
    pub mode: u32,
    pub nlink: u32,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryInode {
    pub mode: u32,
    pub nlink: u32,
    /// Directory holding the entry that created this one. The root points at itself.
    pub parent: InodeId,
    pub entry_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Inode {
    File(FileInode),
    Directory(DirectoryInode),
}

impl Inode {
    /// Builds a fresh inode for `mode`, directory or regular file by its kind bits.
    pub fn new(mode: u32, parent: InodeId) -> Self {
        if is_dir_mode(mode) {
            Inode::Directory(DirectoryInode {
                mode,
                nlink: 1,
                parent,
                entry_count: 0,
            })
        } else {
            Inode::File(FileInode {
                mode,
                nlink: 1,
                size: 0,
            })
        }
    }

    pub fn root() -> Self {
        Inode::Directory(DirectoryInode {
            mode: ROOT_MODE,
            nlink: 1,
            parent: ROOT_ID,
            entry_count: 0,
        })
    }

    pub fn mode(&self) -> u32 {
        match self {
            Inode::File(f) => f.mode,
            Inode::Directory(d) => d.mode,
        }
    }

    pub fn nlink(&self) -> u32 {
        match self {
            Inode::File(f) => f.nlink,
            Inode::Directory(d) => d.nlink,
        }
    }

    /// Content length in bytes; always 0 for directories.
    pub fn size(&self) -> u64 {
        match self {
            Inode::File(f) => f.size,
            Inode::Directory(_) => 0,
        }
    }

    pub fn is_dir(&self) -> bool {
        matches!(self, Inode::Directory(_))
    }
}
