pub mod args;

use crate::fs::types::{DirEntry, FileAttributes};
use bytes::{BufMut, Bytes, BytesMut};
use deku::prelude::*;

pub use args::Operation;

pub const STATUS_ERROR: i64 = -1;
pub const STATUS_SIZE: usize = std::mem::size_of::<i64>();
pub const STAT_RECORD_SIZE: usize = 16;
pub const DIRENT_NAME_SIZE: usize = 256;
pub const DIRENT_RECORD_SIZE: usize = 4 + DIRENT_NAME_SIZE + 4;

/// `struct { u32 id; u32 mode; u64 size; }`, little endian.
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite)]
pub struct StatRecord {
    #[deku(endian = "little")]
    pub id: u32,
    #[deku(endian = "little")]
    pub mode: u32,
    #[deku(endian = "little")]
    pub size: u64,
}

impl From<FileAttributes> for StatRecord {
    fn from(attrs: FileAttributes) -> Self {
        StatRecord {
            id: attrs.fileid,
            mode: attrs.mode,
            size: attrs.size,
        }
    }
}

/// `struct { u32 id; char name[256]; u32 type; }`, little endian. The name is
/// zero padded and cut at 256 bytes; `type` carries the target's full mode.
#[derive(Debug, Clone, PartialEq, Eq, DekuRead, DekuWrite)]
pub struct DirentRecord {
    #[deku(endian = "little")]
    pub id: u32,
    pub name: [u8; DIRENT_NAME_SIZE],
    #[deku(endian = "little")]
    pub mode: u32,
}

impl DirentRecord {
    pub fn new(id: u32, name: &[u8], mode: u32) -> Self {
        let mut padded = [0u8; DIRENT_NAME_SIZE];
        let len = name.len().min(DIRENT_NAME_SIZE);
        padded[..len].copy_from_slice(&name[..len]);
        DirentRecord {
            id,
            name: padded,
            mode,
        }
    }
}

#[cfg(test)]
impl DirentRecord {
    /// Name bytes up to the first NUL.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DIRENT_NAME_SIZE);
        &self.name[..end]
    }
}

impl From<DirEntry> for DirentRecord {
    fn from(entry: DirEntry) -> Self {
        DirentRecord::new(entry.fileid, &entry.name, entry.mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Empty,
    Stat(StatRecord),
    Dirent(DirentRecord),
    Data(Bytes),
}

/// One response frame: `i64` little-endian status, then the payload with no
/// length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: i64,
    pub payload: Payload,
}

impl Response {
    pub fn error() -> Self {
        Response {
            status: STATUS_ERROR,
            payload: Payload::Empty,
        }
    }

    pub fn status(status: i64) -> Self {
        Response {
            status,
            payload: Payload::Empty,
        }
    }

    pub fn stat(attrs: FileAttributes) -> Self {
        Response {
            status: 0,
            payload: Payload::Stat(attrs.into()),
        }
    }

    pub fn dirent(entry: DirEntry) -> Self {
        Response {
            status: 0,
            payload: Payload::Dirent(entry.into()),
        }
    }

    pub fn data(data: Bytes) -> Self {
        Response {
            status: data.len() as i64,
            payload: Payload::Data(data),
        }
    }

    pub fn to_bytes(&self) -> Result<Bytes, DekuError> {
        let mut buf = BytesMut::with_capacity(STATUS_SIZE + self.payload_len());
        buf.put_i64_le(self.status);
        match &self.payload {
            Payload::Empty => {}
            Payload::Stat(stat) => buf.put_slice(&stat.to_bytes()?),
            Payload::Dirent(dirent) => buf.put_slice(&dirent.to_bytes()?),
            Payload::Data(data) => buf.put_slice(data),
        }
        Ok(buf.freeze())
    }

    fn payload_len(&self) -> usize {
        match &self.payload {
            Payload::Empty => 0,
            Payload::Stat(_) => STAT_RECORD_SIZE,
            Payload::Dirent(_) => DIRENT_RECORD_SIZE,
            Payload::Data(data) => data.len(),
        }
    }
}
