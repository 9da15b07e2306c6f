use super::errors::FsError;
use super::inode::InodeId;
use super::tenant::Tenant;
use bytes::Bytes;

const PREFIX_INODE: u8 = 0x01;
const PREFIX_CHUNK: u8 = 0x02;
const PREFIX_DIR_ENTRY: u8 = 0x03;
const PREFIX_DIR_SCAN: u8 = 0x04;
const PREFIX_TOMBSTONE: u8 = 0x05;
const PREFIX_SYSTEM: u8 = 0x07;
const PREFIX_DIR_COOKIE: u8 = 0x08;

const SYSTEM_COUNTER_SUBTYPE: u8 = 0x01;

const U32_SIZE: usize = 4;
const U64_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyPrefix {
    Inode,
    Chunk,
    DirEntry,
    DirScan,
    Tombstone,
    System,
    DirCookie,
}

impl TryFrom<u8> for KeyPrefix {
    type Error = ();

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            PREFIX_INODE => Ok(Self::Inode),
            PREFIX_CHUNK => Ok(Self::Chunk),
            PREFIX_DIR_ENTRY => Ok(Self::DirEntry),
            PREFIX_DIR_SCAN => Ok(Self::DirScan),
            PREFIX_TOMBSTONE => Ok(Self::Tombstone),
            PREFIX_SYSTEM => Ok(Self::System),
            PREFIX_DIR_COOKIE => Ok(Self::DirCookie),
            _ => Err(()),
        }
    }
}

impl From<KeyPrefix> for u8 {
    fn from(prefix: KeyPrefix) -> Self {
        match prefix {
            KeyPrefix::Inode => PREFIX_INODE,
            KeyPrefix::Chunk => PREFIX_CHUNK,
            KeyPrefix::DirEntry => PREFIX_DIR_ENTRY,
            KeyPrefix::DirScan => PREFIX_DIR_SCAN,
            KeyPrefix::Tombstone => PREFIX_TOMBSTONE,
            KeyPrefix::System => PREFIX_SYSTEM,
            KeyPrefix::DirCookie => PREFIX_DIR_COOKIE,
        }
    }
}

impl KeyPrefix {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inode => "INODE",
            Self::Chunk => "CHUNK",
            Self::DirEntry => "DIR_ENTRY",
            Self::DirScan => "DIR_SCAN",
            Self::Tombstone => "TOMBSTONE",
            Self::System => "SYSTEM",
            Self::DirCookie => "DIR_COOKIE",
        }
    }
}

#[derive(Debug, Clone)]
pub enum ParsedKey {
    Inode {
        tenant: Tenant,
        inode_id: InodeId,
    },
    Chunk {
        tenant: Tenant,
        inode_id: InodeId,
        chunk_index: u64,
    },
    DirEntry {
        tenant: Tenant,
        dir_id: InodeId,
        name: Vec<u8>,
    },
    DirScan {
        tenant: Tenant,
        dir_id: InodeId,
        cookie: u64,
    },
    Tombstone {
        tenant: Tenant,
        inode_id: InodeId,
    },
    Counter {
        tenant: Tenant,
    },
    DirCookie {
        tenant: Tenant,
        dir_id: InodeId,
    },
    Unknown,
}

pub struct KeyCodec;

impl KeyCodec {
    fn tenant_key(prefix: KeyPrefix, tenant: &Tenant, extra: usize) -> Vec<u8> {
        let segment = tenant.segment();
        let mut key = Vec::with_capacity(1 + segment.len() + extra);
        key.push(u8::from(prefix));
        key.extend_from_slice(segment);
        key
    }

    /// Smallest key greater than every key starting with `prefix`.
    pub fn prefix_end(prefix: &[u8]) -> Bytes {
        let mut end = prefix.to_vec();
        while let Some(last) = end.pop() {
            if last < u8::MAX {
                end.push(last + 1);
                return Bytes::from(end);
            }
        }
        Bytes::new()
    }

    pub fn inode_key(tenant: &Tenant, inode_id: InodeId) -> Bytes {
        let mut key = Self::tenant_key(KeyPrefix::Inode, tenant, U32_SIZE);
        key.extend_from_slice(&inode_id.to_be_bytes());
        Bytes::from(key)
    }

    /// Key range covering every inode record of a tenant.
    pub fn inode_range(tenant: &Tenant) -> (Bytes, Bytes) {
        let start = Self::tenant_key(KeyPrefix::Inode, tenant, 0);
        let end = Self::prefix_end(&start);
        (Bytes::from(start), end)
    }

    pub fn parse_inode_key(tenant: &Tenant, key: &[u8]) -> Option<InodeId> {
        let header = 1 + tenant.segment().len();
        if key.len() != header + U32_SIZE || key[0] != PREFIX_INODE {
            return None;
        }
        let id_bytes: [u8; U32_SIZE] = key[header..].try_into().ok()?;
        Some(InodeId::from_be_bytes(id_bytes))
    }

    pub fn chunk_key(tenant: &Tenant, inode_id: InodeId, chunk_index: u64) -> Bytes {
        let mut key = Self::tenant_key(KeyPrefix::Chunk, tenant, U32_SIZE + U64_SIZE);
        key.extend_from_slice(&inode_id.to_be_bytes());
        key.extend_from_slice(&chunk_index.to_be_bytes());
        Bytes::from(key)
    }

    pub fn parse_chunk_key(tenant: &Tenant, key: &[u8]) -> Option<u64> {
        let header = 1 + tenant.segment().len() + U32_SIZE;
        if key.len() != header + U64_SIZE || key[0] != PREFIX_CHUNK {
            return None;
        }
        let chunk_bytes: [u8; U64_SIZE] = key[header..].try_into().ok()?;
        Some(u64::from_be_bytes(chunk_bytes))
    }

    pub fn dir_entry_key(tenant: &Tenant, dir_id: InodeId, name: &[u8]) -> Bytes {
        let mut key = Self::tenant_key(KeyPrefix::DirEntry, tenant, U32_SIZE + name.len());
        key.extend_from_slice(&dir_id.to_be_bytes());
        key.extend_from_slice(name);
        Bytes::from(key)
    }

    pub fn dir_scan_key(tenant: &Tenant, dir_id: InodeId, cookie: u64) -> Bytes {
        let mut key = Self::dir_scan_prefix(tenant, dir_id);
        key.extend_from_slice(&cookie.to_be_bytes());
        Bytes::from(key)
    }

    pub fn dir_scan_prefix(tenant: &Tenant, dir_id: InodeId) -> Vec<u8> {
        let mut prefix = Self::tenant_key(KeyPrefix::DirScan, tenant, U32_SIZE + U64_SIZE);
        prefix.extend_from_slice(&dir_id.to_be_bytes());
        prefix
    }

    /// Build the end key for a directory scan range (next directory)
    pub fn dir_scan_end_key(tenant: &Tenant, dir_id: InodeId) -> Bytes {
        Self::prefix_end(&Self::dir_scan_prefix(tenant, dir_id))
    }

    /// Key for storing next cookie counter per directory
    pub fn dir_cookie_counter_key(tenant: &Tenant, dir_id: InodeId) -> Bytes {
        let mut key = Self::tenant_key(KeyPrefix::DirCookie, tenant, U32_SIZE);
        key.extend_from_slice(&dir_id.to_be_bytes());
        Bytes::from(key)
    }

    /// Tombstones sort by time first so the collector drains the oldest.
    pub fn tombstone_key(timestamp: u64, tenant: &Tenant, inode_id: InodeId) -> Bytes {
        let segment = tenant.segment();
        let mut key = Vec::with_capacity(1 + U64_SIZE + segment.len() + U32_SIZE);
        key.push(u8::from(KeyPrefix::Tombstone));
        key.extend_from_slice(&timestamp.to_be_bytes());
        key.extend_from_slice(segment);
        key.extend_from_slice(&inode_id.to_be_bytes());
        Bytes::from(key)
    }

    pub fn system_counter_key(tenant: &Tenant) -> Bytes {
        let mut key = Self::tenant_key(KeyPrefix::System, tenant, 1);
        key.push(SYSTEM_COUNTER_SUBTYPE);
        Bytes::from(key)
    }

    fn parse_id(data: &[u8]) -> Option<InodeId> {
        let bytes: [u8; U32_SIZE] = data.get(..U32_SIZE)?.try_into().ok()?;
        Some(InodeId::from_be_bytes(bytes))
    }

    fn parse_u64(data: &[u8]) -> Option<u64> {
        let bytes: [u8; U64_SIZE] = data.try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }

    pub fn parse_key(key: &[u8]) -> ParsedKey {
        Self::try_parse_key(key).unwrap_or(ParsedKey::Unknown)
    }

    fn try_parse_key(key: &[u8]) -> Option<ParsedKey> {
        let prefix = KeyPrefix::try_from(*key.first()?).ok()?;
        let body = &key[1..];

        if prefix == KeyPrefix::Tombstone {
            let timestamp_end = U64_SIZE;
            let (tenant, rest) = Tenant::split_segment(body.get(timestamp_end..)?)?;
            if rest.len() != U32_SIZE {
                return None;
            }
            let inode_id = Self::parse_id(rest)?;
            return Some(ParsedKey::Tombstone { tenant, inode_id });
        }

        let (tenant, rest) = Tenant::split_segment(body)?;
        let parsed = match prefix {
            KeyPrefix::Inode if rest.len() == U32_SIZE => ParsedKey::Inode {
                tenant,
                inode_id: Self::parse_id(rest)?,
            },
            KeyPrefix::Chunk if rest.len() == U32_SIZE + U64_SIZE => ParsedKey::Chunk {
                tenant,
                inode_id: Self::parse_id(rest)?,
                chunk_index: Self::parse_u64(&rest[U32_SIZE..])?,
            },
            KeyPrefix::DirEntry if rest.len() > U32_SIZE => ParsedKey::DirEntry {
                tenant,
                dir_id: Self::parse_id(rest)?,
                name: rest[U32_SIZE..].to_vec(),
            },
            KeyPrefix::DirScan if rest.len() == U32_SIZE + U64_SIZE => ParsedKey::DirScan {
                tenant,
                dir_id: Self::parse_id(rest)?,
                cookie: Self::parse_u64(&rest[U32_SIZE..])?,
            },
            KeyPrefix::System if rest == [SYSTEM_COUNTER_SUBTYPE] => ParsedKey::Counter { tenant },
            KeyPrefix::DirCookie if rest.len() == U32_SIZE => ParsedKey::DirCookie {
                tenant,
                dir_id: Self::parse_id(rest)?,
            },
            _ => ParsedKey::Unknown,
        };
        Some(parsed)
    }

    /// Encode dir_scan value: (entry_id, name)
    pub fn encode_dir_scan_value(entry_id: InodeId, name: &[u8]) -> Bytes {
        let mut value = Vec::with_capacity(U32_SIZE + name.len());
        value.extend_from_slice(&entry_id.to_le_bytes());
        value.extend_from_slice(name);
        Bytes::from(value)
    }

    /// Decode dir_scan value: (entry_id, name)
    pub fn decode_dir_scan_value(data: &[u8]) -> Result<(InodeId, Vec<u8>), FsError> {
        if data.len() < U32_SIZE {
            return Err(FsError::InvalidData);
        }
        let entry_bytes: [u8; U32_SIZE] = data[..U32_SIZE]
            .try_into()
            .map_err(|_| FsError::InvalidData)?;
        let entry_id = InodeId::from_le_bytes(entry_bytes);
        let name = data[U32_SIZE..].to_vec();
        Ok((entry_id, name))
    }

    pub fn encode_counter(value: InodeId) -> Bytes {
        Bytes::copy_from_slice(&value.to_le_bytes())
    }

    pub fn decode_counter(data: &[u8]) -> Result<InodeId, FsError> {
        let bytes: [u8; U32_SIZE] = data.try_into().map_err(|_| FsError::InvalidData)?;
        Ok(InodeId::from_le_bytes(bytes))
    }

    pub fn encode_cookie(value: u64) -> Bytes {
        Bytes::copy_from_slice(&value.to_le_bytes())
    }

    pub fn decode_cookie(data: &[u8]) -> Result<u64, FsError> {
        let bytes: [u8; U64_SIZE] = data.try_into().map_err(|_| FsError::InvalidData)?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn encode_dir_entry(inode_id: InodeId, cookie: u64) -> Bytes {
        let mut value = Vec::with_capacity(U32_SIZE + U64_SIZE);
        value.extend_from_slice(&inode_id.to_le_bytes());
        value.extend_from_slice(&cookie.to_le_bytes());
        Bytes::from(value)
    }

    pub fn decode_dir_entry(data: &[u8]) -> Result<(InodeId, u64), FsError> {
        if data.len() != U32_SIZE + U64_SIZE {
            return Err(FsError::InvalidData);
        }
        let inode_bytes: [u8; U32_SIZE] = data[..U32_SIZE]
            .try_into()
            .map_err(|_| FsError::InvalidData)?;
        let cookie_bytes: [u8; U64_SIZE] = data[U32_SIZE..]
            .try_into()
            .map_err(|_| FsError::InvalidData)?;
        Ok((
            InodeId::from_le_bytes(inode_bytes),
            u64::from_le_bytes(cookie_bytes),
        ))
    }

    pub fn encode_tombstone_size(size: u64) -> Bytes {
        Bytes::copy_from_slice(&size.to_le_bytes())
    }

    pub fn decode_tombstone_size(data: &[u8]) -> Result<u64, FsError> {
        let bytes: [u8; U64_SIZE] = data.try_into().map_err(|_| FsError::InvalidData)?;
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn prefix_range(prefix: KeyPrefix) -> (Bytes, Bytes) {
        let prefix_byte = u8::from(prefix);
        let start = Bytes::from(vec![prefix_byte]);
        let end = Bytes::from(vec![prefix_byte + 1]);
        (start, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant(token: &str) -> Tenant {
        Tenant::new(token).unwrap()
    }

    #[test]
    fn test_inode_key_layout() {
        let t = tenant("t1");
        let key = KeyCodec::inode_key(&t, 1001);
        assert_eq!(key[0], u8::from(KeyPrefix::Inode));
        assert_eq!(&key[1..5], &[0, 2, b't', b'1']);
        assert_eq!(&key[5..9], &1001u32.to_be_bytes());
        assert_eq!(KeyCodec::parse_inode_key(&t, &key), Some(1001));
    }

    #[test]
    fn test_inode_range_is_tenant_scoped() {
        let a = tenant("a");
        let b = tenant("b");
        let (start, end) = KeyCodec::inode_range(&a);

        let own = KeyCodec::inode_key(&a, u32::MAX);
        assert!(own >= start && own < end);

        let other = KeyCodec::inode_key(&b, 0);
        assert!(!(other >= start && other < end));
    }

    #[test]
    fn test_prefix_end() {
        assert_eq!(KeyCodec::prefix_end(&[1, 2, 3]).as_ref(), &[1, 2, 4]);
        assert_eq!(KeyCodec::prefix_end(&[1, 0xFF, 0xFF]).as_ref(), &[2]);
    }

    #[test]
    fn test_dir_scan_parsing() {
        let t = tenant("scan");
        let key = KeyCodec::dir_scan_key(&t, 10, 42);

        match KeyCodec::parse_key(&key) {
            ParsedKey::DirScan {
                tenant: parsed_tenant,
                dir_id,
                cookie,
            } => {
                assert_eq!(parsed_tenant, t);
                assert_eq!(dir_id, 10);
                assert_eq!(cookie, 42);
            }
            other => panic!("Failed to parse dir scan key: {other:?}"),
        }

        let end = KeyCodec::dir_scan_end_key(&t, 10);
        assert!(key < end);
        assert!(KeyCodec::dir_scan_key(&t, 11, 0) >= end);
    }

    #[test]
    fn test_chunk_key_parsing() {
        let t = tenant("chunks");
        let key = KeyCodec::chunk_key(&t, 7, 99);
        assert_eq!(KeyCodec::parse_chunk_key(&t, &key), Some(99));
        assert!(matches!(
            KeyCodec::parse_key(&key),
            ParsedKey::Chunk {
                inode_id: 7,
                chunk_index: 99,
                ..
            }
        ));
    }

    #[test]
    fn test_tombstone_parsing() {
        let t = tenant("gc");
        let key = KeyCodec::tombstone_key(123456, &t, 789);

        match KeyCodec::parse_key(&key) {
            ParsedKey::Tombstone {
                tenant: parsed_tenant,
                inode_id,
            } => {
                assert_eq!(parsed_tenant, t);
                assert_eq!(inode_id, 789);
            }
            other => panic!("Failed to parse tombstone key: {other:?}"),
        }
    }

    #[test]
    fn test_value_encoding() {
        let encoded = KeyCodec::encode_counter(12345);
        assert_eq!(KeyCodec::decode_counter(&encoded).unwrap(), 12345);

        let encoded = KeyCodec::encode_dir_entry(999, 42);
        assert_eq!(KeyCodec::decode_dir_entry(&encoded).unwrap(), (999, 42));

        let encoded = KeyCodec::encode_dir_scan_value(20, b"test_file.txt");
        let (id, name) = KeyCodec::decode_dir_scan_value(&encoded).unwrap();
        assert_eq!(id, 20);
        assert_eq!(name, b"test_file.txt");

        let encoded = KeyCodec::encode_tombstone_size(1024);
        assert_eq!(KeyCodec::decode_tombstone_size(&encoded).unwrap(), 1024);
    }

    #[test]
    fn test_invalid_key_parsing() {
        assert!(matches!(KeyCodec::parse_key(&[]), ParsedKey::Unknown));
        assert!(matches!(KeyCodec::parse_key(&[0xFF]), ParsedKey::Unknown));
        assert!(matches!(
            KeyCodec::parse_key(&[u8::from(KeyPrefix::Inode)]),
            ParsedKey::Unknown
        ));
        assert!(KeyCodec::decode_counter(&[1, 2]).is_err());
        assert!(KeyCodec::decode_dir_entry(&[1, 2, 3]).is_err());
    }
}
