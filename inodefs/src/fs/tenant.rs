use super::errors::FsError;
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

pub const MAX_TOKEN_LEN: usize = 255;

/// An opaque tenant token together with its encoded key segment.
///
/// Every storage key embeds the segment `[len: u16 BE][token bytes]` right
/// after the record prefix, so records of different tenants never share a
/// key range.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Tenant {
    token: String,
    segment: Bytes,
}

impl Tenant {
    pub fn new(token: &str) -> Result<Self, FsError> {
        if token.is_empty() || token.len() > MAX_TOKEN_LEN {
            return Err(FsError::InvalidArgument);
        }

        let mut segment = BytesMut::with_capacity(2 + token.len());
        segment.put_u16(token.len() as u16);
        segment.put_slice(token.as_bytes());

        Ok(Self {
            token: token.to_string(),
            segment: segment.freeze(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Length-prefixed key segment for this tenant.
    pub fn segment(&self) -> &[u8] {
        &self.segment
    }

    /// Splits a key segment off the front of `data`, returning the tenant and the rest.
    pub fn split_segment(data: &[u8]) -> Option<(Tenant, &[u8])> {
        let len_bytes: [u8; 2] = data.get(..2)?.try_into().ok()?;
        let len = u16::from_be_bytes(len_bytes) as usize;
        let token = data.get(2..2 + len)?;
        let token = std::str::from_utf8(token).ok()?;
        let tenant = Tenant::new(token).ok()?;
        Some((tenant, &data[2 + len..]))
    }
}

impl fmt::Debug for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Tenant").field(&self.token).finish()
    }
}

impl fmt::Display for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token)
    }
}
