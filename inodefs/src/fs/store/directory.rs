use crate::db::{Db, Transaction};
use crate::fs::errors::FsError;
use crate::fs::inode::InodeId;
use crate::fs::key_codec::{KeyCodec, ParsedKey};
use crate::fs::tenant::Tenant;
use futures::Stream;
use futures::StreamExt;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DirEntryInfo {
    pub name: Vec<u8>,
    pub inode_id: InodeId,
    pub cookie: u64,
}

#[derive(Clone)]
pub struct DirectoryStore {
    db: Arc<Db>,
}

impl DirectoryStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub async fn get(&self, tenant: &Tenant, dir_id: InodeId, name: &[u8]) -> Result<InodeId, FsError> {
        let (inode_id, _) = self.get_entry_with_cookie(tenant, dir_id, name).await?;
        Ok(inode_id)
    }

    pub async fn get_entry_with_cookie(
        &self,
        tenant: &Tenant,
        dir_id: InodeId,
        name: &[u8],
    ) -> Result<(InodeId, u64), FsError> {
        let entry_key = KeyCodec::dir_entry_key(tenant, dir_id, name);

        let entry_data = self
            .db
            .get_bytes(&entry_key)
            .await
            .map_err(|_| FsError::IoError)?
            .ok_or(FsError::NotFound)?;

        KeyCodec::decode_dir_entry(&entry_data)
    }

    pub async fn exists(&self, tenant: &Tenant, dir_id: InodeId, name: &[u8]) -> Result<bool, FsError> {
        let entry_key = KeyCodec::dir_entry_key(tenant, dir_id, name);

        let result = self
            .db
            .get_bytes(&entry_key)
            .await
            .map_err(|_| FsError::IoError)?;

        Ok(result.is_some())
    }

    /// Entries of `dir_id` in insertion order.
    pub async fn list(
        &self,
        tenant: &Tenant,
        dir_id: InodeId,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<DirEntryInfo, FsError>> + Send + '_>>, FsError>
    {
        let start_key = bytes::Bytes::from(KeyCodec::dir_scan_prefix(tenant, dir_id));
        let end_key = KeyCodec::dir_scan_end_key(tenant, dir_id);

        let iter = self
            .db
            .scan(start_key..end_key)
            .await
            .map_err(|_| FsError::IoError)?;

        Ok(Box::pin(futures::stream::unfold(iter, |mut iter| async {
            match iter.next().await {
                Some(Ok((key, value))) => match KeyCodec::parse_key(&key) {
                    ParsedKey::DirScan { cookie, .. } => {
                        let entry = KeyCodec::decode_dir_scan_value(&value).map(
                            |(inode_id, name)| DirEntryInfo {
                                name,
                                inode_id,
                                cookie,
                            },
                        );
                        Some((entry, iter))
                    }
                    _ => Some((Err(FsError::InvalidData), iter)),
                },
                Some(Err(_)) => Some((Err(FsError::IoError), iter)),
                None => None,
            }
        })))
    }

    /// Entry at `index` of the insertion-ordered listing, if there is one.
    pub async fn nth(
        &self,
        tenant: &Tenant,
        dir_id: InodeId,
        index: u64,
    ) -> Result<Option<DirEntryInfo>, FsError> {
        let stream = self.list(tenant, dir_id).await?;
        futures::pin_mut!(stream);

        let mut position = 0u64;
        while let Some(entry) = stream.next().await {
            let entry = entry?;
            if position == index {
                return Ok(Some(entry));
            }
            position += 1;
        }
        Ok(None)
    }

    /// Reserves the next listing cookie of `dir_id` inside `txn`.
    /// Callers must hold the directory's write lock.
    pub async fn allocate_cookie(
        &self,
        txn: &mut Transaction,
        tenant: &Tenant,
        dir_id: InodeId,
    ) -> Result<u64, FsError> {
        let counter_key = KeyCodec::dir_cookie_counter_key(tenant, dir_id);
        let cookie = match self
            .db
            .get_bytes(&counter_key)
            .await
            .map_err(|_| FsError::IoError)?
        {
            Some(data) => KeyCodec::decode_cookie(&data)?,
            None => 0,
        };

        txn.put_bytes(&counter_key, KeyCodec::encode_cookie(cookie + 1));
        Ok(cookie)
    }

    pub fn add(
        &self,
        txn: &mut Transaction,
        tenant: &Tenant,
        dir_id: InodeId,
        name: &[u8],
        entry_id: InodeId,
        cookie: u64,
    ) {
        let entry_key = KeyCodec::dir_entry_key(tenant, dir_id, name);
        txn.put_bytes(&entry_key, KeyCodec::encode_dir_entry(entry_id, cookie));

        let scan_key = KeyCodec::dir_scan_key(tenant, dir_id, cookie);
        txn.put_bytes(&scan_key, KeyCodec::encode_dir_scan_value(entry_id, name));
    }

    pub fn remove(
        &self,
        txn: &mut Transaction,
        tenant: &Tenant,
        dir_id: InodeId,
        name: &[u8],
        cookie: u64,
    ) {
        let entry_key = KeyCodec::dir_entry_key(tenant, dir_id, name);
        txn.delete_bytes(&entry_key);

        let scan_key = KeyCodec::dir_scan_key(tenant, dir_id, cookie);
        txn.delete_bytes(&scan_key);
    }

    /// Drops the per-directory bookkeeping of an emptied directory.
    pub fn delete_directory(&self, txn: &mut Transaction, tenant: &Tenant, dir_id: InodeId) {
        txn.delete_bytes(&KeyCodec::dir_cookie_counter_key(tenant, dir_id));
    }
}
