use crate::db::{Db, Transaction};
use crate::fs::errors::FsError;
use crate::fs::inode::{Inode, InodeId, ROOT_ID};
use crate::fs::key_codec::KeyCodec;
use crate::fs::tenant::Tenant;
use bytes::Bytes;
use dashmap::DashMap;
use futures::StreamExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

pub const MAX_HARDLINKS_PER_INODE: u32 = u32::MAX;

#[derive(Clone)]
pub struct InodeStore {
    db: Arc<Db>,
    next_ids: Arc<DashMap<Tenant, Arc<AtomicU32>>>,
}

impl InodeStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self {
            db,
            next_ids: Arc::new(DashMap::new()),
        }
    }

    /// Hands out the next inode id of `tenant`. Ids are never reused while the
    /// process runs, and the persisted counter carries them across restarts.
    pub async fn allocate(&self, tenant: &Tenant) -> Result<InodeId, FsError> {
        let counter = self.counter(tenant).await?;
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |next| next.checked_add(1))
            .map_err(|_| {
                tracing::error!("InodeStore::allocate: inode ids exhausted for {}", tenant);
                FsError::NoSpace
            })
    }

    pub async fn next_id(&self, tenant: &Tenant) -> Result<InodeId, FsError> {
        Ok(self.counter(tenant).await?.load(Ordering::SeqCst))
    }

    async fn counter(&self, tenant: &Tenant) -> Result<Arc<AtomicU32>, FsError> {
        if let Some(counter) = self.next_ids.get(tenant) {
            return Ok(counter.clone());
        }

        let persisted = match self
            .db
            .get_bytes(&KeyCodec::system_counter_key(tenant))
            .await
            .map_err(|e| {
                tracing::error!("InodeStore::counter({}): get_bytes failed: {:?}", tenant, e);
                FsError::IoError
            })? {
            Some(data) => KeyCodec::decode_counter(&data)?,
            None => ROOT_ID + 1,
        };

        // The counter is rewritten by every allocating commit, so concurrent
        // commits can leave it behind the highest id actually stored.
        let scanned = match self.max_id(tenant).await? {
            Some(max) => max.checked_add(1).ok_or(FsError::NoSpace)?,
            None => ROOT_ID + 1,
        };

        let next = persisted.max(scanned).max(ROOT_ID + 1);
        let counter = self
            .next_ids
            .entry(tenant.clone())
            .or_insert_with(|| Arc::new(AtomicU32::new(next)))
            .clone();
        Ok(counter)
    }

    /// Highest inode id stored for `tenant`, if it has any inode at all.
    pub async fn max_id(&self, tenant: &Tenant) -> Result<Option<InodeId>, FsError> {
        let (start, end) = KeyCodec::inode_range(tenant);
        let mut stream = self.db.scan(start..end).await.map_err(|e| {
            tracing::error!("InodeStore::max_id({}): scan failed: {:?}", tenant, e);
            FsError::IoError
        })?;

        let mut max = None;
        while let Some(result) = stream.next().await {
            let (key, _value) = result.map_err(|_| FsError::IoError)?;
            match KeyCodec::parse_inode_key(tenant, &key) {
                Some(id) => max = Some(max.map_or(id, |m: InodeId| m.max(id))),
                None => return Err(FsError::InvalidData),
            }
        }
        Ok(max)
    }

    pub async fn get(&self, tenant: &Tenant, id: InodeId) -> Result<Inode, FsError> {
        let key = KeyCodec::inode_key(tenant, id);

        let data = self
            .db
            .get_bytes(&key)
            .await
            .map_err(|e| {
                tracing::error!(
                    "InodeStore::get({}, {}): database get_bytes failed: {:?}",
                    tenant,
                    id,
                    e
                );
                FsError::IoError
            })?
            .ok_or(FsError::NotFound)?;

        bincode::deserialize(&data).map_err(|e| {
            tracing::warn!(
                "InodeStore::get({}, {}): failed to deserialize inode data (len={}): {:?}.",
                tenant,
                id,
                data.len(),
                e
            );
            FsError::InvalidData
        })
    }

    pub async fn exists(&self, tenant: &Tenant, id: InodeId) -> Result<bool, FsError> {
        match self.get(tenant, id).await {
            Ok(_) => Ok(true),
            Err(FsError::NotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn save(
        &self,
        txn: &mut Transaction,
        tenant: &Tenant,
        id: InodeId,
        inode: &Inode,
    ) -> Result<(), FsError> {
        let key = KeyCodec::inode_key(tenant, id);
        let data = bincode::serialize(inode)?;
        txn.put_bytes(&key, Bytes::from(data));
        Ok(())
    }

    pub fn delete(&self, txn: &mut Transaction, tenant: &Tenant, id: InodeId) {
        let key = KeyCodec::inode_key(tenant, id);
        txn.delete_bytes(&key);
    }

    pub async fn save_counter(
        &self,
        txn: &mut Transaction,
        tenant: &Tenant,
    ) -> Result<(), FsError> {
        let next_id = self.next_id(tenant).await?;
        txn.put_bytes(
            &KeyCodec::system_counter_key(tenant),
            KeyCodec::encode_counter(next_id),
        );
        Ok(())
    }
}
