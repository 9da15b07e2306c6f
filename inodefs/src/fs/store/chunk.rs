use crate::db::{Db, Transaction};
use crate::fs::inode::InodeId;
use crate::fs::key_codec::KeyCodec;
use crate::fs::tenant::Tenant;
use crate::fs::CHUNK_SIZE;
use crate::fs::errors::FsError;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

const PARALLEL_CHUNK_OPS: usize = 20;
const ZERO_CHUNK: &[u8] = &[0u8; CHUNK_SIZE];

/// File content split into fixed-size chunks. Chunks that are entirely zero
/// are never stored, which keeps sparse regions free.
#[derive(Clone)]
pub struct ChunkStore {
    db: Arc<Db>,
}

impl ChunkStore {
    pub fn new(db: Arc<Db>) -> Self {
        Self { db }
    }

    pub async fn get(
        &self,
        tenant: &Tenant,
        id: InodeId,
        chunk_idx: u64,
    ) -> Result<Option<Bytes>, FsError> {
        let key = KeyCodec::chunk_key(tenant, id, chunk_idx);
        match self.db.get_bytes(&key).await {
            Ok(result) => Ok(result),
            Err(e) => {
                error!(
                    "Failed to read chunk (tenant={}, inode={}, chunk={}): {}",
                    tenant, id, chunk_idx, e
                );
                Err(FsError::IoError)
            }
        }
    }

    fn save(&self, txn: &mut Transaction, tenant: &Tenant, id: InodeId, chunk_idx: u64, data: Bytes) {
        let key = KeyCodec::chunk_key(tenant, id, chunk_idx);
        txn.put_bytes(&key, data);
    }

    pub fn delete(&self, txn: &mut Transaction, tenant: &Tenant, id: InodeId, chunk_idx: u64) {
        let key = KeyCodec::chunk_key(tenant, id, chunk_idx);
        txn.delete_bytes(&key);
    }

    pub fn delete_range(
        &self,
        txn: &mut Transaction,
        tenant: &Tenant,
        id: InodeId,
        start: u64,
        end: u64,
    ) {
        for chunk_idx in start..end {
            self.delete(txn, tenant, id, chunk_idx);
        }
    }

    /// Reads `length` bytes at `offset`. Missing chunks read as zeros; the
    /// caller clips the range to the file size.
    pub async fn read(
        &self,
        tenant: &Tenant,
        id: InodeId,
        offset: u64,
        length: u64,
    ) -> Result<Bytes, FsError> {
        if length == 0 {
            return Ok(Bytes::new());
        }

        let end = offset + length;
        let start_chunk = offset / CHUNK_SIZE as u64;
        let end_chunk = (end - 1) / CHUNK_SIZE as u64;
        let start_offset = (offset % CHUNK_SIZE as u64) as usize;

        let start_key = KeyCodec::chunk_key(tenant, id, start_chunk);
        let end_key = KeyCodec::chunk_key(tenant, id, end_chunk + 1);

        let mut chunk_map: HashMap<u64, Bytes> = HashMap::new();
        let mut stream = self.db.scan(start_key..end_key).await.map_err(|e| {
            error!("Failed to scan chunks (tenant={}, inode={}): {}", tenant, id, e);
            FsError::IoError
        })?;

        while let Some(result) = stream.next().await {
            let (key, value) = result.map_err(|e| {
                error!(
                    "Failed to read chunk during scan (tenant={}, inode={}): {}",
                    tenant, id, e
                );
                FsError::IoError
            })?;
            if let Some(chunk_idx) = KeyCodec::parse_chunk_key(tenant, &key) {
                chunk_map.insert(chunk_idx, value);
            }
        }

        let mut result = BytesMut::with_capacity(length as usize);

        for chunk_idx in start_chunk..=end_chunk {
            let chunk_data = chunk_map
                .get(&chunk_idx)
                .map(|b| b.as_ref())
                .unwrap_or(ZERO_CHUNK);

            let chunk_start = if chunk_idx == start_chunk {
                start_offset
            } else {
                0
            };
            let chunk_end = if chunk_idx == end_chunk {
                ((end - 1) % CHUNK_SIZE as u64 + 1) as usize
            } else {
                CHUNK_SIZE
            };
            result.extend_from_slice(&chunk_data[chunk_start..chunk_end]);
        }

        Ok(result.freeze())
    }

    pub async fn write(
        &self,
        txn: &mut Transaction,
        tenant: &Tenant,
        id: InodeId,
        offset: u64,
        data: &[u8],
    ) -> Result<(), FsError> {
        if data.is_empty() {
            return Ok(());
        }

        let end_offset = offset
            .checked_add(data.len() as u64)
            .ok_or(FsError::FileTooLarge)?;
        let start_chunk = offset / CHUNK_SIZE as u64;
        let end_chunk = (end_offset - 1) / CHUNK_SIZE as u64;

        let existing_chunks: Result<HashMap<u64, Bytes>, FsError> =
            stream::iter(start_chunk..=end_chunk)
                .map(|chunk_idx| {
                    let chunk_start = chunk_idx * CHUNK_SIZE as u64;
                    let chunk_end = chunk_start + CHUNK_SIZE as u64;
                    let will_overwrite_fully = offset <= chunk_start && end_offset >= chunk_end;

                    let store = self.clone();
                    let tenant = tenant.clone();
                    async move {
                        let data = if will_overwrite_fully {
                            Bytes::from_static(ZERO_CHUNK)
                        } else {
                            store
                                .get(&tenant, id, chunk_idx)
                                .await?
                                .unwrap_or_else(|| Bytes::from_static(ZERO_CHUNK))
                        };
                        Ok::<(u64, Bytes), FsError>((chunk_idx, data))
                    }
                })
                .buffer_unordered(PARALLEL_CHUNK_OPS)
                .try_collect()
                .await;

        let existing_chunks = existing_chunks?;

        let mut data_offset = 0usize;
        for chunk_idx in start_chunk..=end_chunk {
            let chunk_start = chunk_idx * CHUNK_SIZE as u64;
            let chunk_end = chunk_start + CHUNK_SIZE as u64;

            let write_start = offset.saturating_sub(chunk_start) as usize;
            let write_end = if end_offset < chunk_end {
                (end_offset - chunk_start) as usize
            } else {
                CHUNK_SIZE
            };

            let write_len = write_end - write_start;
            let mut chunk = BytesMut::from(existing_chunks[&chunk_idx].as_ref());
            chunk[write_start..write_end]
                .copy_from_slice(&data[data_offset..data_offset + write_len]);
            data_offset += write_len;

            if chunk.as_ref() == ZERO_CHUNK {
                self.delete(txn, tenant, id, chunk_idx);
            } else {
                self.save(txn, tenant, id, chunk_idx, chunk.freeze());
            }
        }

        Ok(())
    }
}
