use crate::db::Db;
use crate::fs::CHUNK_SIZE;
use crate::fs::errors::FsError;
use crate::fs::metrics::FileSystemStats;
use crate::fs::store::{ChunkStore, TombstoneStore};
use crate::fs::tenant::Tenant;
use bytes::Bytes;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

const MAX_CHUNKS_PER_ROUND: usize = 10_000;

struct PendingUpdate {
    key: Bytes,
    old_size: u64,
    start_chunk: usize,
    finished: bool,
}

/// Reclaims the chunks of large files whose last link was removed.
pub struct GarbageCollector {
    db: Arc<Db>,
    tombstone_store: TombstoneStore,
    chunk_store: ChunkStore,
    stats: Arc<FileSystemStats>,
    interval: Duration,
}

impl GarbageCollector {
    pub fn new(
        db: Arc<Db>,
        tombstone_store: TombstoneStore,
        chunk_store: ChunkStore,
        stats: Arc<FileSystemStats>,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            tombstone_store,
            chunk_store,
            stats,
            interval,
        }
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Starting garbage collection task (every {}s)",
                self.interval.as_secs()
            );
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("GC task shutting down");
                        break;
                    }
                    result = self.run() => {
                        if let Err(e) = result {
                            tracing::error!("Garbage collection failed: {:?}", e);
                        }
                    }
                }

                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("GC task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(self.interval) => {}
                }
            }
        })
    }

    /// Drains tombstones until none remain, deleting at most
    /// `MAX_CHUNKS_PER_ROUND` chunks between tombstone updates.
    pub async fn run(&self) -> Result<(), FsError> {
        self.stats.gc_runs.fetch_add(1, Ordering::Relaxed);

        loop {
            let mut updates: Vec<PendingUpdate> = Vec::new();
            let mut chunks_deleted_this_round = 0;
            let mut tombstones_completed_this_round = 0;
            let mut found_incomplete_tombstones = false;

            let iter = self.tombstone_store.list().await?;
            futures::pin_mut!(iter);

            let mut chunks_remaining_in_round = MAX_CHUNKS_PER_ROUND;

            while let Some(result) = futures::StreamExt::next(&mut iter).await {
                if chunks_remaining_in_round == 0 {
                    found_incomplete_tombstones = true;
                    break;
                }

                let entry = result?;

                if entry.remaining_size == 0 {
                    updates.push(PendingUpdate {
                        key: entry.key,
                        old_size: 0,
                        start_chunk: 0,
                        finished: true,
                    });
                    tombstones_completed_this_round += 1;
                    continue;
                }

                let total_chunks = entry.remaining_size.div_ceil(CHUNK_SIZE as u64) as usize;
                let chunks_to_delete = total_chunks.min(chunks_remaining_in_round);
                let start_chunk = total_chunks - chunks_to_delete;
                let finished = chunks_to_delete == total_chunks;
                if !finished {
                    found_incomplete_tombstones = true;
                }

                self.delete_chunks(
                    &entry.tenant,
                    entry.inode_id,
                    start_chunk as u64,
                    total_chunks as u64,
                )
                .await?;

                updates.push(PendingUpdate {
                    key: entry.key,
                    old_size: entry.remaining_size,
                    start_chunk,
                    finished,
                });

                chunks_deleted_this_round += chunks_to_delete;
                chunks_remaining_in_round -= chunks_to_delete;
                if finished {
                    tombstones_completed_this_round += 1;
                }

                if chunks_deleted_this_round % 1000 == 0 {
                    tokio::task::yield_now().await;
                }
            }

            if !updates.is_empty() {
                let mut txn = self.db.new_transaction();

                for update in updates {
                    if update.finished {
                        self.tombstone_store.remove(&mut txn, &update.key);
                    } else {
                        let remaining = (update.start_chunk as u64) * (CHUNK_SIZE as u64);
                        self.tombstone_store
                            .update(&mut txn, &update.key, remaining.min(update.old_size));
                    }
                }

                self.db.write(txn).await?;

                self.stats
                    .tombstones_processed
                    .fetch_add(tombstones_completed_this_round, Ordering::Relaxed);
            }

            if chunks_deleted_this_round > 0 || tombstones_completed_this_round > 0 {
                self.stats
                    .gc_chunks_deleted
                    .fetch_add(chunks_deleted_this_round as u64, Ordering::Relaxed);

                tracing::debug!(
                    "GC: processed {} tombstones, deleted {} chunks",
                    tombstones_completed_this_round,
                    chunks_deleted_this_round,
                );
            }

            if !found_incomplete_tombstones {
                break;
            }

            tokio::task::yield_now().await;
        }

        Ok(())
    }

    async fn delete_chunks(
        &self,
        tenant: &Tenant,
        inode_id: u32,
        start: u64,
        end: u64,
    ) -> Result<(), FsError> {
        let mut txn = self.db.new_transaction();
        self.chunk_store
            .delete_range(&mut txn, tenant, inode_id, start, end);
        self.db.write(txn).await
    }
}
