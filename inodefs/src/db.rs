use crate::fs::errors::FsError;
use anyhow::Result;
use bytes::Bytes;
use futures::stream::Stream;
use slatedb::{
    WriteBatch,
    config::{DurabilityLevel, ReadOptions, ScanOptions, WriteOptions},
};
use std::ops::RangeBounds;
use std::pin::Pin;
use std::sync::Arc;

/// Fatal handler for SlateDB write errors.
/// After a write failure, the database state is unknown - exit and let
/// the eventual orchestrator restart the service to rebuild from a known-good state.
pub fn exit_on_write_error(err: impl std::fmt::Display) -> ! {
    tracing::error!("Fatal write error, exiting: {}", err);
    std::process::exit(1)
}

/// A set of puts and deletes applied to the database as one atomic unit.
pub struct Transaction {
    inner: WriteBatch,
    ops: usize,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            inner: WriteBatch::new(),
            ops: 0,
        }
    }

    pub fn put_bytes(&mut self, key: &Bytes, value: Bytes) {
        self.inner.put(key, &value);
        self.ops += 1;
    }

    pub fn delete_bytes(&mut self, key: &Bytes) {
        self.inner.delete(key);
        self.ops += 1;
    }

    pub fn is_empty(&self) -> bool {
        self.ops == 0
    }

    pub fn into_inner(self) -> WriteBatch {
        self.inner
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Db {
    inner: Arc<slatedb::Db>,
}

impl Db {
    pub fn new(db: Arc<slatedb::Db>) -> Self {
        Self { inner: db }
    }

    pub fn new_transaction(&self) -> Transaction {
        Transaction::new()
    }

    pub async fn get_bytes(&self, key: &Bytes) -> Result<Option<Bytes>> {
        let read_options = ReadOptions {
            durability_filter: DurabilityLevel::Memory,
            cache_blocks: true,
            ..Default::default()
        };

        Ok(self.inner.get_with_options(key, &read_options).await?)
    }

    pub async fn scan<R: RangeBounds<Bytes> + Clone + Send + Sync + 'static>(
        &self,
        range: R,
    ) -> Result<Pin<Box<dyn Stream<Item = Result<(Bytes, Bytes)>> + Send + '_>>> {
        let scan_options = ScanOptions {
            durability_filter: DurabilityLevel::Memory,
            read_ahead_bytes: 1024 * 1024,
            cache_blocks: true,
            max_fetch_tasks: 8,
            ..Default::default()
        };
        let iter = self.inner.scan_with_options(range, &scan_options).await?;

        Ok(Box::pin(futures::stream::unfold(iter, |mut iter| async move {
            match iter.next().await {
                Ok(Some(kv)) => Some((Ok((kv.key, kv.value)), iter)),
                Ok(None) => None,
                Err(e) => Some((Err(anyhow::anyhow!("Iterator error: {}", e)), iter)),
            }
        })))
    }

    pub async fn write(&self, txn: Transaction) -> Result<(), FsError> {
        if txn.is_empty() {
            return Ok(());
        }

        if let Err(e) = self
            .inner
            .write_with_options(
                txn.into_inner(),
                &WriteOptions {
                    await_durable: false,
                },
            )
            .await
        {
            exit_on_write_error(e);
        }

        Ok(())
    }

    pub async fn flush(&self) -> Result<()> {
        if let Err(e) = self.inner.flush().await {
            exit_on_write_error(e);
        }
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if let Err(e) = self.inner.close().await {
            exit_on_write_error(e);
        }
        Ok(())
    }
}
