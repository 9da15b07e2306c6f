pub mod errors;
pub mod gc;
pub mod inode;
pub mod key_codec;
pub mod lock_manager;
pub mod metrics;
pub mod store;
pub mod tenant;
pub mod types;

use self::errors::FsError;
use self::inode::{Inode, InodeId, ROOT_ID};
use self::lock_manager::LockManager;
use self::metrics::FileSystemStats;
use self::store::inode::MAX_HARDLINKS_PER_INODE;
use self::store::{ChunkStore, DirectoryStore, InodeStore, TombstoneStore};
use self::tenant::Tenant;
use self::types::{DirEntry, FileAttributes, InodeWithId};
use crate::db::Db;
use bytes::Bytes;
use dashmap::DashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, error, info};

pub use self::gc::GarbageCollector;

pub const CHUNK_SIZE: usize = 32 * 1024;
pub const SMALL_FILE_TOMBSTONE_THRESHOLD: usize = 10;
pub const NAME_MAX: usize = 255;
/// Largest offset a write may reach. Keeps chunk arithmetic clear of `u64` overflow.
pub const MAX_FILE_SIZE: u64 = i64::MAX as u64;
/// Upper bound on the bytes returned by a single read; longer reads come back short.
pub const MAX_READ_SIZE: u64 = 8 * 1024 * 1024;

pub fn validate_filename(filename: &[u8]) -> Result<(), FsError> {
    if filename.len() > NAME_MAX {
        return Err(FsError::NameTooLong);
    }
    if filename.is_empty()
        || filename == b"."
        || filename == b".."
        || filename.iter().any(|&b| b == b'/' || b == 0)
    {
        return Err(FsError::InvalidArgument);
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsOptions {
    /// Report the stored parent for `..` instead of the directory itself.
    pub resolve_parent_entry: bool,
}

/// The multi-tenant namespace. Cheap to clone; all state is shared.
#[derive(Clone)]
pub struct InodeFs {
    pub db: Arc<Db>,
    pub chunk_store: ChunkStore,
    pub directory_store: DirectoryStore,
    pub inode_store: InodeStore,
    pub tombstone_store: TombstoneStore,
    pub lock_manager: Arc<LockManager>,
    pub stats: Arc<FileSystemStats>,
    bootstrapped: Arc<DashSet<Tenant>>,
    options: FsOptions,
}

impl InodeFs {
    pub fn new(db: Arc<Db>, options: FsOptions) -> Self {
        Self {
            chunk_store: ChunkStore::new(db.clone()),
            directory_store: DirectoryStore::new(db.clone()),
            inode_store: InodeStore::new(db.clone()),
            tombstone_store: TombstoneStore::new(db.clone()),
            lock_manager: Arc::new(LockManager::new()),
            stats: Arc::new(FileSystemStats::new()),
            bootstrapped: Arc::new(DashSet::new()),
            db,
            options,
        }
    }

    pub async fn new_with_slatedb(
        slatedb: Arc<slatedb::Db>,
        options: FsOptions,
    ) -> anyhow::Result<Self> {
        Ok(Self::new(Arc::new(Db::new(slatedb)), options))
    }

    #[cfg(test)]
    pub async fn new_in_memory() -> anyhow::Result<Self> {
        Self::new_in_memory_with_options(FsOptions::default()).await
    }

    #[cfg(test)]
    pub async fn new_in_memory_with_options(options: FsOptions) -> anyhow::Result<Self> {
        use slatedb::DbBuilder;
        use slatedb::object_store::{ObjectStore, memory::InMemory, path::Path};

        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let slatedb = Arc::new(
            DbBuilder::new(Path::from("test_slatedb"), object_store)
                .build()
                .await?,
        );
        Self::new_with_slatedb(slatedb, options).await
    }

    /// Scoped handle for `token`, creating the tenant's root on first use.
    pub async fn tenant(&self, token: &str) -> Result<TenantFs<'_>, FsError> {
        let tenant = Tenant::new(token)?;
        self.ensure_root(&tenant).await?;
        Ok(TenantFs { fs: self, tenant })
    }

    async fn ensure_root(&self, tenant: &Tenant) -> Result<(), FsError> {
        if self.bootstrapped.contains(tenant) {
            return Ok(());
        }

        let _guard = self.lock_manager.acquire_write(tenant, ROOT_ID).await;

        if self.bootstrapped.contains(tenant) {
            return Ok(());
        }

        if !self.inode_store.exists(tenant, ROOT_ID).await? {
            let mut txn = self.db.new_transaction();
            self.inode_store
                .save(&mut txn, tenant, ROOT_ID, &Inode::root())?;
            self.inode_store.save_counter(&mut txn, tenant).await?;
            self.db.write(txn).await?;

            self.stats
                .tenants_bootstrapped
                .fetch_add(1, Ordering::Relaxed);
            info!("Bootstrapped root directory for tenant {}", tenant);
        }

        self.bootstrapped.insert(tenant.clone());
        Ok(())
    }

    pub fn garbage_collector(&self, interval: Duration) -> GarbageCollector {
        GarbageCollector::new(
            self.db.clone(),
            self.tombstone_store.clone(),
            self.chunk_store.clone(),
            self.stats.clone(),
            interval,
        )
    }
}

/// The namespace of a single tenant. Every key it touches carries the tenant.
pub struct TenantFs<'a> {
    fs: &'a InodeFs,
    tenant: Tenant,
}

impl TenantFs<'_> {
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    async fn get_directory(&self, dirid: InodeId) -> Result<Inode, FsError> {
        let inode = self.fs.inode_store.get(&self.tenant, dirid).await?;
        if !inode.is_dir() {
            return Err(FsError::NotDirectory);
        }
        Ok(inode)
    }

    pub async fn lookup(&self, dirid: InodeId, name: &[u8]) -> Result<FileAttributes, FsError> {
        debug!(
            "lookup: tenant={}, dirid={}, name={}",
            self.tenant,
            dirid,
            String::from_utf8_lossy(name)
        );

        self.get_directory(dirid).await?;
        let id = self
            .fs
            .directory_store
            .get(&self.tenant, dirid, name)
            .await?;
        let inode = self.fs.inode_store.get(&self.tenant, id).await?;

        self.fs.stats.lookups.fetch_add(1, Ordering::Relaxed);
        self.fs.stats.total_operations.fetch_add(1, Ordering::Relaxed);

        Ok(InodeWithId { inode: &inode, id }.into())
    }

    pub async fn getattr(&self, id: InodeId) -> Result<FileAttributes, FsError> {
        debug!("getattr: tenant={}, id={}", self.tenant, id);

        let inode = self.fs.inode_store.get(&self.tenant, id).await?;
        self.fs.stats.total_operations.fetch_add(1, Ordering::Relaxed);

        Ok(InodeWithId { inode: &inode, id }.into())
    }

    pub async fn create(
        &self,
        dirid: InodeId,
        name: &[u8],
        mode: u32,
    ) -> Result<FileAttributes, FsError> {
        validate_filename(name)?;

        debug!(
            "create: tenant={}, dirid={}, name={}, mode={:#o}",
            self.tenant,
            dirid,
            String::from_utf8_lossy(name),
            mode
        );

        let _guard = self.fs.lock_manager.acquire_write(&self.tenant, dirid).await;
        let mut dir_inode = self.get_directory(dirid).await?;

        if self
            .fs
            .directory_store
            .exists(&self.tenant, dirid, name)
            .await?
        {
            return Err(FsError::Exists);
        }

        let new_id = self.fs.inode_store.allocate(&self.tenant).await?;
        let new_inode = Inode::new(mode, dirid);

        let mut txn = self.fs.db.new_transaction();
        let cookie = self
            .fs
            .directory_store
            .allocate_cookie(&mut txn, &self.tenant, dirid)
            .await?;

        self.fs
            .inode_store
            .save(&mut txn, &self.tenant, new_id, &new_inode)?;
        self.fs
            .directory_store
            .add(&mut txn, &self.tenant, dirid, name, new_id, cookie);

        if let Inode::Directory(dir) = &mut dir_inode {
            dir.entry_count += 1;
        }
        self.fs
            .inode_store
            .save(&mut txn, &self.tenant, dirid, &dir_inode)?;
        self.fs.inode_store.save_counter(&mut txn, &self.tenant).await?;

        self.fs.db.write(txn).await.inspect_err(|e| {
            error!("Failed to write create batch: {:?}", e);
        })?;

        if new_inode.is_dir() {
            self.fs
                .stats
                .directories_created
                .fetch_add(1, Ordering::Relaxed);
        } else {
            self.fs.stats.files_created.fetch_add(1, Ordering::Relaxed);
        }
        self.fs.stats.total_operations.fetch_add(1, Ordering::Relaxed);

        Ok(InodeWithId {
            inode: &new_inode,
            id: new_id,
        }
        .into())
    }

    pub async fn link(&self, dirid: InodeId, name: &[u8], target: InodeId) -> Result<(), FsError> {
        validate_filename(name)?;

        debug!(
            "link: tenant={}, dirid={}, name={}, target={}",
            self.tenant,
            dirid,
            String::from_utf8_lossy(name),
            target
        );

        let _guards = self
            .fs
            .lock_manager
            .acquire_multiple_write(&self.tenant, &[dirid, target])
            .await;

        let mut dir_inode = self.get_directory(dirid).await?;

        let mut target_inode = self.fs.inode_store.get(&self.tenant, target).await?;
        let file = match &mut target_inode {
            Inode::File(file) => file,
            Inode::Directory(_) => return Err(FsError::IsDirectory),
        };

        if self
            .fs
            .directory_store
            .exists(&self.tenant, dirid, name)
            .await?
        {
            return Err(FsError::Exists);
        }

        if file.nlink == MAX_HARDLINKS_PER_INODE {
            return Err(FsError::TooManyLinks);
        }
        file.nlink += 1;

        let mut txn = self.fs.db.new_transaction();
        let cookie = self
            .fs
            .directory_store
            .allocate_cookie(&mut txn, &self.tenant, dirid)
            .await?;

        self.fs
            .directory_store
            .add(&mut txn, &self.tenant, dirid, name, target, cookie);
        self.fs
            .inode_store
            .save(&mut txn, &self.tenant, target, &target_inode)?;

        if let Inode::Directory(dir) = &mut dir_inode {
            dir.entry_count += 1;
        }
        self.fs
            .inode_store
            .save(&mut txn, &self.tenant, dirid, &dir_inode)?;

        self.fs.db.write(txn).await?;

        self.fs.stats.links_created.fetch_add(1, Ordering::Relaxed);
        self.fs.stats.total_operations.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    pub async fn unlink(&self, dirid: InodeId, name: &[u8]) -> Result<(), FsError> {
        self.remove(dirid, name, false).await
    }

    pub async fn rmdir(&self, dirid: InodeId, name: &[u8]) -> Result<(), FsError> {
        self.remove(dirid, name, true).await
    }

    async fn remove(&self, dirid: InodeId, name: &[u8], want_dir: bool) -> Result<(), FsError> {
        validate_filename(name)?;

        debug!(
            "{}: tenant={}, dirid={}, name={}",
            if want_dir { "rmdir" } else { "unlink" },
            self.tenant,
            dirid,
            String::from_utf8_lossy(name)
        );

        let (target_id, cookie) = self
            .fs
            .directory_store
            .get_entry_with_cookie(&self.tenant, dirid, name)
            .await?;

        let _guards = self
            .fs
            .lock_manager
            .acquire_multiple_write(&self.tenant, &[dirid, target_id])
            .await;

        let mut dir_inode = self.get_directory(dirid).await?;

        // Re-check inside lock to verify entry still points to same inode
        let (verified_id, verified_cookie) = self
            .fs
            .directory_store
            .get_entry_with_cookie(&self.tenant, dirid, name)
            .await?;
        if verified_id != target_id || verified_cookie != cookie {
            return Err(FsError::NotFound);
        }

        let mut target_inode = self.fs.inode_store.get(&self.tenant, target_id).await?;
        let mut txn = self.fs.db.new_transaction();

        match &mut target_inode {
            Inode::Directory(_) if !want_dir => return Err(FsError::IsDirectory),
            Inode::File(_) if want_dir => return Err(FsError::NotDirectory),
            Inode::Directory(subdir) => {
                if subdir.entry_count > 0 {
                    return Err(FsError::NotEmpty);
                }
                self.fs
                    .inode_store
                    .delete(&mut txn, &self.tenant, target_id);
                self.fs
                    .directory_store
                    .delete_directory(&mut txn, &self.tenant, target_id);
                self.fs
                    .stats
                    .directories_deleted
                    .fetch_add(1, Ordering::Relaxed);
            }
            Inode::File(file) => {
                if file.nlink > 1 {
                    file.nlink -= 1;
                    self.fs
                        .inode_store
                        .save(&mut txn, &self.tenant, target_id, &target_inode)?;
                    self.fs.stats.links_deleted.fetch_add(1, Ordering::Relaxed);
                } else {
                    let total_chunks = file.size.div_ceil(CHUNK_SIZE as u64);

                    if total_chunks as usize <= SMALL_FILE_TOMBSTONE_THRESHOLD {
                        self.fs.chunk_store.delete_range(
                            &mut txn,
                            &self.tenant,
                            target_id,
                            0,
                            total_chunks,
                        );
                    } else {
                        self.fs
                            .tombstone_store
                            .add(&mut txn, &self.tenant, target_id, file.size);
                        self.fs
                            .stats
                            .tombstones_created
                            .fetch_add(1, Ordering::Relaxed);
                    }

                    self.fs
                        .inode_store
                        .delete(&mut txn, &self.tenant, target_id);
                    self.fs.stats.files_deleted.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        self.fs
            .directory_store
            .remove(&mut txn, &self.tenant, dirid, name, cookie);

        if let Inode::Directory(dir) = &mut dir_inode {
            dir.entry_count = dir.entry_count.saturating_sub(1);
        }
        self.fs
            .inode_store
            .save(&mut txn, &self.tenant, dirid, &dir_inode)?;

        self.fs.db.write(txn).await?;
        self.fs.stats.total_operations.fetch_add(1, Ordering::Relaxed);

        Ok(())
    }

    /// Returns the part of `[offset, offset + size)` that lies inside the file.
    pub async fn read(&self, id: InodeId, offset: u64, size: u64) -> Result<Bytes, FsError> {
        debug!(
            "read: tenant={}, id={}, offset={}, size={}",
            self.tenant, id, offset, size
        );

        let inode = self.fs.inode_store.get(&self.tenant, id).await?;
        let file = match &inode {
            Inode::File(file) => file,
            Inode::Directory(_) => return Err(FsError::IsDirectory),
        };

        if offset >= file.size {
            return Ok(Bytes::new());
        }

        let read_len = size.min(file.size - offset).min(MAX_READ_SIZE);
        let data = self
            .fs
            .chunk_store
            .read(&self.tenant, id, offset, read_len)
            .await?;

        self.fs
            .stats
            .bytes_read
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        self.fs.stats.read_operations.fetch_add(1, Ordering::Relaxed);
        self.fs.stats.total_operations.fetch_add(1, Ordering::Relaxed);

        Ok(data)
    }

    /// Writes `data` at `offset`, growing the file with zeros as needed.
    /// Returns the number of bytes written.
    pub async fn write(&self, id: InodeId, offset: u64, data: &[u8]) -> Result<u64, FsError> {
        debug!(
            "write: tenant={}, id={}, offset={}, len={}",
            self.tenant,
            id,
            offset,
            data.len()
        );

        let end_offset = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= MAX_FILE_SIZE)
            .ok_or(FsError::FileTooLarge)?;

        let _guard = self.fs.lock_manager.acquire_write(&self.tenant, id).await;
        let mut inode = self.fs.inode_store.get(&self.tenant, id).await?;

        let file = match &mut inode {
            Inode::File(file) => file,
            Inode::Directory(_) => return Err(FsError::IsDirectory),
        };

        let mut txn = self.fs.db.new_transaction();
        self.fs
            .chunk_store
            .write(&mut txn, &self.tenant, id, offset, data)
            .await?;

        file.size = file.size.max(end_offset);
        let new_size = file.size;
        self.fs.inode_store.save(&mut txn, &self.tenant, id, &inode)?;

        self.fs.db.write(txn).await?;

        debug!("write: inode {} now {} bytes", id, new_size);

        self.fs
            .stats
            .bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        self.fs.stats.write_operations.fetch_add(1, Ordering::Relaxed);
        self.fs.stats.total_operations.fetch_add(1, Ordering::Relaxed);

        Ok(data.len() as u64)
    }

    /// Entry at position `offset` of `[".", "..", children...]`, children in
    /// insertion order. Past the end yields `NotFound`.
    pub async fn iterate(&self, dirid: InodeId, offset: u64) -> Result<DirEntry, FsError> {
        debug!(
            "iterate: tenant={}, dirid={}, offset={}",
            self.tenant, dirid, offset
        );

        let dir_inode = self.get_directory(dirid).await?;
        self.fs.stats.listings.fetch_add(1, Ordering::Relaxed);
        self.fs.stats.total_operations.fetch_add(1, Ordering::Relaxed);

        match offset {
            0 => Ok(DirEntry {
                fileid: dirid,
                name: b".".to_vec(),
                mode: dir_inode.mode(),
            }),
            1 => {
                let parent_id = match &dir_inode {
                    Inode::Directory(dir) if self.fs.options.resolve_parent_entry => dir.parent,
                    _ => dirid,
                };
                let mode = if parent_id == dirid {
                    dir_inode.mode()
                } else {
                    self.fs
                        .inode_store
                        .get(&self.tenant, parent_id)
                        .await?
                        .mode()
                };
                Ok(DirEntry {
                    fileid: parent_id,
                    name: b"..".to_vec(),
                    mode,
                })
            }
            _ => {
                let entry = self
                    .fs
                    .directory_store
                    .nth(&self.tenant, dirid, offset - 2)
                    .await?
                    .ok_or(FsError::NotFound)?;
                let target = self
                    .fs
                    .inode_store
                    .get(&self.tenant, entry.inode_id)
                    .await?;
                Ok(DirEntry {
                    fileid: entry.inode_id,
                    name: entry.name,
                    mode: target.mode(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::inode::{ROOT_MODE, S_IFDIR, S_IFREG};

    #[tokio::test]
    async fn test_tenant_bootstrap_creates_root() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("alice").await.unwrap();

        let root = tfs.getattr(ROOT_ID).await.unwrap();
        assert_eq!(root.fileid, ROOT_ID);
        assert_eq!(root.mode, ROOT_MODE);
        assert_eq!(root.size, 0);

        let inode = fs.inode_store.get(tfs.tenant(), ROOT_ID).await.unwrap();
        assert_eq!(inode.nlink(), 1);
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        {
            let tfs = fs.tenant("alice").await.unwrap();
            tfs.create(ROOT_ID, b"keep", S_IFREG | 0o644).await.unwrap();
        }

        // A second handle must not reset the root
        let tfs = fs.tenant("alice").await.unwrap();
        assert_eq!(tfs.lookup(ROOT_ID, b"keep").await.unwrap().fileid, ROOT_ID + 1);
        assert_eq!(fs.stats.tenants_bootstrapped.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn test_invalid_token() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        assert!(matches!(fs.tenant("").await, Err(FsError::InvalidArgument)));
    }

    #[tokio::test]
    async fn test_create_allocates_sequential_ids() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();

        let a = tfs.create(ROOT_ID, b"a", S_IFREG | 0o644).await.unwrap();
        let b = tfs.create(ROOT_ID, b"b", S_IFDIR | 0o755).await.unwrap();
        assert_eq!(a.fileid, ROOT_ID + 1);
        assert_eq!(b.fileid, ROOT_ID + 2);
        assert_eq!(a.mode, S_IFREG | 0o644);
        assert_eq!(a.size, 0);
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates_and_bad_names() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();

        tfs.create(ROOT_ID, b"x", S_IFREG | 0o644).await.unwrap();
        assert_eq!(
            tfs.create(ROOT_ID, b"x", S_IFREG | 0o644).await,
            Err(FsError::Exists)
        );
        assert_eq!(
            tfs.create(ROOT_ID, b"", 0o644).await,
            Err(FsError::InvalidArgument)
        );
        assert_eq!(
            tfs.create(ROOT_ID, b"a/b", 0o644).await,
            Err(FsError::InvalidArgument)
        );
        assert_eq!(
            tfs.create(ROOT_ID, &[b'n'; NAME_MAX + 1], 0o644).await,
            Err(FsError::NameTooLong)
        );

        // The failed duplicate must not have consumed an id
        let next = tfs.create(ROOT_ID, b"y", 0o644).await.unwrap();
        assert_eq!(next.fileid, ROOT_ID + 2);
    }

    #[tokio::test]
    async fn test_create_in_file_fails() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();

        let file = tfs.create(ROOT_ID, b"f", S_IFREG | 0o644).await.unwrap();
        assert_eq!(
            tfs.create(file.fileid, b"child", 0o644).await,
            Err(FsError::NotDirectory)
        );
        assert_eq!(
            tfs.create(4242, b"child", 0o644).await,
            Err(FsError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_read_and_write_reject_directories() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();

        assert_eq!(tfs.read(ROOT_ID, 0, 10).await, Err(FsError::IsDirectory));
        assert_eq!(
            tfs.write(ROOT_ID, 0, b"data").await,
            Err(FsError::IsDirectory)
        );
        assert_eq!(tfs.write(9999, 0, b"data").await, Err(FsError::NotFound));
    }

    #[tokio::test]
    async fn test_write_is_clipped_on_read() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let id = tfs.create(ROOT_ID, b"f", 0o644).await.unwrap().fileid;

        assert_eq!(tfs.write(id, 0, b"hello world").await.unwrap(), 11);
        assert_eq!(tfs.read(id, 6, 100).await.unwrap().as_ref(), b"world");
        assert_eq!(tfs.read(id, 0, 0).await.unwrap().len(), 0);
        assert_eq!(tfs.getattr(id).await.unwrap().size, 11);

        // Overwrite inside the file keeps its size
        tfs.write(id, 0, b"HELLO").await.unwrap();
        assert_eq!(tfs.read(id, 0, 11).await.unwrap().as_ref(), b"HELLO world");
        assert_eq!(tfs.getattr(id).await.unwrap().size, 11);
    }

    #[tokio::test]
    async fn test_zero_length_write_extends_size() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let id = tfs.create(ROOT_ID, b"f", 0o644).await.unwrap().fileid;

        assert_eq!(tfs.write(id, 100, b"").await.unwrap(), 0);
        assert_eq!(tfs.getattr(id).await.unwrap().size, 100);
        assert_eq!(tfs.read(id, 0, 100).await.unwrap().as_ref(), &[0u8; 100]);
    }

    #[tokio::test]
    async fn test_write_past_max_file_size_is_rejected() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let id = tfs.create(ROOT_ID, b"f", 0o644).await.unwrap().fileid;

        assert!(matches!(
            tfs.write(id, u64::MAX - 10, b"hello").await,
            Err(FsError::FileTooLarge)
        ));
        assert!(matches!(
            tfs.write(id, u64::MAX - 2, b"hello").await,
            Err(FsError::FileTooLarge)
        ));
        assert!(matches!(
            tfs.write(id, MAX_FILE_SIZE, b"x").await,
            Err(FsError::FileTooLarge)
        ));
        assert!(matches!(
            tfs.write(id, MAX_FILE_SIZE + 1, b"").await,
            Err(FsError::FileTooLarge)
        ));
        assert_eq!(tfs.getattr(id).await.unwrap().size, 0);

        assert_eq!(tfs.write(id, MAX_FILE_SIZE - 1, b"x").await.unwrap(), 1);
        assert_eq!(tfs.getattr(id).await.unwrap().size, MAX_FILE_SIZE);
        assert_eq!(
            tfs.read(id, MAX_FILE_SIZE - 1, 10).await.unwrap().as_ref(),
            b"x"
        );
    }

    #[tokio::test]
    async fn test_large_sparse_read_is_clamped() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let id = tfs.create(ROOT_ID, b"f", 0o644).await.unwrap().fileid;

        tfs.write(id, 1 << 40, b"x").await.unwrap();
        assert_eq!(tfs.getattr(id).await.unwrap().size, (1 << 40) + 1);

        let data = tfs.read(id, 0, 1 << 40).await.unwrap();
        assert_eq!(data.len() as u64, MAX_READ_SIZE);
        assert!(data.iter().all(|&b| b == 0));

        let tail = tfs.read(id, 1 << 40, u64::MAX).await.unwrap();
        assert_eq!(tail.as_ref(), b"x");
    }

    #[tokio::test]
    async fn test_unlink_reclaims_small_file() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let id = tfs.create(ROOT_ID, b"f", 0o644).await.unwrap().fileid;
        tfs.write(id, 0, b"contents").await.unwrap();

        tfs.unlink(ROOT_ID, b"f").await.unwrap();

        assert_eq!(tfs.getattr(id).await, Err(FsError::NotFound));
        assert_eq!(tfs.lookup(ROOT_ID, b"f").await, Err(FsError::NotFound));
        assert!(fs.chunk_store.get(tfs.tenant(), id, 0).await.unwrap().is_none());
        assert_eq!(tfs.unlink(ROOT_ID, b"f").await, Err(FsError::NotFound));
    }

    #[tokio::test]
    async fn test_unlink_large_file_leaves_tombstone_for_gc() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let id = tfs.create(ROOT_ID, b"big", 0o644).await.unwrap().fileid;

        let chunks = SMALL_FILE_TOMBSTONE_THRESHOLD + 2;
        let data = vec![0xABu8; CHUNK_SIZE * chunks];
        tfs.write(id, 0, &data).await.unwrap();
        tfs.unlink(ROOT_ID, b"big").await.unwrap();

        assert_eq!(tfs.getattr(id).await, Err(FsError::NotFound));
        assert!(fs.chunk_store.get(tfs.tenant(), id, 0).await.unwrap().is_some());

        let gc = fs.garbage_collector(Duration::from_secs(60));
        gc.run().await.unwrap();

        for idx in 0..chunks as u64 {
            assert!(
                fs.chunk_store
                    .get(tfs.tenant(), id, idx)
                    .await
                    .unwrap()
                    .is_none()
            );
        }
        assert_eq!(fs.stats.tombstones_processed.load(Ordering::Relaxed), 1);
        assert_eq!(
            fs.stats.gc_chunks_deleted.load(Ordering::Relaxed),
            chunks as u64
        );
    }

    #[tokio::test]
    async fn test_unlink_rejects_directory_and_rmdir_rejects_file() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        tfs.create(ROOT_ID, b"d", S_IFDIR | 0o755).await.unwrap();
        tfs.create(ROOT_ID, b"f", S_IFREG | 0o644).await.unwrap();

        assert_eq!(tfs.unlink(ROOT_ID, b"d").await, Err(FsError::IsDirectory));
        assert_eq!(tfs.rmdir(ROOT_ID, b"f").await, Err(FsError::NotDirectory));
        assert!(tfs.lookup(ROOT_ID, b"d").await.is_ok());
        assert!(tfs.lookup(ROOT_ID, b"f").await.is_ok());
    }

    #[tokio::test]
    async fn test_rmdir_requires_empty_directory() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let dir = tfs.create(ROOT_ID, b"d", S_IFDIR | 0o755).await.unwrap();
        tfs.create(dir.fileid, b"inner", 0o644).await.unwrap();

        assert_eq!(tfs.rmdir(ROOT_ID, b"d").await, Err(FsError::NotEmpty));

        tfs.unlink(dir.fileid, b"inner").await.unwrap();
        tfs.rmdir(ROOT_ID, b"d").await.unwrap();
        assert_eq!(tfs.getattr(dir.fileid).await, Err(FsError::NotFound));
        assert_eq!(tfs.iterate(ROOT_ID, 2).await, Err(FsError::NotFound));
    }

    #[tokio::test]
    async fn test_link_shares_inode_and_counts_links() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let id = tfs.create(ROOT_ID, b"orig", 0o644).await.unwrap().fileid;
        tfs.write(id, 0, b"shared").await.unwrap();

        tfs.link(ROOT_ID, b"alias", id).await.unwrap();
        assert_eq!(tfs.lookup(ROOT_ID, b"alias").await.unwrap().fileid, id);
        assert_eq!(
            fs.inode_store.get(tfs.tenant(), id).await.unwrap().nlink(),
            2
        );

        assert_eq!(
            tfs.link(ROOT_ID, b"alias", id).await,
            Err(FsError::Exists)
        );
        assert_eq!(tfs.link(ROOT_ID, b"ghost", 5555).await, Err(FsError::NotFound));

        // Dropping one name keeps the content reachable through the other
        tfs.unlink(ROOT_ID, b"orig").await.unwrap();
        assert_eq!(
            fs.inode_store.get(tfs.tenant(), id).await.unwrap().nlink(),
            1
        );
        assert_eq!(tfs.read(id, 0, 6).await.unwrap().as_ref(), b"shared");

        tfs.unlink(ROOT_ID, b"alias").await.unwrap();
        assert_eq!(tfs.getattr(id).await, Err(FsError::NotFound));
    }

    #[tokio::test]
    async fn test_iterate_resolves_parent_when_enabled() {
        let fs = InodeFs::new_in_memory_with_options(FsOptions {
            resolve_parent_entry: true,
        })
        .await
        .unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let dir = tfs.create(ROOT_ID, b"sub", S_IFDIR | 0o700).await.unwrap();

        let dot = tfs.iterate(dir.fileid, 0).await.unwrap();
        assert_eq!(dot.fileid, dir.fileid);
        assert_eq!(dot.mode, S_IFDIR | 0o700);

        let dotdot = tfs.iterate(dir.fileid, 1).await.unwrap();
        assert_eq!(dotdot.fileid, ROOT_ID);
        assert_eq!(dotdot.mode, ROOT_MODE);

        // The root is its own parent
        assert_eq!(tfs.iterate(ROOT_ID, 1).await.unwrap().fileid, ROOT_ID);
    }

    #[tokio::test]
    async fn test_iterate_rejects_files() {
        let fs = InodeFs::new_in_memory().await.unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let id = tfs.create(ROOT_ID, b"f", 0o644).await.unwrap().fileid;

        assert_eq!(tfs.iterate(id, 0).await, Err(FsError::NotDirectory));
        assert_eq!(tfs.lookup(id, b"x").await, Err(FsError::NotDirectory));
    }

    #[tokio::test]
    async fn test_counter_survives_new_instance() {
        use slatedb::DbBuilder;
        use slatedb::object_store::{ObjectStore, memory::InMemory, path::Path};

        let object_store: Arc<dyn ObjectStore> = Arc::new(InMemory::new());
        let path = Path::from("test_restart");

        {
            let slatedb = Arc::new(
                DbBuilder::new(path.clone(), object_store.clone())
                    .build()
                    .await
                    .unwrap(),
            );
            let fs = InodeFs::new_with_slatedb(slatedb, FsOptions::default())
                .await
                .unwrap();
            let tfs = fs.tenant("t").await.unwrap();
            tfs.create(ROOT_ID, b"a", 0o644).await.unwrap();
            tfs.create(ROOT_ID, b"b", 0o644).await.unwrap();
            fs.db.flush().await.unwrap();
            fs.db.close().await.unwrap();
        }

        let slatedb = Arc::new(DbBuilder::new(path, object_store).build().await.unwrap());
        let fs = InodeFs::new_with_slatedb(slatedb, FsOptions::default())
            .await
            .unwrap();
        let tfs = fs.tenant("t").await.unwrap();
        let c = tfs.create(ROOT_ID, b"c", 0o644).await.unwrap();
        assert_eq!(c.fileid, ROOT_ID + 3);
        assert_eq!(tfs.lookup(ROOT_ID, b"a").await.unwrap().fileid, ROOT_ID + 1);
    }

    #[test]
    fn test_validate_filename() {
        assert!(validate_filename(b"ok.txt").is_ok());
        assert!(validate_filename(&[b'a'; NAME_MAX]).is_ok());
        assert_eq!(validate_filename(b"."), Err(FsError::InvalidArgument));
        assert_eq!(validate_filename(b".."), Err(FsError::InvalidArgument));
        assert_eq!(validate_filename(b"a\0b"), Err(FsError::InvalidArgument));
    }
}
