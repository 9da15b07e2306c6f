use super::inode::InodeId;
use super::tenant::Tenant;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const LOCK_STRIPES: usize = 1024;

/// Per-inode write locks, striped over a fixed table.
///
/// Two inodes may share a stripe. Multi-inode acquisition takes stripes in
/// ascending order and skips duplicates.
pub struct LockManager {
    stripes: Vec<Arc<Mutex<()>>>,
}

pub struct LockGuard {
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::with_stripes(LOCK_STRIPES)
    }

    pub fn with_stripes(count: usize) -> Self {
        let stripes = (0..count.max(1)).map(|_| Arc::new(Mutex::new(()))).collect();
        Self { stripes }
    }

    fn stripe(&self, tenant: &Tenant, id: InodeId) -> usize {
        let mut hasher = DefaultHasher::new();
        tenant.hash(&mut hasher);
        id.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }

    pub async fn acquire_write(&self, tenant: &Tenant, id: InodeId) -> LockGuard {
        self.acquire_multiple_write(tenant, &[id]).await
    }

    pub async fn acquire_multiple_write(&self, tenant: &Tenant, ids: &[InodeId]) -> LockGuard {
        let mut stripes: Vec<usize> = ids.iter().map(|id| self.stripe(tenant, *id)).collect();
        stripes.sort_unstable();
        stripes.dedup();

        let mut guards = Vec::with_capacity(stripes.len());
        for idx in stripes {
            guards.push(self.stripes[idx].clone().lock_owned().await);
        }

        LockGuard { _guards: guards }
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_inode_is_exclusive() {
        let manager = Arc::new(LockManager::new());
        let tenant = Tenant::new("locks").unwrap();

        let guard = manager.acquire_write(&tenant, 5).await;

        let contender = {
            let manager = manager.clone();
            let tenant = tenant.clone();
            tokio::spawn(async move {
                let _guard = manager.acquire_write(&tenant, 5).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), contender)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_multiple_with_shared_stripe_does_not_self_deadlock() {
        // A single stripe forces every id onto the same mutex
        let manager = LockManager::with_stripes(1);
        let tenant = Tenant::new("locks").unwrap();

        let guard = tokio::time::timeout(
            Duration::from_secs(1),
            manager.acquire_multiple_write(&tenant, &[1, 2, 3]),
        )
        .await
        .unwrap();
        drop(guard);

        let _again = manager.acquire_write(&tenant, 2).await;
    }
}
