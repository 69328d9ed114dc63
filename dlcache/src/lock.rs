//! Per-destination mutual exclusion.
//!
//! The registry hands out one lock per absolute destination path so that two
//! downloads writing the same output file in this process are strictly
//! serialized. Locks are never evicted: a build-tool process is short-lived
//! and touches a bounded set of outputs. A long-running service would want
//! idle-time eviction here.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::error::{DownloadError, DownloadResult};

/// State behind one destination path.
#[derive(Debug, Default)]
struct LockSlot {
    held: Mutex<bool>,
    released: Condvar,
}

/// Registry of per-destination locks.
#[derive(Debug, Default)]
pub struct TargetLockRegistry {
    slots: DashMap<PathBuf, Arc<LockSlot>>,
}

/// Held lock on a destination path, released on drop.
#[derive(Debug)]
pub struct TargetLock {
    slot: Arc<LockSlot>,
    path: PathBuf,
}

impl TargetLock {
    /// The registry key this lock was taken on.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TargetLock {
    fn drop(&mut self) {
        let mut held = self.slot.held.lock();
        *held = false;
        self.slot.released.notify_one();
    }
}

impl TargetLockRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry.
    pub fn global() -> Arc<TargetLockRegistry> {
        static GLOBAL: OnceLock<Arc<TargetLockRegistry>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(TargetLockRegistry::new())))
    }

    /// Acquire the lock for `path`, waiting at most `timeout`.
    pub fn acquire(&self, path: &Path, timeout: Duration) -> DownloadResult<TargetLock> {
        let key = lock_key(path);

        // Clone the slot out so the map shard is not held while waiting.
        let slot = Arc::clone(self.slots.entry(key.clone()).or_default().value());

        let deadline = Instant::now() + timeout;
        let mut held = slot.held.lock();
        while *held {
            if slot.released.wait_until(&mut held, deadline).timed_out() && *held {
                return Err(DownloadError::LockTimeout {
                    path: key,
                    waited: timeout,
                });
            }
        }
        *held = true;
        drop(held);

        debug!(path = %key.display(), "Acquired target lock");
        Ok(TargetLock { slot, path: key })
    }

    /// Number of distinct destination paths seen so far.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Registry key for a destination: absolute, with the deepest existing
/// ancestor canonicalized and the not-yet-created components re-appended.
///
/// The key must not change once missing parent directories are created, so
/// `link/new/out` maps to `real/new/out` before and after `new/` exists.
fn lock_key(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let (Some(parent), Some(name)) = (absolute.parent(), absolute.file_name()) else {
        return absolute;
    };

    let mut missing = Vec::new();
    let mut ancestor = parent;
    loop {
        if let Ok(mut key) = ancestor.canonicalize() {
            key.extend(missing.iter().rev());
            key.push(name);
            return key;
        }
        match (ancestor.parent(), ancestor.file_name()) {
            (Some(up), Some(component)) => {
                missing.push(component);
                ancestor = up;
            }
            _ => return absolute,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use tempfile::TempDir;

    #[test]
    fn test_acquire_and_release() {
        let registry = TargetLockRegistry::new();
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.bin");

        let lock = registry.acquire(&path, Duration::from_millis(10)).unwrap();
        drop(lock);
        let again = registry.acquire(&path, Duration::from_millis(10));
        assert!(again.is_ok());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_contended_lock_times_out() {
        let registry = TargetLockRegistry::new();
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.bin");

        let _held = registry.acquire(&path, Duration::from_secs(1)).unwrap();
        let result = registry.acquire(&path, Duration::from_millis(50));

        match result {
            Err(DownloadError::LockTimeout { waited, .. }) => {
                assert_eq!(waited, Duration::from_millis(50))
            }
            other => panic!("Expected LockTimeout, got {:?}", other),
        }
    }

    #[test]
    fn test_different_paths_do_not_contend() {
        let registry = TargetLockRegistry::new();
        let temp = TempDir::new().unwrap();

        let _a = registry.acquire(&temp.path().join("a"), Duration::ZERO).unwrap();
        let _b = registry.acquire(&temp.path().join("b"), Duration::ZERO).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_equivalent_paths_share_a_lock() {
        let registry = TargetLockRegistry::new();
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("sub")).unwrap();

        let direct = temp.path().join("out.bin");
        let roundabout = temp.path().join("sub").join("..").join("out.bin");

        let _held = registry.acquire(&direct, Duration::ZERO).unwrap();
        assert!(registry.acquire(&roundabout, Duration::from_millis(10)).is_err());
    }

    #[test]
    fn test_key_is_stable_when_missing_parent_is_created() {
        let registry = TargetLockRegistry::new();
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("new").join("deeper").join("out.bin");

        let held = registry.acquire(&path, Duration::ZERO).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        assert!(registry.acquire(&path, Duration::from_millis(50)).is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(held.path(), lock_key(&path));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_parent_created_while_held_shares_lock() {
        let registry = TargetLockRegistry::new();
        let temp = TempDir::new().unwrap();
        let real = temp.path().join("real");
        std::fs::create_dir(&real).unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();

        let through_link = link.join("new").join("out.bin");
        let held = registry.acquire(&through_link, Duration::ZERO).unwrap();
        assert!(held.path().starts_with(real.canonicalize().unwrap()));

        std::fs::create_dir_all(link.join("new")).unwrap();

        assert!(registry.acquire(&through_link, Duration::from_millis(50)).is_err());
        let direct = real.join("new").join("out.bin");
        assert!(registry.acquire(&direct, Duration::from_millis(50)).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_waiter_acquires_after_release() {
        let registry = Arc::new(TargetLockRegistry::new());
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.bin");

        let held = registry.acquire(&path, Duration::ZERO).unwrap();
        let waiter = {
            let registry = Arc::clone(&registry);
            let path = path.clone();
            thread::spawn(move || registry.acquire(&path, Duration::from_secs(5)).is_ok())
        };

        thread::sleep(Duration::from_millis(50));
        drop(held);
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_mutual_exclusion_under_contention() {
        let registry = Arc::new(TargetLockRegistry::new());
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("out.bin");
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let path = path.clone();
                let inside = Arc::clone(&inside);
                let max_inside = Arc::clone(&max_inside);
                thread::spawn(move || {
                    let _lock = registry.acquire(&path, Duration::from_secs(10)).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(5));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_global_registry_is_shared() {
        let a = TargetLockRegistry::global();
        let b = TargetLockRegistry::global();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
