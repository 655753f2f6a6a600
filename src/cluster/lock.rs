//! Named locks with bounded acquisition.
//!
//! # Responsibilities
//! - Serialize read-modify-write cycles on shared holders
//! - Bound every acquisition with a timeout (abandon, never block forever)
//! - Process-lifetime holds for single-scheduler election

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Error type for lock operations.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock '{0}' not acquired within the configured timeout")]
    Timeout(String),
}

/// Guard for a held lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct LockGuard {
    _guard: OwnedMutexGuard<()>,
}

/// Registry of named locks shared across the cluster fabric.
#[derive(Clone, Default)]
pub struct LockRegistry {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl LockRegistry {
    fn mutex(&self, name: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquire `name`, waiting at most `timeout`.
    pub async fn acquire(&self, name: &str, timeout: Duration) -> Result<LockGuard, LockError> {
        let mutex = self.mutex(name);
        match tokio::time::timeout(timeout, mutex.lock_owned()).await {
            Ok(guard) => Ok(LockGuard { _guard: guard }),
            Err(_) => Err(LockError::Timeout(name.to_string())),
        }
    }

    /// Take `name` without waiting. Used to elect the one node that runs a
    /// periodic job: the winner keeps the guard for its process lifetime.
    pub fn try_hold(&self, name: &str) -> Option<LockGuard> {
        self.mutex(name)
            .try_lock_owned()
            .ok()
            .map(|guard| LockGuard { _guard: guard })
    }
}
