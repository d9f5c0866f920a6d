//! Per-(session, discriminator) lock registry.
//!
//! Entries are created on first acquisition and removed once nobody holds
//! or waits on them. The registry only serializes event handling while a
//! guard is alive; it is not a durable session lock, and the conversation
//! store remains the source of truth.

use parking_lot::Mutex;
use parley_core::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

type LockKey = (SessionId, String);
type LockTable = HashMap<LockKey, Arc<AsyncMutex<()>>>;

/// Shared lock table. Cloning shares the same table.
#[derive(Clone, Default)]
pub struct SessionLocks {
    table: Arc<Mutex<LockTable>>,
}

impl SessionLocks {
    /// Create an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a handle on the mutex for `(session, discriminator)`, creating
    /// the entry if needed. The handle does not hold the lock yet.
    pub fn acquire(&self, session: SessionId, discriminator: &str) -> SessionLock {
        let key = (session, discriminator.to_string());
        let mutex = self
            .table
            .lock()
            .entry(key.clone())
            .or_default()
            .clone();
        SessionLock {
            key,
            mutex: Some(mutex),
            locks: self.clone(),
        }
    }

    /// Remove the entry for `(session, discriminator)` unless another
    /// handle or guard still references it.
    ///
    /// Guards and handles call this on drop, so callers rarely need it.
    pub fn release(&self, session: SessionId, discriminator: &str) {
        self.release_key(&(session, discriminator.to_string()));
    }

    fn release_key(&self, key: &LockKey) {
        let mut table = self.table.lock();
        if let Some(mutex) = table.get(key) {
            if Arc::strong_count(mutex) == 1 {
                table.remove(key);
                trace!(session = %key.0, discriminator = %key.1, "Lock entry released");
            }
        }
    }

    /// Number of live entries in the table.
    pub fn active_count(&self) -> usize {
        self.table.lock().len()
    }
}

/// Unlocked handle on one table entry.
pub struct SessionLock {
    key: LockKey,
    mutex: Option<Arc<AsyncMutex<()>>>,
    locks: SessionLocks,
}

impl SessionLock {
    /// Wait until the lock is free and take it.
    pub async fn lock(mut self) -> SessionLockGuard {
        let mutex = self.mutex.take().unwrap_or_default();
        let guard = mutex.lock_owned().await;
        SessionLockGuard {
            key: self.key.clone(),
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }

    /// Take the lock if it is free right now.
    pub fn try_lock(mut self) -> Option<SessionLockGuard> {
        let mutex = self.mutex.take()?;
        let guard = mutex.try_lock_owned().ok()?;
        Some(SessionLockGuard {
            key: self.key.clone(),
            guard: Some(guard),
            locks: self.locks.clone(),
        })
    }
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        drop(self.mutex.take());
        self.locks.release_key(&self.key);
    }
}

/// Held lock. Dropping it unlocks and releases the table entry, including
/// while unwinding from a panic.
pub struct SessionLockGuard {
    key: LockKey,
    guard: Option<OwnedMutexGuard<()>>,
    locks: SessionLocks,
}

impl SessionLockGuard {
    /// Session this guard belongs to.
    pub fn session_id(&self) -> SessionId {
        self.key.0
    }

    /// Discriminator this guard belongs to.
    pub fn discriminator(&self) -> &str {
        &self.key.1
    }

    /// Unlock explicitly.
    pub fn unlock(self) {}
}

impl Drop for SessionLockGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release_key(&self.key);
    }
}
