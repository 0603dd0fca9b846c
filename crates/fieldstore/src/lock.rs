//! Per-field locks.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard};

/// Mutual-exclusion primitive guarding one field (or one group of mutually
/// conflicting fields) of one storage instance.
///
/// The lock is not re-entrant: a change action or conflict predicate that
/// reads a field of its own lock group in locked mode will deadlock.
#[derive(Debug, Default)]
pub struct FieldLock {
    mutex: Mutex<()>,
    acquisitions: AtomicU64,
}

impl FieldLock {
    /// Creates an unlocked lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until the lock is held.
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        let guard = self.mutex.lock();
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        guard
    }

    /// Returns true while some thread holds the lock.
    pub fn is_locked(&self) -> bool {
        self.mutex.is_locked()
    }

    /// Number of times the lock has been acquired.
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }
}
