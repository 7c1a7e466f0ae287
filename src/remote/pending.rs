//! In-flight operation tracking and the scoped "shutting down" flag.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::{CacheError, Result};

/// Set of operations that have been dispatched but not yet completed.
///
/// Empty at rest. Shutdown waits on [`PendingOperations::wait_drained`].
#[derive(Debug, Default)]
pub struct PendingOperations {
    ids: Mutex<HashSet<Uuid>>,
    drained: Notify,
}

impl PendingOperations {
    pub fn new() -> Self {
        Self::default()
    }

    fn ids(&self) -> MutexGuard<'_, HashSet<Uuid>> {
        self.ids.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a new operation. It stays pending until the guard drops.
    pub fn register(&self) -> PendingGuard<'_> {
        let id = Uuid::new_v4();
        self.ids().insert(id);
        PendingGuard { set: self, id }
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// Resolves once no operation is pending.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            // Register interest before checking, so a completion in between is not lost
            notified.as_mut().enable();
            if self.is_empty() {
                return;
            }
            notified.await;
        }
    }
}

/// Removes its operation from the pending set on every exit path.
#[derive(Debug)]
pub struct PendingGuard<'a> {
    set: &'a PendingOperations,
    id: Uuid,
}

impl PendingGuard<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let now_empty = {
            let mut ids = self.set.ids();
            ids.remove(&self.id);
            ids.is_empty()
        };
        if now_empty {
            self.set.drained.notify_waiters();
        }
    }
}

/// Holds the "shutting down" flag for a scope and clears it on drop.
#[derive(Debug)]
pub struct ShuttingDownGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ShuttingDownGuard<'a> {
    /// Raises the flag, failing if another scope already holds it.
    pub fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| CacheError::ShuttingDown)?;
        Ok(Self { flag })
    }
}

impl Drop for ShuttingDownGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
