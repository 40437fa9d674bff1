//! Registry of managed threads, used to stop everything at shutdown.
//!
//! Entries are weak and append-only: nothing is ever removed, so `stop_all`
//! is idempotent and safe to run while new threads register. A thread whose
//! handles were all dropped after it exited no longer upgrades and is
//! skipped.

use std::sync::{Mutex, OnceLock, Weak};

use tracing::{debug, info};

use super::lock;
use super::managed::{Inner, ManagedThread};
use super::model::ThreadStatus;

/// Ordered collection of managed thread references.
#[derive(Default)]
pub struct Registry {
    entries: Mutex<Vec<Weak<Inner>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, thread: &ManagedThread) {
        lock(&self.entries).push(thread.downgrade());
        debug!(thread_id = %thread.id(), "Thread registered");
    }

    /// Number of entries ever registered, live or not.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Handles to every entry that is still reachable, in registration order.
    pub fn live(&self) -> Vec<ManagedThread> {
        self.snapshot()
            .iter()
            .filter_map(Weak::upgrade)
            .map(ManagedThread::from_inner)
            .collect()
    }

    /// Entries that have not reached `Exited`.
    pub fn active(&self) -> Vec<ManagedThread> {
        self.live()
            .into_iter()
            .filter(|t| t.status() != ThreadStatus::Exited)
            .collect()
    }

    /// Stop every reachable entry, in registration order, one at a time.
    ///
    /// The entry list is snapshotted first; threads registered during the
    /// scan are not included. With `wait`, each stop blocks until that
    /// thread has exited before the next one is asked to stop. Returns the
    /// number of threads that were asked to stop.
    pub fn stop_all(&self, wait: bool) -> usize {
        let snapshot = self.snapshot();
        let mut stopped = 0;
        for entry in &snapshot {
            let Some(inner) = entry.upgrade() else {
                continue;
            };
            let thread = ManagedThread::from_inner(inner);
            if wait {
                thread.stop_and_wait();
            } else {
                thread.stop();
            }
            stopped += 1;
        }
        info!(stopped, scanned = snapshot.len(), wait, "Stopped registered threads");
        stopped
    }

    fn snapshot(&self) -> Vec<Weak<Inner>> {
        lock(&self.entries).clone()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("entries", &self.len()).finish()
    }
}

/// Process-wide registry, created empty on first use.
static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Get the process-wide registry.
pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

/// Stop every thread in the process-wide registry.
pub fn stop_all(wait: bool) -> usize {
    registry().stop_all(wait)
}
