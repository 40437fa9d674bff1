//! Managed threads with a controllable lifecycle.
//!
//! A managed thread wraps one OS thread with:
//! - A monotonic lifecycle (not started → running → exited)
//! - Cooperative stop (fire-and-forget, blocking, or bounded)
//! - Pause/resume for repeating work
//! - A tag map for auxiliary state
//!
//! Built on top of it:
//! - [`PeriodicTimer`] and [`run_after`]
//! - [`run_async`] fan-out/join
//! - The process-wide [`Registry`] used by [`stop_all`]

mod fanout;
mod managed;
mod model;
mod registry;
mod timer;
mod work;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use fanout::{ActionResult, run_async, run_async_with, run_one_async};
pub use managed::{ManagedThread, PAUSE_QUANTUM, ThreadOptions};
pub use model::{ExitReason, Priority, TagValue, Tags, ThreadId, ThreadStatus};
pub use registry::{Registry, registry, stop_all};
pub use timer::{PeriodicTimer, TIMER_QUANTUM, run_after};
pub use work::{ExitFn, Mode, WorkFn, WorkUnit};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
