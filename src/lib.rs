//! Managed OS threads: a controllable lifecycle (start, pause/resume,
//! cooperative stop), a tag side channel, periodic timers and a fan-out/join
//! combinator.
//!
//! ```rust,no_run
//! use managed_thread::{ManagedThread, WorkUnit};
//! use std::time::Duration;
//!
//! let thread = ManagedThread::spawn(WorkUnit::every(
//!     Duration::from_millis(100),
//!     |sender, label| {
//!         let ticks = sender.tag("ticks").and_then(|v| v.as_int()).unwrap_or(0);
//!         sender.set_tag("ticks", ticks + 1);
//!         println!("{label}: tick");
//!     },
//!     "poller",
//! ))?;
//!
//! std::thread::sleep(Duration::from_millis(350));
//! assert!(thread.stop_timeout(Duration::from_secs(1)));
//! # Ok::<(), managed_thread::ThreadError>(())
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod thread;

pub use config::ThreadConfig;
pub use error::{Result, ThreadError};
pub use thread::{
    ActionResult, ExitReason, ManagedThread, Mode, PeriodicTimer, Priority, Registry, TagValue,
    Tags, ThreadId, ThreadOptions, ThreadStatus, WorkUnit, registry, run_after, run_async,
    run_async_with, run_one_async, stop_all,
};
