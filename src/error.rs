//! Error types for managed threads.

use thiserror::Error;

use crate::thread::ThreadId;

/// Result type alias for managed-thread operations
pub type Result<T> = std::result::Result<T, ThreadError>;

/// Errors raised by the lifecycle, timer and fan-out layers.
#[derive(Error, Debug)]
pub enum ThreadError {
    /// `start` was called on an instance that already spawned its thread
    #[error("Thread {0} was already started")]
    AlreadyStarted(ThreadId),

    /// `start` was called after `stop`; a fresh instance is required
    #[error("Thread {0} was stopped and cannot be restarted")]
    Stopped(ThreadId),

    /// Negative interval other than the `-1` "no delay" sentinel
    #[error("Invalid interval {0}ms: use -1 for no delay or a non-negative value")]
    InvalidInterval(i64),

    /// The OS refused to spawn the execution thread
    #[error("Failed to spawn thread {id}: {source}")]
    Spawn {
        id: ThreadId,
        #[source]
        source: std::io::Error,
    },

    /// A fan-out action panicked instead of returning a value
    #[error("Action {index} panicked: {message}")]
    ActionPanicked { index: usize, message: String },

    /// A fan-out slot was never written
    #[error("No result recorded for action {0}")]
    MissingResult(usize),
}

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
