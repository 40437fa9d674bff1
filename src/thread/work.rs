//! Work units: what a managed thread executes.

use std::sync::Arc;
use std::time::Duration;

use super::managed::ManagedThread;

/// The work function: receives the owning thread and the unit's parameters.
pub type WorkFn<P> = Arc<dyn Fn(&ManagedThread, &P) + Send + Sync + 'static>;

/// Invoked once after the thread reaches `Exited`, with the same arguments
/// the work function received.
pub type ExitFn<P> = Box<dyn FnOnce(&ManagedThread, &P) + Send + 'static>;

/// Invocation mode of a work unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Invoke the action exactly once
    Once,
    /// Invoke the action until a stop is observed, sleeping `interval`
    /// after each invocation when set
    Repeat { interval: Option<Duration> },
}

impl Mode {
    pub fn is_repeating(&self) -> bool {
        matches!(self, Self::Repeat { .. })
    }
}

/// One schedulable piece of work.
pub struct WorkUnit<P> {
    pub action: WorkFn<P>,
    pub mode: Mode,
    pub parameters: P,
}

impl<P> WorkUnit<P> {
    pub fn new<F>(action: F, mode: Mode, parameters: P) -> Self
    where
        F: Fn(&ManagedThread, &P) + Send + Sync + 'static,
    {
        Self {
            action: Arc::new(action),
            mode,
            parameters,
        }
    }

    /// A run-once unit.
    pub fn once<F>(action: F, parameters: P) -> Self
    where
        F: Fn(&ManagedThread, &P) + Send + Sync + 'static,
    {
        Self::new(action, Mode::Once, parameters)
    }

    /// A repeating unit with no delay between iterations.
    pub fn repeat<F>(action: F, parameters: P) -> Self
    where
        F: Fn(&ManagedThread, &P) + Send + Sync + 'static,
    {
        Self::new(action, Mode::Repeat { interval: None }, parameters)
    }

    /// A repeating unit that sleeps `interval` after every invocation.
    pub fn every<F>(interval: Duration, action: F, parameters: P) -> Self
    where
        F: Fn(&ManagedThread, &P) + Send + Sync + 'static,
    {
        Self::new(
            action,
            Mode::Repeat {
                interval: Some(interval),
            },
            parameters,
        )
    }
}

impl<P: std::fmt::Debug> std::fmt::Debug for WorkUnit<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("mode", &self.mode)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}
