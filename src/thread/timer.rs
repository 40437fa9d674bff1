//! Periodic timer and delayed one-shot actions built on managed threads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::lock;
use super::managed::ManagedThread;
use super::model::ThreadStatus;
use super::work::WorkUnit;
use crate::error::Result;

/// Sleep between timer checks. This is the firing precision floor; an
/// interval shorter than this fires once per quantum.
pub const TIMER_QUANTUM: Duration = Duration::from_millis(10);

struct TimerState {
    interval: Duration,
    last_fired: Mutex<Option<Instant>>,
    fired: AtomicU64,
}

impl TimerState {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: Mutex::new(None),
            fired: AtomicU64::new(0),
        }
    }

    fn has_fired(&self) -> bool {
        lock(&self.last_fired).is_some()
    }

    /// Stamp `now` and return true when the callback is due.
    fn try_fire(&self, now: Instant) -> bool {
        let mut last = lock(&self.last_fired);
        match *last {
            Some(previous) if now.saturating_duration_since(previous) < self.interval => false,
            _ => {
                *last = Some(now);
                self.fired.fetch_add(1, Ordering::SeqCst);
                true
            }
        }
    }
}

/// Repeats a callback no more often than a configured interval.
///
/// The first tick fires immediately; later ticks sleep [`TIMER_QUANTUM`]
/// and fire once the interval has elapsed since the last firing.
pub struct PeriodicTimer {
    thread: ManagedThread,
    state: Arc<TimerState>,
}

impl PeriodicTimer {
    /// Start a timer on a new registered thread.
    pub fn start<P, F>(interval: Duration, parameters: P, callback: F) -> Result<Self>
    where
        P: Send + 'static,
        F: Fn(&ManagedThread, &P) + Send + Sync + 'static,
    {
        Self::start_on(
            ManagedThread::new(),
            interval,
            parameters,
            callback,
            None::<fn(&ManagedThread, &P)>,
        )
    }

    /// Start a timer on `thread`, invoking `on_exit` once it stops.
    pub fn start_on<P, F, E>(
        thread: ManagedThread,
        interval: Duration,
        parameters: P,
        callback: F,
        on_exit: Option<E>,
    ) -> Result<Self>
    where
        P: Send + 'static,
        F: Fn(&ManagedThread, &P) + Send + Sync + 'static,
        E: FnOnce(&ManagedThread, &P) + Send + 'static,
    {
        let state = Arc::new(TimerState::new(interval));
        let tick_state = Arc::clone(&state);
        let work = WorkUnit::repeat(
            move |sender: &ManagedThread, parameters: &P| {
                if tick_state.has_fired() {
                    thread::sleep(TIMER_QUANTUM);
                }
                if tick_state.try_fire(Instant::now()) {
                    callback(sender, parameters);
                }
            },
            parameters,
        );

        match on_exit {
            Some(on_exit) => thread.start_with_exit(work, on_exit)?,
            None => thread.start(work)?,
        }
        debug!(thread_id = %thread.id(), interval_ms = interval.as_millis() as u64, "Timer started");
        Ok(Self { thread, state })
    }

    pub fn interval(&self) -> Duration {
        self.state.interval
    }

    /// Number of times the callback has been invoked.
    pub fn fire_count(&self) -> u64 {
        self.state.fired.load(Ordering::SeqCst)
    }

    pub fn last_fired(&self) -> Option<Instant> {
        *lock(&self.state.last_fired)
    }

    pub fn thread(&self) -> &ManagedThread {
        &self.thread
    }

    pub fn status(&self) -> ThreadStatus {
        self.thread.status()
    }

    pub fn pause(&self) {
        self.thread.pause();
    }

    pub fn resume(&self) {
        self.thread.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.thread.is_paused()
    }

    pub fn stop(&self) {
        self.thread.stop();
    }

    pub fn stop_and_wait(&self) {
        self.thread.stop_and_wait();
    }

    pub fn stop_timeout(&self, timeout: Duration) -> bool {
        self.thread.stop_timeout(timeout)
    }
}

impl std::fmt::Debug for PeriodicTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicTimer")
            .field("thread", &self.thread)
            .field("interval", &self.state.interval)
            .field("fired", &self.fire_count())
            .finish()
    }
}

/// Run `action` once after `delay` on a new run-once thread.
pub fn run_after<F>(delay: Duration, action: F) -> Result<ManagedThread>
where
    F: FnOnce() + Send + 'static,
{
    let action = Mutex::new(Some(action));
    ManagedThread::spawn(WorkUnit::once(
        move |_, delay: &Duration| {
            thread::sleep(*delay);
            if let Some(action) = lock(&action).take() {
                action();
            }
        },
        delay,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_fires_immediately() {
        let state = TimerState::new(Duration::from_secs(60));
        assert!(!state.has_fired());
        assert!(state.try_fire(Instant::now()));
        assert!(state.has_fired());
        assert_eq!(state.fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fires_only_after_interval_elapsed() {
        let state = TimerState::new(Duration::from_millis(50));
        let start = Instant::now();
        assert!(state.try_fire(start));
        assert!(!state.try_fire(start + Duration::from_millis(10)));
        assert!(!state.try_fire(start + Duration::from_millis(49)));
        assert!(state.try_fire(start + Duration::from_millis(50)));
        // measured from the latest firing
        assert!(!state.try_fire(start + Duration::from_millis(60)));
        assert!(state.try_fire(start + Duration::from_millis(101)));
        assert_eq!(state.fired.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn zero_interval_fires_every_tick() {
        let state = TimerState::new(Duration::ZERO);
        let now = Instant::now();
        assert!(state.try_fire(now));
        assert!(state.try_fire(now));
    }
}
