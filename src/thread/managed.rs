//! A lifecycle state machine around one OS thread.
//!
//! ```text
//! NotStarted --start()--> Running --(work loop ends)--> Exited
//! ```
//!
//! `stop` is a request, not a transition: the work loop observes it at the
//! next iteration boundary and exits on its own schedule. A running action
//! is never interrupted.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::lock;
use super::model::{ExitReason, Priority, TagValue, Tags, ThreadId, ThreadStatus};
use super::registry::registry;
use super::work::{ExitFn, Mode, WorkFn, WorkUnit};
use crate::error::{Result, ThreadError, panic_message};

/// How long a paused repeating loop sleeps before re-checking its flags.
pub const PAUSE_QUANTUM: Duration = Duration::from_millis(1);

/// Construction options for a [`ManagedThread`].
#[derive(Debug, Clone)]
pub struct ThreadOptions {
    /// Name given to the OS thread
    pub name: Option<String>,
    /// Advisory scheduling hint
    pub priority: Priority,
    /// Add the thread to the process-wide registry
    pub register: bool,
}

impl Default for ThreadOptions {
    fn default() -> Self {
        Self {
            name: None,
            priority: Priority::Normal,
            register: true,
        }
    }
}

impl ThreadOptions {
    /// Options for a thread kept out of the process-wide registry.
    pub fn unregistered() -> Self {
        Self {
            register: false,
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

#[derive(Debug)]
struct Lifecycle {
    status: ThreadStatus,
    /// Set once `start` has committed to spawning
    started: bool,
    exit: Option<ExitReason>,
    os_thread: Option<thread::ThreadId>,
}

impl Lifecycle {
    /// Move forward to `next`; earlier or equal states are ignored.
    fn advance(&mut self, next: ThreadStatus) -> bool {
        if next <= self.status {
            return false;
        }
        self.status = next;
        true
    }

    fn settled(&self) -> bool {
        !self.started || self.status == ThreadStatus::Exited
    }
}

pub(crate) struct Inner {
    id: ThreadId,
    name: Option<String>,
    priority: Priority,
    run_requested: AtomicBool,
    paused: AtomicBool,
    lifecycle: Mutex<Lifecycle>,
    exited: Condvar,
    tags: Mutex<Tags>,
}

/// Handle to a managed thread. Cloning yields another handle to the same
/// thread.
#[derive(Clone)]
pub struct ManagedThread {
    inner: Arc<Inner>,
}

impl ManagedThread {
    /// Create a thread registered in the process-wide registry. Call
    /// [`start`](Self::start) to spawn it.
    pub fn new() -> Self {
        Self::with_options(ThreadOptions::default())
    }

    pub fn with_options(options: ThreadOptions) -> Self {
        let thread = Self {
            inner: Arc::new(Inner {
                id: ThreadId::next(),
                name: options.name,
                priority: options.priority,
                run_requested: AtomicBool::new(true),
                paused: AtomicBool::new(false),
                lifecycle: Mutex::new(Lifecycle {
                    status: ThreadStatus::NotStarted,
                    started: false,
                    exit: None,
                    os_thread: None,
                }),
                exited: Condvar::new(),
                tags: Mutex::new(Tags::new()),
            }),
        };
        if options.register {
            registry().register(&thread);
        }
        thread
    }

    /// Create a registered thread and start `work` on it.
    pub fn spawn<P>(work: WorkUnit<P>) -> Result<Self>
    where
        P: Send + 'static,
    {
        let thread = Self::new();
        thread.start(work)?;
        Ok(thread)
    }

    /// Like [`spawn`](Self::spawn), invoking `on_exit` once the thread exits.
    pub fn spawn_with_exit<P, F>(work: WorkUnit<P>, on_exit: F) -> Result<Self>
    where
        P: Send + 'static,
        F: FnOnce(&ManagedThread, &P) + Send + 'static,
    {
        let thread = Self::new();
        thread.start_with_exit(work, on_exit)?;
        Ok(thread)
    }

    pub fn id(&self) -> ThreadId {
        self.inner.id
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    pub fn priority(&self) -> Priority {
        self.inner.priority
    }

    /// Spawn the execution thread for `work`.
    ///
    /// Fails with [`ThreadError::AlreadyStarted`] on a second call and with
    /// [`ThreadError::Stopped`] once `stop` has been requested.
    pub fn start<P>(&self, work: WorkUnit<P>) -> Result<()>
    where
        P: Send + 'static,
    {
        self.launch(work, None)
    }

    pub fn start_with_exit<P, F>(&self, work: WorkUnit<P>, on_exit: F) -> Result<()>
    where
        P: Send + 'static,
        F: FnOnce(&ManagedThread, &P) + Send + 'static,
    {
        self.launch(work, Some(Box::new(on_exit)))
    }

    fn launch<P>(&self, work: WorkUnit<P>, on_exit: Option<ExitFn<P>>) -> Result<()>
    where
        P: Send + 'static,
    {
        let id = self.id();
        {
            // A concurrent stop either lands before this check or finds
            // `started` set and waits for the exit.
            let mut lifecycle = lock(&self.inner.lifecycle);
            if !self.can_run() {
                warn!(thread_id = %id, "Start refused: thread was already stopped");
                return Err(ThreadError::Stopped(id));
            }
            if lifecycle.started {
                error!(thread_id = %id, "Start refused: thread was already started");
                return Err(ThreadError::AlreadyStarted(id));
            }
            lifecycle.started = true;
        }

        let mode = work.mode;
        let mut builder = thread::Builder::new();
        if let Some(name) = &self.inner.name {
            builder = builder.name(name.clone());
        }

        let handle = self.clone();
        if let Err(source) = builder.spawn(move || handle.run(work, on_exit)) {
            lock(&self.inner.lifecycle).started = false;
            self.inner.exited.notify_all();
            error!(thread_id = %id, error = %source, "Failed to spawn managed thread");
            return Err(ThreadError::Spawn { id, source });
        }

        debug!(thread_id = %id, ?mode, priority = ?self.inner.priority, "Managed thread started");
        Ok(())
    }

    fn run<P>(self, work: WorkUnit<P>, on_exit: Option<ExitFn<P>>) {
        let id = self.id();
        let _span = tracing::debug_span!("managed_thread", thread_id = %id).entered();
        let priority = self.inner.priority;
        if let Err(error) = apply_priority(priority) {
            warn!(thread_id = %id, ?priority, %error, "Priority hint not applied");
        }
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            lifecycle.os_thread = Some(thread::current().id());
            lifecycle.advance(ThreadStatus::Running);
        }

        let WorkUnit {
            action,
            mode,
            parameters,
        } = work;

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match mode {
            Mode::Once => action(&self, &parameters),
            Mode::Repeat { interval } => self.repeat(&action, &parameters, interval),
        }));

        let reason = match outcome {
            Ok(()) => ExitReason::Completed,
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                error!(thread_id = %id, %message, "Work function panicked");
                ExitReason::Panicked(message)
            }
        };
        self.finish(reason);

        if let Some(on_exit) = on_exit {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| on_exit(&self, &parameters)));
            if let Err(payload) = outcome {
                error!(
                    thread_id = %id,
                    message = %panic_message(payload.as_ref()),
                    "Exit callback panicked"
                );
            }
        }
    }

    fn repeat<P>(&self, action: &WorkFn<P>, parameters: &P, interval: Option<Duration>) {
        while self.can_run() {
            if self.is_paused() {
                thread::sleep(PAUSE_QUANTUM);
                continue;
            }
            action(self, parameters);
            if let Some(interval) = interval {
                thread::sleep(interval);
            }
        }
    }

    fn finish(&self, reason: ExitReason) {
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            lifecycle.advance(ThreadStatus::Exited);
            lifecycle.exit = Some(reason);
        }
        self.inner.exited.notify_all();
        debug!(thread_id = %self.id(), "Managed thread exited");
    }

    /// True until `stop` is requested. Long-running work functions can poll
    /// this as a cooperative checkpoint.
    pub fn can_run(&self) -> bool {
        self.inner.run_requested.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ThreadStatus {
        lock(&self.inner.lifecycle).status
    }

    /// `None` until the thread has exited.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        lock(&self.inner.lifecycle).exit.clone()
    }

    /// Suspend further invocations of a repeating unit. No effect on a
    /// run-once unit.
    pub fn pause(&self) {
        self.inner.paused.store(true, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.inner.paused.store(false, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Request a cooperative stop and return immediately. Idempotent.
    pub fn stop(&self) {
        if self.inner.run_requested.swap(false, Ordering::SeqCst) {
            debug!(thread_id = %self.id(), "Stop requested");
        }
    }

    /// Request a stop and block until the thread has exited.
    pub fn stop_and_wait(&self) {
        self.stop();
        self.wait();
    }

    /// Request a stop and wait at most `timeout` for the thread to exit.
    ///
    /// Returns `false` if the thread was still running when the timeout
    /// elapsed. The stop request stays in place either way.
    pub fn stop_timeout(&self, timeout: Duration) -> bool {
        self.stop();
        self.wait_timeout(timeout)
    }

    /// Block until the thread has exited. Returns at once for a thread that
    /// was never started.
    pub fn wait(&self) {
        if self.is_current() {
            warn!(thread_id = %self.id(), "Thread cannot wait for its own exit");
            return;
        }
        let lifecycle = lock(&self.inner.lifecycle);
        let _settled = self
            .inner
            .exited
            .wait_while(lifecycle, |l| !l.settled())
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Wait at most `timeout` for the thread to exit. Returns whether it did
    /// (or was never started).
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_current() {
            warn!(thread_id = %self.id(), "Thread cannot wait for its own exit");
            return false;
        }
        let lifecycle = lock(&self.inner.lifecycle);
        let (lifecycle, _) = self
            .inner
            .exited
            .wait_timeout_while(lifecycle, timeout, |l| !l.settled())
            .unwrap_or_else(PoisonError::into_inner);
        lifecycle.settled()
    }

    /// Whether the caller is running on this thread's execution thread.
    fn is_current(&self) -> bool {
        lock(&self.inner.lifecycle).os_thread == Some(thread::current().id())
    }

    // ── Tags ────────────────────────────────────────────────────────────────

    /// Set a tag, returning the value it replaced.
    pub fn set_tag(&self, key: impl Into<String>, value: impl Into<TagValue>) -> Option<TagValue> {
        lock(&self.inner.tags).set(key, value)
    }

    pub fn tag(&self, key: &str) -> Option<TagValue> {
        lock(&self.inner.tags).get(key).cloned()
    }

    pub fn remove_tag(&self, key: &str) -> Option<TagValue> {
        lock(&self.inner.tags).remove(key)
    }

    /// Snapshot of all tags.
    pub fn tags(&self) -> Tags {
        lock(&self.inner.tags).clone()
    }

    /// Run `f` with exclusive access to the tag map.
    ///
    /// The tag lock is held while `f` runs and is not reentrant: calling
    /// [`tag`](Self::tag), [`set_tag`](Self::set_tag) or any other tag
    /// method of this thread from inside `f` deadlocks. Use the `&mut Tags`
    /// argument instead.
    pub fn with_tags<R>(&self, f: impl FnOnce(&mut Tags) -> R) -> R {
        f(&mut lock(&self.inner.tags))
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<Inner>) -> Self {
        Self { inner }
    }
}

impl Default for ManagedThread {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedThread")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("status", &self.status())
            .field("run_requested", &self.can_run())
            .field("paused", &self.is_paused())
            .finish()
    }
}

/// Hand the priority hint to the scheduler for the calling thread.
/// `Normal` keeps whatever the thread inherited.
#[cfg(target_os = "linux")]
fn apply_priority(priority: Priority) -> std::io::Result<()> {
    if priority == Priority::Normal {
        return Ok(());
    }
    // SAFETY: both calls only read or adjust the calling thread's nice value.
    let rc = unsafe {
        let tid = libc::gettid() as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, priority.niceness())
    };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_priority(priority: Priority) -> std::io::Result<()> {
    if priority == Priority::Normal {
        return Ok(());
    }
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "per-thread priority is only applied on Linux",
    ))
}
