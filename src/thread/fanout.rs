//! Fan-out/join: run N actions on their own threads and deliver all
//! results together.
//!
//! A run-once coordinator thread spawns one run-once worker per action.
//! Each worker writes its slot and decrements the remaining-count under the
//! same lock; the coordinator sleeps on a condvar until the count reaches
//! zero, then calls `on_done` with the results in action order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use tracing::{debug, warn};

use super::lock;
use super::managed::ManagedThread;
use super::work::WorkUnit;
use crate::error::{Result, ThreadError, panic_message};

/// Per-action outcome delivered to `on_done`.
pub type ActionResult<T> = std::result::Result<T, ThreadError>;

struct JoinState<T> {
    slots: Vec<Option<ActionResult<T>>>,
    remaining: usize,
}

/// Result slots plus the remaining-count shared by coordinator and workers.
struct Join<T> {
    state: Mutex<JoinState<T>>,
    done: Condvar,
}

impl<T> Join<T> {
    fn new(size: usize) -> Self {
        Self {
            state: Mutex::new(JoinState {
                slots: (0..size).map(|_| None).collect(),
                remaining: size,
            }),
            done: Condvar::new(),
        }
    }

    /// Record the result for `index`. A slot is only counted once.
    fn complete(&self, index: usize, result: ActionResult<T>) {
        let mut state = lock(&self.state);
        let Some(slot) = state.slots.get_mut(index) else {
            warn!(index, "Result for unknown fan-out slot dropped");
            return;
        };
        if slot.is_some() {
            warn!(index, "Fan-out slot already written");
            return;
        }
        *slot = Some(result);
        state.remaining -= 1;
        if state.remaining == 0 {
            self.done.notify_all();
        }
    }

    /// Block until every slot is written, then take the results in order.
    fn wait(&self) -> Vec<ActionResult<T>> {
        let state = lock(&self.state);
        let mut state = self
            .done
            .wait_while(state, |s| s.remaining > 0)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut state.slots)
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.unwrap_or_else(|| Err(ThreadError::MissingResult(index))))
            .collect()
    }
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    lock(slot).take()
}

/// Run zero-argument `actions` concurrently and pass all results to
/// `on_done`, ordered by action index.
///
/// Returns the coordinator thread; `wait()` on it returns once `on_done`
/// has been called.
pub fn run_async<T, F, D>(actions: Vec<F>, on_done: D) -> Result<ManagedThread>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    D: FnOnce(Vec<ActionResult<T>>) + Send + 'static,
{
    let actions: Vec<_> = actions.into_iter().map(|action| move |_: &()| action()).collect();
    run_async_with(actions, (), on_done)
}

/// Run `actions` concurrently, each receiving `&shared`, and pass all
/// results to `on_done`, ordered by action index.
pub fn run_async_with<A, T, F, D>(actions: Vec<F>, shared: A, on_done: D) -> Result<ManagedThread>
where
    A: Send + Sync + 'static,
    T: Send + 'static,
    F: FnOnce(&A) -> T + Send + 'static,
    D: FnOnce(Vec<ActionResult<T>>) + Send + 'static,
{
    let total = actions.len();
    let pending = Mutex::new(Some((actions, on_done)));
    let shared = Arc::new(shared);

    ManagedThread::spawn(WorkUnit::once(
        move |coordinator, _| {
            let Some((actions, on_done)) = take(&pending) else {
                return;
            };
            let join = Arc::new(Join::new(total));

            for (index, action) in actions.into_iter().enumerate() {
                let worker_join = Arc::clone(&join);
                let shared = Arc::clone(&shared);
                let action = Mutex::new(Some(action));
                let started = ManagedThread::spawn(WorkUnit::once(
                    move |_, index: &usize| {
                        let Some(action) = take(&action) else {
                            return;
                        };
                        let result = panic::catch_unwind(AssertUnwindSafe(|| action(&*shared)))
                            .map_err(|payload| ThreadError::ActionPanicked {
                                index: *index,
                                message: panic_message(payload.as_ref()),
                            });
                        worker_join.complete(*index, result);
                    },
                    index,
                ));
                if let Err(err) = started {
                    warn!(index, error = %err, "Fan-out worker failed to start");
                    join.complete(index, Err(err));
                }
            }

            let results = join.wait();
            debug!(thread_id = %coordinator.id(), total, "Fan-out joined");
            on_done(results);
        },
        (),
    ))
}

/// Single-action form of [`run_async`].
pub fn run_one_async<T, F, D>(action: F, on_done: D) -> Result<ManagedThread>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
    D: FnOnce(ActionResult<T>) + Send + 'static,
{
    run_async(vec![action], move |mut results| {
        let result = results
            .pop()
            .unwrap_or_else(|| Err(ThreadError::MissingResult(0)));
        on_done(result);
    })
}
