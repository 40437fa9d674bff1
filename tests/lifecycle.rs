//! Lifecycle conformance tests.
//!
//! Status transitions, cooperative stop variants, pause/resume and exit
//! callbacks, observed through the public API with timing tolerances.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use managed_thread::{ExitReason, ManagedThread, ThreadError, ThreadStatus, WorkUnit};

/// Poll `condition` until it holds or `timeout` elapses.
fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

/// A repeating unit that counts its invocations.
fn counting_thread(interval: Duration) -> (ManagedThread, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let thread = ManagedThread::spawn(WorkUnit::every(
        interval,
        move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        (),
    ))
    .unwrap();
    (thread, count)
}

// ── Status transitions ──────────────────────────────────────────────────────

mod status {
    use super::*;

    #[test]
    fn run_once_visits_running_then_exits() {
        let observed = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&observed);
        let thread = ManagedThread::new();
        assert_eq!(thread.status(), ThreadStatus::NotStarted);

        thread
            .start(WorkUnit::once(
                move |sender, _| log.lock().unwrap().push(sender.status()),
                (),
            ))
            .unwrap();
        thread.wait();

        assert_eq!(*observed.lock().unwrap(), vec![ThreadStatus::Running]);
        assert_eq!(thread.status(), ThreadStatus::Exited);
        assert_eq!(thread.exit_reason(), Some(ExitReason::Completed));
    }

    #[test]
    fn status_is_monotonic() {
        let thread = ManagedThread::new();
        let gate = Arc::new(Mutex::new(()));
        let held = gate.lock().unwrap();
        let inner_gate = Arc::clone(&gate);
        thread
            .start(WorkUnit::once(
                move |_, _| {
                    let _open = inner_gate.lock();
                },
                (),
            ))
            .unwrap();

        let mut seen = vec![thread.status()];
        assert!(eventually(Duration::from_secs(5), || thread.status() == ThreadStatus::Running));
        seen.push(thread.status());
        drop(held);
        thread.wait();
        seen.push(thread.status());

        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "{seen:?}");
        assert_eq!(seen.last(), Some(&ThreadStatus::Exited));
    }

    #[test]
    fn exit_callback_fires_once_after_exit() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&calls);
        let thread = ManagedThread::spawn_with_exit(
            WorkUnit::once(|_, _| {}, "payload"),
            move |sender, parameters| {
                record.lock().unwrap().push((sender.status(), *parameters));
            },
        )
        .unwrap();

        assert!(eventually(Duration::from_secs(5), || !calls.lock().unwrap().is_empty()));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(
            *calls.lock().unwrap(),
            vec![(ThreadStatus::Exited, "payload")]
        );
        assert_eq!(thread.status(), ThreadStatus::Exited);
    }

    #[test]
    fn repeating_exit_callback_receives_parameters() {
        let seen = Arc::new(Mutex::new(None));
        let record = Arc::clone(&seen);
        let thread = ManagedThread::spawn_with_exit(
            WorkUnit::every(Duration::from_millis(1), |_, _| {}, 7u8),
            move |_, parameters| {
                *record.lock().unwrap() = Some(*parameters);
            },
        )
        .unwrap();

        thread.stop_and_wait();
        assert!(eventually(Duration::from_secs(5), || seen.lock().unwrap().is_some()));
        assert_eq!(*seen.lock().unwrap(), Some(7));
    }

    #[test]
    fn starting_twice_is_an_error() {
        let (thread, _) = counting_thread(Duration::from_millis(1));
        let err = thread
            .start(WorkUnit::once(|_, _| {}, ()))
            .unwrap_err();
        assert!(matches!(err, ThreadError::AlreadyStarted(_)));
        thread.stop_and_wait();
    }
}

// ── Cooperative stop ────────────────────────────────────────────────────────

mod stop {
    use super::*;

    #[test]
    fn fire_and_forget_eventually_exits() {
        let (thread, _) = counting_thread(Duration::from_millis(1));
        thread.stop();
        assert!(!thread.can_run());
        assert!(eventually(Duration::from_secs(5), || thread.status() == ThreadStatus::Exited));
    }

    #[test]
    fn blocking_stop_returns_after_exit() {
        let (thread, count) = counting_thread(Duration::ZERO);
        assert!(eventually(Duration::from_secs(5), || count.load(Ordering::SeqCst) > 0));
        thread.stop_and_wait();
        assert_eq!(thread.status(), ThreadStatus::Exited);

        let after = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after);
    }

    #[test]
    fn stop_is_idempotent() {
        let (thread, _) = counting_thread(Duration::from_millis(1));
        thread.stop();
        thread.stop();
        thread.stop_and_wait();
        thread.stop_and_wait();
        assert!(thread.stop_timeout(Duration::from_millis(10)));
        assert!(!thread.can_run());
        assert_eq!(thread.status(), ThreadStatus::Exited);
    }

    #[test]
    fn timeout_reports_slow_exit() {
        let thread = ManagedThread::spawn(WorkUnit::once(
            |_, delay| thread::sleep(*delay),
            Duration::from_millis(300),
        ))
        .unwrap();
        assert!(eventually(Duration::from_secs(5), || thread.status() == ThreadStatus::Running));

        assert!(!thread.stop_timeout(Duration::from_millis(20)));
        // the stop request is not undone; the thread keeps heading for exit
        assert!(!thread.can_run());
        assert!(thread.stop_timeout(Duration::from_secs(5)));
        assert_eq!(thread.status(), ThreadStatus::Exited);
    }

    #[test]
    fn in_flight_iteration_is_not_interrupted() {
        let finished = Arc::new(AtomicUsize::new(0));
        let done = Arc::clone(&finished);
        let thread = ManagedThread::spawn(WorkUnit::repeat(
            move |_, _| {
                thread::sleep(Duration::from_millis(50));
                done.fetch_add(1, Ordering::SeqCst);
            },
            (),
        ))
        .unwrap();
        assert!(eventually(Duration::from_secs(5), || thread.status() == ThreadStatus::Running));

        thread.stop_and_wait();
        assert!(finished.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn work_function_can_stop_itself() {
        let thread = ManagedThread::spawn(WorkUnit::repeat(
            |sender, limit: &i64| {
                let n = sender.tag("n").and_then(|v| v.as_int()).unwrap_or(0) + 1;
                sender.set_tag("n", n);
                if n >= *limit {
                    sender.stop();
                }
            },
            5,
        ))
        .unwrap();
        thread.wait();
        assert_eq!(thread.tag("n").and_then(|v| v.as_int()), Some(5));
    }

    #[test]
    fn panic_in_repeating_work_does_not_hang_waiters() {
        let thread = ManagedThread::spawn(WorkUnit::repeat(|_, _| panic!("loop failed"), ())).unwrap();
        // Let the first iteration run; a stop issued right away would win.
        assert!(thread.wait_timeout(Duration::from_secs(5)));
        assert_eq!(thread.status(), ThreadStatus::Exited);
        assert!(thread.stop_timeout(Duration::from_secs(5)));
        assert!(matches!(thread.exit_reason(), Some(ExitReason::Panicked(m)) if m == "loop failed"));
    }
}

// ── Pause / resume ──────────────────────────────────────────────────────────

mod pause {
    use super::*;

    #[test]
    fn pause_suspends_invocations_until_resume() {
        let (thread, count) = counting_thread(Duration::from_millis(1));
        assert!(eventually(Duration::from_secs(5), || count.load(Ordering::SeqCst) > 0));

        thread.pause();
        assert!(thread.is_paused());
        // let any in-flight iteration settle
        thread::sleep(Duration::from_millis(20));
        let paused_at = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), paused_at);
        assert_eq!(thread.status(), ThreadStatus::Running);

        thread.resume();
        assert!(!thread.is_paused());
        assert!(eventually(Duration::from_secs(5), || count.load(Ordering::SeqCst) > paused_at));
        thread.stop_and_wait();
    }

    #[test]
    fn paused_thread_still_honours_stop() {
        let (thread, _) = counting_thread(Duration::from_millis(1));
        thread.pause();
        assert!(thread.stop_timeout(Duration::from_secs(5)));
        assert!(thread.is_paused());
    }

    #[test]
    fn pausing_run_once_unit_has_no_effect() {
        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        let thread = ManagedThread::new();
        thread.pause();
        thread
            .start(WorkUnit::once(
                move |_, _| {
                    flag.fetch_add(1, Ordering::SeqCst);
                },
                (),
            ))
            .unwrap();
        assert!(thread.wait_timeout(Duration::from_secs(5)));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}
