//! Signal interruption tests.
//!
//! A helper thread keeps delivering SIGUSR1 to the sleeping thread. The
//! handler does nothing and is installed without `SA_RESTART`, so every
//! delivery during a wait cuts it short with `EINTR`. The sleep must absorb
//! all of them and still last at least the requested time.

#![cfg(target_os = "linux")]

use super::common::{quick_config, real_scheduler};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use rattle_common::activity::ActivityKind;
use rattle_common::time::MonotonicClock;
use rattle_runtime::sleep::{CoarseSleeper, NanosleepWaiter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

extern "C" fn ignore_signal(_: libc::c_int) {}

fn install_noop_handler() {
    let action = SigAction::new(
        SigHandler::Handler(ignore_signal),
        SaFlags::empty(),
        SigSet::empty(),
    );
    unsafe { sigaction(Signal::SIGUSR1, &action) }.expect("sigaction failed");
}

/// Deliver SIGUSR1 to the calling thread every `period` while `f` runs.
fn with_signal_storm<T>(period: Duration, f: impl FnOnce() -> T) -> T {
    install_noop_handler();
    let target = unsafe { libc::pthread_self() };
    let done = Arc::new(AtomicBool::new(false));

    let storm = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                thread::sleep(period);
                unsafe { libc::pthread_kill(target, libc::SIGUSR1) };
            }
        })
    };

    let result = f();
    done.store(true, Ordering::Relaxed);
    storm.join().expect("signal thread panicked");
    result
}

#[test]
fn test_sleep_survives_signal_storm() {
    let mut sleeper = CoarseSleeper::new(MonotonicClock, NanosleepWaiter, None);
    let requested = Duration::from_millis(200);
    let period = Duration::from_millis(10);

    let span = with_signal_storm(period, || sleeper.sleep(requested)).expect("sleep failed");

    assert!(span.interruptions >= 1, "no wait was interrupted");
    assert!(
        u128::from(span.interruptions) <= requested.as_millis() / period.as_millis() + 2,
        "{} interruptions in {:?}",
        span.interruptions,
        requested
    );
    assert!(
        span.duration() >= requested,
        "slept {:?} of {:?}",
        span.duration(),
        requested
    );
}

#[test]
fn test_chunked_sleep_survives_signal_storm() {
    let mut sleeper =
        CoarseSleeper::new(MonotonicClock, NanosleepWaiter, Some(Duration::from_millis(30)));
    let requested = Duration::from_millis(150);

    let span = with_signal_storm(Duration::from_millis(7), || sleeper.sleep(requested))
        .expect("sleep failed");

    assert!(span.duration() >= requested);
}

#[test]
fn test_scheduled_sleep_is_transparent_to_signals() {
    let mut scheduler = real_scheduler(quick_config());

    let entry = with_signal_storm(Duration::from_millis(10), || {
        scheduler.perform(ActivityKind::Sleep, 0.12)
    })
    .expect("perform failed");

    assert_eq!(entry.activity, ActivityKind::Sleep);
    assert!(entry.duration() >= Duration::from_millis(120));
    assert_eq!(scheduler.log().len(), 1);
}
