//! Stop handling for SIGINT and SIGTERM.
//!
//! A segment is never cut short. The first signal only raises a flag that
//! the driver checks between segments; an interrupted sleep resumes for its
//! remainder before the flag is seen. A second signal means the user does
//! not want to wait, and the process exits on the spot with status 130.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::os::raw::c_int;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use tracing::debug;

/// Exit status used when a second signal forces an immediate exit.
pub const EXIT_INTERRUPTED: c_int = 130;

static STOP_REQUESTED: AtomicBool = AtomicBool::new(false);
static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Raise `flag`; returns whether a stop was already pending.
fn mark_stop(flag: &AtomicBool) -> bool {
    flag.swap(true, Ordering::SeqCst)
}

extern "C" fn on_stop_signal(signo: c_int) {
    LAST_SIGNAL.store(signo, Ordering::Relaxed);
    if mark_stop(&STOP_REQUESTED) {
        // SAFETY: _exit is async-signal-safe.
        unsafe { libc::_exit(EXIT_INTERRUPTED) };
    }
}

/// Handle to the process-wide stop flag.
#[derive(Debug, Clone, Copy)]
pub struct StopSignal(());

impl StopSignal {
    /// Install the SIGINT and SIGTERM handlers.
    ///
    /// `SA_RESTART` is left unset so a blocking wait returns `EINTR` and the
    /// sleeper's resume path runs.
    ///
    /// # Errors
    ///
    /// Returns the errno if `sigaction` fails.
    pub fn install() -> nix::Result<Self> {
        let action = SigAction::new(
            SigHandler::Handler(on_stop_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for signal in [Signal::SIGINT, Signal::SIGTERM] {
            // SAFETY: the handler only touches atomics and calls _exit.
            unsafe { sigaction(signal, &action) }?;
        }
        debug!("Stop handlers installed for SIGINT and SIGTERM");
        Ok(Self(()))
    }

    /// Whether a stop has been requested.
    #[inline]
    pub fn stop_requested(&self) -> bool {
        STOP_REQUESTED.load(Ordering::Relaxed)
    }

    /// The signal that requested the stop, if any.
    pub fn last_signal(&self) -> Option<Signal> {
        Signal::try_from(LAST_SIGNAL.load(Ordering::Relaxed)).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_mark_reports_pending_stop() {
        let flag = AtomicBool::new(false);
        assert!(!mark_stop(&flag));
        assert!(mark_stop(&flag));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn test_signal_raises_stop_flag() {
        let stop = StopSignal::install().unwrap();
        assert!(!stop.stop_requested());
        assert!(stop.last_signal().is_none());

        nix::sys::signal::raise(Signal::SIGTERM).unwrap();

        assert!(stop.stop_requested());
        assert_eq!(stop.last_signal(), Some(Signal::SIGTERM));
    }
}
