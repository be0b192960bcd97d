//! Coarse, interruption-tolerant sleep.
//!
//! Idle segments block the thread instead of spinning. A sleep is split into
//! chunks no longer than the configured refill granularity; a chunk cut short
//! by a signal is resumed with exactly the remainder the kernel reported, and
//! the clock is re-read after every chunk. The realized span is therefore
//! never shorter than the request.

use nix::errno::Errno;
use rattle_common::error::{RattleError, RattleResult};
use rattle_common::time::{Clock, MonotonicClock, Timestamp};
use std::time::Duration;
use tracing::trace;

/// Result of one blocking wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration elapsed.
    Completed,
    /// A signal cut the wait short.
    Interrupted {
        /// Unslept part of the request.
        remaining: Duration,
    },
}

/// Blocking relative wait primitive.
pub trait Waiter {
    /// Block for `duration`.
    ///
    /// # Errors
    ///
    /// Returns the errno of a failure other than signal interruption.
    fn wait(&mut self, duration: Duration) -> Result<WaitOutcome, Errno>;
}

/// `clock_nanosleep(CLOCK_MONOTONIC)` on Linux, `nanosleep` elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct NanosleepWaiter;

fn to_timespec(duration: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: libc::time_t::try_from(duration.as_secs()).unwrap_or(libc::time_t::MAX),
        // Always below 1e9, fits every c_long.
        tv_nsec: libc::c_long::try_from(duration.subsec_nanos()).unwrap_or(0),
    }
}

fn from_timespec(ts: &libc::timespec) -> Duration {
    let secs = u64::try_from(ts.tv_sec).unwrap_or(0);
    let nanos = u32::try_from(ts.tv_nsec).unwrap_or(0);
    Duration::new(secs, nanos)
}

impl Waiter for NanosleepWaiter {
    #[cfg(target_os = "linux")]
    fn wait(&mut self, duration: Duration) -> Result<WaitOutcome, Errno> {
        let request = to_timespec(duration);
        let mut remain = to_timespec(Duration::ZERO);
        // SAFETY: both timespecs are valid for the duration of the call.
        // clock_nanosleep returns the error number instead of setting errno.
        let rc = unsafe { libc::clock_nanosleep(libc::CLOCK_MONOTONIC, 0, &request, &mut remain) };
        match rc {
            0 => Ok(WaitOutcome::Completed),
            libc::EINTR => Ok(WaitOutcome::Interrupted {
                remaining: from_timespec(&remain),
            }),
            errno => Err(Errno::from_raw(errno)),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn wait(&mut self, duration: Duration) -> Result<WaitOutcome, Errno> {
        let request = to_timespec(duration);
        let mut remain = to_timespec(Duration::ZERO);
        // SAFETY: both timespecs are valid for the duration of the call.
        let rc = unsafe { libc::nanosleep(&request, &mut remain) };
        if rc == 0 {
            return Ok(WaitOutcome::Completed);
        }
        match Errno::last() {
            Errno::EINTR => Ok(WaitOutcome::Interrupted {
                remaining: from_timespec(&remain),
            }),
            errno => Err(errno),
        }
    }
}

/// Realized bounds of one sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepSpan {
    /// Clock reading before the first wait.
    pub start: Timestamp,
    /// Clock reading after the last wait.
    pub end: Timestamp,
    /// Waits cut short by signals and resumed.
    pub interruptions: u32,
}

impl SleepSpan {
    /// Realized duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }
}

/// Chunked sleep over a [`Waiter`].
#[derive(Debug)]
pub struct CoarseSleeper<C: Clock = MonotonicClock, W: Waiter = NanosleepWaiter> {
    clock: C,
    waiter: W,
    refill_granularity: Option<Duration>,
}

impl<C: Clock, W: Waiter> CoarseSleeper<C, W> {
    /// Create a sleeper. A zero granularity is treated as unset.
    pub fn new(clock: C, waiter: W, refill_granularity: Option<Duration>) -> Self {
        Self {
            clock,
            waiter,
            refill_granularity: refill_granularity.filter(|g| !g.is_zero()),
        }
    }

    /// Block for at least `duration`.
    ///
    /// # Errors
    ///
    /// - [`RattleError::WaitFailure`] if the waiter fails other than by
    ///   interruption.
    /// - [`RattleError::TimingFailure`] if the clock cannot be read.
    pub fn sleep(&mut self, duration: Duration) -> RattleResult<SleepSpan> {
        let start = self.clock.now()?;
        let target = start.saturating_add(duration);
        let mut interruptions = 0u32;
        let mut now = start;

        while now < target {
            let remaining = target.saturating_duration_since(now);
            let mut chunk = self
                .refill_granularity
                .map_or(remaining, |g| remaining.min(g));

            loop {
                match self.waiter.wait(chunk) {
                    Ok(WaitOutcome::Completed) => break,
                    Ok(WaitOutcome::Interrupted { remaining }) => {
                        interruptions = interruptions.saturating_add(1);
                        trace!(remaining_us = remaining.as_micros(), "Wait interrupted, resuming");
                        if remaining.is_zero() {
                            break;
                        }
                        chunk = remaining;
                    }
                    Err(errno) => {
                        return Err(RattleError::WaitFailure {
                            requested_us: u64::try_from(chunk.as_micros()).unwrap_or(u64::MAX),
                            errno,
                        });
                    }
                }
            }
            now = self.clock.now()?;
        }

        Ok(SleepSpan {
            start,
            end: now,
            interruptions,
        })
    }

    /// Effective sleep granularity: the realized length of the second of two
    /// `probe` sleeps.
    ///
    /// # Errors
    ///
    /// Propagates [`sleep`](Self::sleep) failures.
    pub fn granularity(&mut self, probe: Duration) -> RattleResult<Duration> {
        self.sleep(probe)?;
        Ok(self.sleep(probe)?.duration())
    }
}
