//! Wall-clock timestamps at microsecond resolution.
//!
//! Every realized start/end time in rattle is a [`Timestamp`] read from a
//! [`Clock`]. The production clock is `CLOCK_MONOTONIC`; reporting is always
//! relative to an epoch taken when the scheduler starts, so the absolute
//! value carries no meaning.

use crate::error::{RattleError, RattleResult};
use nix::time::{clock_gettime, ClockId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Microseconds per second.
pub const MICROS_PER_SEC: u64 = 1_000_000;

/// Microseconds since an arbitrary, fixed, per-process origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from raw microseconds.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Raw microsecond value.
    #[must_use]
    pub const fn as_micros(self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    #[must_use]
    pub fn saturating_duration_since(self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }

    /// Timestamp `duration` after `self`.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(micros))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{:06}",
            self.0 / MICROS_PER_SEC,
            self.0 % MICROS_PER_SEC
        )
    }
}

/// Source of wall-clock timestamps.
pub trait Clock {
    /// Read the current time.
    ///
    /// # Errors
    ///
    /// Returns [`RattleError::TimingFailure`] if the clock cannot be read.
    fn now(&self) -> RattleResult<Timestamp>;
}

/// `CLOCK_MONOTONIC` read through `clock_gettime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> RattleResult<Timestamp> {
        let ts = clock_gettime(ClockId::CLOCK_MONOTONIC)
            .map_err(|e| RattleError::timing("clock_gettime(CLOCK_MONOTONIC)", e))?;
        let secs = u64::try_from(ts.tv_sec())
            .map_err(|_| RattleError::timing("clock_gettime", "negative seconds"))?;
        let nanos = u64::try_from(ts.tv_nsec())
            .map_err(|_| RattleError::timing("clock_gettime", "negative nanoseconds"))?;
        Ok(Timestamp(secs * MICROS_PER_SEC + nanos / 1_000))
    }
}

/// Manually advanced clock for deterministic simulations and tests.
///
/// Clones share the same time, so a simulated wait primitive can advance
/// the clock observed by the engine under test.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    /// Create a clock reading `start`.
    #[must_use]
    pub fn new(start: Timestamp) -> Self {
        Self {
            micros: Arc::new(AtomicU64::new(start.as_micros())),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let micros = u64::try_from(by.as_micros()).unwrap_or(u64::MAX);
        self.micros.fetch_add(micros, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> RattleResult<Timestamp> {
        Ok(Timestamp(self.micros.load(Ordering::Relaxed)))
    }
}
