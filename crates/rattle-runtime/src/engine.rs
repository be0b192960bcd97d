//! Calibrated busy-loop engine.
//!
//! A requested duration is turned into a tick deadline once, up front. The
//! loop then executes the kind's pattern in batches of `batch_size` steps
//! and re-reads the tick counter only between batches. Reading the counter
//! every step would dominate cheap patterns such as `PAUSE`; reading it
//! rarely raises the overshoot past the deadline.
//!
//! Wall-clock timestamps bracket the loop; the log entry is appended after
//! the end timestamp is taken.

use crate::calibrate::Calibration;
use crate::exec_log::{ExecutionLog, LogEntry};
use crate::pattern::{
    Add, Div, Fmul, MemoryRead, MemoryWrite, Mul, MulFmul, Pattern, Pause, LARGE_DIVISOR,
    SMALL_DIVISOR,
};
use crate::scratch::ScratchRegion;
use crate::tick::{self, Tick};
use rattle_common::activity::ActivityKind;
use rattle_common::config::EngineConfig;
use rattle_common::error::{RattleError, RattleResult};
use rattle_common::time::{Clock, MonotonicClock};
use std::time::Duration;
use tracing::{debug, trace};

/// Spin `pattern` until the tick counter reaches `deadline`.
///
/// The deadline is checked once per batch, so the loop overshoots by at most
/// one batch plus one counter read.
#[inline(never)]
pub(crate) fn spin_until<P: Pattern>(pattern: &mut P, deadline: Tick, batch_size: u32) {
    let mut now = tick::read();
    while now < deadline {
        for _ in 0..batch_size {
            pattern.step();
        }
        now = tick::read();
    }
}

/// Convert a duration in seconds into a validated [`Duration`].
pub(crate) fn checked_duration(seconds: f64) -> RattleResult<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(RattleError::InvalidDuration(seconds));
    }
    Duration::try_from_secs_f64(seconds).map_err(|_| RattleError::InvalidDuration(seconds))
}

/// Busy-loop engine for the non-idle activity kinds.
#[derive(Debug)]
pub struct LoopEngine<C: Clock = MonotonicClock> {
    clock: C,
    calibration: Calibration,
    slowdown: f64,
    batch_size: u32,
    scratch: ScratchRegion,
}

impl<C: Clock> LoopEngine<C> {
    /// Create an engine using `calibration` to convert durations into ticks.
    ///
    /// Allocates and initializes the scratch region.
    ///
    /// # Errors
    ///
    /// Returns [`RattleError::Config`] if the batch size is zero.
    pub fn new(
        clock: C,
        calibration: Calibration,
        slowdown: f64,
        config: &EngineConfig,
    ) -> RattleResult<Self> {
        if config.batch_size == 0 {
            return Err(RattleError::Config("batch size must be non-zero".into()));
        }
        Ok(Self {
            clock,
            calibration,
            slowdown: slowdown.max(1.0),
            batch_size: config.batch_size,
            scratch: ScratchRegion::new(config.scratch_words),
        })
    }

    /// Calibration in use.
    #[must_use]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Scratch region shared by the memory patterns.
    #[must_use]
    pub fn scratch(&self) -> &ScratchRegion {
        &self.scratch
    }

    /// Pattern steps per tick check.
    #[must_use]
    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Busy-run `kind` for `seconds` (scaled by the slowdown) and log it.
    ///
    /// # Errors
    ///
    /// - [`RattleError::InvalidDuration`] for negative or non-finite `seconds`.
    /// - [`RattleError::Config`] for idle kinds, which have no busy pattern.
    /// - [`RattleError::TimingFailure`] if the clock cannot be read.
    /// - [`RattleError::LogCapacityExceeded`] if the log is full.
    pub fn run(
        &mut self,
        kind: ActivityKind,
        seconds: f64,
        log: &mut ExecutionLog,
    ) -> RattleResult<LogEntry> {
        if kind.is_idle() {
            return Err(RattleError::Config(format!(
                "{kind} is an idle activity and has no busy-loop pattern"
            )));
        }
        let requested = checked_duration(seconds * self.slowdown)?;
        let ticks = self.calibration.ticks_for(requested);

        let first_tick = tick::read();
        let deadline = first_tick.saturating_add(ticks);
        let start = self.clock.now()?;
        self.spin(kind, deadline);
        let end = self.clock.now()?;
        let spun = tick::read().since(first_tick);

        let entry = LogEntry {
            activity: kind,
            requested,
            start,
            end,
        };
        log.append(entry)?;
        debug!(
            activity = %kind,
            ticks,
            spun,
            requested_us = requested.as_micros(),
            realized_us = entry.duration().as_micros(),
            "Busy segment complete"
        );
        if kind.touches_memory() {
            trace!(
                read_cursor = self.scratch.read_cursor(),
                write_cursor = self.scratch.write_cursor(),
                "Scratch cursors"
            );
        }
        Ok(entry)
    }

    /// Dispatch to the pattern table.
    fn spin(&mut self, kind: ActivityKind, deadline: Tick) {
        let batch = self.batch_size;
        match kind {
            ActivityKind::None | ActivityKind::Sleep | ActivityKind::Pause => {
                spin_until(&mut Pause, deadline, batch);
            }
            ActivityKind::Add => spin_until(&mut Add::default(), deadline, batch),
            ActivityKind::Mul => spin_until(&mut Mul::default(), deadline, batch),
            ActivityKind::Fmul => spin_until(&mut Fmul::default(), deadline, batch),
            ActivityKind::MulFmul => spin_until(&mut MulFmul::default(), deadline, batch),
            ActivityKind::DivBySmall => spin_until(&mut Div::new(SMALL_DIVISOR), deadline, batch),
            ActivityKind::DivByLarge => spin_until(&mut Div::new(LARGE_DIVISOR), deadline, batch),
            ActivityKind::MemoryRead => {
                spin_until(&mut MemoryRead::new(&mut self.scratch), deadline, batch);
            }
            ActivityKind::MemoryWriteZero => {
                spin_until(&mut MemoryWrite::zeros(&mut self.scratch), deadline, batch);
            }
            ActivityKind::MemoryWriteOnes => {
                spin_until(&mut MemoryWrite::ones(&mut self.scratch), deadline, batch);
            }
        }
    }
}
