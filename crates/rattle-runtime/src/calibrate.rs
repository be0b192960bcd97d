//! Tick-rate calibration.
//!
//! The tick counter's frequency is not known up front. The calibrator spins
//! for a tick budget of 2, 4, 8, ... ticks, timing each spin against the
//! wall clock, and stops at the first budget whose spin lasted at least the
//! requested window. The rate is that budget divided by its wall duration.
//!
//! Spinning uses the same batched loop as the engine so the per-batch read
//! overhead is folded into the estimate.

use crate::engine::spin_until;
use crate::pattern::Pause;
use crate::tick;
use rattle_common::error::{RattleError, RattleResult};
use rattle_common::time::Clock;
use std::time::Duration;
use tracing::{info, trace};

/// Calibrated tick rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    ticks_per_second: f64,
    budget_ticks: u64,
    window: Duration,
}

impl Calibration {
    /// Build a calibration from a known rate.
    ///
    /// # Errors
    ///
    /// Returns [`RattleError::Config`] if the rate is not positive and finite.
    pub fn from_ticks_per_second(ticks_per_second: f64) -> RattleResult<Self> {
        if !ticks_per_second.is_finite() || ticks_per_second <= 0.0 {
            return Err(RattleError::Config(format!(
                "tick rate must be positive, got {ticks_per_second}"
            )));
        }
        Ok(Self {
            ticks_per_second,
            budget_ticks: 0,
            window: Duration::ZERO,
        })
    }

    /// Ticks per second.
    #[must_use]
    pub fn ticks_per_second(&self) -> f64 {
        self.ticks_per_second
    }

    /// Tick budget of the accepted measurement (0 if not measured).
    #[must_use]
    pub fn budget_ticks(&self) -> u64 {
        self.budget_ticks
    }

    /// Wall duration of the accepted measurement.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Ticks spanning `duration`, saturating at `u64::MAX`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn ticks_for(&self, duration: Duration) -> u64 {
        // Float-to-int `as` saturates.
        (self.ticks_per_second * duration.as_secs_f64()) as u64
    }
}

/// Measures the tick rate against a wall clock.
#[derive(Debug, Clone)]
pub struct Calibrator<C: Clock> {
    clock: C,
    batch_size: u32,
}

impl<C: Clock> Calibrator<C> {
    /// Create a calibrator spinning `batch_size` steps between counter reads.
    pub fn new(clock: C, batch_size: u32) -> Self {
        Self { clock, batch_size }
    }

    /// Run the doubling search.
    ///
    /// The final measurement lasts at least `min_wall`, so the call takes
    /// between `min_wall` and roughly twice that.
    ///
    /// # Errors
    ///
    /// - [`RattleError::Config`] if `min_wall` or the batch size is zero.
    /// - [`RattleError::TimingFailure`] if the clock fails, or if the budget
    ///   overflows before a spin lasts `min_wall` (the counter is not
    ///   advancing).
    pub fn calibrate(&self, min_wall: Duration) -> RattleResult<Calibration> {
        if min_wall.is_zero() {
            return Err(RattleError::Config(
                "calibration window must be non-zero".into(),
            ));
        }
        if self.batch_size == 0 {
            return Err(RattleError::Config("batch size must be non-zero".into()));
        }

        let mut budget: u64 = 1;
        let elapsed = loop {
            budget = budget
                .checked_mul(2)
                .ok_or_else(|| RattleError::timing("calibrate", "tick budget overflow"))?;

            let start = self.clock.now()?;
            let deadline = tick::read().saturating_add(budget);
            spin_until(&mut Pause, deadline, self.batch_size);
            let elapsed = self.clock.now()?.saturating_duration_since(start);

            trace!(budget, elapsed_us = elapsed.as_micros(), "Calibration step");
            if elapsed >= min_wall {
                break elapsed;
            }
        };

        #[allow(clippy::cast_precision_loss)]
        let ticks_per_second = budget as f64 / elapsed.as_secs_f64();
        info!(
            ticks_per_second,
            budget,
            window_us = elapsed.as_micros(),
            "Tick counter calibrated"
        );

        Ok(Calibration {
            ticks_per_second,
            budget_ticks: budget,
            window: elapsed,
        })
    }
}
