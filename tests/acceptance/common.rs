//! Common utilities for acceptance tests.

use rattle_common::config::{RattleConfig, MIN_SCRATCH_WORDS};
use rattle_runtime::scheduler::{ActivityScheduler, SchedulerBuilder};
use std::time::Duration;

/// Calibration window used by the lenient tests.
pub const QUICK_WINDOW: Duration = Duration::from_millis(100);

/// Configuration sized for tests: short calibration, small scratch region.
pub fn quick_config() -> RattleConfig {
    let mut config = RattleConfig::default();
    config.calibration.short = true;
    config.calibration.short_window = QUICK_WINDOW;
    config.engine.scratch_words = MIN_SCRATCH_WORDS * 256;
    config.log.capacity = 1_000;
    config
}

/// A real scheduler built from `config`.
pub fn real_scheduler(config: RattleConfig) -> ActivityScheduler {
    SchedulerBuilder::new()
        .config(config)
        .build()
        .expect("scheduler startup failed")
}

/// Bounds on a realized duration relative to the request.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Allowed relative undershoot.
    pub below: f64,
    /// Allowed relative overshoot.
    pub above: f64,
    /// Absolute slack added to the upper bound.
    pub slack: Duration,
}

impl Tolerance {
    /// Loose bounds for shared CI machines.
    pub fn lenient() -> Self {
        Self {
            below: 0.5,
            above: 2.0,
            slack: Duration::from_millis(25),
        }
    }

    /// Five percent either way, for a quiescent machine.
    pub fn quiescent() -> Self {
        Self {
            below: 0.05,
            above: 0.05,
            slack: Duration::ZERO,
        }
    }

    /// Whether `realized` is within bounds of `requested`.
    pub fn accepts(&self, requested: Duration, realized: Duration) -> bool {
        let req = requested.as_secs_f64();
        let real = realized.as_secs_f64();
        let upper = req * (1.0 + self.above) + self.slack.as_secs_f64();
        real >= req * (1.0 - self.below) && real <= upper
    }
}
