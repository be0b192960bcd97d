//! Precise-duration activity scheduler.
//!
//! Owns the calibrated loop engine, the coarse sleeper and the execution
//! log. Startup runs once, in order:
//!
//! 1. take the epoch all dumped offsets are relative to
//! 2. calibrate the tick counter (skipped when a calibration is supplied)
//! 3. measure the sleep granularity
//! 4. allocate and fill the scratch region
//! 5. align to a clock boundary with a minimal sleep
//!
//! After that, [`ActivityScheduler::perform`] is the single entry point:
//! busy kinds go to the loop engine, idle kinds to the sleeper, and every
//! segment is appended to the log.

use crate::calibrate::{Calibration, Calibrator};
use crate::engine::{checked_duration, LoopEngine};
use crate::exec_log::{ExecutionLog, LogEntry};
use crate::observer::{ActivityObserver, TracingObserver};
use crate::sleep::{CoarseSleeper, NanosleepWaiter, Waiter};
use rattle_common::activity::ActivityKind;
use rattle_common::config::RattleConfig;
use rattle_common::error::RattleResult;
use rattle_common::time::{Clock, MonotonicClock, Timestamp};
use std::time::Duration;
use tracing::{debug, info};

/// Shortest sleep, used to align the first segment to a timer boundary.
const ALIGNMENT_SLEEP: Duration = Duration::from_micros(1);

/// Runs activity segments and records when they really happened.
pub struct ActivityScheduler<
    C: Clock + Clone = MonotonicClock,
    W: Waiter = NanosleepWaiter,
    O: ActivityObserver = TracingObserver,
> {
    engine: LoopEngine<C>,
    sleeper: CoarseSleeper<C, W>,
    log: ExecutionLog,
    observer: O,
    slowdown: f64,
    granularity: Duration,
}

impl<C: Clock + Clone, W: Waiter, O: ActivityObserver> ActivityScheduler<C, W, O> {
    /// Run one segment of `kind` for `seconds` (before slowdown).
    ///
    /// # Errors
    ///
    /// Any error is fatal for the run: invalid durations, clock or wait
    /// failures, and a full execution log.
    pub fn perform(&mut self, kind: ActivityKind, seconds: f64) -> RattleResult<LogEntry> {
        let requested = checked_duration(seconds * self.slowdown)?;
        self.observer.activity_started(kind, requested);

        let entry = if kind.is_idle() {
            let span = self.sleeper.sleep(requested)?;
            let entry = LogEntry {
                activity: kind,
                requested,
                start: span.start,
                end: span.end,
            };
            self.log.append(entry)?;
            entry
        } else {
            self.engine.run(kind, seconds, &mut self.log)?
        };

        self.observer.activity_finished(&entry);
        Ok(entry)
    }

    /// The execution log.
    #[must_use]
    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    /// Consume the scheduler, keeping only its log.
    #[must_use]
    pub fn into_log(self) -> ExecutionLog {
        self.log
    }

    /// Startup timestamp; dumped offsets are relative to it.
    #[must_use]
    pub fn epoch(&self) -> Timestamp {
        self.log.epoch()
    }

    /// Tick calibration in use.
    #[must_use]
    pub fn calibration(&self) -> &Calibration {
        self.engine.calibration()
    }

    /// Sleep granularity measured at startup.
    #[must_use]
    pub fn granularity(&self) -> Duration {
        self.granularity
    }

    /// Multiplier applied to every requested duration.
    #[must_use]
    pub fn slowdown(&self) -> f64 {
        self.slowdown
    }

    /// The observer.
    pub fn observer(&self) -> &O {
        &self.observer
    }
}

/// Builder for [`ActivityScheduler`].
#[derive(Debug)]
pub struct SchedulerBuilder<
    C: Clock + Clone = MonotonicClock,
    W: Waiter = NanosleepWaiter,
    O: ActivityObserver = TracingObserver,
> {
    clock: C,
    waiter: W,
    observer: O,
    config: RattleConfig,
    calibration: Option<Calibration>,
}

impl SchedulerBuilder {
    /// Builder with the monotonic clock, nanosleep and tracing observer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            clock: MonotonicClock,
            waiter: NanosleepWaiter,
            observer: TracingObserver,
            config: RattleConfig::default(),
            calibration: None,
        }
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock + Clone, W: Waiter, O: ActivityObserver> SchedulerBuilder<C, W, O> {
    /// Set the full configuration.
    #[must_use]
    pub fn config(mut self, config: RattleConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the slowdown multiplier.
    #[must_use]
    pub fn slowdown(mut self, slowdown: f64) -> Self {
        self.config.slowdown = slowdown;
        self
    }

    /// Select the short calibration window.
    #[must_use]
    pub fn short_calibration(mut self, short: bool) -> Self {
        self.config.calibration.short = short;
        self
    }

    /// Reuse a known calibration instead of measuring one.
    #[must_use]
    pub fn calibration(mut self, calibration: Calibration) -> Self {
        self.calibration = Some(calibration);
        self
    }

    /// Replace the clock.
    pub fn clock<C2: Clock + Clone>(self, clock: C2) -> SchedulerBuilder<C2, W, O> {
        SchedulerBuilder {
            clock,
            waiter: self.waiter,
            observer: self.observer,
            config: self.config,
            calibration: self.calibration,
        }
    }

    /// Replace the wait primitive.
    pub fn waiter<W2: Waiter>(self, waiter: W2) -> SchedulerBuilder<C, W2, O> {
        SchedulerBuilder {
            clock: self.clock,
            waiter,
            observer: self.observer,
            config: self.config,
            calibration: self.calibration,
        }
    }

    /// Replace the observer.
    pub fn observer<O2: ActivityObserver>(self, observer: O2) -> SchedulerBuilder<C, W, O2> {
        SchedulerBuilder {
            clock: self.clock,
            waiter: self.waiter,
            observer,
            config: self.config,
            calibration: self.calibration,
        }
    }

    /// Validate the configuration and run the startup sequence.
    ///
    /// Takes at least the calibration window unless a calibration was
    /// supplied.
    ///
    /// # Errors
    ///
    /// Returns [`RattleError::Config`](rattle_common::error::RattleError::Config)
    /// for an invalid configuration, or any calibration and sleep failure.
    pub fn build(self) -> RattleResult<ActivityScheduler<C, W, O>> {
        let config = self.config;
        config.validate()?;

        let epoch = self.clock.now()?;

        let calibration = match self.calibration {
            Some(calibration) => calibration,
            None => {
                let window = config.calibration.window();
                info!(window_ms = window.as_millis(), "Calibrating tick counter");
                Calibrator::new(self.clock.clone(), config.engine.batch_size).calibrate(window)?
            }
        };

        let mut sleeper = CoarseSleeper::new(
            self.clock.clone(),
            self.waiter,
            config.sleep.refill_granularity,
        );
        let granularity = sleeper.granularity(config.sleep.probe)?;

        debug!(words = config.engine.scratch_words, "Preparing scratch region");
        let engine = LoopEngine::new(self.clock, calibration, config.slowdown, &config.engine)?;
        let log = ExecutionLog::new(config.log.capacity, epoch);

        sleeper.sleep(ALIGNMENT_SLEEP)?;

        info!(
            ticks_per_second = calibration.ticks_per_second(),
            granularity_us = granularity.as_micros(),
            slowdown = config.slowdown,
            log_capacity = log.capacity(),
            "Scheduler ready"
        );

        Ok(ActivityScheduler {
            engine,
            sleeper,
            log,
            observer: self.observer,
            slowdown: config.slowdown,
            granularity,
        })
    }
}
