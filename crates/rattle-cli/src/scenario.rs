//! Run modes and the activity sequences they perform.
//!
//! A mode expands into a list of [`Step`]s for one cycle. The sweep modes
//! (`full`, `watch`) run their cycle once; every other mode repeats it until
//! the requested number of cycles is done or a stop is requested.

use clap::ValueEnum;
use rattle_common::activity::ActivityKind;
use rattle_common::error::RattleResult;
use rattle_common::time::Clock;
use rattle_runtime::observer::ActivityObserver;
use rattle_runtime::scheduler::ActivityScheduler;
use rattle_runtime::sleep::Waiter;
use tracing::info;

/// Sweep durations stop once they fall to this many seconds.
const SWEEP_FLOOR: f64 = 0.000_01;

/// First duration of the resolution sweep.
const RESOLUTION_START: f64 = 0.659_25;

/// Segment length of the single-activity modes.
const SINGLE_ACTIVITY_SECS: f64 = 1000.0;

/// What to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    /// 30 s prelude, activity sweep from 8 s, resolution sweep.
    #[default]
    Full,
    /// Quick sweep from 1 s without the prelude.
    Watch,
    /// MUL 0.8, SLEEP 0.4, MEMORY 0.8, SLEEP 0.4, repeated.
    Trial,
    /// MUL 0.4, SLEEP 0.2, repeated.
    MulSleep,
    /// Integer and float multiply mixes, repeated.
    MulFmul,
    /// MEMORY only.
    JustMem,
    /// MUL only.
    JustMul,
    /// PAUSE only.
    JustPause,
}

impl Mode {
    /// Whether the cycle repeats.
    #[must_use]
    pub fn repeats(self) -> bool {
        !matches!(self, Self::Full | Self::Watch)
    }

    /// Whether the mode skips the full calibration window.
    #[must_use]
    pub fn forces_short_calibration(self) -> bool {
        self != Self::Full
    }

    /// Line printed before the first segment.
    #[must_use]
    pub fn headline(self) -> Option<&'static str> {
        match self {
            Self::Full | Self::Watch => None,
            Self::Trial => Some("! Trial"),
            Self::MulSleep => Some("! MUL/SLEEP"),
            Self::MulFmul => Some("! MUL/FMUL/MUL_FMUL only"),
            Self::JustMem => Some("! Memory only"),
            Self::JustMul => Some("! MUL only"),
            Self::JustPause => Some("! PAUSE only"),
        }
    }
}

/// One item of a cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step {
    /// Start of a sweep set; logged, not timed.
    Phase(&'static str, f64),
    /// Perform `kind` for the given seconds (before slowdown).
    Run(ActivityKind, f64),
}

/// A mode plus its options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scenario {
    /// Run mode.
    pub mode: Mode,
    /// Add DIV2, DIV8209, MEMW0 and MEMW1 to the activity sweep.
    pub exotic: bool,
    /// Cycles of a repeating mode; 0 runs until stopped.
    pub repetitions: u64,
}

/// How a scenario ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriveOutcome {
    /// Completed cycles.
    pub cycles: u64,
    /// Performed segments.
    pub segments: u64,
    /// Whether a stop request ended the run early.
    pub stopped: bool,
}

impl Scenario {
    /// Steps of one cycle.
    #[must_use]
    pub fn cycle(&self) -> Vec<Step> {
        use ActivityKind::{Fmul, MemoryRead, Mul, MulFmul, Pause, Sleep};

        match self.mode {
            Mode::Full => self.sweeps(false),
            Mode::Watch => self.sweeps(true),
            Mode::Trial => vec![
                Step::Run(Mul, 0.8),
                Step::Run(Sleep, 0.4),
                Step::Run(MemoryRead, 0.8),
                Step::Run(Sleep, 0.4),
            ],
            Mode::MulSleep => vec![Step::Run(Mul, 0.4), Step::Run(Sleep, 0.2)],
            Mode::MulFmul => {
                let mut steps = vec![
                    Step::Run(Mul, 1.0),
                    Step::Run(Fmul, 1.0),
                    Step::Run(MulFmul, 1.0),
                ];
                for _ in 0..500 {
                    steps.extend([Step::Run(Mul, 0.001), Step::Run(Fmul, 0.001)]);
                }
                for _ in 0..500 {
                    steps.extend([Step::Run(Mul, 0.0005), Step::Run(Fmul, 0.0015)]);
                }
                steps.push(Step::Run(Sleep, 0.2));
                steps
            }
            Mode::JustMem => vec![Step::Run(MemoryRead, SINGLE_ACTIVITY_SECS)],
            Mode::JustMul => vec![Step::Run(Mul, SINGLE_ACTIVITY_SECS)],
            Mode::JustPause => vec![Step::Run(Pause, SINGLE_ACTIVITY_SECS)],
        }
    }

    fn sweeps(&self, watch: bool) -> Vec<Step> {
        use ActivityKind::{
            Add, DivByLarge, DivBySmall, MemoryRead, MemoryWriteOnes, MemoryWriteZero, Mul, Pause,
            Sleep,
        };

        let mut steps = Vec::new();
        if !watch {
            steps.extend([Step::Run(Mul, 30.0), Step::Run(Sleep, 30.0)]);
        }

        let mut d = if watch { 1.0 } else { 8.0 };
        loop {
            steps.push(Step::Phase("Activity set", d));
            steps.extend([Mul, Add, MemoryRead, Pause].map(|k| Step::Run(k, d)));
            if self.exotic {
                let exotic = [DivBySmall, DivByLarge, MemoryWriteZero, MemoryWriteOnes];
                steps.extend(exotic.map(|k| Step::Run(k, d)));
            }
            steps.push(Step::Run(Sleep, d));

            d /= if d > 0.5 {
                1.5
            } else if d > 0.03 {
                1.07
            } else {
                1.02
            };
            if d <= SWEEP_FLOOR {
                break;
            }
        }

        let pairs = if watch { 3 } else { 10 };
        let mut d = RESOLUTION_START;
        loop {
            steps.push(Step::Phase("Resolution set", d));
            for _ in 0..pairs {
                steps.extend([Step::Run(Mul, d), Step::Run(Sleep, d / 2.0)]);
            }

            d /= if d > 0.1 {
                1.5
            } else if d > 0.01 {
                1.3
            } else {
                1.1
            };
            if d <= SWEEP_FLOOR {
                break;
            }
        }
        steps
    }

    /// Perform the scenario on `scheduler`.
    ///
    /// `should_stop` is polled before every step; a stop never interrupts a
    /// segment in progress.
    ///
    /// # Errors
    ///
    /// Returns the first scheduler error; the run is over at that point.
    pub fn drive<C, W, O>(
        &self,
        scheduler: &mut ActivityScheduler<C, W, O>,
        should_stop: impl Fn() -> bool,
    ) -> RattleResult<DriveOutcome>
    where
        C: Clock + Clone,
        W: Waiter,
        O: ActivityObserver,
    {
        let steps = self.cycle();
        let mut outcome = DriveOutcome {
            cycles: 0,
            segments: 0,
            stopped: false,
        };

        'cycles: loop {
            for step in &steps {
                if should_stop() {
                    outcome.stopped = true;
                    break 'cycles;
                }
                match *step {
                    Step::Phase(name, seconds) => info!(seconds, "{name}"),
                    Step::Run(kind, seconds) => {
                        scheduler.perform(kind, seconds)?;
                        outcome.segments += 1;
                    }
                }
            }
            outcome.cycles += 1;

            let done = !self.mode.repeats()
                || (self.repetitions > 0 && outcome.cycles >= self.repetitions);
            if done {
                break;
            }
        }
        Ok(outcome)
    }
}
