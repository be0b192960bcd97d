//! rattle entry point.
//!
//! Calibrates, runs the selected scenario and prints the execution log.
//! stdout carries only the banner and the dump; diagnostics go to stderr.

mod scenario;
mod signals;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use rattle_common::config::RattleConfig;
use rattle_runtime::exec_log::{ExecutionLog, LogRecord};
use rattle_runtime::realtime::init_realtime;
use rattle_runtime::scheduler::SchedulerBuilder;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{info, warn, Level};

use crate::scenario::{Mode, Scenario};
use crate::signals::StopSignal;

/// Dump format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
enum OutputFormat {
    /// `> start end duration  LABEL` lines.
    #[default]
    Text,
    /// One JSON array of records.
    Json,
}

/// rattle command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "rattle",
    about = "Precisely timed CPU load and idle patterns with an exact execution timeline",
    version,
    long_about = None
)]
struct Args {
    /// Run mode.
    #[arg(long, short = 'm', value_enum, default_value_t = Mode::Full)]
    mode: Mode,

    /// Path to a configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Double every duration; repeat to slow down further.
    #[arg(long, action = ArgAction::Count)]
    slow: u8,

    /// Add DIV2, DIV8209, MEMW0 and MEMW1 to the activity sweep.
    #[arg(long)]
    exotic: bool,

    /// Use the short calibration window.
    #[arg(long)]
    short_calibration: bool,

    /// Cycles of a repeating mode (0 = until SIGINT/SIGTERM).
    #[arg(long, short = 'n', default_value = "0")]
    repetitions: u64,

    /// Dump format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// More diagnostics on stderr; repeat for more.
    #[arg(long, short = 'v', action = ArgAction::Count)]
    verbose: u8,

    /// Errors only on stderr.
    #[arg(long, short = 'q', conflicts_with = "verbose")]
    quiet: bool,

    /// Base log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: Level,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(effective_level(args.log_level, args.verbose, args.quiet));
    info!(version = env!("CARGO_PKG_VERSION"), mode = ?args.mode, "Starting rattle");

    let mut config = load_config(args.config.as_deref())?;
    apply_args(&mut config, &args);
    config.validate().context("Invalid configuration")?;

    let stop = StopSignal::install().context("Failed to install stop handlers")?;
    init_realtime(&config.realtime).context("Real-time setup failed")?;

    let mut scheduler = SchedulerBuilder::new()
        .config(config.clone())
        .build()
        .context("Scheduler startup failed")?;

    let heading = banner(
        scheduler.calibration().ticks_per_second(),
        scheduler.granularity(),
    );
    if args.format == OutputFormat::Text {
        println!("{heading}");
        if let Some(headline) = args.mode.headline() {
            println!("{headline}");
        }
    } else {
        info!("{heading}");
    }

    let scenario = Scenario {
        mode: args.mode,
        exotic: args.exotic,
        repetitions: args.repetitions,
    };
    let started = Instant::now();
    let outcome = scenario
        .drive(&mut scheduler, || stop.stop_requested())
        .context("Run aborted")?;

    if outcome.stopped {
        warn!(
            signal = ?stop.last_signal(),
            segments = outcome.segments,
            "Stop requested, dumping the log"
        );
    }

    let log = scheduler.into_log();
    dump(&log, args.format).context("Failed to write the execution log")?;
    summarize(&log, started.elapsed());
    Ok(())
}

/// Step `base` up once per `-v`; `-q` wins.
fn effective_level(base: Level, verbose: u8, quiet: bool) -> Level {
    const LADDER: [Level; 5] = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];
    if quiet {
        return Level::ERROR;
    }
    let base_index = LADDER.iter().position(|l| *l == base).unwrap_or(2);
    LADDER[(base_index + usize::from(verbose)).min(LADDER.len() - 1)]
}

/// Initialize logging on stderr at the given level.
fn init_logging(level: Level) {
    let level = level.as_str().to_ascii_lowercase();
    let filter = format!(
        "rattle={level},rattle_cli={level},rattle_runtime={level},rattle_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_writer(io::stderr)
        .with_target(true)
        .init();
}

/// Load configuration from file or use defaults.
///
/// Resolution priority (first existing file wins):
/// 1. Command-line `--config` argument
/// 2. `RATTLE_CONFIG_PATH` environment variable
/// 3. `/etc/rattle/config.toml` (system path)
/// 4. `config/default.toml` (local development)
/// 5. Built-in defaults
fn load_config(explicit: Option<&Path>) -> Result<RattleConfig> {
    if let Some(config_path) = explicit {
        info!(?config_path, "Loading config from command-line argument");
        return RattleConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {config_path:?}"));
    }

    if let Ok(env_path) = std::env::var("RATTLE_CONFIG_PATH") {
        let config_path = PathBuf::from(&env_path);
        if config_path.exists() {
            info!(?config_path, "Loading config from RATTLE_CONFIG_PATH");
            return RattleConfig::from_file(&config_path).with_context(|| {
                format!("Failed to load config from RATTLE_CONFIG_PATH={env_path:?}")
            });
        }
        warn!(
            path = %env_path,
            "RATTLE_CONFIG_PATH set but file does not exist, checking other locations"
        );
    }

    for candidate in ["/etc/rattle/config.toml", "config/default.toml"] {
        let config_path = Path::new(candidate);
        if config_path.exists() {
            info!(?config_path, "Loading config");
            return RattleConfig::from_file(config_path)
                .with_context(|| format!("Failed to load config from {config_path:?}"));
        }
    }

    info!("No config file found, using built-in defaults");
    Ok(RattleConfig::default())
}

/// Fold command-line overrides into the loaded configuration.
fn apply_args(config: &mut RattleConfig, args: &Args) {
    if args.slow > 0 {
        config.slowdown *= 2f64.powi(i32::from(args.slow));
    }
    if args.short_calibration || args.mode.forces_short_calibration() {
        config.calibration.short = true;
    }
}

fn banner(ticks_per_second: f64, granularity: Duration) -> String {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let tps = ticks_per_second as u64;
    format!(
        "TPS: {tps}    Sleep granularity: {:.6}sec",
        granularity.as_secs_f64()
    )
}

fn dump(log: &ExecutionLog, format: OutputFormat) -> Result<()> {
    let mut out = BufWriter::new(io::stdout().lock());
    match format {
        OutputFormat::Text => {
            for record in log.dump() {
                writeln!(out, "{record}")?;
            }
        }
        OutputFormat::Json => {
            let records: Vec<LogRecord> = log.dump().collect();
            serde_json::to_writer_pretty(&mut out, &records)?;
            writeln!(out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn summarize(log: &ExecutionLog, elapsed: Duration) {
    for (kind, summary) in log.summary() {
        info!(
            activity = %kind,
            count = summary.count,
            realized_sec = summary.realized_sec,
            mean_overshoot_us = summary.mean_overshoot_us,
            max_overshoot_us = summary.max_overshoot_us,
            "Activity summary"
        );
    }
    let elapsed = Duration::from_millis(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
    info!(
        segments = log.len(),
        elapsed = %humantime::format_duration(elapsed),
        "Run complete"
    );
}
