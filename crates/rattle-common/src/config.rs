//! Configuration structures for a rattle run.
//!
//! Supports TOML deserialization with defaults matching the behaviour of a
//! plain `rattle` invocation. The configuration is an explicit value handed
//! to the calibrator and engines at construction.

use crate::error::{RattleError, RattleResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

/// Default number of pattern steps between two tick-counter reads.
pub const DEFAULT_BATCH_SIZE: u32 = 120;

/// Default scratch region size in 32-bit words (32 MiB).
pub const DEFAULT_SCRATCH_WORDS: usize = 8 * 1024 * 1024;

/// Smallest accepted scratch region, in words.
pub const MIN_SCRATCH_WORDS: usize = 1024;

/// Default execution log capacity.
pub const DEFAULT_LOG_CAPACITY: usize = 100_000;

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RattleConfig {
    /// Multiplier applied to every requested activity and sleep duration.
    pub slowdown: f64,

    /// Tick calibration settings.
    pub calibration: CalibrationConfig,

    /// Busy-loop engine settings.
    pub engine: EngineConfig,

    /// Coarse sleep settings.
    pub sleep: SleepConfig,

    /// Execution log settings.
    pub log: LogConfig,

    /// Best-effort real-time setup.
    pub realtime: RealtimeConfig,
}

impl Default for RattleConfig {
    fn default() -> Self {
        Self {
            slowdown: 1.0,
            calibration: CalibrationConfig::default(),
            engine: EngineConfig::default(),
            sleep: SleepConfig::default(),
            log: LogConfig::default(),
            realtime: RealtimeConfig::default(),
        }
    }
}

/// Tick calibration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Use the short window (fast startup, lower precision).
    pub short: bool,

    /// Minimum wall time of the final calibration measurement in short mode.
    #[serde(with = "humantime_serde")]
    pub short_window: Duration,

    /// Minimum wall time of the final calibration measurement otherwise.
    #[serde(with = "humantime_serde")]
    pub full_window: Duration,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            short: false,
            short_window: Duration::from_millis(300),
            full_window: Duration::from_secs(3),
        }
    }
}

impl CalibrationConfig {
    /// The window selected by [`short`](Self::short).
    #[must_use]
    pub fn window(&self) -> Duration {
        if self.short {
            self.short_window
        } else {
            self.full_window
        }
    }
}

/// Busy-loop engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Pattern steps executed between two tick-counter reads.
    ///
    /// Larger batches lower the read overhead and raise the overshoot past
    /// the deadline.
    pub batch_size: u32,

    /// Scratch region size in 32-bit words; must be a power of two.
    pub scratch_words: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            scratch_words: DEFAULT_SCRATCH_WORDS,
        }
    }
}

/// Coarse sleep settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepConfig {
    /// Longest single blocking wait. `None` waits for the whole remainder.
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "humantime_serde::option"
    )]
    pub refill_granularity: Option<Duration>,

    /// Duration slept twice when measuring the sleep granularity.
    #[serde(with = "humantime_serde")]
    pub probe: Duration,
}

impl Default for SleepConfig {
    fn default() -> Self {
        Self {
            refill_granularity: None,
            probe: Duration::from_micros(100),
        }
    }
}

/// Execution log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Maximum number of entries; appending beyond it is fatal.
    pub capacity: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

/// Real-time scheduling configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RealtimeConfig {
    /// Enable real-time setup (requires privileges; failures degrade to warnings).
    pub enabled: bool,

    /// Scheduler policy: "fifo", "rr" or "other".
    pub policy: SchedPolicy,

    /// Scheduler priority (1-99 for RT policies).
    pub priority: u8,

    /// CPU the run is pinned to.
    pub cpu_affinity: CpuAffinity,

    /// Lock all memory pages (mlockall), including the scratch region.
    pub lock_memory: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            policy: SchedPolicy::Fifo,
            priority: 80,
            cpu_affinity: CpuAffinity::None,
            lock_memory: true,
        }
    }
}

/// Scheduler policy for the measuring thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// SCHED_FIFO: First-in-first-out real-time.
    #[default]
    Fifo,
    /// SCHED_RR: Round-robin real-time.
    Rr,
    /// SCHED_OTHER: Normal time-sharing (non-RT).
    Other,
}

/// CPU affinity specification.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CpuAffinity {
    /// No affinity set (OS chooses).
    #[default]
    None,
    /// Pin to a single CPU core.
    Single(usize),
    /// Pin to a set of CPU cores.
    Set(Vec<usize>),
}

impl Serialize for CpuAffinity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            CpuAffinity::None => serializer.serialize_none(),
            CpuAffinity::Single(cpu) => serializer.serialize_u64(*cpu as u64),
            CpuAffinity::Set(cpus) => cpus.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for CpuAffinity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct CpuAffinityVisitor;

        impl<'de> Visitor<'de> for CpuAffinityVisitor {
            type Value = CpuAffinity;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("null, a CPU index, or an array of CPU indices")
            }

            fn visit_none<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(CpuAffinity::None)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(CpuAffinity::None)
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                usize::try_from(value)
                    .map(CpuAffinity::Single)
                    .map_err(|_| de::Error::custom("CPU index out of range"))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                usize::try_from(value)
                    .map(CpuAffinity::Single)
                    .map_err(|_| de::Error::custom("CPU index cannot be negative"))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut cpus = Vec::new();
                while let Some(cpu) = seq.next_element::<usize>()? {
                    cpus.push(cpu);
                }
                Ok(CpuAffinity::Set(cpus))
            }
        }

        deserializer.deserialize_any(CpuAffinityVisitor)
    }
}

impl RattleConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        debug!(?path, "Reading configuration file");
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check the invariants the engines rely on.
    ///
    /// # Errors
    ///
    /// Returns [`RattleError::Config`] naming the first offending setting.
    pub fn validate(&self) -> RattleResult<()> {
        if !self.slowdown.is_finite() || self.slowdown < 1.0 {
            return Err(RattleError::Config(format!(
                "slowdown must be a finite value >= 1, got {}",
                self.slowdown
            )));
        }
        if self.calibration.short_window.is_zero() || self.calibration.full_window.is_zero() {
            return Err(RattleError::Config(
                "calibration windows must be greater than zero".into(),
            ));
        }
        if self.engine.batch_size == 0 {
            return Err(RattleError::Config("engine.batch_size must be at least 1".into()));
        }
        let words = self.engine.scratch_words;
        if words < MIN_SCRATCH_WORDS || !words.is_power_of_two() {
            return Err(RattleError::Config(format!(
                "engine.scratch_words must be a power of two >= {MIN_SCRATCH_WORDS}, got {words}"
            )));
        }
        if self.sleep.probe.is_zero() {
            return Err(RattleError::Config("sleep.probe must be greater than zero".into()));
        }
        if self.sleep.refill_granularity.is_some_and(|g| g.is_zero()) {
            return Err(RattleError::Config(
                "sleep.refill_granularity must be greater than zero when set".into(),
            ));
        }
        if self.log.capacity == 0 {
            return Err(RattleError::Config("log.capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};
        use std::time::Duration;

        #[allow(clippy::ref_option)]
        pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match duration {
                Some(d) => super::serialize(d, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let s = Option::<String>::deserialize(deserializer)?;
            s.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RattleConfig::default();
        assert!((config.slowdown - 1.0).abs() < f64::EPSILON);
        assert_eq!(config.engine.batch_size, 120);
        assert_eq!(config.log.capacity, 100_000);
        assert_eq!(config.calibration.window(), Duration::from_secs(3));
        assert!(config.sleep.refill_granularity.is_none());
        assert!(!config.realtime.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            slowdown = 2.0

            [calibration]
            short = true
            short_window = "150ms"

            [engine]
            batch_size = 64
            scratch_words = 4096

            [sleep]
            refill_granularity = "250ms"

            [log]
            capacity = 16

            [realtime]
            enabled = true
            cpu_affinity = 2
        "#;

        let config = RattleConfig::from_toml(toml).unwrap();
        assert!((config.slowdown - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.calibration.window(), Duration::from_millis(150));
        assert_eq!(config.engine.batch_size, 64);
        assert_eq!(
            config.sleep.refill_granularity,
            Some(Duration::from_millis(250))
        );
        assert_eq!(config.sleep.probe, Duration::from_micros(100));
        assert_eq!(config.log.capacity, 16);
        assert_eq!(config.realtime.cpu_affinity, CpuAffinity::Single(2));
        config.validate().unwrap();
    }

    #[test]
    fn test_cpu_affinity_variants() {
        let single: CpuAffinity = serde_json::from_str("3").unwrap();
        assert_eq!(single, CpuAffinity::Single(3));

        let set: CpuAffinity = serde_json::from_str("[1, 2, 3]").unwrap();
        assert_eq!(set, CpuAffinity::Set(vec![1, 2, 3]));

        assert!(serde_json::from_str::<CpuAffinity>("-1").is_err());
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = RattleConfig::default();
        config.sleep.refill_granularity = Some(Duration::from_millis(90));
        let toml = config.to_toml().unwrap();
        let parsed = RattleConfig::from_toml(&toml).unwrap();
        assert_eq!(config.calibration.full_window, parsed.calibration.full_window);
        assert_eq!(parsed.sleep.refill_granularity, Some(Duration::from_millis(90)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = RattleConfig {
            slowdown: 0.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(RattleError::Config(_))));

        config.slowdown = f64::NAN;
        assert!(config.validate().is_err());

        config.slowdown = 1.0;
        config.engine.scratch_words = 3000;
        assert!(config.validate().is_err());

        config.engine.scratch_words = 4096;
        config.engine.batch_size = 0;
        assert!(config.validate().is_err());

        config.engine.batch_size = 1;
        config.sleep.refill_granularity = Some(Duration::ZERO);
        assert!(config.validate().is_err());

        config.sleep.refill_granularity = None;
        config.log.capacity = 0;
        assert!(config.validate().is_err());

        config.log.capacity = 1;
        config.validate().unwrap();
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rattle.toml");
        std::fs::write(&path, "slowdown = 4.0\n").unwrap();
        let config = RattleConfig::from_file(&path).unwrap();
        assert!((config.slowdown - 4.0).abs() < f64::EPSILON);

        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            RattleConfig::from_file(&missing),
            Err(ConfigError::Io { .. })
        ));
    }
}
