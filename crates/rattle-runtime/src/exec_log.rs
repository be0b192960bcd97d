//! Append-only execution log.
//!
//! One [`LogEntry`] is recorded per executed segment, after the segment's
//! end timestamp has been taken, so appending never lands inside a
//! measured interval.
//!
//! # Design
//!
//! - **Pre-allocated**: all storage is reserved up front; appends never allocate.
//! - **Fail-fast**: appending to a full log is an error. Dropping entries
//!   would silently corrupt a measurement.
//! - **Relative dump**: records are reported as offsets from the log's
//!   epoch so the timeline can be rebuilt without knowing the clock origin.

use rattle_common::activity::ActivityKind;
use rattle_common::error::{RattleError, RattleResult};
use rattle_common::time::{Timestamp, MICROS_PER_SEC};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Realized timing of one executed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogEntry {
    /// What ran.
    pub activity: ActivityKind,
    /// Duration asked for, after slowdown scaling.
    pub requested: Duration,
    /// Realized start.
    pub start: Timestamp,
    /// Realized end.
    pub end: Timestamp,
}

impl LogEntry {
    /// Realized wall duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end.saturating_duration_since(self.start)
    }

    /// Realized minus requested duration, in microseconds (negative on undershoot).
    #[must_use]
    pub fn overshoot_us(&self) -> i64 {
        let realized = i64::try_from(self.duration().as_micros()).unwrap_or(i64::MAX);
        let requested = i64::try_from(self.requested.as_micros()).unwrap_or(i64::MAX);
        realized.saturating_sub(requested)
    }
}

/// Dumped form of a [`LogEntry`], relative to the log epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LogRecord {
    /// Activity label.
    pub activity: &'static str,
    /// Start offset in seconds.
    pub start_sec: f64,
    /// End offset in seconds.
    pub end_sec: f64,
    /// Realized duration in seconds.
    pub duration_sec: f64,
}

impl LogRecord {
    fn from_entry(entry: &LogEntry, epoch: Timestamp) -> Self {
        Self {
            activity: entry.activity.label(),
            start_sec: micros_to_secs(entry.start.saturating_duration_since(epoch)),
            end_sec: micros_to_secs(entry.end.saturating_duration_since(epoch)),
            duration_sec: micros_to_secs(entry.duration()),
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn micros_to_secs(d: Duration) -> f64 {
    d.as_micros() as f64 / MICROS_PER_SEC as f64
}

/// `> start end duration  LABEL`, fixed-point seconds.
impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "> {:12.9} {:12.9} {:12.9}  {}",
            self.start_sec, self.end_sec, self.duration_sec, self.activity
        )
    }
}

/// Per-activity aggregate over the log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivitySummary {
    /// Number of segments.
    pub count: usize,
    /// Sum of realized durations in seconds.
    pub realized_sec: f64,
    /// Mean overshoot in microseconds.
    pub mean_overshoot_us: f64,
    /// Largest overshoot in microseconds.
    pub max_overshoot_us: i64,
}

/// Bounded, append-only record of executed segments.
#[derive(Debug)]
pub struct ExecutionLog {
    entries: Vec<LogEntry>,
    capacity: usize,
    epoch: Timestamp,
}

impl ExecutionLog {
    /// Create an empty log holding at most `capacity` entries.
    ///
    /// Offsets in [`dump`](Self::dump) are relative to `epoch`. A zero
    /// capacity log rejects every append.
    #[must_use]
    pub fn new(capacity: usize, epoch: Timestamp) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
            epoch,
        }
    }

    /// Record a finished segment.
    ///
    /// # Errors
    ///
    /// Returns [`RattleError::LogCapacityExceeded`] when the log is full;
    /// the entry is not recorded.
    pub fn append(&mut self, entry: LogEntry) -> RattleResult<()> {
        if self.entries.len() >= self.capacity {
            return Err(RattleError::LogCapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Maximum number of entries.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of recorded entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Timestamp the dump offsets are relative to.
    #[must_use]
    pub fn epoch(&self) -> Timestamp {
        self.epoch
    }

    /// Recorded entries in append order.
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries as epoch-relative records, in append order.
    pub fn dump(&self) -> impl Iterator<Item = LogRecord> + '_ {
        self.entries
            .iter()
            .map(move |entry| LogRecord::from_entry(entry, self.epoch))
    }

    /// Aggregate count, realized time and overshoot per activity.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn summary(&self) -> BTreeMap<ActivityKind, ActivitySummary> {
        let mut totals: BTreeMap<ActivityKind, (usize, Duration, i64, i64)> = BTreeMap::new();
        for entry in &self.entries {
            let overshoot = entry.overshoot_us();
            let slot = totals
                .entry(entry.activity)
                .or_insert((0, Duration::ZERO, 0, i64::MIN));
            slot.0 += 1;
            slot.1 += entry.duration();
            slot.2 = slot.2.saturating_add(overshoot);
            slot.3 = slot.3.max(overshoot);
        }
        totals
            .into_iter()
            .map(|(kind, (count, realized, overshoot_sum, overshoot_max))| {
                (
                    kind,
                    ActivitySummary {
                        count,
                        realized_sec: micros_to_secs(realized),
                        mean_overshoot_us: overshoot_sum as f64 / count as f64,
                        max_overshoot_us: overshoot_max,
                    },
                )
            })
            .collect()
    }
}
