//! Side-channel hooks around each segment.
//!
//! Observers run outside the measured interval: `activity_started` before
//! the start timestamp is taken and `activity_finished` after the entry has
//! been logged. Anything they cost lands in the gap between two segments,
//! never inside one.

use crate::exec_log::LogEntry;
use rattle_common::activity::ActivityKind;
use std::time::Duration;
use tracing::{debug, trace};

/// Callbacks around each performed segment.
pub trait ActivityObserver {
    /// A segment of `kind` lasting `planned` (after slowdown) is about to start.
    fn activity_started(&mut self, kind: ActivityKind, planned: Duration) {
        let _ = (kind, planned);
    }

    /// A segment finished and was logged.
    fn activity_finished(&mut self, entry: &LogEntry) {
        let _ = entry;
    }
}

/// Observer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ActivityObserver for NoopObserver {}

/// Observer reporting every segment through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ActivityObserver for TracingObserver {
    fn activity_started(&mut self, kind: ActivityKind, planned: Duration) {
        trace!(activity = %kind, planned_sec = planned.as_secs_f64(), "Segment starting");
    }

    fn activity_finished(&mut self, entry: &LogEntry) {
        debug!(
            activity = %entry.activity,
            start = %entry.start,
            realized_sec = entry.duration().as_secs_f64(),
            overshoot_us = entry.overshoot_us(),
            "Segment finished"
        );
    }
}
