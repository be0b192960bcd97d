//! Execution log tests against a real scheduler.
//!
//! # Acceptance Criteria
//!
//! - Entries appear in perform order and never overlap
//! - Dumped offsets are relative to the startup epoch
//! - A full log stops the run with an overflow error

use super::common::{quick_config, real_scheduler};
use rattle_common::activity::ActivityKind;
use rattle_common::error::RattleError;

#[test]
fn test_entries_ordered_and_disjoint() {
    let mut scheduler = real_scheduler(quick_config());
    let plan = [
        ActivityKind::Add,
        ActivityKind::Sleep,
        ActivityKind::MemoryWriteZero,
        ActivityKind::None,
        ActivityKind::DivBySmall,
        ActivityKind::MulFmul,
    ];
    for kind in plan {
        scheduler.perform(kind, 0.005).unwrap();
    }

    let entries = scheduler.log().entries();
    assert_eq!(
        entries.iter().map(|e| e.activity).collect::<Vec<_>>(),
        plan.to_vec()
    );
    assert!(entries[0].start >= scheduler.epoch());
    for entry in entries {
        assert!(entry.start <= entry.end);
    }
    for pair in entries.windows(2) {
        assert!(pair[0].end <= pair[1].start);
    }
}

#[test]
fn test_dump_is_epoch_relative() {
    let mut scheduler = real_scheduler(quick_config());
    scheduler.perform(ActivityKind::Mul, 0.01).unwrap();
    scheduler.perform(ActivityKind::Sleep, 0.01).unwrap();

    let records: Vec<_> = scheduler.log().dump().collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].activity, "MUL");
    assert_eq!(records[1].activity, "SLEEP");

    // Startup (granularity probes, alignment) precedes the first segment.
    assert!(records[0].start_sec > 0.0);
    assert!(records[0].start_sec < 1.0);
    assert!(records[1].start_sec >= records[0].end_sec);
    for record in &records {
        assert!((record.end_sec - record.start_sec - record.duration_sec).abs() < 1e-6);
        let line = record.to_string();
        assert!(line.starts_with("> "));
        assert!(line.ends_with(&format!("  {}", record.activity)));
    }
}

#[test]
fn test_overflow_stops_the_run() {
    let mut config = quick_config();
    config.log.capacity = 3;
    let mut scheduler = real_scheduler(config);

    for _ in 0..3 {
        scheduler.perform(ActivityKind::Pause, 0.001).unwrap();
    }
    let err = scheduler.perform(ActivityKind::Sleep, 0.001).unwrap_err();

    assert_eq!(err, RattleError::LogCapacityExceeded { capacity: 3 });
    assert_eq!(scheduler.log().len(), 3);
}

#[test]
fn test_summary_groups_by_activity() {
    let mut scheduler = real_scheduler(quick_config());
    for _ in 0..3 {
        scheduler.perform(ActivityKind::Mul, 0.004).unwrap();
        scheduler.perform(ActivityKind::Sleep, 0.002).unwrap();
    }

    let summary = scheduler.log().summary();
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[&ActivityKind::Mul].count, 3);
    assert_eq!(summary[&ActivityKind::Sleep].count, 3);
    assert!(summary[&ActivityKind::Sleep].max_overshoot_us >= 0);
    assert!(summary[&ActivityKind::Mul].realized_sec > 0.0);
}
