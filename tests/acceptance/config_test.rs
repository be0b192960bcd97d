//! Configuration files driving a real scheduler.

use super::common::QUICK_WINDOW;
use rattle_common::activity::ActivityKind;
use rattle_common::config::RattleConfig;
use rattle_runtime::scheduler::SchedulerBuilder;
use std::io::Write;
use std::time::Duration;

#[test]
fn test_scheduler_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
slowdown = 2.0

[calibration]
short = true
short_window = "{}ms"

[engine]
batch_size = 60
scratch_words = 65536

[sleep]
refill_granularity = "5ms"
probe = "50us"

[log]
capacity = 4
"#,
        QUICK_WINDOW.as_millis()
    )
    .unwrap();

    let config = RattleConfig::from_file(file.path()).unwrap();
    assert_eq!(config.engine.batch_size, 60);
    assert_eq!(config.sleep.refill_granularity, Some(Duration::from_millis(5)));

    let mut scheduler = SchedulerBuilder::new().config(config).build().unwrap();
    assert!((scheduler.slowdown() - 2.0).abs() < f64::EPSILON);
    assert!(scheduler.calibration().window() >= QUICK_WINDOW);

    let entry = scheduler.perform(ActivityKind::Sleep, 0.012).unwrap();
    assert_eq!(entry.requested, Duration::from_millis(24));
    assert!(entry.duration() >= Duration::from_millis(24));
    assert_eq!(scheduler.log().capacity(), 4);
}

#[test]
fn test_invalid_file_rejected_at_startup() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine]\nscratch_words = 1000").unwrap();

    let config = RattleConfig::from_file(file.path()).unwrap();
    let result = SchedulerBuilder::new().config(config).build();
    assert!(result.is_err());
}

#[test]
fn test_shipped_default_config_parses() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("config/default.toml");
    let config = RattleConfig::from_file(&path).unwrap();
    config.validate().unwrap();
    assert!(!config.realtime.enabled);
}
