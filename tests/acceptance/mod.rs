//! Integration tests for rattle acceptance testing.
//!
//! Lenient variants run everywhere; the tight-tolerance variants are
//! `#[ignore]`d and meant for a quiescent machine:
//!
//! ```text
//! cargo test --release --test acceptance_tests -- --ignored --test-threads=1
//! ```

mod common;
mod config_test;
mod interruption_test;
mod log_test;
mod timing_test;
