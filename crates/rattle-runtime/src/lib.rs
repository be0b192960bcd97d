#![doc = "Precise-duration activity scheduler: tick calibration, busy-loop patterns, coarse sleep and execution log."]

pub mod calibrate;
pub mod engine;
pub mod exec_log;
pub mod observer;
pub(crate) mod pattern;
pub mod realtime;
pub mod scheduler;
pub mod scratch;
pub mod sleep;
pub(crate) mod tick;

pub use calibrate::*;
pub use engine::LoopEngine;
pub use exec_log::*;
pub use observer::*;
pub use realtime::*;
pub use scheduler::*;
pub use scratch::ScratchRegion;
pub use sleep::*;
