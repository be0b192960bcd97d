#![doc = "Common types shared across the rattle workspace."]

pub mod activity;
pub mod config;
pub mod error;
pub mod time;

pub use activity::*;
pub use config::*;
pub use error::*;
pub use time::*;
