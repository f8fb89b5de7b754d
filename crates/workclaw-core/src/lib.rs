//! # WorkClaw Core
//!
//! Configuration and error types shared by every WorkClaw crate.

pub mod config;
pub mod error;

pub use config::{DispatchConfig, WorkClawConfig};
pub use error::{Result, WorkClawError};
