//! Error types for WorkClaw.

use thiserror::Error;

/// Top-level error shared across crates.
#[derive(Debug, Error)]
pub enum WorkClawError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, WorkClawError>;
