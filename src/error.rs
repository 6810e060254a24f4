use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BootstrapError {
    #[error("config file not found at {0}: run node initialization first")]
    ConfigFileMissing(PathBuf),
    #[error("setup strategy {strategy} failed: {reason}")]
    SetupStrategyFailed {
        strategy: &'static str,
        reason: String,
    },
    #[error("all {attempts} setup strategies failed to produce a genesis file")]
    SetupExhausted { attempts: usize },
    #[error("node binary not found: {0}")]
    BinaryMissing(String),
    #[error("genesis chain id mismatch: expected {expected}, found {found}")]
    GenesisMismatch { expected: String, found: String },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BootstrapError>;
