//! Error types for powledger

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("Serialization error: {0}")]
    SerializationError(String),
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Invalid difficulty {difficulty}: must not exceed {max}")]
    InvalidDifficulty { difficulty: u32, max: u32 },
    #[error("Mining exceeded its iteration budget of {budget} attempts")]
    ExceededIterationBudget { budget: u64 },
    #[error("Mining cancelled after {attempts} attempts")]
    MiningCancelled { attempts: u64 },
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("IO error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for ChainError {
    fn from(err: std::io::Error) -> Self {
        ChainError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(err: serde_json::Error) -> Self {
        ChainError::SerializationError(err.to_string())
    }
}

impl From<toml::de::Error> for ChainError {
    fn from(err: toml::de::Error) -> Self {
        ChainError::ConfigError(err.to_string())
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, ChainError>;
