//! Error types for the alignment controller

use thiserror::Error;

/// Controller error type
#[derive(Error, Debug)]
pub enum AlignError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown peg target: {0} (expected left, centre or right)")]
    Target(String),
}

impl From<toml::de::Error> for AlignError {
    fn from(e: toml::de::Error) -> Self {
        AlignError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AlignError>;
