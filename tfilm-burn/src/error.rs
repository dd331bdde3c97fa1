use burn::record::RecorderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TfilmError {
    #[error("Invalid input length: {0}")]
    InvalidInputLength(String),

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] RecorderError),
}

pub type Result<T> = std::result::Result<T, TfilmError>;
