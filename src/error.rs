//! Error types for Segmentar

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Device unavailable: accelerator {0} is not present on this backend")]
    DeviceUnavailable(usize),

    #[error("Epoch produced no batches")]
    EmptyEpoch,

    #[error("No checkpoint found at '{0}'")]
    CheckpointNotFound(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type Result<T> = std::result::Result<T, Error>;
