use std::path::PathBuf;
use thiserror::Error;

use crate::models::SensorKind;

/// Errors that stop a sensor instance or the whole process.
#[derive(Debug, Error)]
pub enum SensorError {
    #[error("no {0} devices found")]
    TransportUnavailable(SensorKind),

    #[error("failed to open device {}: {source}", .path.display())]
    DeviceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("device {0} reached end of stream")]
    Disconnected(String),

    #[error("logger task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why a decoded line was not turned into a reading. Never fatal.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FrameError {
    #[error("empty line")]
    Empty,

    #[error("line does not start with a digit")]
    NotDataLine,

    #[error("expected at least {expected} fields, found {found}")]
    TooFewFields { expected: usize, found: usize },

    #[error("field {index} is not a number: {value:?}")]
    BadNumber { index: usize, value: String },

    #[error("field 1 is not a MAC address: {0:?}")]
    BadMacAddress(String),
}
