//! Serial sensor logger
//!
//! Polls line-oriented serial sensors (wind, VOC, particulate), validates
//! each line and appends records to daily CSV logs. Wind readings are
//! averaged over roughly one-minute windows before being written.

pub mod aggregation;
pub mod config;
pub mod error;
pub mod ingest;
pub mod models;
pub mod serial;
pub mod storage;
pub mod utils;
pub mod validation;

pub use error::{FrameError, SensorError};
pub use models::SensorKind;
