//! Error type shared by the estimator, the pose history and the file-backed helpers.
//!
//! Expected outcomes such as an invalid GPS fix or a pose query that cannot be answered yet
//! are ordinary return values and never show up here. The variants below are the data faults
//! that cause an input to be rejected without touching filter state, plus the IO failures of
//! the configuration and diagnostic log helpers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EstimatorError {
    /// A sample carried a NaN or infinite component.
    #[error("non-finite value in {0}")]
    NonFiniteInput(&'static str),
    /// A sample arrived with a timestamp older than the newest accepted one.
    #[error("timestamp {timestamp_ns} ns is older than the newest accepted sample at {newest_ns} ns")]
    OutOfOrderTimestamp { timestamp_ns: u64, newest_ns: u64 },
    /// Integration interval that is zero, negative or not finite.
    #[error("sample interval must be positive and finite, got {0} s")]
    InvalidInterval(f64),
    /// The innovation covariance could not be factored or inverted.
    #[error("innovation covariance is not invertible")]
    SingularInnovation,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, EstimatorError>;
