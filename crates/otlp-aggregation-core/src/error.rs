use thiserror::Error;

use crate::data::InstrumentKind;

/// An error from the aggregation core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Exponential histogram max_size {0} must be within [2, 16384]")]
    InvalidMaxSize(i32),

    #[error("Exponential histogram max_scale {0} is below the minimum scale of -10")]
    InvalidMaxScale(i8),

    #[error("Invalid explicit bucket boundaries: {0}")]
    InvalidBoundaries(String),

    #[error("Aggregation {aggregation} is not supported for {kind} instruments")]
    UnsupportedAggregation {
        aggregation: &'static str,
        kind: InstrumentKind,
    },

    #[error("Unknown instrument kind {0:?}")]
    UnknownInstrumentKind(String),

    #[error("Unknown aggregation temporality {0:?}")]
    UnknownTemporality(String),

    #[error("Measurement value {0} is not a finite number")]
    InvalidMeasurement(f64),

    #[error("Negative value {0} recorded on a monotonic instrument")]
    NegativeMonotonicMeasurement(f64),
}
