//! Errors for this crate.

use otlp_aggregation_core::InstrumentKind;
use thiserror::Error;

/// An error from the aggregation collector.
#[derive(Error, Debug)]
pub enum Error {
    /// An error from aggregation itself.
    #[error(transparent)]
    AggregationError(#[from] otlp_aggregation_core::Error),
    #[error("Instrument {name} is registered as a {existing}, not a {requested}")]
    InstrumentConflict {
        name: String,
        existing: InstrumentKind,
        requested: InstrumentKind,
    },
    #[error("Metric export channel is closed")]
    SinkClosed,
    #[error("Invalid measurement on line {line}: {source}")]
    InvalidInput {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    IoError(#[from] std::io::Error),
    #[error(transparent)]
    JsonError(#[from] serde_json::Error),
    #[error(transparent)]
    ArgumentError(#[from] clap::Error),
}
