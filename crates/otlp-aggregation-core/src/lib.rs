//! Metric aggregation and temporality conversion for OTLP metrics.
//!
//! Measurements are absorbed by one [`Aggregator`] per time series and
//! reported as immutable [`Point`]s at every collection, converted to the
//! requested [`Temporality`].

mod aggregation;
mod attributes;
mod config;
mod data;
mod error;

// Exposes the aggregators and how they are chosen.
pub use aggregation::{
    create_aggregator, AggregationPolicy, Aggregator, AggregatorFactory, DropAggregation,
    ExponentialHistogramAggregation, HistogramAggregation, LastValueAggregation, SumAggregation,
};
// Exposes time series identity.
pub use attributes::{AttributeSet, AttributeValue, KeyValue};
// Exposes the configuration used for histograms.
pub use config::{
    ExplicitBucketHistogramConfig, ExponentialHistogramConfig, DEFAULT_BOUNDARIES, MAX_MAX_SIZE,
    MAX_SCALE, MIN_MAX_SIZE, MIN_SCALE,
};
// Exposes the collected data model.
pub use data::{
    ExponentialBuckets, ExponentialHistogramPoint, HistogramPoint, InstrumentKind, NumberPoint,
    Point, Temporality,
};
// Exposes the error handling we use.
pub use error::Error;
