//! Collects aggregated metrics into OTLP messages.
//!
//! This package wires the aggregators of `otlp-aggregation-core` into an
//! instrument registry, collects it periodically and converts the result
//! into OTLP export requests.
//!
//! This should mirror the metric collection behavior of an OpenTelemetry SDK.

/// Collector configuration.
pub mod config;
/// Conversion into OTLP protos.
pub mod convert;
mod error;
pub mod metric;
pub mod reader;
/// Replay of recorded measurements.
pub mod replay;

pub use config::{CollectorConfig, TemporalityPreference};
pub use error::Error;
pub use metric::{CollectedMetric, InstrumentDescriptor, MetricRegistry, MetricStorage};
pub use reader::PeriodicReader;
