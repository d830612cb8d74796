//! Configuration for the aggregation collector.

use std::{collections::HashMap, str::FromStr};

use otlp_aggregation_core::{AggregationPolicy, InstrumentKind, KeyValue, Temporality};

/// Which temporality collected metrics are reported in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TemporalityPreference {
    /// Running totals for every instrument.
    #[default]
    Cumulative,
    /// Changes since the previous collection for every instrument.
    Delta,
    /// Whatever each instrument produces naturally, so no previous state is kept.
    Stateless,
}

impl TemporalityPreference {
    pub fn temporality_for(&self, kind: InstrumentKind) -> Temporality {
        match self {
            TemporalityPreference::Cumulative => Temporality::Cumulative,
            TemporalityPreference::Delta => Temporality::Delta,
            TemporalityPreference::Stateless => kind.natural_temporality(),
        }
    }
}

impl FromStr for TemporalityPreference {
    type Err = otlp_aggregation_core::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("stateless") {
            return Ok(TemporalityPreference::Stateless);
        }
        Ok(match s.parse::<Temporality>()? {
            Temporality::Cumulative => TemporalityPreference::Cumulative,
            Temporality::Delta => TemporalityPreference::Delta,
        })
    }
}

/// Configuration for the collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// The reporting interval for metrics.
    pub report_interval: tokio::time::Duration,
    pub temporality: TemporalityPreference,
    /// Aggregation overrides, keyed by instrument name.
    pub views: HashMap<String, AggregationPolicy>,
    /// Attributes of the resource all metrics are reported under.
    pub resource_attributes: Vec<KeyValue>,
    /// Name of the instrumentation scope all metrics are reported under.
    pub scope_name: String,
}

const DEFAULT_SCOPE_NAME: &str = "otlp-aggregation-collector";

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            report_interval: tokio::time::Duration::from_secs(60),
            temporality: TemporalityPreference::default(),
            views: HashMap::new(),
            resource_attributes: vec![KeyValue::new("service.name", DEFAULT_SCOPE_NAME)],
            scope_name: DEFAULT_SCOPE_NAME.to_owned(),
        }
    }
}

impl CollectorConfig {
    /// The aggregation selected for an instrument.
    pub fn policy_for(&self, instrument: &str) -> AggregationPolicy {
        self.views.get(instrument).cloned().unwrap_or_default()
    }
}
