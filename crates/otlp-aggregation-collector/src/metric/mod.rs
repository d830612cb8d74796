//! Metric SDK implementation

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use otlp_aggregation_core::{InstrumentKind, Point, Temporality};

use crate::{config::CollectorConfig, Error};

mod storage;

pub use storage::MetricStorage;

/// Identifying metadata of an instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentDescriptor {
    pub name: String,
    pub description: String,
    pub unit: String,
    pub kind: InstrumentKind,
}

impl InstrumentDescriptor {
    /// Constructs a descriptor with no description or unit.
    pub fn new(name: impl Into<String>, kind: InstrumentKind) -> InstrumentDescriptor {
        InstrumentDescriptor {
            name: name.into(),
            description: String::new(),
            unit: String::new(),
            kind,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }
}

/// Current value of a collected metric.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectedMetric {
    pub descriptor: InstrumentDescriptor,
    pub temporality: Temporality,
    /// One point per time series with data, ordered by attributes.
    pub points: Vec<Point>,
}

/// Wall clock time, in nanoseconds since the unix epoch.
pub fn now_unix_nano() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Every instrument registered with a collector, by name.
pub struct MetricRegistry {
    config: CollectorConfig,
    start_time_unix_nano: u64,
    instruments: scc::HashMap<String, Arc<MetricStorage>>,
}

impl MetricRegistry {
    pub fn new(config: CollectorConfig, start_time_unix_nano: u64) -> MetricRegistry {
        MetricRegistry {
            config,
            start_time_unix_nano,
            instruments: scc::HashMap::new(),
        }
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn start_time_unix_nano(&self) -> u64 {
        self.start_time_unix_nano
    }

    /// Returns the storage for an instrument, creating it on first registration.
    ///
    /// Re-registering a name with the same kind returns the existing storage.
    pub fn register(&self, descriptor: InstrumentDescriptor) -> Result<Arc<MetricStorage>, Error> {
        let storage = match self.instruments.get_sync(&descriptor.name) {
            Some(existing) => existing.get().clone(),
            None => {
                let policy = self.config.policy_for(&descriptor.name);
                let candidate = Arc::new(MetricStorage::new(
                    descriptor.clone(),
                    &policy,
                    self.start_time_unix_nano,
                )?);
                let storage = self
                    .instruments
                    .entry_sync(descriptor.name.clone())
                    .or_insert_with(|| candidate.clone())
                    .get()
                    .clone();
                if Arc::ptr_eq(&storage, &candidate) {
                    tracing::info!(
                        instrument = %descriptor.name,
                        kind = %descriptor.kind,
                        aggregation = policy.name(),
                        "registered instrument"
                    );
                    return Ok(storage);
                }
                storage
            }
        };
        let existing = storage.descriptor().kind;
        if existing != descriptor.kind {
            tracing::warn!(
                instrument = %descriptor.name,
                %existing,
                requested = %descriptor.kind,
                "conflicting instrument registration"
            );
            return Err(Error::InstrumentConflict {
                name: descriptor.name,
                existing,
                requested: descriptor.kind,
            });
        }
        tracing::debug!(instrument = %descriptor.name, "instrument re-registered");
        Ok(storage)
    }

    /// Looks up a registered instrument.
    pub fn get(&self, name: &str) -> Option<Arc<MetricStorage>> {
        self.instruments.get_sync(name).map(|e| e.get().clone())
    }

    /// Collects every instrument that has data, ordered by instrument name.
    pub fn collect(&self, now: u64) -> Vec<CollectedMetric> {
        let mut instruments = Vec::with_capacity(self.instruments.len());
        self.instruments.iter_sync(|_, storage| {
            instruments.push(storage.clone());
            true
        });
        instruments.sort_by(|l, r| l.descriptor().name.cmp(&r.descriptor().name));
        let metrics: Vec<CollectedMetric> = instruments
            .iter()
            .filter_map(|storage| {
                let descriptor = storage.descriptor();
                let temporality = self.config.temporality.temporality_for(descriptor.kind);
                let points = storage.collect(temporality, now);
                if points.is_empty() {
                    return None;
                }
                Some(CollectedMetric {
                    descriptor: descriptor.clone(),
                    temporality,
                    points,
                })
            })
            .collect();
        tracing::debug!(
            instruments = instruments.len(),
            reported = metrics.len(),
            points = metrics.iter().map(|m| m.points.len()).sum::<usize>(),
            "collected metrics"
        );
        metrics
    }
}
