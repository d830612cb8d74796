//! Replays recorded measurements from newline-delimited JSON.

use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufRead, BufReader},
    path::Path,
};

use otlp_aggregation_core::{AttributeSet, AttributeValue, InstrumentKind, KeyValue};
use serde::{Deserialize, Deserializer};

use crate::{
    metric::{now_unix_nano, CollectedMetric, InstrumentDescriptor, MetricRegistry},
    Error,
};

/// One recorded measurement.
///
/// ```json
/// {"instrument": "http.requests", "kind": "counter", "value": 1, "attributes": {"route": "/a"}}
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct MeasurementRecord {
    pub instrument: String,
    #[serde(deserialize_with = "deserialize_kind")]
    pub kind: InstrumentKind,
    pub value: f64,
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub description: String,
}

fn deserialize_kind<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<InstrumentKind, D::Error> {
    let name = String::deserialize(deserializer)?;
    name.parse().map_err(serde::de::Error::custom)
}

impl MeasurementRecord {
    pub fn descriptor(&self) -> InstrumentDescriptor {
        InstrumentDescriptor::new(self.instrument.clone(), self.kind)
            .with_description(self.description.clone())
            .with_unit(self.unit.clone())
    }

    /// Attributes as a time series identity. Non-scalar values are kept as their JSON text.
    pub fn attribute_set(&self) -> AttributeSet {
        AttributeSet::new(self.attributes.iter().map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(v) => AttributeValue::String(v.clone()),
                serde_json::Value::Bool(v) => AttributeValue::Bool(*v),
                serde_json::Value::Number(n) => match n.as_i64() {
                    Some(i) => AttributeValue::Int(i),
                    None => AttributeValue::Double(n.as_f64().unwrap_or(f64::NAN)),
                },
                other => AttributeValue::String(other.to_string()),
            };
            KeyValue::new(key.clone(), value)
        }))
    }
}

/// Parses measurements, one JSON object per line. Blank lines are ignored.
pub fn read_measurements(input: impl BufRead) -> Result<Vec<MeasurementRecord>, Error> {
    let mut measurements = Vec::new();
    for (idx, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| Error::InvalidInput {
            line: idx + 1,
            source,
        })?;
        measurements.push(record);
    }
    Ok(measurements)
}

pub fn read_measurements_file(path: &Path) -> Result<Vec<MeasurementRecord>, Error> {
    read_measurements(BufReader::new(File::open(path)?))
}

/// Outcome of a replay.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub recorded: usize,
    pub dropped: usize,
    pub collections: usize,
}

/// Records `measurements` into `registry`, split into `collections` chunks.
///
/// The registry is collected after each chunk and the result handed to `on_collect`.
/// Measurements that cannot be recorded are logged and counted as dropped.
pub fn replay(
    registry: &MetricRegistry,
    measurements: &[MeasurementRecord],
    collections: usize,
    mut on_collect: impl FnMut(Vec<CollectedMetric>) -> Result<(), Error>,
) -> Result<ReplaySummary, Error> {
    let collections = collections.max(1);
    let chunk_size = measurements.len().div_ceil(collections).max(1);
    let mut summary = ReplaySummary::default();
    let mut chunks = measurements.chunks(chunk_size).peekable();
    // An empty input still produces one (empty) collection.
    if chunks.peek().is_none() {
        on_collect(registry.collect(now_unix_nano()))?;
        summary.collections = 1;
        return Ok(summary);
    }
    for chunk in chunks {
        for measurement in chunk {
            let recorded = registry
                .register(measurement.descriptor())
                .and_then(|storage| {
                    storage.record(measurement.value, measurement.attribute_set())
                });
            // Storage and registry already log why a measurement was rejected.
            match recorded {
                Ok(()) => summary.recorded += 1,
                Err(_) => summary.dropped += 1,
            }
        }
        on_collect(registry.collect(now_unix_nano()))?;
        summary.collections += 1;
    }
    tracing::info!(
        recorded = summary.recorded,
        dropped = summary.dropped,
        collections = summary.collections,
        "replay complete"
    );
    Ok(summary)
}
