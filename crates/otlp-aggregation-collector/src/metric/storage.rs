//! Per-instrument time series storage.

use std::sync::Arc;

use otlp_aggregation_core::{
    AggregationPolicy, Aggregator, AggregatorFactory, AttributeSet, InstrumentKind, Point,
    Temporality,
};

use crate::{metric::InstrumentDescriptor, Error};

/// All time series of one instrument.
///
/// Time series are created on their first measurement and live as long as
/// the storage. There is no eviction, cardinality is bounded only by the
/// attribute sets callers record.
pub struct MetricStorage {
    descriptor: InstrumentDescriptor,
    factory: AggregatorFactory,
    start_time_unix_nano: u64,
    timeseries: scc::HashMap<AttributeSet, Arc<Aggregator>>,
}

impl MetricStorage {
    /// Constructs storage, resolving the aggregation for the instrument.
    pub fn new(
        descriptor: InstrumentDescriptor,
        policy: &AggregationPolicy,
        start_time_unix_nano: u64,
    ) -> Result<MetricStorage, Error> {
        let factory = AggregatorFactory::new(descriptor.kind, policy)?;
        Ok(MetricStorage {
            descriptor,
            factory,
            start_time_unix_nano,
            timeseries: scc::HashMap::new(),
        })
    }

    pub fn descriptor(&self) -> &InstrumentDescriptor {
        &self.descriptor
    }

    /// Number of distinct attribute sets seen so far.
    pub fn cardinality(&self) -> usize {
        self.timeseries.len()
    }

    /// Records a measurement against the time series for `attributes`.
    ///
    /// Rejected measurements are logged and dropped, the time series is left untouched.
    pub fn record(&self, value: f64, attributes: AttributeSet) -> Result<(), Error> {
        // A rejected value must never create a time series.
        let result = if !value.is_finite() {
            Err(otlp_aggregation_core::Error::InvalidMeasurement(value))
        } else if self.descriptor.kind == InstrumentKind::Counter && value < 0.0 {
            Err(otlp_aggregation_core::Error::NegativeMonotonicMeasurement(value))
        } else {
            self.aggregator_for(attributes).aggregate(value)
        };
        if let Err(e) = &result {
            tracing::warn!(
                instrument = %self.descriptor.name,
                value,
                error = %e,
                "dropping measurement"
            );
        }
        Ok(result?)
    }

    fn aggregator_for(&self, attributes: AttributeSet) -> Arc<Aggregator> {
        if let Some(existing) = self.timeseries.get_sync(&attributes) {
            return existing.get().clone();
        }
        self.timeseries
            .entry_sync(attributes.clone())
            .or_insert_with(|| {
                Arc::new(self.factory.create(attributes, self.start_time_unix_nano))
            })
            .get()
            .clone()
    }

    /// Collects every time series with something to report, ordered by attributes.
    pub fn collect(&self, temporality: Temporality, now: u64) -> Vec<Point> {
        let mut timeseries = Vec::with_capacity(self.timeseries.len());
        self.timeseries.iter_sync(|attributes, aggregator| {
            timeseries.push((attributes.clone(), aggregator.clone()));
            true
        });
        timeseries.sort_by(|(l, _), (r, _)| l.cmp(r));
        timeseries
            .iter()
            .filter_map(|(_, aggregator)| aggregator.collect(temporality, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use otlp_aggregation_core::KeyValue;

    use super::*;

    fn storage(kind: InstrumentKind) -> MetricStorage {
        MetricStorage::new(
            InstrumentDescriptor::new("requests", kind),
            &AggregationPolicy::Default,
            100,
        )
        .expect("default policy is valid")
    }

    fn attrs(route: &str) -> AttributeSet {
        AttributeSet::new(vec![KeyValue::new("route", route)])
    }

    #[test]
    fn test_records_per_attribute_set() {
        let storage = storage(InstrumentKind::Counter);
        storage.record(1.0, attrs("/a")).expect("valid");
        storage.record(2.0, attrs("/b")).expect("valid");
        storage.record(3.0, attrs("/a")).expect("valid");
        assert_eq!(storage.cardinality(), 2);

        let points = storage.collect(Temporality::Delta, 200);
        let values: Vec<(AttributeSet, f64)> = points
            .into_iter()
            .map(|p| match p {
                Point::Sum { point, .. } => (point.attributes, point.value),
                other => panic!("expected a sum, got {other:?}"),
            })
            .collect();
        assert_eq!(values, vec![(attrs("/a"), 4.0), (attrs("/b"), 2.0)]);

        // Series are retained after collection, but have nothing new to say.
        assert!(storage.collect(Temporality::Delta, 300).is_empty());
        assert_eq!(storage.cardinality(), 2);
    }

    #[test]
    fn test_negative_counter_values_are_dropped() {
        let storage = storage(InstrumentKind::Counter);
        let err = storage
            .record(-1.0, attrs("/a"))
            .expect_err("counters only go up");
        assert!(matches!(
            err,
            Error::AggregationError(otlp_aggregation_core::Error::NegativeMonotonicMeasurement(_))
        ));
        assert_eq!(storage.cardinality(), 0);

        let updown = self::storage(InstrumentKind::UpDownCounter);
        updown.record(-1.0, attrs("/a")).expect("up down counters may go down");
    }

    #[test]
    fn test_invalid_values_are_dropped() {
        let storage = storage(InstrumentKind::Histogram);
        storage.record(5.0, attrs("/a")).expect("valid");
        assert!(storage.record(f64::NAN, attrs("/a")).is_err());
        let points = storage.collect(Temporality::Cumulative, 200);
        match points.as_slice() {
            [Point::Histogram { point, .. }] => assert_eq!(point.count, 1),
            other => panic!("expected one histogram, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_values_do_not_create_series() {
        struct TestCase {
            kind: InstrumentKind,
            value: f64,
        }
        let cases = [
            TestCase {
                kind: InstrumentKind::Counter,
                value: f64::NAN,
            },
            TestCase {
                kind: InstrumentKind::UpDownCounter,
                value: f64::INFINITY,
            },
            TestCase {
                kind: InstrumentKind::Histogram,
                value: f64::NEG_INFINITY,
            },
            TestCase {
                kind: InstrumentKind::Counter,
                value: -1.0,
            },
        ];
        for case in cases {
            let storage = storage(case.kind);
            assert!(matches!(
                storage.record(case.value, attrs("/new")),
                Err(Error::AggregationError(_))
            ));
            assert_eq!(storage.cardinality(), 0, "{:?} {}", case.kind, case.value);
            assert!(
                storage.collect(Temporality::Cumulative, 200).is_empty(),
                "{:?} {}",
                case.kind,
                case.value
            );
        }
    }

    #[test]
    fn test_concurrent_recording_across_series() {
        let storage = Arc::new(storage(InstrumentKind::Counter));
        let threads = 8;
        let per_thread = 2_000;
        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let storage = storage.clone();
                thread::spawn(move || {
                    for i in 0..per_thread {
                        let route = if (i + t) % 2 == 0 { "/even" } else { "/odd" };
                        storage.record(1.0, attrs(route)).expect("valid");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }
        let total: f64 = storage
            .collect(Temporality::Delta, 200)
            .into_iter()
            .map(|p| match p {
                Point::Sum { point, .. } => point.value,
                other => panic!("expected a sum, got {other:?}"),
            })
            .sum();
        assert_eq!(total, (threads * per_thread) as f64);
        assert_eq!(storage.cardinality(), 2);
    }
}
