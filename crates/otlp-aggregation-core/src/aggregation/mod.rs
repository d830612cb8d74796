//! Aggregation of measurements into per-time-series points.
//!
//! An [`AggregatorFactory`] is resolved once per instrument from its kind and
//! the configured [`AggregationPolicy`]. It then creates one [`Aggregator`] for
//! every attribute set the instrument sees.

mod drop;
mod exponential;
mod histogram;
mod last_value;
mod sum;

use std::sync::Arc;

pub use drop::DropAggregation;
pub use exponential::ExponentialHistogramAggregation;
pub use histogram::HistogramAggregation;
pub use last_value::LastValueAggregation;
pub use sum::SumAggregation;

use crate::{
    attributes::AttributeSet,
    config::{ExplicitBucketHistogramConfig, ExponentialHistogramConfig},
    data::{InstrumentKind, Point, Temporality},
    Error,
};

/// The aggregation a view selects for an instrument.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum AggregationPolicy {
    /// Pick the aggregation from the instrument kind.
    #[default]
    Default,
    Drop,
    Sum,
    LastValue,
    ExplicitBucketHistogram(ExplicitBucketHistogramConfig),
    ExponentialBucketHistogram(ExponentialHistogramConfig),
}

impl AggregationPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            AggregationPolicy::Default => "default",
            AggregationPolicy::Drop => "drop",
            AggregationPolicy::Sum => "sum",
            AggregationPolicy::LastValue => "last_value",
            AggregationPolicy::ExplicitBucketHistogram(_) => "explicit_bucket_histogram",
            AggregationPolicy::ExponentialBucketHistogram(_) => "exponential_bucket_histogram",
        }
    }
}

/// Storage which actually performs aggregation for one time series.
pub enum Aggregator {
    Drop(DropAggregation),
    Sum(SumAggregation),
    LastValue(LastValueAggregation),
    ExplicitBucketHistogram(HistogramAggregation),
    ExponentialBucketHistogram(ExponentialHistogramAggregation),
}

impl Aggregator {
    /// Absorbs one measurement.
    ///
    /// Non-finite values are rejected with [`Error::InvalidMeasurement`] and
    /// leave the aggregator untouched.
    pub fn aggregate(&self, value: f64) -> Result<(), Error> {
        match self {
            Aggregator::Drop(_) => Ok(()),
            Aggregator::Sum(agg) => agg.aggregate(value),
            Aggregator::LastValue(agg) => agg.aggregate(value),
            Aggregator::ExplicitBucketHistogram(agg) => agg.aggregate(value),
            Aggregator::ExponentialBucketHistogram(agg) => agg.aggregate(value),
        }
    }

    /// Reports the interval ending at `now` in the requested temporality.
    ///
    /// Returns `None` when there is nothing to report.
    pub fn collect(&self, temporality: Temporality, now: u64) -> Option<Point> {
        match self {
            Aggregator::Drop(_) => None,
            Aggregator::Sum(agg) => agg.collect(temporality, now),
            Aggregator::LastValue(agg) => agg.collect(now),
            Aggregator::ExplicitBucketHistogram(agg) => agg.collect(temporality, now),
            Aggregator::ExponentialBucketHistogram(agg) => agg.collect(temporality, now),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Aggregator::Drop(_) => "drop",
            Aggregator::Sum(_) => "sum",
            Aggregator::LastValue(_) => "last_value",
            Aggregator::ExplicitBucketHistogram(_) => "explicit_bucket_histogram",
            Aggregator::ExponentialBucketHistogram(_) => "exponential_bucket_histogram",
        }
    }
}

#[derive(Debug, Clone)]
enum Resolved {
    Drop,
    Sum {
        is_monotonic: bool,
        temporality: Temporality,
    },
    LastValue,
    ExplicitBucketHistogram {
        boundaries: Arc<[f64]>,
        record_min_max: bool,
    },
    ExponentialBucketHistogram(ExponentialHistogramConfig),
}

/// Creates aggregators for one instrument.
///
/// All configuration errors surface from [`AggregatorFactory::new`], creating
/// an aggregator afterwards cannot fail.
#[derive(Debug, Clone)]
pub struct AggregatorFactory {
    kind: InstrumentKind,
    resolved: Resolved,
}

impl AggregatorFactory {
    pub fn new(kind: InstrumentKind, policy: &AggregationPolicy) -> Result<Self, Error> {
        let resolved = match policy {
            AggregationPolicy::Default => match kind {
                InstrumentKind::Counter
                | InstrumentKind::UpDownCounter
                | InstrumentKind::ObservableCounter
                | InstrumentKind::ObservableUpDownCounter => sum_for(kind),
                InstrumentKind::Histogram => {
                    explicit_for(kind, &ExplicitBucketHistogramConfig::default())?
                }
                InstrumentKind::Gauge | InstrumentKind::ObservableGauge => Resolved::LastValue,
            },
            AggregationPolicy::Drop => Resolved::Drop,
            AggregationPolicy::Sum => sum_for(kind),
            AggregationPolicy::LastValue => Resolved::LastValue,
            AggregationPolicy::ExplicitBucketHistogram(config) => explicit_for(kind, config)?,
            AggregationPolicy::ExponentialBucketHistogram(config) => {
                histogram_supported(kind, policy.name())?;
                config.validate()?;
                Resolved::ExponentialBucketHistogram(*config)
            }
        };
        tracing::debug!(%kind, aggregation = policy.name(), "resolved aggregation");
        Ok(AggregatorFactory { kind, resolved })
    }

    pub fn kind(&self) -> InstrumentKind {
        self.kind
    }

    /// A fresh aggregator for the time series identified by `attributes`.
    pub fn create(&self, attributes: AttributeSet, start_time_unix_nano: u64) -> Aggregator {
        match &self.resolved {
            Resolved::Drop => Aggregator::Drop(DropAggregation::default()),
            Resolved::Sum {
                is_monotonic,
                temporality,
            } => Aggregator::Sum(SumAggregation::new(
                attributes,
                start_time_unix_nano,
                *is_monotonic,
                *temporality,
            )),
            Resolved::LastValue => {
                Aggregator::LastValue(LastValueAggregation::new(attributes, start_time_unix_nano))
            }
            Resolved::ExplicitBucketHistogram {
                boundaries,
                record_min_max,
            } => Aggregator::ExplicitBucketHistogram(HistogramAggregation::new(
                boundaries.clone(),
                *record_min_max,
                attributes,
                start_time_unix_nano,
            )),
            Resolved::ExponentialBucketHistogram(config) => Aggregator::ExponentialBucketHistogram(
                ExponentialHistogramAggregation::new(*config, attributes, start_time_unix_nano),
            ),
        }
    }
}

/// Resolves the policy and creates a single aggregator.
pub fn create_aggregator(
    kind: InstrumentKind,
    policy: &AggregationPolicy,
    attributes: AttributeSet,
    start_time_unix_nano: u64,
) -> Result<Aggregator, Error> {
    Ok(AggregatorFactory::new(kind, policy)?.create(attributes, start_time_unix_nano))
}

fn sum_for(kind: InstrumentKind) -> Resolved {
    Resolved::Sum {
        is_monotonic: kind.is_monotonic(),
        temporality: kind.natural_temporality(),
    }
}

fn explicit_for(
    kind: InstrumentKind,
    config: &ExplicitBucketHistogramConfig,
) -> Result<Resolved, Error> {
    histogram_supported(kind, "explicit_bucket_histogram")?;
    config.validate()?;
    Ok(Resolved::ExplicitBucketHistogram {
        boundaries: config.boundaries.as_slice().into(),
        record_min_max: config.record_min_max,
    })
}

// Histograms only convert from delta measurements.
fn histogram_supported(kind: InstrumentKind, aggregation: &'static str) -> Result<(), Error> {
    if kind.natural_temporality() == Temporality::Cumulative {
        return Err(Error::UnsupportedAggregation { aggregation, kind });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::KeyValue;

    #[test]
    fn test_default_aggregation_per_kind() {
        struct TestCase {
            kind: InstrumentKind,
            want: &'static str,
        }
        let test_cases = vec![
            TestCase {
                kind: InstrumentKind::Counter,
                want: "sum",
            },
            TestCase {
                kind: InstrumentKind::UpDownCounter,
                want: "sum",
            },
            TestCase {
                kind: InstrumentKind::ObservableCounter,
                want: "sum",
            },
            TestCase {
                kind: InstrumentKind::ObservableUpDownCounter,
                want: "sum",
            },
            TestCase {
                kind: InstrumentKind::Histogram,
                want: "explicit_bucket_histogram",
            },
            TestCase {
                kind: InstrumentKind::Gauge,
                want: "last_value",
            },
            TestCase {
                kind: InstrumentKind::ObservableGauge,
                want: "last_value",
            },
        ];
        for test in test_cases {
            let agg = create_aggregator(
                test.kind,
                &AggregationPolicy::Default,
                AttributeSet::empty(),
                0,
            )
            .expect("default aggregation is always valid");
            assert_eq!(agg.name(), test.want, "{}", test.kind);
        }
    }

    #[test]
    fn test_sum_flags_follow_instrument_kind() {
        let counter = create_aggregator(
            InstrumentKind::Counter,
            &AggregationPolicy::Default,
            AttributeSet::empty(),
            0,
        )
        .expect("valid");
        counter.aggregate(2.0).expect("valid measurement");
        match counter.collect(Temporality::Delta, 1) {
            Some(Point::Sum { is_monotonic, .. }) => assert!(is_monotonic),
            other => panic!("expected a sum, got {other:?}"),
        }

        let observed = create_aggregator(
            InstrumentKind::ObservableUpDownCounter,
            &AggregationPolicy::Default,
            AttributeSet::empty(),
            0,
        )
        .expect("valid");
        observed.aggregate(10.0).expect("valid measurement");
        observed.collect(Temporality::Delta, 1);
        observed.aggregate(4.0).expect("valid measurement");
        // Observed totals are cumulative, so a delta is the difference.
        match observed.collect(Temporality::Delta, 2) {
            Some(Point::Sum {
                point,
                is_monotonic,
                ..
            }) => {
                assert!(!is_monotonic);
                assert_eq!(point.value, -6.0);
            }
            other => panic!("expected a sum, got {other:?}"),
        }
    }

    #[test]
    fn test_histograms_on_observable_instruments_are_rejected() {
        for policy in [
            AggregationPolicy::ExplicitBucketHistogram(Default::default()),
            AggregationPolicy::ExponentialBucketHistogram(Default::default()),
        ] {
            let err = AggregatorFactory::new(InstrumentKind::ObservableCounter, &policy)
                .expect_err("cumulative histograms are unsupported");
            let unsupported = matches!(
                err,
                Error::UnsupportedAggregation {
                    kind: InstrumentKind::ObservableCounter,
                    ..
                }
            );
            assert!(unsupported, "{err}");
        }
    }

    #[test]
    fn test_configuration_errors_surface_at_setup() {
        let policy = AggregationPolicy::ExponentialBucketHistogram(ExponentialHistogramConfig {
            max_size: 1,
            ..Default::default()
        });
        assert_eq!(
            AggregatorFactory::new(InstrumentKind::Histogram, &policy).err(),
            Some(Error::InvalidMaxSize(1))
        );

        let policy = AggregationPolicy::ExplicitBucketHistogram(ExplicitBucketHistogramConfig {
            boundaries: vec![5.0, 1.0],
            record_min_max: true,
        });
        assert!(matches!(
            AggregatorFactory::new(InstrumentKind::Counter, &policy),
            Err(Error::InvalidBoundaries(_))
        ));
    }

    #[test]
    fn test_factory_creates_independent_series() {
        let factory = AggregatorFactory::new(
            InstrumentKind::Histogram,
            &AggregationPolicy::ExponentialBucketHistogram(Default::default()),
        )
        .expect("valid");
        assert_eq!(factory.kind(), InstrumentKind::Histogram);

        let a = factory.create(AttributeSet::new(vec![KeyValue::new("k", "a")]), 0);
        let b = factory.create(AttributeSet::new(vec![KeyValue::new("k", "b")]), 0);
        a.aggregate(1.0).expect("valid measurement");
        assert!(a.collect(Temporality::Delta, 1).is_some());
        assert!(b.collect(Temporality::Delta, 1).is_none());
        assert_eq!(a.name(), "exponential_bucket_histogram");
    }

    #[test]
    fn test_explicit_policy_on_counter() {
        let agg = create_aggregator(
            InstrumentKind::Counter,
            &AggregationPolicy::ExplicitBucketHistogram(ExplicitBucketHistogramConfig {
                boundaries: vec![1.0, 2.0],
                record_min_max: false,
            }),
            AttributeSet::empty(),
            0,
        )
        .expect("valid");
        agg.aggregate(1.5).expect("valid measurement");
        match agg.collect(Temporality::Cumulative, 1) {
            Some(Point::Histogram { point, temporality }) => {
                assert_eq!(temporality, Temporality::Cumulative);
                assert_eq!(point.bucket_counts, vec![0, 1, 0]);
            }
            other => panic!("expected a histogram, got {other:?}"),
        }
    }
}
