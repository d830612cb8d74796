//! Instrument metadata and the immutable points produced by collection.

use std::{fmt, str::FromStr};

use crate::{attributes::AttributeSet, Error};

/// Whether a reported value is the change since the last report, or a running total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Temporality {
    Delta,
    Cumulative,
}

impl Temporality {
    /// The OTLP `AggregationTemporality` enum value.
    pub fn as_otlp(&self) -> i32 {
        match self {
            Temporality::Delta => 1,
            Temporality::Cumulative => 2,
        }
    }
}

impl FromStr for Temporality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "delta" => Ok(Temporality::Delta),
            "cumulative" => Ok(Temporality::Cumulative),
            _ => Err(Error::UnknownTemporality(s.to_owned())),
        }
    }
}

impl fmt::Display for Temporality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Temporality::Delta => f.write_str("delta"),
            Temporality::Cumulative => f.write_str("cumulative"),
        }
    }
}

/// The kinds of instrument measurements can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InstrumentKind {
    Counter,
    UpDownCounter,
    Histogram,
    Gauge,
    ObservableCounter,
    ObservableUpDownCounter,
    ObservableGauge,
}

impl InstrumentKind {
    pub const ALL: [InstrumentKind; 7] = [
        InstrumentKind::Counter,
        InstrumentKind::UpDownCounter,
        InstrumentKind::Histogram,
        InstrumentKind::Gauge,
        InstrumentKind::ObservableCounter,
        InstrumentKind::ObservableUpDownCounter,
        InstrumentKind::ObservableGauge,
    ];

    /// Synchronous instruments are recorded inline and report deltas.
    /// Observable instruments are polled by callback and report running totals.
    pub fn is_synchronous(&self) -> bool {
        matches!(
            self,
            InstrumentKind::Counter
                | InstrumentKind::UpDownCounter
                | InstrumentKind::Histogram
                | InstrumentKind::Gauge
        )
    }

    /// Whether values of this instrument may only increase a sum.
    pub fn is_monotonic(&self) -> bool {
        matches!(
            self,
            InstrumentKind::Counter | InstrumentKind::ObservableCounter | InstrumentKind::Histogram
        )
    }

    /// The temporality the instrument naturally produces.
    pub fn natural_temporality(&self) -> Temporality {
        if self.is_synchronous() {
            Temporality::Delta
        } else {
            Temporality::Cumulative
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            InstrumentKind::Counter => "counter",
            InstrumentKind::UpDownCounter => "up_down_counter",
            InstrumentKind::Histogram => "histogram",
            InstrumentKind::Gauge => "gauge",
            InstrumentKind::ObservableCounter => "observable_counter",
            InstrumentKind::ObservableUpDownCounter => "observable_up_down_counter",
            InstrumentKind::ObservableGauge => "observable_gauge",
        }
    }
}

impl FromStr for InstrumentKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstrumentKind::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| Error::UnknownInstrumentKind(s.to_owned()))
    }
}

impl fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A scalar sum or gauge value for one collection interval.
#[derive(Debug, Clone, PartialEq)]
pub struct NumberPoint {
    pub attributes: AttributeSet,
    /// `None` for gauges, which carry no meaningful start time.
    pub start_time_unix_nano: Option<u64>,
    pub time_unix_nano: u64,
    pub value: f64,
}

/// An explicit-bucket histogram for one collection interval.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramPoint {
    pub attributes: AttributeSet,
    pub start_time_unix_nano: u64,
    pub time_unix_nano: u64,
    pub count: u64,
    pub sum: f64,
    /// One more entry than `explicit_bounds`.
    pub bucket_counts: Vec<u64>,
    pub explicit_bounds: Vec<f64>,
    /// Only present when min/max recording is enabled.
    pub min: Option<f64>,
    pub max: Option<f64>,
}

/// One side (positive or negative) of an exponential histogram point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExponentialBuckets {
    /// Bucket index of the first entry in `bucket_counts`.
    pub offset: i32,
    pub bucket_counts: Vec<u64>,
}

/// An exponential-bucket histogram for one collection interval.
#[derive(Debug, Clone, PartialEq)]
pub struct ExponentialHistogramPoint {
    pub attributes: AttributeSet,
    pub start_time_unix_nano: u64,
    pub time_unix_nano: u64,
    pub count: u64,
    pub sum: f64,
    pub scale: i8,
    pub zero_count: u64,
    pub positive: ExponentialBuckets,
    pub negative: ExponentialBuckets,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub flags: u32,
}

/// The result of collecting one aggregator.
#[derive(Debug, Clone, PartialEq)]
pub enum Point {
    Sum {
        point: NumberPoint,
        temporality: Temporality,
        is_monotonic: bool,
    },
    Gauge(NumberPoint),
    Histogram {
        point: HistogramPoint,
        temporality: Temporality,
    },
    ExponentialHistogram {
        point: ExponentialHistogramPoint,
        temporality: Temporality,
    },
}

impl Point {
    pub fn attributes(&self) -> &AttributeSet {
        match self {
            Point::Sum { point, .. } | Point::Gauge(point) => &point.attributes,
            Point::Histogram { point, .. } => &point.attributes,
            Point::ExponentialHistogram { point, .. } => &point.attributes,
        }
    }

    pub fn time_unix_nano(&self) -> u64 {
        match self {
            Point::Sum { point, .. } | Point::Gauge(point) => point.time_unix_nano,
            Point::Histogram { point, .. } => point.time_unix_nano,
            Point::ExponentialHistogram { point, .. } => point.time_unix_nano,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrument_kind_round_trips_names() {
        for kind in InstrumentKind::ALL {
            assert_eq!(kind.name().parse::<InstrumentKind>(), Ok(kind));
        }
        assert_eq!(
            "summary".parse::<InstrumentKind>(),
            Err(Error::UnknownInstrumentKind("summary".to_owned()))
        );
    }

    #[test]
    fn test_natural_temporality() {
        assert_eq!(InstrumentKind::Counter.natural_temporality(), Temporality::Delta);
        assert_eq!(InstrumentKind::Histogram.natural_temporality(), Temporality::Delta);
        assert_eq!(
            InstrumentKind::ObservableUpDownCounter.natural_temporality(),
            Temporality::Cumulative
        );
        assert!(InstrumentKind::ObservableCounter.is_monotonic());
        assert!(!InstrumentKind::UpDownCounter.is_monotonic());
    }

    #[test]
    fn test_parse_temporality() {
        assert_eq!("DELTA".parse::<Temporality>(), Ok(Temporality::Delta));
        assert_eq!("cumulative".parse::<Temporality>(), Ok(Temporality::Cumulative));
        assert!("weekly".parse::<Temporality>().is_err());
        assert_eq!(Temporality::Cumulative.as_otlp(), 2);
    }
}
