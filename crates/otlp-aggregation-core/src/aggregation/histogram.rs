//! Explicit bucket histogram aggregation.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::{
    attributes::AttributeSet,
    data::{HistogramPoint, Point, Temporality},
    Error,
};

#[derive(Debug, Clone)]
struct HistogramState {
    bucket_counts: Vec<u64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl HistogramState {
    fn new(buckets: usize) -> Self {
        HistogramState {
            bucket_counts: vec![0; buckets],
            count: 0,
            sum: 0.0,
            min: f64::MAX,
            max: f64::MIN,
        }
    }

    fn merge(&mut self, other: &HistogramState) {
        for (total, count) in self.bucket_counts.iter_mut().zip(&other.bucket_counts) {
            *total += count;
        }
        self.count += other.count;
        self.sum += other.sum;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }
}

struct CollectionState {
    previous_time: u64,
    cumulative: Option<HistogramState>,
}

/// Histogram over fixed, ascending bucket boundaries.
///
/// Bucket `i` counts values in `(boundaries[i-1], boundaries[i]]`, the first
/// bucket catches everything at or below the first boundary and the last one
/// everything above the last boundary.
pub struct HistogramAggregation {
    boundaries: Arc<[f64]>,
    record_min_max: bool,
    attributes: AttributeSet,
    start_time_unix_nano: u64,
    current: Mutex<HistogramState>,
    collection: Mutex<CollectionState>,
}

impl HistogramAggregation {
    /// `boundaries` must be finite and strictly ascending.
    pub(crate) fn new(
        boundaries: Arc<[f64]>,
        record_min_max: bool,
        attributes: AttributeSet,
        start_time_unix_nano: u64,
    ) -> Self {
        HistogramAggregation {
            current: Mutex::new(HistogramState::new(boundaries.len() + 1)),
            collection: Mutex::new(CollectionState {
                previous_time: start_time_unix_nano,
                cumulative: None,
            }),
            boundaries,
            record_min_max,
            attributes,
            start_time_unix_nano,
        }
    }

    pub(crate) fn aggregate(&self, value: f64) -> Result<(), Error> {
        if !value.is_finite() {
            return Err(Error::InvalidMeasurement(value));
        }
        // Number of boundaries strictly below the value.
        let index = self.boundaries.partition_point(|b| *b < value);

        let mut state = self.current.lock();
        state.bucket_counts[index] += 1;
        state.count += 1;
        state.sum += value;
        if value < state.min {
            state.min = value;
        }
        if value > state.max {
            state.max = value;
        }
        Ok(())
    }

    pub(crate) fn collect(&self, temporality: Temporality, now: u64) -> Option<Point> {
        let mut collection = self.collection.lock();
        let now = now.max(collection.previous_time);
        let empty = HistogramState::new(self.boundaries.len() + 1);
        let current = std::mem::replace(&mut *self.current.lock(), empty);

        let start = std::mem::replace(&mut collection.previous_time, now);
        match temporality {
            Temporality::Delta => {
                if current.count == 0 {
                    return None;
                }
                Some(self.to_point(&current, start, now, temporality))
            }
            Temporality::Cumulative => {
                let buckets = self.boundaries.len() + 1;
                let cumulative = collection
                    .cumulative
                    .get_or_insert_with(|| HistogramState::new(buckets));
                cumulative.merge(&current);
                if cumulative.count == 0 {
                    return None;
                }
                Some(self.to_point(cumulative, self.start_time_unix_nano, now, temporality))
            }
        }
    }

    fn to_point(
        &self,
        state: &HistogramState,
        start_time_unix_nano: u64,
        time_unix_nano: u64,
        temporality: Temporality,
    ) -> Point {
        let (min, max) = if self.record_min_max {
            (Some(state.min), Some(state.max))
        } else {
            (None, None)
        };
        Point::Histogram {
            point: HistogramPoint {
                attributes: self.attributes.clone(),
                start_time_unix_nano,
                time_unix_nano,
                count: state.count,
                sum: state.sum,
                bucket_counts: state.bucket_counts.clone(),
                explicit_bounds: self.boundaries.to_vec(),
                min,
                max,
            },
            temporality,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::config::DEFAULT_BOUNDARIES;

    fn histogram(boundaries: &[f64], record_min_max: bool) -> HistogramAggregation {
        HistogramAggregation::new(boundaries.into(), record_min_max, AttributeSet::empty(), 100)
    }

    fn expect_histogram(point: Option<Point>) -> HistogramPoint {
        match point {
            Some(Point::Histogram { point, .. }) => point,
            other => panic!("expected a histogram point, got {other:?}"),
        }
    }

    #[test]
    fn test_bucket_selection() {
        struct TestCase {
            name: &'static str,
            boundaries: Vec<f64>,
            values: Vec<f64>,
            want: Vec<u64>,
        }
        let test_cases = vec![
            TestCase {
                name: "values equal to a boundary land in the lower bucket",
                boundaries: vec![0.0, 5.0, 10.0],
                values: vec![-1.0, 0.0, 3.0, 5.0, 7.0, 10.0, 100.0],
                want: vec![2, 2, 2, 1],
            },
            TestCase {
                name: "no boundaries is a single bucket",
                boundaries: vec![],
                values: vec![-5.0, 0.0, 5.0],
                want: vec![3],
            },
            TestCase {
                name: "just above a boundary",
                boundaries: vec![1.0],
                values: vec![1.0, 1.0000001],
                want: vec![1, 1],
            },
            TestCase {
                name: "default boundaries",
                boundaries: DEFAULT_BOUNDARIES.to_vec(),
                values: vec![0.0, 4.0, 99.0, 10_000.0, 10_000.5],
                want: vec![1, 1, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 1],
            },
        ];
        for test in test_cases {
            let agg = histogram(&test.boundaries, true);
            for v in &test.values {
                agg.aggregate(*v).expect("valid measurement");
            }
            let point = expect_histogram(agg.collect(Temporality::Delta, 200));
            assert_eq!(point.bucket_counts, test.want, "{}", test.name);
            assert_eq!(point.count, test.values.len() as u64, "{}", test.name);
            assert_eq!(point.explicit_bounds, test.boundaries, "{}", test.name);
        }
    }

    #[test]
    fn test_delta_collect_resets() {
        let agg = histogram(&[0.0, 5.0, 10.0], true);
        agg.aggregate(3.0).expect("valid measurement");
        agg.aggregate(12.0).expect("valid measurement");

        let point = expect_histogram(agg.collect(Temporality::Delta, 200));
        assert_eq!(point.start_time_unix_nano, 100);
        assert_eq!(point.time_unix_nano, 200);
        assert_eq!(point.sum, 15.0);
        assert_eq!(point.min, Some(3.0));
        assert_eq!(point.max, Some(12.0));

        assert_eq!(agg.collect(Temporality::Delta, 300), None);

        agg.aggregate(1.0).expect("valid measurement");
        let point = expect_histogram(agg.collect(Temporality::Delta, 400));
        assert_eq!(point.start_time_unix_nano, 300);
        assert_eq!(point.bucket_counts, vec![0, 1, 0, 0]);
        assert_eq!(point.min, Some(1.0));
    }

    #[test]
    fn test_cumulative_collect_accumulates() {
        let agg = histogram(&[0.0, 5.0, 10.0], true);
        assert_eq!(agg.collect(Temporality::Cumulative, 150), None);

        agg.aggregate(7.0).expect("valid measurement");
        let point = expect_histogram(agg.collect(Temporality::Cumulative, 200));
        assert_eq!(point.bucket_counts, vec![0, 0, 1, 0]);
        assert_eq!(point.start_time_unix_nano, 100);

        agg.aggregate(-2.0).expect("valid measurement");
        agg.aggregate(20.0).expect("valid measurement");
        let point = expect_histogram(agg.collect(Temporality::Cumulative, 300));
        assert_eq!(point.bucket_counts, vec![1, 0, 1, 1]);
        assert_eq!(point.count, 3);
        assert_eq!(point.sum, 25.0);
        assert_eq!(point.min, Some(-2.0));
        assert_eq!(point.max, Some(20.0));
        assert_eq!(point.start_time_unix_nano, 100);
        assert_eq!(point.time_unix_nano, 300);

        // Running totals are reported again with no new data.
        let point = expect_histogram(agg.collect(Temporality::Cumulative, 400));
        assert_eq!(point.count, 3);
    }

    #[test]
    fn test_min_max_omitted_when_disabled() {
        let agg = histogram(&[1.0], false);
        agg.aggregate(0.5).expect("valid measurement");
        let point = expect_histogram(agg.collect(Temporality::Delta, 200));
        assert_eq!(point.min, None);
        assert_eq!(point.max, None);
    }

    #[test]
    fn test_rejects_non_finite_values() {
        let agg = histogram(&[1.0], true);
        assert!(agg.aggregate(f64::NAN).is_err());
        assert!(agg.aggregate(f64::NEG_INFINITY).is_err());
        assert_eq!(agg.collect(Temporality::Delta, 200), None);
    }

    #[test]
    fn test_concurrent_aggregate_loses_nothing() {
        let agg = Arc::new(histogram(&DEFAULT_BOUNDARIES, true));
        let threads = 8u64;
        let per_thread = 5_000u64;
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let agg = agg.clone();
                thread::spawn(move || {
                    for _ in 0..per_thread {
                        agg.aggregate(1.0).expect("valid measurement");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("writer thread");
        }
        let point = expect_histogram(agg.collect(Temporality::Delta, 200));
        assert_eq!(point.count, threads * per_thread);
        assert_eq!(point.bucket_counts[1], threads * per_thread);
    }
}
