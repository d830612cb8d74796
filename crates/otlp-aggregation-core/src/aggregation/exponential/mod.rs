//! Exponential Histogram implementation
//!
//! Buckets have geometrically growing boundaries of ratio `2^(2^-scale)`. The
//! histogram starts at the configured max scale and halves its resolution
//! whenever the recorded range no longer fits in `max_size` buckets.

mod buckets;
mod mapping;

use parking_lot::Mutex;

use buckets::{scale_change, Buckets};
use mapping::Mapping;

use crate::{
    attributes::AttributeSet,
    config::{ExponentialHistogramConfig, MAX_SCALE, MIN_SCALE},
    data::{ExponentialHistogramPoint, Point, Temporality},
    Error,
};

/// Accumulated measurements of one interval, or a running total of many.
#[derive(Debug, Clone)]
struct Accumulator {
    max_size: usize,
    max_scale: i8,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    zero_count: u64,
    mapping: Mapping,
    positive: Buckets,
    negative: Buckets,
}

impl Accumulator {
    fn new(config: &ExponentialHistogramConfig) -> Self {
        let max_scale = config.effective_max_scale();
        Accumulator {
            max_size: config.max_size as usize,
            max_scale,
            count: 0,
            sum: 0.0,
            min: f64::MAX,
            max: f64::MIN,
            zero_count: 0,
            mapping: Mapping::new(max_scale),
            positive: Buckets::default(),
            negative: Buckets::default(),
        }
    }

    fn has_buckets(&self) -> bool {
        !self.positive.is_empty() || !self.negative.is_empty()
    }

    fn scale(&self) -> i8 {
        self.mapping.scale()
    }

    fn set_scale(&mut self, scale: i8) {
        self.mapping = Mapping::new(scale);
    }

    fn side_mut(&mut self, negative: bool) -> &mut Buckets {
        if negative {
            &mut self.negative
        } else {
            &mut self.positive
        }
    }

    /// Adds a new measurement to the histogram.
    ///
    /// It will rescale the buckets if needed. `value` must be finite.
    fn record(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        if value == 0.0 {
            self.zero_count += 1;
            if self.count == self.zero_count {
                self.set_scale(0);
            }
            return;
        }

        // The scale of a zero-only histogram carries no information.
        if !self.has_buckets() && self.scale() != self.max_scale {
            self.set_scale(self.max_scale);
        }

        let abs = value.abs();
        let negative = value < 0.0;
        loop {
            let index = self.mapping.map_to_index(abs);
            let max_size = self.max_size;
            let change = match self.side_mut(negative).range() {
                Some((start, end)) => scale_change(max_size, start.min(index), end.max(index)),
                None => 0,
            };
            if change == 0 {
                self.side_mut(negative).increment(index, 1, max_size);
                return;
            }
            self.downscale(change);
        }
    }

    fn downscale(&mut self, change: u32) {
        if change == 0 {
            return;
        }
        let scale = self.scale() as i32 - change as i32;
        assert!(
            scale >= MIN_SCALE as i32,
            "exponential histogram scale underflow: scale {} reduced by {change}",
            self.scale()
        );
        self.positive.downscale(change);
        self.negative.downscale(change);
        self.set_scale(scale as i8);
    }

    /// Adds `other` into this running total.
    fn merge(&mut self, other: &Accumulator) {
        self.count += other.count;
        self.sum += other.sum;
        self.zero_count += other.zero_count;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);

        if other.count == 0 {
            return;
        }
        if !other.has_buckets() {
            // Zero-only intervals keep the scale of a zero-only total.
            if !self.has_buckets() {
                self.set_scale(other.scale());
            }
            return;
        }
        let target = if self.has_buckets() {
            let mut target = self.scale().min(other.scale());
            let change = merged_scale_change(self, other, target, false)
                .max(merged_scale_change(self, other, target, true));
            target -= change as i8;
            target
        } else {
            other.scale()
        };
        if self.has_buckets() {
            self.downscale((self.scale() - target) as u32);
        } else {
            self.set_scale(target);
        }

        let shift = (other.scale() - target) as u32;
        let max_size = self.max_size;
        self.positive.merge_from(&other.positive, shift, max_size);
        self.negative.merge_from(&other.negative, shift, max_size);
    }

    fn to_point(
        &self,
        attributes: &AttributeSet,
        start_time_unix_nano: u64,
        time_unix_nano: u64,
        record_min_max: bool,
    ) -> ExponentialHistogramPoint {
        let has_min_max = record_min_max && self.count > 0;
        ExponentialHistogramPoint {
            attributes: attributes.clone(),
            start_time_unix_nano,
            time_unix_nano,
            count: self.count,
            sum: self.sum,
            scale: self.scale(),
            zero_count: self.zero_count,
            positive: self.positive.to_point(),
            negative: self.negative.to_point(),
            min: has_min_max.then_some(self.min),
            max: has_min_max.then_some(self.max),
            flags: 0,
        }
    }
}

/// Extra downscaling needed so both sides' index ranges fit once merged at `scale`.
fn merged_scale_change(
    into: &Accumulator,
    from: &Accumulator,
    scale: i8,
    negative: bool,
) -> u32 {
    let pick = |acc: &Accumulator| {
        let side = if negative { &acc.negative } else { &acc.positive };
        let shift = (acc.scale() - scale) as u32;
        side.range().map(|(start, end)| (start >> shift, end >> shift))
    };
    match (pick(into), pick(from)) {
        (Some((l0, h0)), Some((l1, h1))) => scale_change(into.max_size, l0.min(l1), h0.max(h1)),
        (Some((low, high)), None) | (None, Some((low, high))) => {
            scale_change(into.max_size, low, high)
        }
        (None, None) => 0,
    }
}

struct CollectionState {
    previous_time: u64,
    cumulative: Option<Accumulator>,
}

/// Exponential-bucket histogram of a delta-producing instrument.
pub struct ExponentialHistogramAggregation {
    config: ExponentialHistogramConfig,
    attributes: AttributeSet,
    start_time_unix_nano: u64,
    current: Mutex<Accumulator>,
    // Only held by collect, writers never wait on the merge.
    collection: Mutex<CollectionState>,
}

impl ExponentialHistogramAggregation {
    /// `config` must already be validated.
    pub(crate) fn new(
        config: ExponentialHistogramConfig,
        attributes: AttributeSet,
        start_time_unix_nano: u64,
    ) -> Self {
        ExponentialHistogramAggregation {
            current: Mutex::new(Accumulator::new(&config)),
            collection: Mutex::new(CollectionState {
                previous_time: start_time_unix_nano,
                cumulative: None,
            }),
            config,
            attributes,
            start_time_unix_nano,
        }
    }

    pub(crate) fn aggregate(&self, value: f64) -> Result<(), Error> {
        if !value.is_finite() {
            return Err(Error::InvalidMeasurement(value));
        }
        self.current.lock().record(value);
        Ok(())
    }

    pub(crate) fn collect(&self, temporality: Temporality, now: u64) -> Option<Point> {
        let mut state = self.collection.lock();
        let now = now.max(state.previous_time);
        let current = std::mem::replace(&mut *self.current.lock(), Accumulator::new(&self.config));

        match temporality {
            Temporality::Delta => {
                let start = std::mem::replace(&mut state.previous_time, now);
                if current.count == 0 {
                    return None;
                }
                let point =
                    current.to_point(&self.attributes, start, now, self.config.record_min_max);
                Some(Point::ExponentialHistogram { point, temporality })
            }
            Temporality::Cumulative => {
                state.previous_time = now;
                let cumulative = state
                    .cumulative
                    .get_or_insert_with(|| Accumulator::new(&self.config));
                cumulative.merge(&current);
                if cumulative.count == 0 {
                    return None;
                }
                let point = cumulative.to_point(
                    &self.attributes,
                    self.start_time_unix_nano,
                    now,
                    self.config.record_min_max,
                );
                Some(Point::ExponentialHistogram { point, temporality })
            }
        }
    }
}

impl ExponentialHistogramPoint {
    /// The magnitudes `(lower, upper]` covered by bucket `index` at this point's scale.
    ///
    /// Applies to positive and negative buckets alike. Returns `None` when the
    /// scale is outside `[-10, 20]` or no finite value maps to `index`.
    pub fn bucket_bounds(&self, index: i32) -> Option<(f64, f64)> {
        if !(MIN_SCALE..=MAX_SCALE).contains(&self.scale) {
            return None;
        }
        let mapping = Mapping::new(self.scale);
        let max_index = mapping.max_index();
        if index < mapping.map_to_index(f64::MIN_POSITIVE) || index > max_index {
            return None;
        }
        let upper = if index == max_index {
            f64::MAX
        } else {
            mapping.lower_boundary(index + 1)
        };
        Some((mapping.lower_boundary(index), upper))
    }
}
