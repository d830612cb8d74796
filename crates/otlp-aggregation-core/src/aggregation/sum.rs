//! Sum Aggregation

use parking_lot::Mutex;

use crate::{
    attributes::AttributeSet,
    data::{NumberPoint, Point, Temporality},
    Error,
};

struct SumState {
    /// `None` until something is measured in the current interval.
    value: Option<f64>,
    previous_time: u64,
    /// Running total for delta to cumulative, last raw total for cumulative to delta.
    previous_value: f64,
}

/// Sums measurements, converting between the instrument's temporality and the
/// temporality requested at collection.
pub struct SumAggregation {
    attributes: AttributeSet,
    start_time_unix_nano: u64,
    is_monotonic: bool,
    /// The temporality measurements arrive in.
    temporality: Temporality,
    state: Mutex<SumState>,
}

impl SumAggregation {
    pub(crate) fn new(
        attributes: AttributeSet,
        start_time_unix_nano: u64,
        is_monotonic: bool,
        temporality: Temporality,
    ) -> Self {
        SumAggregation {
            attributes,
            start_time_unix_nano,
            is_monotonic,
            temporality,
            state: Mutex::new(SumState {
                value: None,
                previous_time: start_time_unix_nano,
                previous_value: 0.0,
            }),
        }
    }

    pub fn is_monotonic(&self) -> bool {
        self.is_monotonic
    }

    pub(crate) fn aggregate(&self, value: f64) -> Result<(), Error> {
        if !value.is_finite() {
            return Err(Error::InvalidMeasurement(value));
        }
        let mut state = self.state.lock();
        *state.value.get_or_insert(0.0) += value;
        Ok(())
    }

    pub(crate) fn collect(&self, temporality: Temporality, now: u64) -> Option<Point> {
        let mut state = self.state.lock();
        let now = now.max(state.previous_time);
        let value = state.value.take();
        let start = state.previous_time;

        let (start, value) = match (self.temporality, temporality) {
            (Temporality::Delta, Temporality::Delta) => {
                state.previous_time = now;
                (start, value?)
            }
            (Temporality::Delta, Temporality::Cumulative) => {
                state.previous_time = now;
                state.previous_value += value.unwrap_or(0.0);
                (self.start_time_unix_nano, state.previous_value)
            }
            (Temporality::Cumulative, Temporality::Cumulative) => {
                state.previous_time = now;
                (self.start_time_unix_nano, value?)
            }
            (Temporality::Cumulative, Temporality::Delta) => {
                // The delta spans back to the last reported total.
                let value = value?;
                state.previous_time = now;
                let delta = value - std::mem::replace(&mut state.previous_value, value);
                (start, delta)
            }
        };
        drop(state);

        Some(Point::Sum {
            point: NumberPoint {
                attributes: self.attributes.clone(),
                start_time_unix_nano: Some(start),
                time_unix_nano: now,
                value,
            },
            temporality,
            is_monotonic: self.is_monotonic,
        })
    }
}
