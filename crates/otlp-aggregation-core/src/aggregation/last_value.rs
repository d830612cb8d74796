//! Last Value (Gauge) Aggregation

use parking_lot::Mutex;

use crate::{
    attributes::AttributeSet,
    data::{NumberPoint, Point},
    Error,
};

struct LastValueState {
    value: Option<f64>,
    previous_time: u64,
}

/// "cell" of aggregation for a Gauge, remembering only the latest measurement.
pub struct LastValueAggregation {
    attributes: AttributeSet,
    state: Mutex<LastValueState>,
}

impl LastValueAggregation {
    pub(crate) fn new(attributes: AttributeSet, start_time_unix_nano: u64) -> Self {
        LastValueAggregation {
            attributes,
            state: Mutex::new(LastValueState {
                value: None,
                previous_time: start_time_unix_nano,
            }),
        }
    }

    pub(crate) fn aggregate(&self, value: f64) -> Result<(), Error> {
        if !value.is_finite() {
            return Err(Error::InvalidMeasurement(value));
        }
        self.state.lock().value = Some(value);
        Ok(())
    }

    /// Gauges have no temporality, the latest value is reported as is.
    pub(crate) fn collect(&self, now: u64) -> Option<Point> {
        let mut state = self.state.lock();
        let now = now.max(state.previous_time);
        state.previous_time = now;
        let value = state.value.take()?;
        drop(state);

        Some(Point::Gauge(NumberPoint {
            attributes: self.attributes.clone(),
            start_time_unix_nano: None,
            time_unix_nano: now,
            value,
        }))
    }
}
