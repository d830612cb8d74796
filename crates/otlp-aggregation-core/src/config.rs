//! Configuration for histogram aggregations.

use crate::Error;

/// Default explicit bucket boundaries.
pub const DEFAULT_BOUNDARIES: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
    10000.0,
];
/// Default number of buckets per sign in an exponential histogram.
const DEFAULT_MAX_SIZE: i32 = 160;
/// Smallest allowed bucket count per sign.
pub const MIN_MAX_SIZE: i32 = 2;
/// Largest allowed bucket count per sign.
pub const MAX_MAX_SIZE: i32 = 16384;
/// Finest supported scale; the default starting scale.
pub const MAX_SCALE: i8 = 20;
/// Coarsest supported scale.
pub const MIN_SCALE: i8 = -10;

/// Configuration for an explicit-bucket histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitBucketHistogramConfig {
    /// Strictly ascending bucket boundaries.
    pub boundaries: Vec<f64>,
    /// Whether to track the min and max of recorded values.
    pub record_min_max: bool,
}

/// Configuration for an exponential-bucket histogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExponentialHistogramConfig {
    /// Maximum number of buckets for each of the positive and negative ranges.
    pub max_size: i32,
    /// The scale measurements start at, before any downscaling.
    pub max_scale: i8,
    /// Whether to track the min and max of recorded values.
    pub record_min_max: bool,
}

impl Default for ExplicitBucketHistogramConfig {
    fn default() -> Self {
        Self {
            boundaries: DEFAULT_BOUNDARIES.to_vec(),
            record_min_max: true,
        }
    }
}

impl Default for ExponentialHistogramConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            max_scale: MAX_SCALE,
            record_min_max: true,
        }
    }
}

impl ExplicitBucketHistogramConfig {
    /// Checks the boundaries are finite and strictly ascending.
    pub fn validate(&self) -> Result<(), Error> {
        if let Some(b) = self.boundaries.iter().find(|b| !b.is_finite()) {
            return Err(Error::InvalidBoundaries(format!(
                "boundary {b} is not finite"
            )));
        }
        if let Some(w) = self.boundaries.windows(2).find(|w| w[0] >= w[1]) {
            return Err(Error::InvalidBoundaries(format!(
                "boundaries must be strictly ascending, found {} before {}",
                w[0], w[1]
            )));
        }
        Ok(())
    }
}

impl ExponentialHistogramConfig {
    /// Checks size and scale limits.
    ///
    /// A `max_scale` above [`MAX_SCALE`] is accepted with a warning and
    /// clamped, see [`ExponentialHistogramConfig::effective_max_scale`].
    pub fn validate(&self) -> Result<(), Error> {
        if !(MIN_MAX_SIZE..=MAX_MAX_SIZE).contains(&self.max_size) {
            return Err(Error::InvalidMaxSize(self.max_size));
        }
        if self.max_scale < MIN_SCALE {
            return Err(Error::InvalidMaxScale(self.max_scale));
        }
        if self.max_scale > MAX_SCALE {
            tracing::warn!(
                max_scale = self.max_scale,
                recommended = MAX_SCALE,
                "max_scale is larger than the recommended value; using the recommended value"
            );
        }
        Ok(())
    }

    /// The scale a fresh histogram starts at.
    pub fn effective_max_scale(&self) -> i8 {
        self.max_scale.min(MAX_SCALE)
    }
}
