//! Scale to bucket index mapping for exponential histograms.
//!
//! Bucket `index` at a given `scale` covers the range
//! `(base^index, base^(index+1)]` where `base = 2^(2^-scale)`.

use std::f64::consts::LOG2_E;

use crate::config::{MAX_SCALE, MIN_SCALE};

/// Exponent of the smallest normal f64, `f64::MIN_POSITIVE == 2^-1022`.
const MIN_NORMAL_EXPONENT: i32 = -1022;
/// Exponent of the largest power of two below `f64::MAX`.
const MAX_NORMAL_EXPONENT: i32 = 1023;
/// Exponent of the smallest subnormal f64.
const MIN_SUBNORMAL_EXPONENT: i32 = -1074;
const MANTISSA_WIDTH: u32 = 52;
const MANTISSA_MASK: u64 = (1 << MANTISSA_WIDTH) - 1;
const EXPONENT_BIAS: i32 = 1023;

/// Maps positive finite values onto bucket indices at a fixed scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Mapping {
    /// Scales <= 0: indices come straight from the IEEE-754 exponent.
    Exponent { shift: u32 },
    /// Scales > 0: indices come from the logarithm of the mantissa.
    Logarithm { scale: i8, scale_factor: f64 },
}

impl Mapping {
    /// Constructs the mapping for `scale`.
    ///
    /// Panics if the scale is outside `[-10, 20]`, callers clamp or validate first.
    pub(crate) fn new(scale: i8) -> Mapping {
        assert!(
            (MIN_SCALE..=MAX_SCALE).contains(&scale),
            "exponential histogram scale {scale} out of range"
        );
        if scale <= 0 {
            Mapping::Exponent {
                shift: (-scale) as u32,
            }
        } else {
            Mapping::Logarithm {
                scale,
                scale_factor: LOG2_E * 2f64.powi(scale as i32),
            }
        }
    }

    pub(crate) fn scale(&self) -> i8 {
        match self {
            Mapping::Exponent { shift } => -(*shift as i8),
            Mapping::Logarithm { scale, .. } => *scale,
        }
    }

    /// The bucket `value` falls into. `value` must be positive and finite.
    pub(crate) fn map_to_index(&self, value: f64) -> i32 {
        // Subnormals all share the bucket of the smallest normal value.
        let value = value.max(f64::MIN_POSITIVE);
        let is_power_of_two = value.to_bits() & MANTISSA_MASK == 0;
        match *self {
            Mapping::Exponent { shift } => {
                let exponent = ieee754_exponent(value);
                // Exact powers of two are the inclusive upper bound of the bucket below.
                let correction = if is_power_of_two { -1 } else { 0 };
                (exponent + correction) >> shift
            }
            Mapping::Logarithm {
                scale,
                scale_factor,
            } => {
                if is_power_of_two {
                    // `ln` can round either way exactly on a boundary, the exponent can't.
                    return (ieee754_exponent(value) << scale) - 1;
                }
                let (frac, exp) = frexp(value);
                // frac is within (0.5, 1), so the scaled logarithm is within (-2^scale, 0)
                // and truncating it rounds towards the ceiling.
                let index = (exp << scale) + (frac.ln() * scale_factor) as i32 - 1;
                index.min(self.max_index())
            }
        }
    }

    /// The exclusive lower bound of bucket `index`.
    pub(crate) fn lower_boundary(&self, index: i32) -> f64 {
        match *self {
            Mapping::Exponent { shift } => exp2i(index << shift),
            Mapping::Logarithm { scale, .. } => {
                let size = 1i32 << scale;
                if index >= self.max_index() {
                    // 2^1024 overflows, so step down one power of two and double.
                    return 2.0 * (((index - size) as f64) / size as f64).exp2();
                }
                let min_normal_index = MIN_NORMAL_EXPONENT << scale;
                if index == min_normal_index {
                    return f64::MIN_POSITIVE;
                }
                if index < min_normal_index {
                    return (((index + size) as f64) / size as f64).exp2() / 2.0;
                }
                (index as f64 / size as f64).exp2()
            }
        }
    }

    /// The bucket of the largest finite value.
    pub(crate) fn max_index(&self) -> i32 {
        match *self {
            Mapping::Exponent { shift } => MAX_NORMAL_EXPONENT >> shift,
            Mapping::Logarithm { scale, .. } => ((MAX_NORMAL_EXPONENT + 1) << scale) - 1,
        }
    }
}

/// The unbiased IEEE-754 exponent of a normal value.
fn ieee754_exponent(value: f64) -> i32 {
    ((value.to_bits() >> MANTISSA_WIDTH) & 0x7ff) as i32 - EXPONENT_BIAS
}

/// Exactly `2^e`, for any `e` representable as a normal or subnormal f64.
fn exp2i(e: i32) -> f64 {
    if e >= MIN_NORMAL_EXPONENT {
        f64::from_bits(((e.min(MAX_NORMAL_EXPONENT) + EXPONENT_BIAS) as u64) << MANTISSA_WIDTH)
    } else {
        f64::from_bits(1u64 << (e.max(MIN_SUBNORMAL_EXPONENT) - MIN_SUBNORMAL_EXPONENT))
    }
}

/// Breaks the number into a normalized fraction and a base-2 exponent.
///
/// This impl is necessary as rust removed this functionality from std in
/// <https://github.com/rust-lang/rust/pull/41437>
#[inline(always)]
fn frexp(x: f64) -> (f64, i32) {
    let mut y = x.to_bits();
    let ee = ((y >> 52) & 0x7ff) as i32;

    if ee == 0 {
        if x != 0.0 {
            let x1p64 = f64::from_bits(0x43f0000000000000);
            let (x, e) = frexp(x * x1p64);
            return (x, e - 64);
        }
        return (x, 0);
    } else if ee == 0x7ff {
        return (x, 0);
    }

    let e = ee - 0x3fe;
    y &= 0x800fffffffffffff;
    y |= 0x3fe0000000000000;

    (f64::from_bits(y), e)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn next_up(v: f64) -> f64 {
        f64::from_bits(v.to_bits() + 1)
    }

    #[test]
    fn test_power_of_two_boundaries_every_scale() {
        for scale in MIN_SCALE..=MAX_SCALE {
            let mapping = Mapping::new(scale);
            assert_eq!(mapping.scale(), scale);
            for exponent in -1022..=1023 {
                let v = exp2i(exponent);
                let want = if scale > 0 {
                    (exponent << scale) - 1
                } else {
                    (exponent - 1) >> -scale
                };
                assert_eq!(
                    mapping.map_to_index(v),
                    want,
                    "2^{exponent} at scale {scale}"
                );
            }
        }
    }

    #[test]
    fn test_just_above_power_of_two_exponent_scales() {
        for scale in MIN_SCALE..=0 {
            let mapping = Mapping::new(scale);
            for exponent in [-1000, -10, -1, 0, 1, 7, 64, 1000] {
                let v = next_up(exp2i(exponent));
                assert_eq!(
                    mapping.map_to_index(v),
                    exponent >> -scale,
                    "next_up(2^{exponent}) at scale {scale}"
                );
            }
        }
    }

    #[test]
    fn test_values_fall_within_bucket_bounds() {
        let values = [1.1, 1.5, 3.7, 10.0, 100.25, 12345.678, 0.001, 0.3, 7.0e20, 2.5e-30];
        for scale in MIN_SCALE..=MAX_SCALE {
            let mapping = Mapping::new(scale);
            for v in values {
                let index = mapping.map_to_index(v);
                let lower = mapping.lower_boundary(index);
                let upper = mapping.lower_boundary(index + 1);
                assert!(
                    lower < v && v <= upper,
                    "{v} at scale {scale}: index {index} covers ({lower}, {upper}]"
                );
            }
        }
    }

    #[test]
    fn test_mapping_is_monotonic() {
        for scale in [-10, -3, 0, 1, 3, 8, 20] {
            let mapping = Mapping::new(scale);
            let mut v = 1.0e-3;
            let mut last = mapping.map_to_index(v);
            while v < 1.0e3 {
                v *= 1.0001;
                let index = mapping.map_to_index(v);
                assert!(index >= last, "index decreased at {v} scale {scale}");
                last = index;
            }
        }
    }

    #[test]
    fn test_scale_zero_buckets() {
        struct TestCase {
            value: f64,
            want: i32,
        }
        let mapping = Mapping::new(0);
        let cases = [
            TestCase { value: 1.0, want: -1 },
            TestCase { value: 1.5, want: 0 },
            TestCase { value: 2.0, want: 0 },
            TestCase { value: 3.0, want: 1 },
            TestCase { value: 4.0, want: 1 },
            TestCase { value: 4.5, want: 2 },
            TestCase { value: 0.5, want: -2 },
            TestCase { value: 0.75, want: -1 },
        ];
        for case in cases {
            assert_eq!(mapping.map_to_index(case.value), case.want, "{}", case.value);
        }
    }

    #[test]
    fn test_extreme_values() {
        // These bins are calculated from the following formula:
        // floor( log2( value) * 2^20 ) using an arbitrary precision calculator.
        let mapping = Mapping::new(20);
        assert_eq!(mapping.map_to_index(f64::MAX), 1073741823);
        assert_eq!(mapping.map_to_index(f64::MIN_POSITIVE), -1071644673);
        assert_eq!(mapping.map_to_index(i64::MAX as f64), 66060287);
        // Subnormals share the smallest normal bucket.
        assert_eq!(mapping.map_to_index(f64::MIN_POSITIVE / 8.0), -1071644673);

        let coarse = Mapping::new(-10);
        assert_eq!(coarse.map_to_index(f64::MAX), 0);
        assert_eq!(coarse.map_to_index(f64::MIN_POSITIVE), -1);
        assert_eq!(coarse.map_to_index(1.0), -1);
        assert_eq!(coarse.map_to_index(2.0), 0);
    }

    #[test]
    fn test_lower_boundary_extremes() {
        let mapping = Mapping::new(20);
        assert_eq!(mapping.lower_boundary(-1071644672), f64::MIN_POSITIVE);
        assert!(mapping.lower_boundary(1073741823).is_finite());
        assert!(mapping.lower_boundary(-1071644673) < f64::MIN_POSITIVE);
        assert_eq!(Mapping::new(0).lower_boundary(0), 1.0);
        assert_eq!(Mapping::new(-1).lower_boundary(2), 16.0);
    }

    #[test]
    fn test_frexp() {
        assert_eq!(frexp(1.0), (0.5, 1));
        assert_eq!(frexp(3.0), (0.75, 2));
        assert_eq!(frexp(0.25), (0.5, -1));
        let (frac, exp) = frexp(f64::MIN_POSITIVE / 4.0);
        assert_eq!((frac, exp), (0.5, -1023));
    }
}
