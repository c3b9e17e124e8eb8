//! Shared-exponent scale computation
//!
//! Every group of a grouped sample tensor `[Batch, Groups, GroupSize]` gets one
//! power-of-two scale:
//!
//! ```text
//! x_max = max |x|                       (over batch and group axes)
//! x_max = 1            if x_max == 0
//! e     = floor(log2(x_max)) - max_pot  (clamped to [-127, 128])
//! scale = 2^e
//! ```
//!
//! The exponent range is that of an 8-bit unsigned exponent (E8M0) scale.

use ndarray::{Array1, ArrayView3, Axis};

/// Smallest scale exponent representable by an E8M0 scale
pub const SCALE_EXP_MIN: i32 = -127;

/// Largest scale exponent representable by an E8M0 scale
pub const SCALE_EXP_MAX: i32 = 128;

/// Exact `2^exp` as f32, computed in f64 so large shifts stay exact.
pub fn pow2(exp: i32) -> f32 {
    2f64.powi(exp) as f32
}

/// Exact `floor(log2(|x|))` read off the IEEE-754 exponent field.
///
/// Subnormals are handled by counting leading zeros of the mantissa. Zero
/// has no logarithm and yields `i32::MIN`; infinities and NaN yield
/// `i32::MAX`. Both saturate once clamped to the scale range.
pub fn floor_log2(x: f32) -> i32 {
    let bits = x.abs().to_bits();
    let biased = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    match biased {
        0xff => i32::MAX,
        0 if mantissa == 0 => i32::MIN,
        // Subnormal: value = mantissa * 2^-149
        0 => (31 - mantissa.leading_zeros() as i32) - 149,
        _ => biased - 127,
    }
}

/// Scale exponent for a single group maximum
///
/// Applies the zero fallback and the E8M0 clamp.
pub fn scale_exponent(x_max: f32, max_pot: i32) -> i32 {
    let x_max = if x_max == 0.0 { 1.0 } else { x_max };
    floor_log2(x_max)
        .saturating_sub(max_pot)
        .clamp(SCALE_EXP_MIN, SCALE_EXP_MAX)
}

/// `max` that propagates NaN instead of skipping it
fn nan_max(a: f32, b: f32) -> f32 {
    if a.is_nan() || b.is_nan() {
        f32::NAN
    } else {
        a.max(b)
    }
}

/// Per-group maximum magnitude of `[Batch, Groups, GroupSize]` samples.
///
/// A NaN anywhere in a group makes that group's maximum NaN.
pub fn group_max(samples: ArrayView3<'_, f32>) -> Array1<f32> {
    samples
        .map_axis(Axis(2), |group| group.iter().fold(0.0f32, |m, v| nan_max(m, v.abs())))
        .fold_axis(Axis(0), 0.0f32, |m, v| nan_max(*m, *v))
}

/// Compute one power-of-two scale per group
///
/// # Arguments
/// * `samples` - grouped samples, shape `[Batch, Groups, GroupSize]`
/// * `max_pot` - log2 of the largest power of two the element format holds
///
/// Groups whose maximum is NaN get a NaN scale.
pub fn compute_scale(samples: ArrayView3<'_, f32>, max_pot: i32) -> Array1<f32> {
    group_max(samples).mapv(|x_max| {
        if x_max.is_nan() {
            f32::NAN
        } else {
            pow2(scale_exponent(x_max, max_pot))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array3;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(200))]

        /// Every scale is 2^k with k inside the E8M0 range
        #[test]
        fn prop_scale_is_power_of_two(
            values in prop::collection::vec(-1.0e6f32..1.0e6, 8..64),
            max_pot in 0i32..9,
        ) {
            let groups = values.len() / 4;
            let samples = Array3::from_shape_vec((1, groups, 4), values[..groups * 4].to_vec()).unwrap();
            let scale = compute_scale(samples.view(), max_pot);

            prop_assert_eq!(scale.len(), groups);
            for &s in scale.iter() {
                prop_assert!(s > 0.0 && s.is_finite());
                let k = floor_log2(s);
                prop_assert!((SCALE_EXP_MIN..=SCALE_EXP_MAX).contains(&k));
                prop_assert_eq!(s, pow2(k));
            }
        }

        /// floor_log2 agrees with the float logarithm away from exact powers
        #[test]
        fn prop_floor_log2_matches_log2(x in 1.0e-30f32..1.0e30) {
            let expected = x.log2().floor() as i32;
            let got = floor_log2(x);
            // log2 may round across an integer boundary for values next to a power of two
            prop_assert!((got - expected).abs() <= 1);
            prop_assert!(pow2(got) <= x && x < pow2(got + 1));
        }
    }

    #[test]
    fn test_floor_log2_exact_powers() {
        assert_eq!(floor_log2(1.0), 0);
        assert_eq!(floor_log2(4.0), 2);
        assert_eq!(floor_log2(3.999), 1);
        assert_eq!(floor_log2(0.5), -1);
        assert_eq!(floor_log2(-8.0), 3);
        assert_eq!(floor_log2(f32::MIN_POSITIVE), -126);
        assert_eq!(floor_log2(f32::from_bits(1)), -149);
    }

    #[test]
    fn test_floor_log2_degenerate() {
        assert_eq!(floor_log2(0.0), i32::MIN);
        assert_eq!(floor_log2(f32::INFINITY), i32::MAX);
    }

    #[test]
    fn test_compute_scale_single_group() {
        // x_max = 4, max_pot = 3 -> 2^(2 - 3) = 0.5
        let samples = Array3::from_shape_vec((1, 1, 4), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let scale = compute_scale(samples.view(), 3);
        assert_eq!(scale.len(), 1);
        assert_abs_diff_eq!(scale[0], 0.5);
    }

    #[test]
    fn test_compute_scale_reduces_over_batch() {
        // group 0 max = 8 (batch 1), group 1 max = 1 (batch 0)
        let samples = Array3::from_shape_vec(
            (2, 2, 2),
            vec![1.0, -0.5, 1.0, 0.25, -8.0, 2.0, 0.5, 0.0],
        )
        .unwrap();
        let scale = compute_scale(samples.view(), 1);
        assert_abs_diff_eq!(scale[0], 4.0);
        assert_abs_diff_eq!(scale[1], 0.5);
    }

    #[test]
    fn test_zero_group_falls_back_to_unit_max() {
        let samples = Array3::<f32>::zeros((3, 2, 4));
        let scale = compute_scale(samples.view(), 0);
        assert_abs_diff_eq!(scale[0], 1.0);
        assert_abs_diff_eq!(scale[1], 1.0);
    }

    #[test]
    fn test_scale_exponent_clamped() {
        assert_eq!(scale_exponent(f32::MAX, -200), SCALE_EXP_MAX);
        assert_eq!(scale_exponent(f32::from_bits(1), 8), SCALE_EXP_MIN);
        assert_eq!(scale_exponent(0.0, 3), -3);
    }

    #[test]
    fn test_nan_propagates_to_group_scale() {
        // group 0 holds a NaN in batch 1, group 1 is finite
        let samples = Array3::from_shape_vec(
            (2, 2, 2),
            vec![1.0, 2.0, 1.0, 4.0, f32::NAN, 0.5, 0.25, 0.0],
        )
        .unwrap();
        assert!(group_max(samples.view())[0].is_nan());
        let scale = compute_scale(samples.view(), 2);
        assert!(scale[0].is_nan());
        assert_abs_diff_eq!(scale[1], 1.0);
    }
}
