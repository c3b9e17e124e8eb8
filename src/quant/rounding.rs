//! Rounding onto integer and minifloat grids
//!
//! Both grids round half to even (IEEE-754 `roundTiesToEven`), matching the
//! default rounding of the hardware arithmetic being simulated.

use super::scale::floor_log2;

/// Representable range of a `bits`-wide integer element
///
/// Signed: `[-(2^(W-1)) (+1 if symmetric), 2^(W-1) - 1]`.
/// Unsigned: `[0, 2^W - 1]`.
pub fn int_range(bits: u32, signed: bool, symmetric: bool) -> (f32, f32) {
    if signed {
        let max_repr = ((1i64 << (bits - 1)) - 1) as f32;
        let min_repr = if symmetric {
            -max_repr
        } else {
            -((1i64 << (bits - 1)) as f32)
        };
        (min_repr, max_repr)
    } else {
        (0.0, ((1i64 << bits) - 1) as f32)
    }
}

/// Integer element grid
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IntGrid {
    pub min_repr: f32,
    pub max_repr: f32,
}

impl IntGrid {
    pub fn new(bits: u32, signed: bool, symmetric: bool) -> Self {
        let (min_repr, max_repr) = int_range(bits, signed, symmetric);
        Self { min_repr, max_repr }
    }

    /// Round to the nearest integer and clamp to the element range
    pub fn round(&self, x: f32) -> f32 {
        x.round_ties_even().clamp(self.min_repr, self.max_repr)
    }
}

/// Round to the nearest integer and clamp to the element range.
pub fn to_int(x: f32, bits: u32, signed: bool, symmetric: bool) -> f32 {
    IntGrid::new(bits, signed, symmetric).round(x)
}

/// Exponent bias of an `exp_bits`-wide minifloat: `2^(E-1) - 1`
pub fn exponent_bias(exp_bits: u32) -> i32 {
    (1i32 << (exp_bits - 1)) - 1
}

/// Largest representable minifloat magnitude
///
/// `(2^(M+1) - 1) * 2^-M * 2^(2^E - 1 - bias)`; all exponent codes are used
/// for finite values (no inf/NaN encodings).
pub fn max_float(exp_bits: u32, man_bits: u32, bias: i32) -> f32 {
    let exp = (1i32 << exp_bits) - 1 - bias;
    let man = ((1u64 << (man_bits + 1)) - 1) as f64 * 2f64.powi(-(man_bits as i32));
    (man * 2f64.powi(exp)) as f32
}

/// Smallest normal minifloat magnitude: `2^-bias`
pub fn min_normal(bias: i32) -> f32 {
    2f64.powi(-bias) as f32
}

/// Minifloat element grid
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MinifloatGrid {
    /// Mantissa bits (excluding the implicit leading one)
    pub man_bits: u32,
    /// Whether negative values are representable
    pub signed: bool,
    /// Smallest normal magnitude
    pub min_repr: f32,
    /// Largest magnitude
    pub max_repr: f32,
}

impl MinifloatGrid {
    /// Grid for an `E`-exponent, `M`-mantissa minifloat
    pub fn new(exp_bits: u32, man_bits: u32, signed: bool) -> Self {
        let bias = exponent_bias(exp_bits);
        Self {
            man_bits,
            signed,
            min_repr: min_normal(bias),
            max_repr: max_float(exp_bits, man_bits, bias),
        }
    }

    /// Magnitudes at or below this flush to zero
    pub fn flush_threshold(&self) -> f32 {
        self.min_repr / 2.0
    }

    /// Round `x` onto the grid
    ///
    /// Keeps `M + 1` significant bits, clamps to `[min_repr, max_repr]`, and
    /// flushes magnitudes `<= min_repr / 2` to zero. Zero stays zero and the
    /// sign of nonzero inputs is preserved (unsigned grids clamp negatives to
    /// zero).
    pub fn round(&self, x: f32) -> f32 {
        if x == 0.0 {
            return 0.0;
        }
        if x.is_nan() {
            return x;
        }

        let x_abs = x.abs();
        if x_abs <= self.flush_threshold() {
            return 0.0;
        }

        let shift = self.man_bits as i32 - floor_log2(x_abs);
        let mantissa = (x_abs as f64 * 2f64.powi(shift)).round_ties_even();
        let rounded = (mantissa * 2f64.powi(-shift)) as f32;
        let magnitude = rounded.clamp(self.min_repr, self.max_repr);

        let signed = magnitude.copysign(x);
        if self.signed {
            signed
        } else {
            signed.max(0.0)
        }
    }
}

/// Round `x` onto an `(E, M)` minifloat grid.
pub fn to_minifloat(x: f32, exp_bits: u32, man_bits: u32, signed: bool) -> f32 {
    MinifloatGrid::new(exp_bits, man_bits, signed).round(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(200))]

        /// Integer rounding lands on an integer inside the range
        #[test]
        fn prop_to_int_bounded(
            x in -1000.0f32..1000.0,
            bits in 2u32..9,
            symmetric in any::<bool>(),
            signed in any::<bool>(),
        ) {
            let (lo, hi) = int_range(bits, signed, symmetric);
            let q = to_int(x, bits, signed, symmetric);
            prop_assert!(q >= lo && q <= hi);
            prop_assert_eq!(q, q.round());
        }

        /// Re-rounding a minifloat grid value is a no-op
        #[test]
        fn prop_minifloat_idempotent(x in -100.0f32..100.0, exp_bits in 1u32..6, man_bits in 0u32..5) {
            let grid = MinifloatGrid::new(exp_bits, man_bits, true);
            let once = grid.round(x);
            prop_assert_eq!(grid.round(once), once);
        }

        /// Output magnitude stays in {0} ∪ [min_repr, max_repr] and keeps the sign
        #[test]
        fn prop_minifloat_bounded(x in -100.0f32..100.0, exp_bits in 1u32..6, man_bits in 0u32..5) {
            let grid = MinifloatGrid::new(exp_bits, man_bits, true);
            let q = grid.round(x);
            prop_assert!(q == 0.0 || (q.abs() >= grid.min_repr && q.abs() <= grid.max_repr));
            if q != 0.0 {
                prop_assert_eq!(q.is_sign_negative(), x.is_sign_negative());
            }
        }
    }

    #[test]
    fn test_int_range() {
        assert_eq!(int_range(4, true, true), (-7.0, 7.0));
        assert_eq!(int_range(4, true, false), (-8.0, 7.0));
        assert_eq!(int_range(4, false, false), (0.0, 15.0));
        assert_eq!(int_range(2, true, true), (-1.0, 1.0));
        assert_eq!(int_range(8, true, true), (-127.0, 127.0));
    }

    #[test]
    fn test_to_int_ties_to_even() {
        assert_eq!(to_int(0.5, 8, true, true), 0.0);
        assert_eq!(to_int(1.5, 8, true, true), 2.0);
        assert_eq!(to_int(2.5, 8, true, true), 2.0);
        assert_eq!(to_int(-2.5, 8, true, true), -2.0);
        assert_eq!(to_int(2.6, 8, true, true), 3.0);
    }

    #[test]
    fn test_to_int_clamps() {
        assert_eq!(to_int(8.0, 4, true, true), 7.0);
        assert_eq!(to_int(-9.0, 4, true, true), -7.0);
        assert_eq!(to_int(-9.0, 4, true, false), -8.0);
        assert_eq!(to_int(-3.0, 4, false, false), 0.0);
        assert_eq!(to_int(20.0, 4, false, false), 15.0);
    }

    #[test]
    fn test_e2m1_limits() {
        let grid = MinifloatGrid::new(2, 1, true);
        assert_eq!(exponent_bias(2), 1);
        assert_abs_diff_eq!(grid.min_repr, 0.5);
        assert_abs_diff_eq!(grid.max_repr, 6.0);
    }

    #[test]
    fn test_e4m3_limits() {
        // bias 7, all exponent codes finite: 1.875 * 2^8
        assert_abs_diff_eq!(max_float(4, 3, exponent_bias(4)), 480.0);
        assert_abs_diff_eq!(min_normal(exponent_bias(4)), 1.0 / 128.0);
    }

    #[test]
    fn test_minifloat_subnormal_flush() {
        // E2M1: min_repr = 0.5, so 0.2 <= 0.25 flushes
        assert_eq!(to_minifloat(0.2, 2, 1, true), 0.0);
        assert_eq!(to_minifloat(-0.25, 2, 1, true), 0.0);
        // just above the threshold clamps up to the smallest normal
        assert_abs_diff_eq!(to_minifloat(0.3, 2, 1, true), 0.5);
        assert_abs_diff_eq!(to_minifloat(-0.3, 2, 1, true), -0.5);
    }

    #[test]
    fn test_minifloat_grid_points() {
        // E2M1 positive grid: 0.5 1 1.5 2 3 4 6
        let grid = MinifloatGrid::new(2, 1, true);
        for &v in &[0.5f32, 1.0, 1.5, 2.0, 3.0, 4.0, 6.0] {
            assert_eq!(grid.round(v), v);
            assert_eq!(grid.round(-v), -v);
        }
        assert_eq!(grid.round(2.5), 2.0); // tie between 2 and 3 -> even mantissa
        assert_eq!(grid.round(3.5), 4.0); // tie between 3 and 4 -> even mantissa
        assert_eq!(grid.round(5.0), 4.0); // tie between 4 and 6 -> even mantissa
        assert_eq!(grid.round(100.0), 6.0);
    }

    #[test]
    fn test_minifloat_zero_and_unsigned() {
        let grid = MinifloatGrid::new(2, 1, false);
        assert_eq!(grid.round(0.0), 0.0);
        assert_eq!(grid.round(-3.0), 0.0);
        assert_eq!(grid.round(3.0), 3.0);
    }
}
