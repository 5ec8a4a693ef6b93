//! Property tests for the quantization formula.

use proptest::prelude::*;

use qfold_dtype::DType;

use crate::ops::{degenerate_epsilon, fake_quantize};

use super::generators::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Quantization is non-decreasing in its input when `output_low <= output_high`.
    #[test]
    fn quantize_monotonic(
        (il, ih) in arb_range(),
        (ol, oh) in arb_range(),
        levels in arb_levels(),
        a in -100.0f32..100.0,
        b in -100.0f32..100.0,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let quantized = |x| fake_quantize(x, [il, ih, ol, oh], levels, f32::EPSILON);
        prop_assert!(quantized(lo) <= quantized(hi) + 1e-4);
    }

    /// Outputs stay within the output range.
    #[test]
    fn quantize_bounded((il, ih) in arb_range(), (ol, oh) in arb_range(), levels in arb_levels(), x in -100.0f32..100.0) {
        let y = fake_quantize(x, [il, ih, ol, oh], levels, f32::EPSILON);
        let tol = 1e-4 * (1.0 + ol.abs().max(oh.abs()));
        prop_assert!(y >= ol - tol && y <= oh + tol, "{y} outside [{ol}, {oh}]");
    }

    /// Two levels produce exactly one of the two output thresholds.
    #[test]
    fn quantize_two_levels_binary((il, ih) in arb_range(), (ol, oh) in arb_range(), x in -100.0f32..100.0) {
        let y = fake_quantize(x, [il, ih, ol, oh], 2, f32::EPSILON);
        let tol = 1e-5 * (1.0 + ol.abs().max(oh.abs()));
        prop_assert!((y - ol).abs() <= tol || (y - oh).abs() <= tol, "{y} not in {{{ol}, {oh}}}");
    }

    /// A collapsed input range is a step at `input_low`.
    #[test]
    fn quantize_degenerate_step(t in -10.0f32..10.0, (ol, oh) in arb_range(), levels in arb_levels(), x in -20.0f32..20.0) {
        let expected = if x <= t { ol } else { oh };
        prop_assert_eq!(fake_quantize(x, [t, t, ol, oh], levels, f32::EPSILON), expected);
    }

    /// A range narrower than the `f16` epsilon is a step for `f16` values but
    /// still resolves into levels for `f32` values.
    #[test]
    fn quantize_degenerate_follows_dtype_epsilon(t in -10.0f32..10.0, (ol, oh) in arb_range()) {
        let (ih, x) = (t + 5e-4, t + 1e-4);
        prop_assert_eq!(fake_quantize(x, [t, ih, ol, oh], 2, degenerate_epsilon(DType::Float16)), oh);
        prop_assert_eq!(fake_quantize(x, [t, ih, ol, oh], 2, degenerate_epsilon(DType::Float32)), ol);
    }
}
