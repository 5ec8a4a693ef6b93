//! Fake quantization.

use qfold_dtype::DType;

use crate::error::{BroadcastShapeMismatchSnafu, DTypeMismatchSnafu, InvalidLevelsSnafu, Result, UnsupportedDTypeSnafu};
use crate::graph::OutputInfo;
use crate::shape::broadcasts_to;
use crate::types::OpKind;

use super::Operand;

/// Data must be float; the four thresholds share its dtype and broadcast onto it.
pub fn fake_quantize_info(levels: u32, inputs: &[Operand<'_>]) -> Result<OutputInfo> {
    snafu::ensure!(levels >= 2, InvalidLevelsSnafu { levels });
    let data = inputs[0].info;
    snafu::ensure!(data.dtype.is_float(), UnsupportedDTypeSnafu { kind: OpKind::FakeQuantize, dtype: data.dtype });

    for threshold in &inputs[1..] {
        let t = threshold.info;
        snafu::ensure!(t.dtype == data.dtype, DTypeMismatchSnafu { lhs: data.dtype, rhs: t.dtype });
        snafu::ensure!(
            broadcasts_to(&t.shape, &data.shape),
            BroadcastShapeMismatchSnafu { lhs: data.shape.clone(), rhs: t.shape.clone() }
        );
    }
    Ok(data.clone())
}

/// Width under which an input range of `dtype` values counts as collapsed:
/// the machine epsilon of the float type, or of `f32` otherwise.
pub fn degenerate_epsilon(dtype: DType) -> f32 {
    dtype.epsilon().map_or(f32::EPSILON, |eps| eps as f32)
}

/// Quantize one element.
///
/// Values at or below `input_low` map to `output_low`, values above
/// `input_high` to `output_high`, and the range in between is split into
/// `levels` uniform steps (rounding half away from zero). An input range no
/// wider than `epsilon` degenerates into a step function at `input_low`.
pub fn fake_quantize(
    x: f32,
    [input_low, input_high, output_low, output_high]: [f32; 4],
    levels: u32,
    epsilon: f32,
) -> f32 {
    if (input_high - input_low).abs() <= epsilon {
        return if x <= input_low { output_low } else { output_high };
    }
    if x <= input_low {
        return output_low;
    }
    if x > input_high {
        return output_high;
    }

    let steps = levels.saturating_sub(1).max(1) as f32;
    ((x - input_low) / (input_high - input_low) * steps).round() / steps * (output_high - output_low) + output_low
}
