//! Threshold algebra shared by the fusion rules.
//!
//! Everything here works on constant tensors; the rules call it after the
//! matcher has proven that the thresholds involved are static.

use std::iter;

use itertools::Itertools;
use qfold_ir::error::{BroadcastShapeMismatchSnafu, Result};
use qfold_ir::ops::{degenerate_epsilon, elementwise, fake_quantize};
use qfold_ir::shape::{broadcast_index, broadcast_shapes, broadcasts_to, numel};
use qfold_ir::{BinaryOp, ConstTensor, DType, Op, OutputInfo, Shape, eval};

// ============================================================================
// SIGN CLASSIFICATION
// ============================================================================

/// Zero/symmetry regimes of a pair of output thresholds, compared elementwise
/// after broadcasting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ThresholdSigns {
    /// Every low threshold is zero.
    pub low_is_zero: bool,
    /// Every high threshold is zero.
    pub high_is_zero: bool,
    /// `low == -high` everywhere.
    pub opposite: bool,
}

impl ThresholdSigns {
    /// Classify `low`/`high`. `None` when the two do not broadcast together.
    pub fn classify(low: &ConstTensor, high: &ConstTensor) -> Option<Self> {
        let shape = broadcast_shapes(low.shape(), high.shape()).ok()?;
        let (lo, hi) = (low.to_f32_vec(), high.to_f32_vec());
        let pairs = (0..numel(&shape))
            .map(|i| (lo[broadcast_index(i, &shape, low.shape())], hi[broadcast_index(i, &shape, high.shape())]))
            .collect_vec();

        Some(Self {
            low_is_zero: pairs.iter().all(|&(l, _)| l == 0.0),
            high_is_zero: pairs.iter().all(|&(_, h)| h == 0.0),
            opposite: pairs.iter().all(|&(l, h)| l == -h),
        })
    }

    /// Symmetric, or one-sided from zero on exactly one side.
    pub fn is_valid(&self) -> bool {
        self.opposite || self.low_is_zero != self.high_is_zero
    }

    /// The threshold tensor to normalize by: `low` when the high side is zero.
    pub fn factor<'t>(&self, low: &'t ConstTensor, high: &'t ConstTensor) -> &'t ConstTensor {
        if self.high_is_zero { low } else { high }
    }
}

/// Normalization factor of a valid threshold pair.
///
/// Dividing both thresholds by it maps the range into `{-1, 0, 1}`.
pub fn normalization_factor<'t>(low: &'t ConstTensor, high: &'t ConstTensor) -> Option<&'t ConstTensor> {
    let signs = ThresholdSigns::classify(low, high)?;
    signs.is_valid().then(|| signs.factor(low, high))
}

// ============================================================================
// QUANTIZATION
// ============================================================================

/// Two-level quantization of one `f32` value.
pub fn quantize(w: f32, input_low: f32, input_high: f32, output_low: f32, output_high: f32) -> f32 {
    quantize_as(DType::Float32, w, [input_low, input_high, output_low, output_high])
}

/// Two-level quantization of one value of `dtype`; the degenerate range
/// tolerance follows the dtype.
pub fn quantize_as(dtype: DType, w: f32, thresholds: [f32; 4]) -> f32 {
    fake_quantize(w, thresholds, 2, degenerate_epsilon(dtype))
}

/// Two-level quantization of a whole constant with broadcast thresholds
/// `[input_low, input_high, output_low, output_high]`.
///
/// The result keeps the dtype and shape of `weights`.
pub fn quantize_weights(weights: &ConstTensor, thresholds: [&ConstTensor; 4]) -> Result<ConstTensor> {
    let shape = weights.shape();
    for t in thresholds {
        snafu::ensure!(
            broadcasts_to(t.shape(), shape),
            BroadcastShapeMismatchSnafu { lhs: shape.clone(), rhs: t.shape().clone() }
        );
    }

    let [il, ih, ol, oh] = thresholds.map(|t| (t.to_f32_vec(), t.shape()));
    let at = |(data, operand): &(Vec<f32>, &Shape), i: usize| data[broadcast_index(i, shape, operand)];
    let values = weights
        .to_f32_vec()
        .into_iter()
        .enumerate()
        .map(|(i, w)| quantize_as(weights.dtype(), w, [at(&il, i), at(&ih, i), at(&ol, i), at(&oh, i)]))
        .collect_vec();
    ConstTensor::from_f32_as(weights.dtype(), shape, &values)
}

/// Pack `±1` values eight per byte: bit `j % 8` of byte `j / 8` is set for `+1`.
///
/// `None` if any value is not exactly `+1` or `-1`.
pub fn pack_bits(values: &[f32]) -> Option<Vec<u8>> {
    let mut bytes = vec![0u8; values.len().div_ceil(8)];
    for (j, &v) in values.iter().enumerate() {
        if v == 1.0 {
            bytes[j / 8] |= 1 << (j % 8);
        } else if v != -1.0 {
            return None;
        }
    }
    Some(bytes)
}

// ============================================================================
// CONSTANT HELPERS
// ============================================================================

/// Elementwise binary op on two constants, with broadcasting.
pub fn binary(op: BinaryOp, lhs: &ConstTensor, rhs: &ConstTensor) -> Result<ConstTensor> {
    let info = elementwise::binary(op, &info_of(lhs), &info_of(rhs))?;
    eval::compute(&Op::Binary(op), &[lhs, rhs], &info)
}

/// Rank-0 constant of `like`'s dtype.
pub fn scalar_like(like: &ConstTensor, value: f32) -> Result<ConstTensor> {
    ConstTensor::from_f32_as(like.dtype(), &[], &[value])
}

/// The single value shared by every element.
pub fn uniform(tensor: &ConstTensor) -> Option<f32> {
    tensor.to_f32_vec().into_iter().all_equal_value().ok()
}

pub fn has_zero(tensor: &ConstTensor) -> bool {
    tensor.to_f32_vec().contains(&0.0)
}

/// Whether `factor` is a scalar or one value per output channel of an
/// `OIHW...` kernel, laid out as `[O, 1, 1, ...]`.
pub fn is_channel_factor(factor: &ConstTensor, kernel: &[usize]) -> bool {
    let shape = factor.shape();
    factor.numel() == 1
        || (shape.len() == kernel.len() && shape[0] == kernel[0] && shape[1..].iter().all(|&d| d == 1))
}

/// Reshape target aligning a per-channel vector with the channel axis of a
/// convolution output of `rank` dimensions: `[-1, 1, 1, ...]`.
pub fn channel_target(rank: usize) -> Vec<i64> {
    iter::once(-1).chain(iter::repeat_n(1, rank.saturating_sub(2))).collect()
}

fn info_of(tensor: &ConstTensor) -> OutputInfo {
    OutputInfo::new(tensor.dtype(), tensor.shape().clone())
}
