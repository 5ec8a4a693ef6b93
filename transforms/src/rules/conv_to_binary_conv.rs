//! Lower a convolution between two binary quantizations to an XNOR-popcount
//! binary convolution over bit-packed weights.
//!
//! With activations `y ∈ {lo, a}` and weights `w = f · s`, `s ∈ {-1, +1}`,
//! the binary convolution computes `Σ sign(y) · s`. The activation range
//! selects the arithmetic:
//! - `{-a, a}`: `conv = a · f · Σ sign(y) · s`, padding contributes nothing.
//! - `{0, a}`: `y / a = (sign(y) + 1) / 2`, so
//!   `conv = a · f · (Σ sign(y) · s + Σ s) / 2` with padding read as `-1`.
//!
//! Any other activation range, and weights that do not quantize to exactly
//! `±1` after normalization, reject the match.

use itertools::Itertools;
use qfold_ir::Result;
use qfold_ir::prelude::*;

use crate::algebra::{self, channel_target, has_zero, is_channel_factor, normalization_factor, pack_bits, uniform};

use super::{OrReject, bound_constant, reject};

pub const NAME: &str = "binary_convolution";

pub fn pattern() -> Pat {
    let act = Pat::fake_quantize(
        Pat::wildcard(),
        [Pat::wildcard(), Pat::wildcard(), Pat::cvar("act_low"), Pat::cvar("act_high")],
    )
    .with_predicate(levels(2))
    .named("act");
    let weights = Pat::fake_quantize(
        Pat::cvar("weights"),
        [Pat::cvar("w_in_low"), Pat::cvar("w_in_high"), Pat::cvar("w_low"), Pat::cvar("w_high")],
    )
    .with_predicate(levels(2));
    Pat::convolution(act, weights)
}

pub fn rule() -> RewriteRule {
    RewriteRule::new(NAME, pattern(), |m, rw| fuse(m, rw).into())
}

/// How the activation range maps onto the XNOR result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Activations in `{0, a}`: add the weight sum, halve.
    Centered,
    /// Activations in `{-a, a}`.
    Direct,
}

impl Mode {
    fn pad_value(self) -> f32 {
        match self {
            Mode::Centered => -1.0,
            Mode::Direct => 0.0,
        }
    }
}

/// Everything the replacement needs, computed before staging.
struct Lowering {
    mode: Mode,
    attrs: ConvAttrs,
    /// Normalized weights, every element `±1`.
    quantized: ConstTensor,
    packed: ConstTensor,
    /// `a · f`, scalar or per output channel.
    scale: ConstTensor,
}

fn fuse(m: &Match<'_>, rw: &mut Rewriter<'_>) -> Option<Value> {
    let graph = rw.graph();
    let Op::Convolution(attrs) = graph.node(m.root())?.op() else {
        return None;
    };
    let constant = |name: &str| bound_constant(graph, m, name);
    let (act_low, act_high) = (constant("act_low")?, constant("act_high")?);
    let weights = constant("weights")?;
    let [w_in_low, w_in_high, w_low, w_high] = ["w_in_low", "w_in_high", "w_low", "w_high"].map(constant);
    let (w_in_low, w_in_high, w_low, w_high) = (w_in_low?, w_in_high?, w_low?, w_high?);

    // Activation range
    let Some(a) = uniform(act_high).filter(|&a| a > 0.0) else {
        return reject(NAME, "activation high threshold is not one positive value");
    };
    let mode = match uniform(act_low) {
        Some(low) if low == 0.0 => Mode::Centered,
        Some(low) if low == -a => Mode::Direct,
        _ => return reject(NAME, "activation range is neither {0, a} nor {-a, a}"),
    };

    // Weight normalization
    let Some(factor) = normalization_factor(w_low, w_high) else {
        return reject(NAME, "weight thresholds are neither symmetric nor one-sided");
    };
    if has_zero(factor) || !is_channel_factor(factor, weights.shape()) {
        return reject(NAME, "weight factor is zero or not per output channel");
    }
    let norm_low = algebra::binary(BinaryOp::Div, w_low, factor).or_reject(NAME)?;
    let norm_high = algebra::binary(BinaryOp::Div, w_high, factor).or_reject(NAME)?;
    let quantized =
        algebra::quantize_weights(weights, [w_in_low, w_in_high, &norm_low, &norm_high]).or_reject(NAME)?;
    let Some(bits) = pack_bits(&quantized.to_f32_vec()) else {
        return reject(NAME, "quantized weights are not exactly ±1");
    };
    let packed = ConstTensor::packed_bits(weights.shape(), bits).or_reject(NAME)?;

    let a = algebra::scalar_like(factor, a).or_reject(NAME)?;
    let scale = algebra::binary(BinaryOp::Mul, &a, factor).or_reject(NAME)?;

    let act = m.get("act")?;
    let lowering = Lowering { mode, attrs: attrs.clone(), quantized, packed, scale };
    stage(rw, act, lowering).or_reject(NAME)
}

fn stage(rw: &mut Rewriter<'_>, act: TensorRef, lowering: Lowering) -> Result<Value> {
    let Lowering { mode, attrs, quantized, packed, scale } = lowering;
    let kernel_rank = quantized.shape().len();
    let dtype = quantized.dtype();

    let bits = rw.constant(packed);
    let attrs = BinaryConvAttrs { conv: attrs, mode: BinaryConvMode::XnorPopcount, pad_value: mode.pad_value() };
    let conv = rw.add(Op::BinaryConvolution(attrs), [act.into(), bits])?;
    let target = channel_target(rw.info(conv)?.rank());

    let unscaled = match mode {
        Mode::Direct => conv,
        Mode::Centered => {
            let weights = rw.constant(quantized);
            let axes = rw.constant(ConstTensor::i64_vector(&(1..kernel_rank as i64).collect_vec()));
            let sum = rw.add(Op::ReduceSum { keep_dims: false }, [weights, axes])?;
            let correction = rw.reshape(sum, &target)?;
            let shifted = rw.binary(BinaryOp::Add, conv, correction)?;
            let half = rw.constant(ConstTensor::from_f32_as(dtype, &[], &[0.5])?);
            rw.binary(BinaryOp::Mul, shifted, half)?
        }
    };

    let scale = rw.constant(scale);
    let scale = rw.reshape(scale, &target)?;
    rw.binary(BinaryOp::Mul, unscaled, scale)
}
