//! Normalize binary quantization around a convolution.
//!
//! A two-level quantization whose output range is symmetric or one-sided
//! from zero equals a normalization factor times a range inside `{-1, 0, 1}`.
//! The factors move past the convolution, which is linear in each operand:
//!
//! ```text
//! conv(fq_a(x), fq_w(W))  ->  conv(fq_a'(x), Wq) * a * f
//! ```
//!
//! `fq_a'` has its output thresholds divided by the activation factor `a`,
//! `Wq` is the weight constant quantized into the normalized range and `f`
//! is the weight factor, reshaped onto the channel axis. The weights-only
//! variant handles convolutions whose activation is not a binary
//! quantization, or whose activation range does not normalize.

use qfold_ir::Result;
use qfold_ir::prelude::*;

use crate::algebra::{self, channel_target, has_zero, is_channel_factor, normalization_factor, uniform};

use super::{OrReject, bound_constant, reject};

pub const NAME: &str = "binarize_weights";
pub const WEIGHTS_ONLY: &str = "binarize_weights_only";

fn weights_pattern() -> Pat {
    Pat::fake_quantize(
        Pat::cvar("weights"),
        [Pat::cvar("w_in_low"), Pat::cvar("w_in_high"), Pat::cvar("w_low"), Pat::cvar("w_high")],
    )
    .with_predicate(levels(2))
    .with_predicate(consumers_count(1))
}

pub fn pattern() -> Pat {
    let act = Pat::fake_quantize(
        Pat::var("x"),
        [Pat::var("act_in_low"), Pat::var("act_in_high"), Pat::cvar("act_low"), Pat::cvar("act_high")],
    )
    .with_predicate(levels(2));
    Pat::convolution(act, weights_pattern())
}

pub fn weights_only_pattern() -> Pat {
    Pat::convolution(Pat::var("data"), weights_pattern())
}

pub fn rule() -> RewriteRule {
    RewriteRule::new(NAME, pattern(), |m, rw| fuse(m, rw).into())
}

pub fn weights_only_rule() -> RewriteRule {
    RewriteRule::new(WEIGHTS_ONLY, weights_only_pattern(), |m, rw| fuse_weights_only(m, rw).into())
}

/// Normalized weights and the factor that restores their scale.
struct NormalizedWeights {
    attrs: ConvAttrs,
    quantized: ConstTensor,
    factor: ConstTensor,
}

fn normalize_weights(rule: &str, m: &Match<'_>, graph: &Graph) -> Option<NormalizedWeights> {
    let Op::Convolution(attrs) = graph.node(m.root())?.op() else {
        return None;
    };
    let constant = |name: &str| bound_constant(graph, m, name);
    let weights = constant("weights")?;
    let (w_in_low, w_in_high) = (constant("w_in_low")?, constant("w_in_high")?);
    let (w_low, w_high) = (constant("w_low")?, constant("w_high")?);

    let Some(factor) = normalization_factor(w_low, w_high) else {
        return reject(rule, "weight thresholds are neither symmetric nor one-sided");
    };
    if has_zero(factor) || !is_channel_factor(factor, weights.shape()) {
        return reject(rule, "weight factor is zero or not per output channel");
    }
    let norm_low = algebra::binary(BinaryOp::Div, w_low, factor).or_reject(rule)?;
    let norm_high = algebra::binary(BinaryOp::Div, w_high, factor).or_reject(rule)?;
    let quantized = algebra::quantize_weights(weights, [w_in_low, w_in_high, &norm_low, &norm_high]).or_reject(rule)?;

    Some(NormalizedWeights { attrs: attrs.clone(), quantized, factor: factor.clone() })
}

fn fuse(m: &Match<'_>, rw: &mut Rewriter<'_>) -> Option<Value> {
    let graph = rw.graph();
    let (act_low, act_high) = (bound_constant(graph, m, "act_low")?, bound_constant(graph, m, "act_high")?);
    let Some(act_factor) = normalization_factor(act_low, act_high) else {
        return reject(NAME, "activation thresholds are neither symmetric nor one-sided");
    };
    let Some(a) = uniform(act_factor).filter(|&a| a != 0.0) else {
        return reject(NAME, "activation factor is zero or not one value");
    };
    let weights = normalize_weights(NAME, m, graph)?;

    let [Some(x), Some(in_low), Some(in_high), Some(low), Some(high)] =
        ["x", "act_in_low", "act_in_high", "act_low", "act_high"].map(|n| m.get(n))
    else {
        return None;
    };
    let a = algebra::scalar_like(act_low, a).or_reject(NAME)?;
    stage(rw, weights, a, [x, in_low, in_high, low, high]).or_reject(NAME)
}

fn stage(
    rw: &mut Rewriter<'_>,
    weights: NormalizedWeights,
    a: ConstTensor,
    [x, in_low, in_high, low, high]: [TensorRef; 5],
) -> Result<Value> {
    let a = rw.constant(a);
    let low = rw.binary(BinaryOp::Div, low, a)?;
    let high = rw.binary(BinaryOp::Div, high, a)?;
    let act = rw.add(Op::FakeQuantize { levels: 2 }, [x.into(), in_low.into(), in_high.into(), low, high])?;

    let conv = convolve(rw, act, &weights)?;
    let target = channel_target(rw.info(conv)?.rank());
    let act_scale = rw.reshape(a, &target)?;
    let scaled = rw.binary(BinaryOp::Mul, conv, act_scale)?;
    rescale(rw, scaled, weights.factor, &target)
}

fn fuse_weights_only(m: &Match<'_>, rw: &mut Rewriter<'_>) -> Option<Value> {
    let weights = normalize_weights(WEIGHTS_ONLY, m, rw.graph())?;
    let data = m.get("data")?;
    stage_weights_only(rw, weights, data).or_reject(WEIGHTS_ONLY)
}

fn stage_weights_only(rw: &mut Rewriter<'_>, weights: NormalizedWeights, data: TensorRef) -> Result<Value> {
    let conv = convolve(rw, data.into(), &weights)?;
    let target = channel_target(rw.info(conv)?.rank());
    rescale(rw, conv, weights.factor, &target)
}

fn convolve(rw: &mut Rewriter<'_>, data: Value, weights: &NormalizedWeights) -> Result<Value> {
    let kernel = rw.constant(weights.quantized.clone());
    rw.add(Op::Convolution(weights.attrs.clone()), [data, kernel])
}

/// Multiply by the weight factor laid out along the channel axis.
fn rescale(rw: &mut Rewriter<'_>, value: Value, factor: ConstTensor, target: &[i64]) -> Result<Value> {
    let factor = rw.constant(factor);
    let factor = rw.reshape(factor, target)?;
    rw.binary(BinaryOp::Mul, value, factor)
}
