//! Fold a constant multiply into the quantization that follows it.
//!
//! `fq(x * c, il, ih, ol, oh)` becomes `fq(x, il / c, ih / c, ol, oh)`.
//! Dividing by a negative element reverses the input range, so for those
//! elements the divided input thresholds trade places and so do the output
//! thresholds. When only some elements are negative the swap is blended in
//! through `0/1` masks.

use qfold_ir::prelude::*;
use qfold_ir::Result;

use super::{OrReject, bound_constant, fq_levels, reject, same_info};

pub const NAME: &str = "mul_fake_quantize";

pub fn pattern() -> Pat {
    let mul = Pat::commutative(BinaryOp::Mul, [Pat::var("x"), Pat::cvar("c")])
        .with_predicate(consumers_count(1))
        .named("mul");
    Pat::fake_quantize(mul, [Pat::var("il"), Pat::var("ih"), Pat::var("ol"), Pat::var("oh")])
}

pub fn rule() -> RewriteRule {
    RewriteRule::new(NAME, pattern(), |m, rw| fuse(m, rw).into())
}

/// Signs present in the multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signs {
    NonNegative,
    Negative,
    Mixed,
}

fn fuse(m: &Match<'_>, rw: &mut Rewriter<'_>) -> Option<Value> {
    let graph = rw.graph();
    let levels = fq_levels(graph, m.root())?;
    let (x, c) = (m.get("x")?, m.get("c")?);
    let scale = bound_constant(graph, m, "c")?.to_f32_vec();

    if scale.contains(&0.0) {
        return reject(NAME, "multiplier has a zero element");
    }
    if !same_info(graph, x, m.get("mul")?) {
        return reject(NAME, "multiply broadcasts its data operand");
    }

    let signs = match scale.iter().filter(|&&v| v < 0.0).count() {
        0 => Signs::NonNegative,
        n if n == scale.len() => Signs::Negative,
        _ => Signs::Mixed,
    };
    let thresholds = ["il", "ih", "ol", "oh"].map(|name| m.get(name).map(Value::from));
    let [Some(il), Some(ih), Some(ol), Some(oh)] = thresholds else {
        return None;
    };
    stage(rw, signs, levels, x.into(), c.into(), [il, ih, ol, oh]).or_reject(NAME)
}

fn stage(
    rw: &mut Rewriter<'_>,
    signs: Signs,
    levels: u32,
    x: Value,
    c: Value,
    [il, ih, ol, oh]: [Value; 4],
) -> Result<Value> {
    let il_c = rw.binary(BinaryOp::Div, il, c)?;
    let ih_c = rw.binary(BinaryOp::Div, ih, c)?;

    let thresholds = match signs {
        Signs::NonNegative => [il_c, ih_c, ol, oh],
        Signs::Negative => [ih_c, il_c, oh, ol],
        Signs::Mixed => {
            let dtype = rw.info(c)?.dtype;
            let zero = rw.constant(ConstTensor::from_f32_as(dtype, &[], &[0.0])?);
            let negative = rw.binary(BinaryOp::Less, c, zero)?;
            let negative = rw.convert(negative, dtype)?;
            let positive = rw.binary(BinaryOp::GreaterEqual, c, zero)?;
            let positive = rw.convert(positive, dtype)?;
            let masks = (positive, negative);
            [
                select(rw, masks, il_c, ih_c)?,
                select(rw, masks, ih_c, il_c)?,
                select(rw, masks, ol, oh)?,
                select(rw, masks, oh, ol)?,
            ]
        }
    };

    let [il, ih, ol, oh] = thresholds;
    rw.add(Op::FakeQuantize { levels }, [x, il, ih, ol, oh])
}

/// `positive * on_positive + negative * on_negative`.
fn select(rw: &mut Rewriter<'_>, (positive, negative): (Value, Value), on_positive: Value, on_negative: Value) -> Result<Value> {
    let kept = rw.binary(BinaryOp::Mul, positive, on_positive)?;
    let swapped = rw.binary(BinaryOp::Mul, negative, on_negative)?;
    rw.binary(BinaryOp::Add, kept, swapped)
}
