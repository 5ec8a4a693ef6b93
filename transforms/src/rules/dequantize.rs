//! Express integer dequantization as a quantization node.
//!
//! `(convert(q) - zero_point) * scale` over an 8-bit `q` takes one of
//! `max - min + 1` evenly spaced values, which is exactly a quantization node
//! with `input = [min, max]` and `output = [(min - zp) * scale, (max - zp) * scale]`
//! applied to `convert(q)`.
//!
//! The output low is taken at the type minimum, `(min - zp) * scale`. For
//! `u8` the minimum is zero and this is the usual `-zp * scale`; for `i8` it
//! keeps every representable value on its exact level.

use qfold_ir::Result;
use qfold_ir::prelude::*;

use super::{OrReject, reject, same_info};

pub const NAME: &str = "dequantize";

pub fn pattern() -> Pat {
    let convert = Pat::convert(Pat::var("q")).named("convert");
    let shifted = Pat::binary(BinaryOp::Sub, [convert, Pat::cvar("zero_point")]).with_predicate(consumers_count(1));
    Pat::commutative(BinaryOp::Mul, [shifted, Pat::cvar("scale")])
}

pub fn rule() -> RewriteRule {
    RewriteRule::new(NAME, pattern(), |m, rw| fuse(m, rw).into())
}

fn fuse(m: &Match<'_>, rw: &mut Rewriter<'_>) -> Option<Value> {
    let graph = rw.graph();
    let (q, convert) = (m.get("q")?, m.get("convert")?);
    let source = graph.output_info(q).ok()?.dtype;
    if !matches!(source, DType::Int8 | DType::UInt8) {
        return reject(NAME, "only 8-bit integer sources are supported");
    }
    if !same_info(graph, convert, m.root().into()) {
        return reject(NAME, "dequantization broadcasts its integer operand");
    }
    let (min, max) = source.int_range()?;
    let levels = u32::try_from(source.int_levels()?).ok()?;
    let float = graph.output_info(convert).ok()?.dtype;
    let (zero_point, scale) = (m.get("zero_point")?, m.get("scale")?);

    stage(rw, float, levels, (min as f32, max as f32), convert, zero_point, scale).or_reject(NAME)
}

fn stage(
    rw: &mut Rewriter<'_>,
    float: DType,
    levels: u32,
    (min, max): (f32, f32),
    convert: TensorRef,
    zero_point: TensorRef,
    scale: TensorRef,
) -> Result<Value> {
    let scalar = |v: f32| ConstTensor::from_f32_as(float, &[], &[v]);

    let input_low = rw.constant(scalar(min)?);
    let input_high = rw.constant(scalar(max)?);
    let shifted = rw.binary(BinaryOp::Sub, input_low, zero_point)?;
    let output_low = rw.binary(BinaryOp::Mul, shifted, scale)?;
    let steps = rw.constant(scalar((levels - 1) as f32)?);
    let span = rw.binary(BinaryOp::Mul, scale, steps)?;
    let output_high = rw.binary(BinaryOp::Add, span, output_low)?;

    rw.add(Op::FakeQuantize { levels }, [convert.into(), input_low, input_high, output_low, output_high])
}
