//! Tests for the quantization fusions.
//!
//! Every fusion test checks numeric equivalence with the reference
//! evaluator: the same inputs give the same results before and after the
//! rewrite.

mod unit;

use std::collections::HashMap;

use qfold_ir::evaluate_results;
use qfold_ir::prelude::*;

pub(crate) fn t(id: NodeId) -> TensorRef {
    id.into()
}

pub(crate) fn constant(g: &mut Graph, shape: &[usize], values: &[f32]) -> NodeId {
    g.constant(ConstTensor::from_f32(shape, values).unwrap())
}

pub(crate) fn scalar(g: &mut Graph, value: f32) -> NodeId {
    g.constant(ConstTensor::scalar_f32(value))
}

pub(crate) fn binary(g: &mut Graph, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
    g.add_node(Op::Binary(op), [t(lhs), t(rhs)]).unwrap()
}

pub(crate) fn fake_quantize(g: &mut Graph, data: NodeId, thresholds: [NodeId; 4], levels: u32) -> NodeId {
    let [il, ih, ol, oh] = thresholds;
    g.add_node(Op::FakeQuantize { levels }, [data, il, ih, ol, oh].map(t)).unwrap()
}

/// Quantization with scalar thresholds.
pub(crate) fn fake_quantize_scalar(g: &mut Graph, data: NodeId, thresholds: [f32; 4], levels: u32) -> NodeId {
    let thresholds = thresholds.map(|v| scalar(g, v));
    fake_quantize(g, data, thresholds, levels)
}

pub(crate) fn conv(g: &mut Graph, attrs: ConvAttrs, data: NodeId, weights: NodeId) -> NodeId {
    g.add_node(Op::Convolution(attrs), [t(data), t(weights)]).unwrap()
}

/// Evaluate the first result with every parameter bound.
pub(crate) fn run(g: &Graph, inputs: &[(NodeId, ConstTensor)]) -> Vec<f32> {
    let inputs: HashMap<_, _> = inputs.iter().cloned().collect();
    evaluate_results(g, &inputs).unwrap().remove(0).to_f32_vec()
}

#[track_caller]
pub(crate) fn assert_close(actual: &[f32], expected: &[f32], tol: f32) {
    assert_eq!(actual.len(), expected.len(), "length mismatch");
    for (i, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!((a - e).abs() <= tol * (1.0 + e.abs()), "element {i}: {a} != {e}");
    }
}

/// Kinds of the live nodes, in topological order.
pub(crate) fn kinds(g: &Graph) -> Vec<OpKind> {
    g.topological_order().into_iter().filter_map(|id| g.node(id)).map(|n| n.kind()).collect()
}

/// Evenly spaced values that avoid rounding ties in the fixtures.
pub(crate) fn ramp(n: usize, start: f32, step: f32) -> Vec<f32> {
    (0..n).map(|i| start + step * i as f32).collect()
}
