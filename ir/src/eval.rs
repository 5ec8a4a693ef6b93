//! Reference interpreter.
//!
//! Evaluates every node of a graph in `f32`, in topological order, and
//! returns the value of every output. Slow and straightforward; it exists so
//! that a rewrite can be checked to preserve numeric behavior.

use std::collections::HashMap;

use smallvec::SmallVec;
use snafu::OptionExt;

use crate::error::{MissingInputSnafu, NotConstantSnafu, Result, UnknownNodeSnafu};
use crate::graph::{Graph, NodeId, OutputInfo, TensorRef};
use crate::op::Op;
use crate::ops::{degenerate_epsilon, fake_quantize};
use crate::shape::{broadcast_index, normalize_axes, numel, strides};
use crate::tensor::ConstTensor;
use crate::types::{BinaryConvAttrs, ConvAttrs, OpKind};

/// Values of every output, keyed by tensor.
pub type Values = HashMap<TensorRef, ConstTensor>;

/// Evaluate the whole graph.
///
/// `inputs` supplies one tensor per parameter; it is cast to the parameter's
/// dtype and must have the parameter's element count.
pub fn evaluate(graph: &Graph, inputs: &HashMap<NodeId, ConstTensor>) -> Result<Values> {
    let mut values = Values::with_capacity(graph.len());
    for id in graph.topological_order() {
        let node = graph.node(id).context(UnknownNodeSnafu { node: id })?;
        let info = &node.outputs()[0];
        let value = match node.op() {
            Op::Parameter { dtype, shape } => {
                inputs.get(&id).context(MissingInputSnafu { node: id })?.cast(*dtype)?.reshaped(shape)?
            }
            op => {
                let args = node
                    .inputs()
                    .iter()
                    .map(|t| values.get(t).context(UnknownNodeSnafu { node: t.node }))
                    .collect::<Result<SmallVec<[&ConstTensor; 5]>>>()?;
                compute(op, &args, info)?
            }
        };
        values.insert(TensorRef::new(id, 0), value);
    }
    tracing::trace!(nodes = values.len(), "graph evaluated");
    Ok(values)
}

/// Apply one operator to constant operands.
///
/// `info` is the inferred output of `op`; parameters have no value to compute.
pub fn compute(op: &Op, args: &[&ConstTensor], info: &OutputInfo) -> Result<ConstTensor> {
    let value = match op {
        Op::Parameter { .. } => return NotConstantSnafu { kind: OpKind::Parameter, input: 0usize }.fail(),
        Op::Constant(tensor) => tensor.clone(),
        Op::Binary(op) => {
            let (lhs, rhs) = (args[0], args[1]);
            let (a, b) = (lhs.to_f32_vec(), rhs.to_f32_vec());
            let out = (0..numel(&info.shape))
                .map(|i| {
                    let x = a[broadcast_index(i, &info.shape, lhs.shape())];
                    let y = b[broadcast_index(i, &info.shape, rhs.shape())];
                    op.apply(x, y)
                })
                .collect::<Vec<_>>();
            output(info, &out)?
        }
        Op::Convert { dtype } => args[0].cast(*dtype)?,
        Op::Reshape { .. } => args[0].reshaped(&info.shape)?,
        Op::ReduceSum { .. } => {
            let axes = args[1].to_i64_vec().context(NotConstantSnafu { kind: OpKind::ReduceSum, input: 1usize })?;
            reduce_sum(args[0], &axes, info)?
        }
        Op::FakeQuantize { levels } => {
            let x = args[0].to_f32_vec();
            let thresholds = args[1..].iter().map(|t| (t.to_f32_vec(), t.shape())).collect::<SmallVec<[_; 4]>>();
            let at = |k: usize, i: usize| {
                let (data, shape) = &thresholds[k];
                data[broadcast_index(i, &info.shape, shape)]
            };
            let epsilon = degenerate_epsilon(info.dtype);
            let out = x
                .iter()
                .enumerate()
                .map(|(i, &v)| fake_quantize(v, [at(0, i), at(1, i), at(2, i), at(3, i)], *levels, epsilon))
                .collect::<Vec<_>>();
            output(info, &out)?
        }
        Op::Convolution(attrs) => {
            let weights = args[1].to_f32_vec();
            let out = convolve(attrs, args[0], args[1].shape(), &info.shape, |x, w| x.map_or(0.0, |x| x * weights[w]));
            output(info, &out)?
        }
        Op::BinaryConvolution(attrs) => {
            let out = convolve(&attrs.conv, args[0], args[1].shape(), &info.shape, |x, w| {
                binary_tap(attrs, x, args[1].bit(w).unwrap_or(false))
            });
            output(info, &out)?
        }
    };
    Ok(value)
}

/// Evaluate and return the graph results in order.
pub fn evaluate_results(graph: &Graph, inputs: &HashMap<NodeId, ConstTensor>) -> Result<Vec<ConstTensor>> {
    let values = evaluate(graph, inputs)?;
    graph
        .results()
        .iter()
        .map(|t| values.get(t).cloned().context(UnknownNodeSnafu { node: t.node }))
        .collect()
}

fn output(info: &OutputInfo, values: &[f32]) -> Result<ConstTensor> {
    ConstTensor::from_f32_as(info.dtype, &info.shape, values)
}

/// Coordinates of a flat row-major index.
fn unravel(mut flat: usize, shape: &[usize]) -> SmallVec<[usize; 4]> {
    let mut coords = SmallVec::from_elem(0, shape.len());
    for (axis, &dim) in shape.iter().enumerate().rev() {
        coords[axis] = flat % dim.max(1);
        flat /= dim.max(1);
    }
    coords
}

fn reduce_sum(src: &ConstTensor, axes: &[i64], info: &OutputInfo) -> Result<ConstTensor> {
    let shape = src.shape();
    let axes = normalize_axes(axes, shape.len())?;
    let kept: SmallVec<[usize; 4]> =
        shape.iter().enumerate().map(|(axis, &d)| if axes.contains(&axis) { 1 } else { d }).collect();
    let kept_strides = strides(&kept);

    let mut out = vec![0.0f32; numel(&info.shape)];
    for (i, v) in src.to_f32_vec().into_iter().enumerate() {
        let target: usize = unravel(i, shape)
            .iter()
            .enumerate()
            .filter(|(axis, _)| !axes.contains(axis))
            .map(|(axis, c)| c * kept_strides[axis])
            .sum();
        out[target] += v;
    }
    output(info, &out)
}

/// Contribution of one binary-convolution tap.
///
/// Activations binarize at zero; padded taps take the sign of `pad_value`, or
/// contribute nothing when it is zero.
fn binary_tap(attrs: &BinaryConvAttrs, x: Option<f32>, weight_bit: bool) -> f32 {
    let act = match x {
        Some(x) => x > 0.0,
        None if attrs.pad_value == 0.0 => return 0.0,
        None => attrs.pad_value > 0.0,
    };
    if act == weight_bit { 1.0 } else { -1.0 }
}

/// N-D NCHW convolution with one group.
///
/// `tap` receives the input value (`None` on a padded position) and the flat
/// index of the weight element.
fn convolve(
    attrs: &ConvAttrs,
    data: &ConstTensor,
    weights: &[usize],
    out_shape: &[usize],
    tap: impl Fn(Option<f32>, usize) -> f32,
) -> Vec<f32> {
    let input = data.to_f32_vec();
    let dshape = data.shape();
    let (batch, channels) = (dshape[0], dshape[1]);
    let filters = weights[0];
    let (in_sp, k_sp, out_sp) = (&dshape[2..], &weights[2..], &out_shape[2..]);
    let (pads_begin, _) = attrs.resolve_pads(in_sp, k_sp);
    let (d_strides, w_strides) = (strides(dshape), strides(weights));

    let mut out = Vec::with_capacity(numel(out_shape));
    for n in 0..batch {
        for f in 0..filters {
            for pos in 0..numel(out_sp) {
                let pos = unravel(pos, out_sp);
                let mut acc = 0.0;
                for c in 0..channels {
                    for k in 0..numel(k_sp) {
                        let k = unravel(k, k_sp);
                        let mut w_index = f * w_strides[0] + c * w_strides[1];
                        let mut d_index = Some(n * d_strides[0] + c * d_strides[1]);
                        for axis in 0..k.len() {
                            w_index += k[axis] * w_strides[axis + 2];
                            let at = (pos[axis] * attrs.strides[axis] + k[axis] * attrs.dilations[axis]) as isize
                                - pads_begin[axis] as isize;
                            d_index = d_index.filter(|_| (0..in_sp[axis] as isize).contains(&at)).map(|d| {
                                d + at.max(0) as usize * d_strides[axis + 2]
                            });
                        }
                        acc += tap(d_index.map(|i| input[i]), w_index);
                    }
                }
                out.push(acc);
            }
        }
    }
    out
}
