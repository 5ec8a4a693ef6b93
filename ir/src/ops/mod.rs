//! Output type and shape inference for every operator.
//!
//! Inference runs when a node is constructed, both on the live graph and on
//! staged rewrite nodes, so an ill-formed replacement fails before it can be
//! spliced in.
//!
//! - `elementwise`: broadcasting binary ops, comparisons, conversion
//! - `movement`: reshape
//! - `reduction`: sum reduction
//! - `conv`: float and binary convolution
//! - `quantize`: fake quantization

use smallvec::{SmallVec, smallvec};
use snafu::OptionExt;

use crate::error::{InputCountSnafu, NotConstantSnafu, Result};
use crate::graph::OutputInfo;
use crate::op::Op;
use crate::tensor::ConstTensor;
use crate::types::OpKind;

pub mod conv;
pub mod elementwise;
pub mod movement;
pub mod quantize;
pub mod reduction;

pub use quantize::{degenerate_epsilon, fake_quantize};

/// An operand as seen by inference: its type and shape, plus the static value
/// when the producer is a constant.
#[derive(Debug, Clone, Copy)]
pub struct Operand<'a> {
    pub info: &'a OutputInfo,
    pub value: Option<&'a ConstTensor>,
}

/// Infer the outputs of `op` applied to `inputs`.
pub fn infer(op: &Op, inputs: &[Operand<'_>]) -> Result<SmallVec<[OutputInfo; 1]>> {
    snafu::ensure!(
        inputs.len() == op.arity(),
        InputCountSnafu { kind: op.kind(), expected: op.arity(), actual: inputs.len() }
    );

    let info = match op {
        Op::Parameter { dtype, shape } => OutputInfo::new(*dtype, shape.clone()),
        Op::Constant(tensor) => OutputInfo::new(tensor.dtype(), tensor.shape().clone()),
        Op::Binary(binary) => elementwise::binary(*binary, inputs[0].info, inputs[1].info)?,
        Op::Convert { dtype } => elementwise::convert(*dtype, inputs[0].info)?,
        Op::Reshape { special_zero } => movement::reshape(*special_zero, inputs[0].info, &inputs[1])?,
        Op::ReduceSum { keep_dims } => reduction::reduce_sum(*keep_dims, inputs[0].info, &inputs[1])?,
        Op::Convolution(attrs) => conv::convolution(attrs, inputs[0].info, inputs[1].info)?,
        Op::BinaryConvolution(attrs) => conv::binary_convolution(attrs, inputs[0].info, inputs[1].info)?,
        Op::FakeQuantize { levels } => quantize::fake_quantize_info(*levels, inputs)?,
    };
    Ok(smallvec![info])
}

/// Integer payload of a shape-defining operand.
pub(crate) fn static_ints(kind: OpKind, operand: &Operand<'_>, input: usize) -> Result<Vec<i64>> {
    operand
        .value
        .filter(|t| t.dtype().is_int() && t.shape().len() <= 1)
        .and_then(ConstTensor::to_i64_vec)
        .context(NotConstantSnafu { kind, input })
}
