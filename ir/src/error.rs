use qfold_dtype::DType;
use snafu::Snafu;

use crate::graph::{Graph, NodeId, TensorRef};
use crate::shape::Shape;
use crate::types::OpKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Node id does not refer to a live node.
    #[snafu(display("unknown node {node:?}"))]
    UnknownNode { node: NodeId },

    /// Output index past the producer's output count.
    #[snafu(display("output {} of node {:?} requested but the node has {outputs} outputs", tensor.output, tensor.node))]
    OutputOutOfRange { tensor: TensorRef, outputs: usize },

    /// Staged value refers to a node that was not staged (or not yet).
    #[snafu(display("staged value {index}:{output} does not exist"))]
    UnknownStaged { index: u32, output: u32 },

    /// Wrong number of inputs for an operator.
    #[snafu(display("{kind} expects {expected} inputs, got {actual}"))]
    InputCount { kind: OpKind, expected: usize, actual: usize },

    /// DType mismatch between operands.
    #[snafu(display("dtype mismatch: cannot perform operation on {lhs:?} and {rhs:?}"))]
    DTypeMismatch { lhs: DType, rhs: DType },

    /// Operator does not accept this element type.
    #[snafu(display("{kind} does not support dtype {dtype}"))]
    UnsupportedDType { kind: OpKind, dtype: DType },

    /// Broadcasting shape mismatch.
    #[snafu(display("cannot broadcast shapes {lhs:?} and {rhs:?}"))]
    BroadcastShapeMismatch { lhs: Shape, rhs: Shape },

    /// A shape-defining operand is not a constant.
    #[snafu(display("input {input} of {kind} must be an integer constant"))]
    NotConstant { kind: OpKind, input: usize },

    /// Reshape size mismatch.
    #[snafu(display("reshape size mismatch: input size {input_size} != output size {output_size}"))]
    ReshapeSizeMismatch { input_size: usize, output_size: usize },

    /// Reshape target pattern cannot be resolved.
    #[snafu(display("invalid reshape pattern {pattern:?} for input shape {input:?}"))]
    ReshapeInvalid { pattern: Vec<i64>, input: Shape },

    /// Reduce axis invalid.
    #[snafu(display("reduce axis {axis} is invalid for shape with {shape_dims} dimensions"))]
    ReduceAxisInvalid { axis: i64, shape_dims: usize },

    /// Convolution operand ranks disagree.
    #[snafu(display(
        "convolution rank mismatch: data rank {data_rank}, weights rank {weights_rank}, {spatial_attrs} spatial attributes"
    ))]
    ConvRankMismatch { data_rank: usize, weights_rank: usize, spatial_attrs: usize },

    /// Convolution input channels disagree with the kernel.
    #[snafu(display("convolution channel mismatch: data has {data_channels} channels, weights expect {weight_channels}"))]
    ConvChannelMismatch { data_channels: usize, weight_channels: usize },

    /// Zero stride or dilation, or a kernel larger than the padded input.
    #[snafu(display("invalid convolution attributes on spatial axis {axis}"))]
    ConvAttrInvalid { axis: usize },

    /// FakeQuantize needs at least two levels.
    #[snafu(display("fake quantize needs at least 2 levels, got {levels}"))]
    InvalidLevels { levels: u32 },

    /// Constant payload length disagrees with its shape.
    #[snafu(display("constant of shape {shape:?} needs {expected} elements, got {actual}"))]
    ConstShapeMismatch { shape: Shape, expected: usize, actual: usize },

    /// Replacement would make the graph cyclic.
    #[snafu(display("replacing {root:?} would create a cycle through {through:?}"))]
    CyclicReplacement { root: NodeId, through: NodeId },

    /// Replacement output count differs from the replaced node.
    #[snafu(display("replacement provides {actual} outputs, {expected} required"))]
    ReplacementOutputMismatch { expected: usize, actual: usize },

    /// Replacement output type or shape differs from the replaced output.
    #[snafu(display("replacement for {root:?} changes output {expected} into {actual}"))]
    InvalidReplacement { root: NodeId, expected: String, actual: String },

    /// Evaluator was not given a value for a parameter.
    #[snafu(display("no value supplied for parameter {node:?}"))]
    MissingInput { node: NodeId },

    /// Rewrite driver did not reach a fixed point.
    #[snafu(display("graph rewrite did not converge after {limit} iterations"))]
    RewriteLimitExceeded { limit: usize },
}

/// Log an error together with the provenance of the node it concerns.
pub fn log_provenance(graph: &Graph, node: NodeId, error: &Error) {
    if let Some(n) = graph.node(node)
        && !n.provenance().is_empty()
    {
        tracing::error!(
            node.name = n.name(),
            error = %error,
            provenance = %n.provenance(),
            "node error with provenance"
        );
    }
}
