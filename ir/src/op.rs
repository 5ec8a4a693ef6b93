//! Operation enum.
//!
//! The [`Op`] enum is the closed set of operators a qfold graph can hold. Each
//! variant carries its attribute payload; operands live on the owning
//! [`Node`](crate::Node) as an ordered input list.

use std::fmt;

use qfold_dtype::DType;

use crate::shape::Shape;
use crate::tensor::ConstTensor;
use crate::types::*;

/// Operator with its attributes.
///
/// Input order is significant:
/// - `Convolution`, `BinaryConvolution`: data, weights
/// - `Binary`: lhs, rhs
/// - `Reshape`: data, target shape (1-D integer constant)
/// - `FakeQuantize`: data, input_low, input_high, output_low, output_high
/// - `ReduceSum`: data, axes (1-D integer constant)
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    // Sources
    Parameter { dtype: DType, shape: Shape },
    Constant(ConstTensor),

    Convolution(ConvAttrs),
    BinaryConvolution(BinaryConvAttrs),

    Binary(BinaryOp),
    Convert { dtype: DType },

    Reshape { special_zero: bool },
    ReduceSum { keep_dims: bool },

    FakeQuantize { levels: u32 },
}

impl Op {
    /// Flat kind tag.
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Parameter { .. } => OpKind::Parameter,
            Op::Constant(_) => OpKind::Constant,
            Op::Convolution(_) => OpKind::Convolution,
            Op::BinaryConvolution(_) => OpKind::BinaryConvolution,
            Op::Binary(op) => OpKind::from(*op),
            Op::Convert { .. } => OpKind::Convert,
            Op::Reshape { .. } => OpKind::Reshape,
            Op::ReduceSum { .. } => OpKind::ReduceSum,
            Op::FakeQuantize { .. } => OpKind::FakeQuantize,
        }
    }

    /// Number of inputs the operator consumes.
    pub fn arity(&self) -> usize {
        match self {
            Op::Parameter { .. } | Op::Constant(_) => 0,
            Op::Convert { .. } => 1,
            Op::Convolution(_)
            | Op::BinaryConvolution(_)
            | Op::Binary(_)
            | Op::Reshape { .. }
            | Op::ReduceSum { .. } => 2,
            Op::FakeQuantize { .. } => 5,
        }
    }

    pub fn as_constant(&self) -> Option<&ConstTensor> {
        match self {
            Op::Constant(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn is_source(&self) -> bool {
        self.arity() == 0
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Parameter { dtype, shape } => write!(f, "Parameter({dtype}{:?})", shape.as_slice()),
            Op::Constant(tensor) => write!(f, "Constant({tensor})"),
            Op::Convolution(attrs) => write!(f, "Convolution(strides={:?})", attrs.strides.as_slice()),
            Op::BinaryConvolution(attrs) => {
                write!(f, "BinaryConvolution({}, pad_value={})", attrs.mode, attrs.pad_value)
            }
            Op::Binary(op) => write!(f, "{op}"),
            Op::Convert { dtype } => write!(f, "Convert({dtype})"),
            Op::Reshape { special_zero } => write!(f, "Reshape(special_zero={special_zero})"),
            Op::ReduceSum { keep_dims } => write!(f, "ReduceSum(keep_dims={keep_dims})"),
            Op::FakeQuantize { levels } => write!(f, "FakeQuantize(levels={levels})"),
        }
    }
}
