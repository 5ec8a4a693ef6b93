//! Elementwise operators.

use qfold_dtype::DType;

use crate::error::{DTypeMismatchSnafu, Result, UnsupportedDTypeSnafu};
use crate::graph::OutputInfo;
use crate::shape::broadcast_shapes;
use crate::types::{BinaryOp, OpKind};

/// Binary op with NumPy broadcasting. Both operands must share a dtype;
/// comparisons produce `Bool`.
pub fn binary(op: BinaryOp, lhs: &OutputInfo, rhs: &OutputInfo) -> Result<OutputInfo> {
    snafu::ensure!(lhs.dtype == rhs.dtype, DTypeMismatchSnafu { lhs: lhs.dtype, rhs: rhs.dtype });
    snafu::ensure!(!lhs.dtype.is_packed(), UnsupportedDTypeSnafu { kind: OpKind::from(op), dtype: lhs.dtype });

    let shape = broadcast_shapes(&lhs.shape, &rhs.shape)?;
    let dtype = if op.is_comparison() { DType::Bool } else { lhs.dtype };
    Ok(OutputInfo::new(dtype, shape))
}

pub fn convert(dtype: DType, src: &OutputInfo) -> Result<OutputInfo> {
    for dt in [dtype, src.dtype] {
        snafu::ensure!(!dt.is_packed(), UnsupportedDTypeSnafu { kind: OpKind::Convert, dtype: dt });
    }
    Ok(OutputInfo::new(dtype, src.shape.clone()))
}
