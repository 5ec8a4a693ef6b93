//! Reduction operators.

use crate::error::{Result, UnsupportedDTypeSnafu};
use crate::graph::OutputInfo;
use crate::shape::{Shape, normalize_axes};
use crate::types::OpKind;

use super::{Operand, static_ints};

/// Sum over the axes held by the constant `axes` operand.
///
/// Reduced axes are kept as size 1 with `keep_dims`, dropped otherwise.
pub fn reduce_sum(keep_dims: bool, src: &OutputInfo, axes: &Operand<'_>) -> Result<OutputInfo> {
    snafu::ensure!(
        !src.dtype.is_packed() && !src.dtype.is_bool(),
        UnsupportedDTypeSnafu { kind: OpKind::ReduceSum, dtype: src.dtype }
    );
    let axes = normalize_axes(&static_ints(OpKind::ReduceSum, axes, 1)?, src.shape.len())?;

    let shape: Shape = src
        .shape
        .iter()
        .enumerate()
        .filter_map(|(axis, &d)| match (axes.contains(&axis), keep_dims) {
            (false, _) => Some(d),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect();
    Ok(OutputInfo::new(src.dtype, shape))
}
