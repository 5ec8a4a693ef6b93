//! Reshape.

use crate::error::Result;
use crate::graph::OutputInfo;
use crate::shape::resolve_reshape;
use crate::types::OpKind;

use super::{Operand, static_ints};

/// Reshape `src` to the shape held by the constant `target` operand.
pub fn reshape(special_zero: bool, src: &OutputInfo, target: &Operand<'_>) -> Result<OutputInfo> {
    let pattern = static_ints(OpKind::Reshape, target, 1)?;
    let shape = resolve_reshape(&src.shape, &pattern, special_zero)?;
    Ok(OutputInfo::new(src.dtype, shape))
}
