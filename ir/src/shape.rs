//! Static shape utilities.
//!
//! Every output in a qfold graph has a fully known shape. Broadcasting follows
//! NumPy rules: shapes are right-aligned and a dimension of size 1 stretches.

use smallvec::SmallVec;

use crate::error::{BroadcastShapeMismatchSnafu, ReduceAxisInvalidSnafu, ReshapeInvalidSnafu, ReshapeSizeMismatchSnafu, Result};

/// Shape of a tensor.
pub type Shape = SmallVec<[usize; 4]>;

/// Number of elements of a shape (1 for rank 0).
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Row-major strides of a shape.
pub fn strides(shape: &[usize]) -> Shape {
    let mut strides: Shape = SmallVec::from_elem(1, shape.len());
    for axis in (0..shape.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * shape[axis + 1];
    }
    strides
}

/// Broadcast two shapes.
pub fn broadcast_shapes(lhs: &[usize], rhs: &[usize]) -> Result<Shape> {
    let rank = lhs.len().max(rhs.len());
    let mut out = Shape::with_capacity(rank);
    for i in 0..rank {
        let l = dim_from_right(lhs, rank, i);
        let r = dim_from_right(rhs, rank, i);
        let d = match (l, r) {
            (a, b) if a == b => a,
            (1, b) => b,
            (a, 1) => a,
            _ => return BroadcastShapeMismatchSnafu { lhs: Shape::from(lhs), rhs: Shape::from(rhs) }.fail(),
        };
        out.push(d);
    }
    Ok(out)
}

/// True if `shape` broadcasts onto `target` without growing it.
pub fn broadcasts_to(shape: &[usize], target: &[usize]) -> bool {
    broadcast_shapes(shape, target).is_ok_and(|s| s.as_slice() == target)
}

fn dim_from_right(shape: &[usize], rank: usize, i: usize) -> usize {
    let offset = rank - shape.len();
    if i < offset { 1 } else { shape[i - offset] }
}

/// Map a flat index in `out_shape` to the flat index of a broadcast operand.
pub fn broadcast_index(flat: usize, out_shape: &[usize], operand: &[usize]) -> usize {
    let offset = out_shape.len() - operand.len();
    let op_strides = strides(operand);
    let mut rem = flat;
    let mut index = 0;
    for (axis, out_stride) in strides(out_shape).iter().enumerate() {
        let coord = rem / out_stride;
        rem %= out_stride;
        if axis >= offset {
            let a = axis - offset;
            if operand[a] != 1 {
                index += coord * op_strides[a];
            }
        }
    }
    index
}

/// Resolve a reshape target pattern against an input shape.
///
/// `-1` infers one dimension; with `special_zero` a `0` copies the input
/// dimension at the same position.
pub fn resolve_reshape(input: &[usize], pattern: &[i64], special_zero: bool) -> Result<Shape> {
    let invalid = || ReshapeInvalidSnafu { pattern: pattern.to_vec(), input: Shape::from(input) };
    let mut out = Shape::with_capacity(pattern.len());
    let mut inferred = None;
    for (i, &p) in pattern.iter().enumerate() {
        match p {
            -1 if inferred.is_none() => {
                inferred = Some(i);
                out.push(1);
            }
            0 if special_zero => match input.get(i) {
                Some(&d) => out.push(d),
                None => return invalid().fail(),
            },
            p if p >= 0 => out.push(p as usize),
            _ => return invalid().fail(),
        }
    }

    let input_size = numel(input);
    if let Some(axis) = inferred {
        let known = numel(&out);
        if known == 0 || input_size % known != 0 {
            return invalid().fail();
        }
        out[axis] = input_size / known;
    }

    let output_size = numel(&out);
    snafu::ensure!(input_size == output_size, ReshapeSizeMismatchSnafu { input_size, output_size });
    Ok(out)
}

/// Normalize (possibly negative) axes against a rank, sorted and deduplicated.
pub fn normalize_axes(axes: &[i64], rank: usize) -> Result<SmallVec<[usize; 4]>> {
    let mut out = SmallVec::<[usize; 4]>::new();
    for &axis in axes {
        let resolved = if axis < 0 { axis + rank as i64 } else { axis };
        snafu::ensure!(
            (0..rank as i64).contains(&resolved),
            ReduceAxisInvalidSnafu { axis, shape_dims: rank }
        );
        out.push(resolved as usize);
    }
    out.sort_unstable();
    out.dedup();
    Ok(out)
}
