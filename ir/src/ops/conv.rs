//! Convolution shape inference (NCHW data, OIHW weights, one group).

use qfold_dtype::DType;

use crate::error::{
    ConvAttrInvalidSnafu, ConvChannelMismatchSnafu, ConvRankMismatchSnafu, DTypeMismatchSnafu, Result,
    UnsupportedDTypeSnafu,
};
use crate::graph::OutputInfo;
use crate::shape::Shape;
use crate::types::{BinaryConvAttrs, ConvAttrs, OpKind};

pub fn convolution(attrs: &ConvAttrs, data: &OutputInfo, weights: &OutputInfo) -> Result<OutputInfo> {
    snafu::ensure!(data.dtype.is_float(), UnsupportedDTypeSnafu { kind: OpKind::Convolution, dtype: data.dtype });
    snafu::ensure!(data.dtype == weights.dtype, DTypeMismatchSnafu { lhs: data.dtype, rhs: weights.dtype });
    let shape = output_shape(attrs, &data.shape, &weights.shape)?;
    Ok(OutputInfo::new(data.dtype, shape))
}

/// Binary convolution over float activations and packed `U1` weights.
pub fn binary_convolution(attrs: &BinaryConvAttrs, data: &OutputInfo, weights: &OutputInfo) -> Result<OutputInfo> {
    snafu::ensure!(
        data.dtype.is_float(),
        UnsupportedDTypeSnafu { kind: OpKind::BinaryConvolution, dtype: data.dtype }
    );
    snafu::ensure!(weights.dtype == DType::U1, DTypeMismatchSnafu { lhs: DType::U1, rhs: weights.dtype });
    let shape = output_shape(&attrs.conv, &data.shape, &weights.shape)?;
    Ok(OutputInfo::new(data.dtype, shape))
}

/// `[N, C_out, spatial...]` for the given data and kernel shapes.
pub fn output_shape(attrs: &ConvAttrs, data: &[usize], weights: &[usize]) -> Result<Shape> {
    let spatial_attrs = attrs.spatial_rank();
    snafu::ensure!(
        data.len() >= 3 && data.len() == weights.len() && data.len() == spatial_attrs + 2,
        ConvRankMismatchSnafu { data_rank: data.len(), weights_rank: weights.len(), spatial_attrs }
    );
    snafu::ensure!(
        data[1] == weights[1],
        ConvChannelMismatchSnafu { data_channels: data[1], weight_channels: weights[1] }
    );

    let uniform_attrs = [attrs.pads_begin.len(), attrs.pads_end.len(), attrs.dilations.len()]
        .iter()
        .all(|&len| len == spatial_attrs);
    snafu::ensure!(
        uniform_attrs,
        ConvRankMismatchSnafu { data_rank: data.len(), weights_rank: weights.len(), spatial_attrs }
    );

    let (input, kernel) = (&data[2..], &weights[2..]);
    for axis in 0..spatial_attrs {
        snafu::ensure!(
            attrs.strides[axis] > 0 && attrs.dilations[axis] > 0 && kernel[axis] > 0,
            ConvAttrInvalidSnafu { axis }
        );
    }

    let (pads_begin, pads_end) = attrs.resolve_pads(input, kernel);
    let mut shape = Shape::from_slice(&[data[0], weights[0]]);
    for axis in 0..spatial_attrs {
        let padded = input[axis] + pads_begin[axis] + pads_end[axis];
        let effective_kernel = (kernel[axis] - 1) * attrs.dilations[axis] + 1;
        snafu::ensure!(padded >= effective_kernel, ConvAttrInvalidSnafu { axis });
        shape.push((padded - effective_kernel) / attrs.strides[axis] + 1);
    }
    Ok(shape)
}
