//! Constant tensors stored inside `Constant` nodes.

use std::fmt;

use itertools::Itertools;
use qfold_dtype::DType;
use snafu::OptionExt;

use crate::error::{ConstShapeMismatchSnafu, Result, UnsupportedDTypeSnafu};
use crate::shape::{Shape, numel};
use crate::types::{ConstValue, OpKind};

/// Payload of a constant tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// One value per element, already cast to the tensor dtype.
    Values(Vec<ConstValue>),
    /// Bit-packed `U1` elements, eight per byte, element `j` in bit `j % 8` of byte `j / 8`.
    Packed(Vec<u8>),
}

/// Immutable, flat, row-major constant tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstTensor {
    dtype: DType,
    shape: Shape,
    data: TensorData,
}

impl ConstTensor {
    /// Create a tensor, casting every value to `dtype`.
    pub fn new(dtype: DType, shape: &[usize], values: Vec<ConstValue>) -> Result<Self> {
        let shape = Shape::from_slice(shape);
        let expected = numel(&shape);
        snafu::ensure!(
            values.len() == expected,
            ConstShapeMismatchSnafu { shape: shape.clone(), expected, actual: values.len() }
        );
        let values = values
            .into_iter()
            .map(|v| v.cast(dtype))
            .collect::<Option<Vec<_>>>()
            .context(UnsupportedDTypeSnafu { kind: OpKind::Constant, dtype })?;
        Ok(Self { dtype, shape, data: TensorData::Values(values) })
    }

    /// `f32` tensor.
    pub fn from_f32(shape: &[usize], values: &[f32]) -> Result<Self> {
        Self::from_f32_as(DType::Float32, shape, values)
    }

    /// Tensor of `dtype` from `f32` values (Rust `as` semantics for integer targets).
    pub fn from_f32_as(dtype: DType, shape: &[usize], values: &[f32]) -> Result<Self> {
        Self::new(dtype, shape, values.iter().map(|&v| ConstValue::Float(v as f64)).collect())
    }

    /// Integer tensor.
    pub fn from_i64(dtype: DType, shape: &[usize], values: &[i64]) -> Result<Self> {
        Self::new(dtype, shape, values.iter().map(|&v| ConstValue::Int(v)).collect())
    }

    /// Rank-0 `f32` tensor.
    pub fn scalar_f32(value: f32) -> Self {
        Self {
            dtype: DType::Float32,
            shape: Shape::new(),
            data: TensorData::Values(vec![ConstValue::Float(value as f64)]),
        }
    }

    /// One-dimensional `i64` tensor, the operand format of reshape targets and reduction axes.
    pub fn i64_vector(values: &[i64]) -> Self {
        Self {
            dtype: DType::Int64,
            shape: Shape::from_slice(&[values.len()]),
            data: TensorData::Values(values.iter().map(|&v| ConstValue::Int(v)).collect()),
        }
    }

    /// Bit-packed `U1` tensor.
    pub fn packed_bits(shape: &[usize], bytes: Vec<u8>) -> Result<Self> {
        let shape = Shape::from_slice(shape);
        let expected = DType::U1.storage_bytes(numel(&shape));
        snafu::ensure!(
            bytes.len() == expected,
            ConstShapeMismatchSnafu { shape: shape.clone(), expected, actual: bytes.len() }
        );
        Ok(Self { dtype: DType::U1, shape, data: TensorData::Packed(bytes) })
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    /// Bit at `index` of a packed tensor.
    pub fn bit(&self, index: usize) -> Option<bool> {
        match &self.data {
            TensorData::Packed(bytes) if index < self.numel() => Some((bytes[index / 8] >> (index % 8)) & 1 == 1),
            _ => None,
        }
    }

    /// All elements as `f32`. Packed bits read as 0/1.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        match &self.data {
            TensorData::Values(values) => values.iter().map(|v| v.as_f64() as f32).collect(),
            TensorData::Packed(_) => (0..self.numel()).map(|i| self.bit(i).map_or(0.0, |b| b as u8 as f32)).collect(),
        }
    }

    /// All elements as `i64`, if the tensor holds integers or booleans.
    pub fn to_i64_vec(&self) -> Option<Vec<i64>> {
        match &self.data {
            TensorData::Values(values) => values.iter().map(ConstValue::as_i64).collect(),
            TensorData::Packed(_) => None,
        }
    }

    /// Convert every element to `dtype`.
    pub fn cast(&self, dtype: DType) -> Result<Self> {
        match &self.data {
            TensorData::Values(values) => Self::new(dtype, &self.shape, values.clone()),
            TensorData::Packed(_) if dtype == DType::U1 => Ok(self.clone()),
            TensorData::Packed(_) => Self::from_f32_as(dtype, &self.shape, &self.to_f32_vec()),
        }
    }

    /// Same data with a new shape of equal element count.
    pub fn reshaped(&self, shape: &[usize]) -> Result<Self> {
        let shape = Shape::from_slice(shape);
        let expected = numel(&shape);
        snafu::ensure!(
            expected == self.numel(),
            ConstShapeMismatchSnafu { shape: shape.clone(), expected, actual: self.numel() }
        );
        Ok(Self { shape, ..self.clone() })
    }
}

impl fmt::Display for ConstTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PREVIEW: usize = 8;
        let values = self.to_f32_vec();
        write!(f, "{}{:?}[{}", self.dtype, self.shape.as_slice(), values.iter().take(PREVIEW).join(", "))?;
        if values.len() > PREVIEW {
            write!(f, ", ...")?;
        }
        write!(f, "]")
    }
}
