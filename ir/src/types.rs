//! Type definitions for graph operations.
//!
//! Scalar constant values, the operator kind tags used by patterns, and the
//! attribute payloads of convolution-like operators.

use bon::bon;
use qfold_dtype::DType;
use smallvec::SmallVec;

/// Constant value stored in a constant tensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
}

/// Helper macro to cast to target width and back to storage type (for proper truncation/extension).
macro_rules! cast_via {
    ($v:expr, $target:ty, $storage:ty) => {
        ($v as $target) as $storage
    };
}

/// Macro to generate casting logic by delegating to helper functions.
macro_rules! impl_cast {
    ($self:expr, $to:expr) => {
        match ($self, $to) {
            (ConstValue::Bool(v), dt) => cast_bool(v, dt)?,
            (ConstValue::Int(v), dt) => cast_int(v, dt)?,
            (ConstValue::UInt(v), dt) => cast_uint(v, dt)?,
            (ConstValue::Float(v), dt) => cast_float(v, dt)?,
        }
    };
}

#[inline]
fn cast_bool(v: bool, to: DType) -> Option<ConstValue> {
    use DType::*;
    Some(match to {
        Bool => ConstValue::Bool(v),
        Int8 | Int16 | Int32 | Int64 => ConstValue::Int(v as i64),
        UInt8 | UInt16 | UInt32 | UInt64 => ConstValue::UInt(v as u64),
        Float16 | Float32 | Float64 => ConstValue::Float(v as u8 as f64),
        U1 => return None,
    })
}

#[inline]
fn cast_int(v: i64, to: DType) -> Option<ConstValue> {
    use DType::*;
    Some(match to {
        Bool => ConstValue::Bool(v != 0),
        Int8 => ConstValue::Int(cast_via!(v, i8, i64)),
        Int16 => ConstValue::Int(cast_via!(v, i16, i64)),
        Int32 => ConstValue::Int(cast_via!(v, i32, i64)),
        Int64 => ConstValue::Int(v),
        UInt8 => ConstValue::UInt(cast_via!(v, u8, u64)),
        UInt16 => ConstValue::UInt(cast_via!(v, u16, u64)),
        UInt32 => ConstValue::UInt(cast_via!(v, u32, u64)),
        UInt64 => ConstValue::UInt(v as u64),
        Float16 | Float64 => ConstValue::Float(v as f64),
        Float32 => ConstValue::Float(v as f32 as f64),
        U1 => return None,
    })
}

#[inline]
fn cast_uint(v: u64, to: DType) -> Option<ConstValue> {
    use DType::*;
    Some(match to {
        Bool => ConstValue::Bool(v != 0),
        Int8 => ConstValue::Int(cast_via!(v, i8, i64)),
        Int16 => ConstValue::Int(cast_via!(v, i16, i64)),
        Int32 => ConstValue::Int(cast_via!(v, i32, i64)),
        Int64 => ConstValue::Int(v as i64),
        UInt8 => ConstValue::UInt(cast_via!(v, u8, u64)),
        UInt16 => ConstValue::UInt(cast_via!(v, u16, u64)),
        UInt32 => ConstValue::UInt(cast_via!(v, u32, u64)),
        UInt64 => ConstValue::UInt(v),
        Float16 | Float64 => ConstValue::Float(v as f64),
        Float32 => ConstValue::Float(v as f32 as f64),
        U1 => return None,
    })
}

#[inline]
fn cast_float(v: f64, to: DType) -> Option<ConstValue> {
    use DType::*;
    Some(match to {
        Bool => ConstValue::Bool(v != 0.0),
        Int8 => ConstValue::Int(cast_via!(v, i8, i64)),
        Int16 => ConstValue::Int(cast_via!(v, i16, i64)),
        Int32 => ConstValue::Int(cast_via!(v, i32, i64)),
        Int64 => ConstValue::Int(v as i64),
        // Float-to-unsigned routes through i64 first
        UInt8 => ConstValue::UInt(cast_via!(v as i64, u8, u64)),
        UInt16 => ConstValue::UInt(cast_via!(v as i64, u16, u64)),
        UInt32 => ConstValue::UInt(cast_via!(v as i64, u32, u64)),
        UInt64 => ConstValue::UInt((v as i64) as u64),
        Float16 | Float64 => ConstValue::Float(v),
        Float32 => ConstValue::Float(v as f32 as f64),
        U1 => return None,
    })
}

impl ConstValue {
    pub const fn dtype(&self) -> DType {
        match self {
            ConstValue::Int(_) => DType::Int64,
            ConstValue::UInt(_) => DType::UInt64,
            ConstValue::Float(_) => DType::Float64,
            ConstValue::Bool(_) => DType::Bool,
        }
    }

    /// Cast this constant value to the target dtype.
    ///
    /// Returns `None` for the packed `U1` type, which has no per-element
    /// representation. All other casts are allowed, including lossy ones,
    /// and follow Rust `as` semantics (truncation, wrap-around, truncation
    /// toward zero for float to int).
    pub fn cast(&self, dtype: DType) -> Option<Self> {
        Some(impl_cast!(*self, dtype))
    }

    /// Numeric value as `f64` (booleans map to 0/1).
    pub fn as_f64(&self) -> f64 {
        match *self {
            ConstValue::Int(v) => v as f64,
            ConstValue::UInt(v) => v as f64,
            ConstValue::Float(v) => v,
            ConstValue::Bool(v) => v as u8 as f64,
        }
    }

    /// Integral value, if this constant is an integer or boolean.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            ConstValue::Int(v) => Some(v),
            ConstValue::UInt(v) => i64::try_from(v).ok(),
            ConstValue::Bool(v) => Some(v as i64),
            ConstValue::Float(_) => None,
        }
    }
}

/// Elementwise binary operation types.
///
/// Arithmetic operations preserve the operand dtype.
/// Comparison operations always produce `DType::Bool`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
pub enum BinaryOp {
    /// Addition: a + b
    Add,
    /// Subtraction: a - b
    Sub,
    /// Multiplication: a * b
    Mul,
    /// Float division: a / b
    Div,
    /// Less than: a < b
    Less,
    /// Greater or equal: a >= b
    GreaterEqual,
}

impl BinaryOp {
    /// Returns true if this is a comparison operation.
    pub fn is_comparison(self) -> bool {
        matches!(self, Self::Less | Self::GreaterEqual)
    }

    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            Self::Add => a + b,
            Self::Sub => a - b,
            Self::Mul => a * b,
            Self::Div => a / b,
            Self::Less => (a < b) as u8 as f32,
            Self::GreaterEqual => (a >= b) as u8 as f32,
        }
    }
}

/// Flat operator tag.
///
/// Patterns constrain candidates by kind; the attribute payload lives in
/// [`Op`](crate::Op).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::Display, strum::EnumIter)]
pub enum OpKind {
    Parameter,
    Constant,
    Convolution,
    BinaryConvolution,
    Add,
    Sub,
    Mul,
    Div,
    Less,
    GreaterEqual,
    Reshape,
    Convert,
    FakeQuantize,
    ReduceSum,
}

impl From<BinaryOp> for OpKind {
    fn from(op: BinaryOp) -> Self {
        match op {
            BinaryOp::Add => Self::Add,
            BinaryOp::Sub => Self::Sub,
            BinaryOp::Mul => Self::Mul,
            BinaryOp::Div => Self::Div,
            BinaryOp::Less => Self::Less,
            BinaryOp::GreaterEqual => Self::GreaterEqual,
        }
    }
}

/// Padding policy of a convolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AutoPad {
    /// Use `pads_begin`/`pads_end` as given.
    #[default]
    Explicit,
    /// Output size is `ceil(input / stride)`, odd padding goes to the end.
    SameUpper,
    /// Output size is `ceil(input / stride)`, odd padding goes to the beginning.
    SameLower,
    /// No padding.
    Valid,
}

/// Convolution attributes (NCHW layout, one group).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConvAttrs {
    pub strides: SmallVec<[usize; 2]>,
    pub pads_begin: SmallVec<[usize; 2]>,
    pub pads_end: SmallVec<[usize; 2]>,
    pub dilations: SmallVec<[usize; 2]>,
    pub auto_pad: AutoPad,
}

#[bon]
impl ConvAttrs {
    /// Build attributes for a convolution with `spatial_rank` spatial axes.
    ///
    /// Unset vectors default to unit strides/dilations and zero padding.
    #[builder]
    pub fn new(
        spatial_rank: usize,
        strides: Option<Vec<usize>>,
        pads_begin: Option<Vec<usize>>,
        pads_end: Option<Vec<usize>>,
        dilations: Option<Vec<usize>>,
        #[builder(default)] auto_pad: AutoPad,
    ) -> Self {
        let ones = || SmallVec::from_elem(1, spatial_rank);
        let zeros = || SmallVec::from_elem(0, spatial_rank);
        Self {
            strides: strides.map(SmallVec::from_vec).unwrap_or_else(ones),
            pads_begin: pads_begin.map(SmallVec::from_vec).unwrap_or_else(zeros),
            pads_end: pads_end.map(SmallVec::from_vec).unwrap_or_else(zeros),
            dilations: dilations.map(SmallVec::from_vec).unwrap_or_else(ones),
            auto_pad,
        }
    }
}

impl ConvAttrs {
    /// Unit strides and dilations, no padding.
    pub fn unit(spatial_rank: usize) -> Self {
        Self::builder().spatial_rank(spatial_rank).build()
    }

    pub fn spatial_rank(&self) -> usize {
        self.strides.len()
    }

    /// Resolve the effective padding for the given input and kernel extents.
    pub fn resolve_pads(&self, input: &[usize], kernel: &[usize]) -> (SmallVec<[usize; 2]>, SmallVec<[usize; 2]>) {
        match self.auto_pad {
            AutoPad::Explicit => (self.pads_begin.clone(), self.pads_end.clone()),
            AutoPad::Valid => (SmallVec::from_elem(0, input.len()), SmallVec::from_elem(0, input.len())),
            AutoPad::SameUpper | AutoPad::SameLower => {
                let mut begin = SmallVec::new();
                let mut end = SmallVec::new();
                for axis in 0..input.len() {
                    let stride = self.strides[axis];
                    let out = input[axis].div_ceil(stride);
                    let effective_kernel = (kernel[axis] - 1) * self.dilations[axis] + 1;
                    let total = (out.saturating_sub(1) * stride + effective_kernel).saturating_sub(input[axis]);
                    let (small, large) = (total / 2, total - total / 2);
                    if self.auto_pad == AutoPad::SameUpper {
                        begin.push(small);
                        end.push(large);
                    } else {
                        begin.push(large);
                        end.push(small);
                    }
                }
                (begin, end)
            }
        }
    }
}

/// Arithmetic mode of a binary convolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, strum::Display)]
pub enum BinaryConvMode {
    /// Accumulate `+1` where activation and weight bits agree and `-1` where they differ.
    #[default]
    #[strum(serialize = "xnor-popcount")]
    XnorPopcount,
}

/// Attributes of a binary (bit-packed weight) convolution.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryConvAttrs {
    pub conv: ConvAttrs,
    pub mode: BinaryConvMode,
    /// Value used for padded positions. Zero means padded positions contribute nothing.
    pub pad_value: f32,
}
