//! Element types for qfold graphs.
//!
//! A [`DType`] describes the element type of one node output or of a constant
//! tensor. Besides the usual integer and floating point widths there is
//! [`DType::U1`], the bit-packed type used by binary convolution weights.


/// Element data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::Display, strum::EnumCount, strum::EnumIter, strum::VariantArray, strum::FromRepr)]
#[cfg_attr(feature = "proptest", derive(proptest_derive::Arbitrary))]
pub enum DType {
    #[strum(serialize = "boolean")]
    Bool = 0,

    /// One bit per element, packed eight per byte.
    #[strum(serialize = "u1")]
    U1 = 1,

    // Interleaved signed/unsigned, narrowest first.
    #[strum(serialize = "i8")]
    Int8 = 2,
    #[strum(serialize = "u8")]
    UInt8 = 3,
    #[strum(serialize = "i16")]
    Int16 = 4,
    #[strum(serialize = "u16")]
    UInt16 = 5,
    #[strum(serialize = "i32")]
    Int32 = 6,
    #[strum(serialize = "u32")]
    UInt32 = 7,
    #[strum(serialize = "i64")]
    Int64 = 8,
    #[strum(serialize = "u64")]
    UInt64 = 9,

    #[strum(serialize = "f16")]
    Float16 = 10,
    #[strum(serialize = "f32")]
    Float32 = 11,
    #[strum(serialize = "f64")]
    Float64 = 12,
}

impl DType {
    /// Width of one element in bits.
    pub const fn bits(&self) -> usize {
        match self {
            Self::U1 => 1,
            Self::Bool | Self::Int8 | Self::UInt8 => 8,
            Self::Int16 | Self::UInt16 | Self::Float16 => 16,
            Self::Int32 | Self::UInt32 | Self::Float32 => 32,
            Self::Int64 | Self::UInt64 | Self::Float64 => 64,
        }
    }

    /// Number of bytes needed to store `count` elements of this type.
    pub const fn storage_bytes(&self, count: usize) -> usize {
        (count * self.bits()).div_ceil(8)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self, Self::Bool)
    }

    pub const fn is_packed(&self) -> bool {
        matches!(self, Self::U1)
    }

    pub const fn is_signed(&self) -> bool {
        matches!(self, Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64)
    }

    pub const fn is_unsigned(&self) -> bool {
        matches!(self, Self::UInt8 | Self::UInt16 | Self::UInt32 | Self::UInt64)
    }

    pub const fn is_int(&self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    pub const fn is_float(&self) -> bool {
        matches!(self, Self::Float16 | Self::Float32 | Self::Float64)
    }

    /// Smallest and largest representable value of an integer type.
    ///
    /// Returns `None` for non-integer types.
    pub const fn int_range(&self) -> Option<(i128, i128)> {
        Some(match self {
            Self::Int8 => (i8::MIN as i128, i8::MAX as i128),
            Self::Int16 => (i16::MIN as i128, i16::MAX as i128),
            Self::Int32 => (i32::MIN as i128, i32::MAX as i128),
            Self::Int64 => (i64::MIN as i128, i64::MAX as i128),
            Self::UInt8 => (0, u8::MAX as i128),
            Self::UInt16 => (0, u16::MAX as i128),
            Self::UInt32 => (0, u32::MAX as i128),
            Self::UInt64 => (0, u64::MAX as i128),
            _ => return None,
        })
    }

    /// Number of distinct values an integer type can hold.
    pub const fn int_levels(&self) -> Option<u128> {
        match self.int_range() {
            Some((min, max)) => Some((max - min) as u128 + 1),
            None => None,
        }
    }

    /// Machine epsilon of a floating point type.
    pub const fn epsilon(&self) -> Option<f64> {
        match self {
            // 2^-10
            Self::Float16 => Some(0.000_976_562_5),
            Self::Float32 => Some(f32::EPSILON as f64),
            Self::Float64 => Some(f64::EPSILON),
            _ => None,
        }
    }
}
