use crate::*;
use proptest::prelude::*;

#[rustfmt::skip]
pub fn int_dtype() -> impl Strategy<Value = DType> {
    prop_oneof![
        Just(DType::Int8), Just(DType::Int16), Just(DType::Int32), Just(DType::Int64),
        Just(DType::UInt8), Just(DType::UInt16), Just(DType::UInt32), Just(DType::UInt64)
    ]
}

#[rustfmt::skip]
pub fn float_dtype() -> impl Strategy<Value = DType> {
    prop_oneof![Just(DType::Float16), Just(DType::Float32), Just(DType::Float64)]
}

/// 8-bit integer types accepted as dequantization sources.
pub fn byte_dtype() -> impl Strategy<Value = DType> {
    prop_oneof![Just(DType::Int8), Just(DType::UInt8)]
}

pub fn scalar_generator() -> impl Strategy<Value = DType> {
    prop_oneof![Just(DType::Bool), Just(DType::U1), int_dtype(), float_dtype()]
}
