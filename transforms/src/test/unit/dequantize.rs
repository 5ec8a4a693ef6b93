//! Integer dequantization to quantization node.

use qfold_ir::prelude::*;

use crate::rules::dequantize::rule;
use crate::test::*;

/// `(convert(q) - zp) * scale` over a parameter `q` of `dtype`.
fn dequantize(dtype: DType, len: usize, zero_point: f32, scale: f32, scale_first: bool) -> (Graph, NodeId, NodeId) {
    let mut g = Graph::new();
    let q = g.parameter("q", dtype, &[len]);
    let float = g.add_node(Op::Convert { dtype: DType::Float32 }, [t(q)]).unwrap();
    let zp = scalar(&mut g, zero_point);
    let shifted = binary(&mut g, BinaryOp::Sub, float, zp);
    let s = scalar(&mut g, scale);
    let mul = if scale_first { binary(&mut g, BinaryOp::Mul, s, shifted) } else { binary(&mut g, BinaryOp::Mul, shifted, s) };
    g.add_result(t(mul)).unwrap();
    (g, q, mul)
}

fn ints(dtype: DType, values: impl IntoIterator<Item = i64>) -> ConstTensor {
    let values: Vec<i64> = values.into_iter().collect();
    ConstTensor::from_i64(dtype, &[values.len()], &values).unwrap()
}

#[test]
fn test_i8_dequantize_round_trip() {
    let (mut g, q, mul) = dequantize(DType::Int8, 6, 2.0, 5.0, false);
    let input = ints(DType::Int8, 0..6);
    assert_eq!(run(&g, &[(q, input.clone())]), vec![-10.0, -5.0, 0.0, 5.0, 10.0, 15.0]);

    assert!(rule().apply(&mut g, mul));
    let root = g.node(g.results()[0].node).unwrap();
    assert_eq!(root.op(), &Op::FakeQuantize { levels: 256 });
    assert_eq!(g.node(root.inputs()[0].node).unwrap().kind(), OpKind::Convert);
    assert!(!kinds(&g).contains(&OpKind::Sub));

    let thresholds: Vec<f32> =
        root.inputs()[1..].iter().map(|&i| g.static_value(i).unwrap().to_f32_vec()[0]).collect();
    assert_eq!(thresholds, vec![-128.0, 127.0, -650.0, 625.0]);

    assert_close(&run(&g, &[(q, input)]), &[-10.0, -5.0, 0.0, 5.0, 10.0, 15.0], 1e-4);
}

#[test]
fn test_u8_full_range_round_trip() {
    let (mut g, q, mul) = dequantize(DType::UInt8, 256, 128.0, 0.5, true);
    let input = ints(DType::UInt8, 0..256);
    let before = run(&g, &[(q, input.clone())]);

    assert!(rule().apply(&mut g, mul));
    let root = g.node(g.results()[0].node).unwrap();
    let low = g.static_value(root.inputs()[3]).unwrap().to_f32_vec();
    assert_eq!(low, vec![-64.0]);
    assert_close(&run(&g, &[(q, input)]), &before, 1e-4);
}

#[test]
fn test_i8_full_range_round_trip() {
    let (mut g, q, mul) = dequantize(DType::Int8, 256, -3.0, 0.1, false);
    let input = ints(DType::Int8, -128..128);
    let before = run(&g, &[(q, input.clone())]);

    assert!(rule().apply(&mut g, mul));
    assert_close(&run(&g, &[(q, input)]), &before, 1e-4);
}

#[test]
fn test_wider_integers_reject() {
    let (mut g, _, mul) = dequantize(DType::Int32, 4, 0.0, 1.0, false);
    let snapshot = g.snapshot();
    assert!(!rule().apply(&mut g, mul));
    assert_eq!(g.snapshot(), snapshot);
}

#[test]
fn test_shared_subtraction_is_kept() {
    let (mut g, _, mul) = dequantize(DType::UInt8, 4, 1.0, 2.0, false);
    let sub = g.node(mul).unwrap().inputs()[0];
    g.add_result(sub).unwrap();

    assert!(!rule().apply(&mut g, mul));
}
