//! Multiply-into-quantize folding.

use qfold_ir::prelude::*;
use test_case::test_case;

use crate::rules::mul_fake_quantize::rule;
use crate::test::*;

/// `fq(x * c)` with `x: [4, 3]`, `c` per column, thresholds `[-1, 1] -> [0, 3]`, 5 levels.
fn scaled_fq(scale: &[f32], swap_operands: bool) -> (Graph, NodeId, NodeId) {
    let mut g = Graph::new();
    let x = g.parameter("x", DType::Float32, &[4, 3]);
    let c = constant(&mut g, &[3], scale);
    let mul = if swap_operands { binary(&mut g, BinaryOp::Mul, c, x) } else { binary(&mut g, BinaryOp::Mul, x, c) };
    let fq = fake_quantize_scalar(&mut g, mul, [-1.0, 1.0, 0.0, 3.0], 5);
    g.add_result(t(fq)).unwrap();
    (g, x, fq)
}

fn input() -> ConstTensor {
    ConstTensor::from_f32(&[4, 3], &ramp(12, -2.9, 0.37)).unwrap()
}

#[test_case(&[2.0, 0.5, 4.0], false ; "positive")]
#[test_case(&[-2.0, -0.5, -4.0], false ; "negative")]
#[test_case(&[2.0, -0.5, 4.0], false ; "mixed")]
#[test_case(&[1.5, -3.0, -0.25], true ; "mixed constant first")]
fn test_mul_folds_into_thresholds(scale: &[f32], swap_operands: bool) {
    let (mut g, x, fq) = scaled_fq(scale, swap_operands);
    let before = run(&g, &[(x, input())]);

    assert!(rule().apply(&mut g, fq));
    assert!(!kinds(&g).contains(&OpKind::Mul), "multiply not elided: {g}");

    let root = g.node(g.results()[0].node).unwrap();
    assert_eq!(root.kind(), OpKind::FakeQuantize);
    assert_eq!(root.inputs()[0], t(x));
    for threshold in &root.inputs()[1..] {
        assert!(g.static_value(*threshold).is_some(), "threshold not folded: {g}");
    }
    assert_close(&run(&g, &[(x, input())]), &before, 1e-5);
}

#[test]
fn test_negative_scale_swaps_thresholds() {
    let (mut g, _, fq) = scaled_fq(&[-2.0, -2.0, -2.0], false);
    assert!(rule().apply(&mut g, fq));

    let root = g.node(g.results()[0].node).unwrap();
    let value = |i: usize| g.static_value(root.inputs()[i]).unwrap().to_f32_vec();
    assert_eq!(value(1), vec![-0.5, -0.5, -0.5]);
    assert_eq!(value(2), vec![0.5, 0.5, 0.5]);
    assert_eq!(value(3), vec![3.0]);
    assert_eq!(value(4), vec![0.0]);
}

#[test]
fn test_zero_scale_rejects() {
    let (mut g, _, fq) = scaled_fq(&[2.0, 0.0, 1.0], false);
    let snapshot = g.snapshot();
    assert!(!rule().apply(&mut g, fq));
    assert_eq!(g.snapshot(), snapshot);
}

#[test]
fn test_shared_multiply_is_kept() {
    let (mut g, _, fq) = scaled_fq(&[2.0, 2.0, 2.0], false);
    let mul = g.node(fq).unwrap().inputs()[0];
    g.add_result(mul).unwrap();

    let snapshot = g.snapshot();
    assert!(!rule().apply(&mut g, fq));
    assert_eq!(g.snapshot(), snapshot);
}

#[test]
fn test_broadcasting_multiply_rejects() {
    let mut g = Graph::new();
    let x = g.parameter("x", DType::Float32, &[3]);
    let c = constant(&mut g, &[2, 3], &[1.0; 6]);
    let mul = binary(&mut g, BinaryOp::Mul, x, c);
    let fq = fake_quantize_scalar(&mut g, mul, [-1.0, 1.0, 0.0, 3.0], 5);
    g.add_result(t(fq)).unwrap();

    let snapshot = g.snapshot();
    assert!(!rule().apply(&mut g, fq));
    assert_eq!(g.snapshot(), snapshot);
}

#[test]
fn test_dynamic_thresholds_stay_dynamic() {
    let mut g = Graph::new();
    let x = g.parameter("x", DType::Float32, &[4, 3]);
    let high = g.parameter("high", DType::Float32, &[]);
    let c = constant(&mut g, &[3], &[2.0, -1.0, 0.5]);
    let mul = binary(&mut g, BinaryOp::Mul, x, c);
    let [il, ol, oh] = [-1.0, 0.0, 3.0].map(|v| scalar(&mut g, v));
    let fq = fake_quantize(&mut g, mul, [il, high, ol, oh], 5);
    g.add_result(t(fq)).unwrap();

    let inputs = [(x, input()), (high, ConstTensor::scalar_f32(1.0))];
    let before = run(&g, &inputs);
    assert!(rule().apply(&mut g, fq));
    assert!(kinds(&g).contains(&OpKind::Div));
    assert_close(&run(&g, &inputs), &before, 1e-5);
}
