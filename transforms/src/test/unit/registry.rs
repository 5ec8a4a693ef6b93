//! Registry assembly and whole-graph runs.

use qfold_ir::prelude::*;
use qfold_ir::{RewriteConfig, graph_rewrite};

use crate::test::*;
use crate::{FusionConfig, fuse_quantization, quantization_fusions};

#[test]
fn test_default_registry_order() {
    let rules = quantization_fusions(&FusionConfig::default());
    assert_eq!(
        rules.names().collect::<Vec<_>>(),
        vec![
            "dequantize",
            "mul_fake_quantize",
            "add_fake_quantize",
            "binary_convolution",
            "binarize_weights",
            "binarize_weights_only",
        ]
    );
}

#[test]
fn test_disabled_rules_are_not_registered() {
    let config = FusionConfig::builder().binarize_weights(false).dequantize(false).build();
    let rules = quantization_fusions(&config);
    assert_eq!(rules.len(), 3);
    assert!(rules.get("binarize_weights").is_none());
    assert!(rules.get("binary_convolution").is_some());

    let none = FusionConfig::builder()
        .binary_convolution(false)
        .binarize_weights(false)
        .mul_fake_quantize(false)
        .add_fake_quantize(false)
        .dequantize(false)
        .build();
    assert!(quantization_fusions(&none).is_empty());
}

/// `conv(fq(x * s + b) -> {0, 1}, fq(W) -> {-0.5, 0.5})`.
fn network() -> (Graph, NodeId) {
    let mut g = Graph::new();
    let x = g.parameter("x", DType::Float32, &[1, 2, 3, 3]);
    let s = constant(&mut g, &[1, 2, 1, 1], &[2.0, 0.5]);
    let scaled = binary(&mut g, BinaryOp::Mul, x, s);
    let b = constant(&mut g, &[1, 2, 1, 1], &[0.25, -0.125]);
    let shifted = binary(&mut g, BinaryOp::Add, scaled, b);
    let act = fake_quantize_scalar(&mut g, shifted, [-1.0, 1.0, 0.0, 1.0], 2);

    let values: Vec<f32> = (0..8).map(|i| if i % 3 == 0 { -0.2 } else { 0.3 }).collect();
    let weights = constant(&mut g, &[2, 2, 1, 2], &values);
    let wfq = fake_quantize_scalar(&mut g, weights, [0.0, 0.0, -0.5, 0.5], 2);
    let out = g.add_named("conv1", Op::Convolution(ConvAttrs::unit(2)), [t(act), t(wfq)]).unwrap();
    g.add_result(t(out)).unwrap();
    (g, x)
}

fn input() -> ConstTensor {
    ConstTensor::from_f32(&[1, 2, 3, 3], &ramp(18, -1.37, 0.17)).unwrap()
}

#[test]
fn test_network_lowers_to_binary_convolution() {
    let (mut g, x) = network();
    let before = run(&g, &[(x, input())]);

    let stats = fuse_quantization(&mut g, &FusionConfig::default(), &RewriteConfig::default()).unwrap();
    assert_eq!(stats.count("add_fake_quantize"), 1);
    assert_eq!(stats.count("mul_fake_quantize"), 1);
    assert_eq!(stats.count("binary_convolution"), 1);
    assert_eq!(stats.count("binarize_weights"), 0);

    let kinds = kinds(&g);
    assert!(kinds.contains(&OpKind::BinaryConvolution));
    assert!(!kinds.contains(&OpKind::Convolution));
    // Scale and shift were folded: the input feeds the quantization directly.
    let users: Vec<OpKind> = g.consumers(t(x)).map(|u| g.node(u.user).unwrap().kind()).collect();
    assert_eq!(users, vec![OpKind::FakeQuantize]);
    assert_eq!(g.node(g.results()[0].node).unwrap().name(), "conv1");
    assert_close(&run(&g, &[(x, input())]), &before, 1e-5);
}

#[test]
fn test_network_binarizes_without_binary_convolution() {
    let (mut g, x) = network();
    let before = run(&g, &[(x, input())]);

    let config = FusionConfig::builder().binary_convolution(false).build();
    let stats = fuse_quantization(&mut g, &config, &RewriteConfig::default()).unwrap();
    assert_eq!(stats.count("binarize_weights"), 1);
    assert!(!kinds(&g).contains(&OpKind::BinaryConvolution));
    assert_close(&run(&g, &[(x, input())]), &before, 1e-5);
}

#[test]
fn test_fusions_are_idempotent() {
    let (mut g, _) = network();
    let rules = quantization_fusions(&FusionConfig::default());
    let first = graph_rewrite(&mut g, &rules, &RewriteConfig::default()).unwrap();
    assert!(first.rewrites > 0);

    let snapshot = g.snapshot();
    let second = graph_rewrite(&mut g, &rules, &RewriteConfig::default()).unwrap();
    assert_eq!(second.rewrites, 0);
    assert_eq!(second.iterations, 1);
    assert_eq!(g.snapshot(), snapshot);
}

#[test]
fn test_constant_dequantization_becomes_quantization() {
    let mut g = Graph::new();
    let q = g.constant(ConstTensor::from_i64(DType::Int8, &[4], &[-3, 0, 3, 127]).unwrap());
    let float = g.add_node(Op::Convert { dtype: DType::Float32 }, [t(q)]).unwrap();
    let zp = scalar(&mut g, 1.0);
    let shifted = binary(&mut g, BinaryOp::Sub, float, zp);
    let s = scalar(&mut g, 0.5);
    let dequantized = binary(&mut g, BinaryOp::Mul, shifted, s);
    g.add_result(t(dequantized)).unwrap();

    let stats = fuse_quantization(&mut g, &FusionConfig::default(), &RewriteConfig::default()).unwrap();
    assert_eq!(stats.count("dequantize"), 1);
    assert_eq!(stats.rewrites, 1);
    assert_close(&run(&g, &[]), &[-2.0, -0.5, 1.0, 63.0], 1e-4);
}
