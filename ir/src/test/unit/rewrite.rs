//! Unit tests for rule application and the fixed-point driver.

use qfold_dtype::DType;

use crate::error::Error;
use crate::graph::{Graph, NodeId, TensorRef, Value};
use crate::op::Op;
use crate::pattern::{Pat, consumers_count};
use crate::provenance::ProvenanceEvent;
use crate::rewrite::{RewriteConfig, RewriteResult, RewriteRule, Rewriter, RuleSet, graph_rewrite};
use crate::tensor::ConstTensor;
use crate::types::{BinaryOp, OpKind};

fn t(id: NodeId) -> TensorRef {
    id.into()
}

fn binary(g: &mut Graph, op: BinaryOp, lhs: NodeId, rhs: NodeId) -> NodeId {
    g.add_node(Op::Binary(op), [t(lhs), t(rhs)]).unwrap()
}

/// `x * 1 -> x`
fn mul_by_one() -> RewriteRule {
    RewriteRule::new("mul_by_one", Pat::commutative(BinaryOp::Mul, [Pat::var("x"), Pat::cvar("one")]), |m, rw| {
        let one = m.get("one").and_then(|c| rw.graph().static_value(c));
        if !one.is_some_and(|c| c.to_f32_vec().iter().all(|&v| v == 1.0)) {
            return RewriteResult::NoMatch;
        }
        let (Some(x), Ok(root)) = (m.get("x"), rw.info(Value::from(m.root()))) else {
            return RewriteResult::NoMatch;
        };
        // Only when the multiply does not broadcast `x`.
        match rw.info(x.into()) {
            Ok(info) if info == root => RewriteResult::Rewritten(x.into()),
            _ => RewriteResult::NoMatch,
        }
    })
}

/// `x * 2 -> x + x`
fn double_to_add() -> RewriteRule {
    let pattern = Pat::binary(BinaryOp::Mul, [Pat::var("x"), Pat::cvar("two")]).with_predicate(consumers_count(1));
    RewriteRule::new("double_to_add", pattern, |m, rw| {
        let two = m.get("two").and_then(|c| rw.graph().static_value(c));
        if !two.is_some_and(|c| c.to_f32_vec() == [2.0]) {
            return RewriteResult::NoMatch;
        }
        let Some(x) = m.get("x") else { return RewriteResult::NoMatch };
        rw.binary(BinaryOp::Add, x, x).ok().into()
    })
}

fn scaled(factor: f32) -> (Graph, NodeId, NodeId) {
    let mut g = Graph::new();
    let x = g.parameter("x", DType::Float32, &[4]);
    let c = g.constant(ConstTensor::scalar_f32(factor));
    let mul = g.add_named("scaled", Op::Binary(BinaryOp::Mul), [t(x), t(c)]).unwrap();
    g.add_result(t(mul)).unwrap();
    (g, x, mul)
}

#[test]
fn test_rule_replaces_root_with_existing_value() {
    let (mut g, x, mul) = scaled(1.0);
    assert!(mul_by_one().apply(&mut g, mul));
    assert!(!g.contains(mul));
    assert_eq!(g.results(), &[t(x)]);
    assert_eq!(g.len(), 1);
}

#[test]
fn test_rule_staged_replacement_inherits_name_and_provenance() {
    let (mut g, x, mul) = scaled(2.0);
    g.tag_origin(mul, "model/scale").unwrap();
    assert!(double_to_add().apply(&mut g, mul));

    let root = g.results()[0];
    let node = g.node(root.node).unwrap();
    assert_eq!(node.kind(), OpKind::Add);
    assert_eq!(node.name(), "scaled");
    assert_eq!(node.inputs(), &[t(x), t(x)]);

    let provenance = node.provenance();
    assert!(provenance.contains(&ProvenanceEvent::Imported { origin: "model/scale".into() }));
    assert!(provenance.contains(&ProvenanceEvent::Rewritten { rule: "double_to_add".into(), from: "scaled".into() }));
}

#[test]
fn test_staged_intermediate_keeps_explicit_name() {
    // `x * 2 -> (x + x) - 0`, naming the intermediate add.
    let pattern = Pat::binary(BinaryOp::Mul, [Pat::var("x"), Pat::cvar("two")]);
    let rule = RewriteRule::new("named_intermediate", pattern, |m, rw| {
        let Some(x) = m.get("x") else { return RewriteResult::NoMatch };
        let Ok(twice) = rw.binary(BinaryOp::Add, x, x) else { return RewriteResult::NoMatch };
        rw.set_name(twice, "twice");
        let zero = rw.constant(ConstTensor::scalar_f32(0.0));
        rw.binary(BinaryOp::Sub, twice, zero).ok().into()
    });

    let (mut g, _, mul) = scaled(2.0);
    assert!(rule.apply(&mut g, mul));
    let names: Vec<String> = g.node_ids().into_iter().map(|id| g.node(id).unwrap().name().to_string()).collect();
    assert!(names.iter().any(|n| n == "twice"));
    assert_eq!(g.node(g.results()[0].node).unwrap().name(), "scaled");
}

#[test]
fn test_rejected_rule_leaves_graph_untouched() {
    let (mut g, _, mul) = scaled(3.0);
    let before = g.snapshot();
    assert!(!mul_by_one().apply(&mut g, mul));
    assert!(!double_to_add().apply(&mut g, mul));
    assert_eq!(g.snapshot(), before);
}

#[test]
fn test_invalid_replacement_leaves_graph_untouched() {
    let (mut g, _, mul) = scaled(2.0);
    let widen = RewriteRule::new("widen", Pat::leaf(OpKind::Mul), |m, rw| {
        let Ok(wide) = rw.reshape(m.root(), &[2, 2]) else { return RewriteResult::NoMatch };
        RewriteResult::Rewritten(wide)
    });
    let before = g.snapshot();
    assert!(!widen.apply(&mut g, mul));
    assert_eq!(g.snapshot(), before);
}

#[test]
fn test_cyclic_replacement_leaves_graph_untouched() {
    let (mut g, _, mul) = scaled(2.0);
    let wrap = RewriteRule::new("wrap", Pat::leaf(OpKind::Mul), |m, rw| rw.binary(BinaryOp::Add, m.root(), m.root()).ok().into());
    let before = g.snapshot();
    assert!(!wrap.apply(&mut g, mul));
    assert_eq!(g.snapshot(), before);
}

#[test]
fn test_splice_rejects_unknown_staged_value() {
    let (mut g, _, mul) = scaled(2.0);
    let before = g.snapshot();
    let err = g.splice(mul, Vec::new(), Value::Staged { index: 0, output: 0 }, &[mul], "bogus").unwrap_err();
    assert_eq!(err, Error::UnknownStaged { index: 0, output: 0 });
    assert_eq!(g.snapshot(), before);
}

#[test]
fn test_rewrite_reaches_fixed_point() {
    let mut g = Graph::new();
    let x = g.parameter("x", DType::Float32, &[4]);
    let one = g.constant(ConstTensor::scalar_f32(1.0));
    let inner = binary(&mut g, BinaryOp::Mul, x, one);
    let outer = binary(&mut g, BinaryOp::Mul, one, inner);
    g.add_result(t(outer)).unwrap();

    let rules: RuleSet = [mul_by_one(), double_to_add()].into_iter().collect();
    let stats = graph_rewrite(&mut g, &rules, &RewriteConfig::default()).unwrap();

    assert_eq!(stats.rewrites, 2);
    assert_eq!(stats.count("mul_by_one"), 2);
    assert_eq!(stats.count("double_to_add"), 0);
    assert_eq!(stats.iterations, 2);
    assert_eq!(g.results(), &[t(x)]);
    assert_eq!(g.len(), 1);

    // Already at the fixed point
    let again = graph_rewrite(&mut g, &rules, &RewriteConfig::default()).unwrap();
    assert_eq!(again.rewrites, 0);
    assert_eq!(again.iterations, 1);
}

#[test]
fn test_first_registered_rule_wins() {
    let (mut g, _, mul) = scaled(2.0);
    let shadow = RewriteRule::new("shadow", Pat::binary(BinaryOp::Mul, [Pat::var("x"), Pat::wildcard()]), |m, rw| {
        let Some(x) = m.get("x") else { return RewriteResult::NoMatch };
        rw.binary(BinaryOp::Sub, x, x).ok().into()
    });
    let rules = RuleSet::new().with(double_to_add()).with(shadow);
    assert_eq!(rules.names().collect::<Vec<_>>(), vec!["double_to_add", "shadow"]);

    let stats = graph_rewrite(&mut g, &rules, &RewriteConfig::default()).unwrap();
    assert_eq!(stats.count("double_to_add"), 1);
    assert_eq!(stats.count("shadow"), 0);
    assert!(!g.contains(mul));
}

#[test]
fn test_non_converging_rules_hit_limit() {
    let mut g = Graph::new();
    let x = g.parameter("x", DType::Float32, &[4]);
    let y = g.parameter("y", DType::Float32, &[4]);
    let add = binary(&mut g, BinaryOp::Add, x, y);
    g.add_result(t(add)).unwrap();

    let mut rules = RuleSet::new();
    rules.register("swap", Pat::binary(BinaryOp::Add, [Pat::var("a"), Pat::var("b")]), |m, rw| {
        let (Some(a), Some(b)) = (m.get("a"), m.get("b")) else { return RewriteResult::NoMatch };
        rw.binary(BinaryOp::Add, b, a).ok().into()
    });

    let config = RewriteConfig::builder().max_iterations(3).build();
    let err = graph_rewrite(&mut g, &rules, &config).unwrap_err();
    assert_eq!(err, Error::RewriteLimitExceeded { limit: 3 });
}

#[test]
fn test_rewrite_config_defaults() {
    assert_eq!(RewriteConfig::default().max_iterations, 1000);
    assert_eq!(RewriteConfig::builder().build(), RewriteConfig::default());
}

#[test]
fn test_rewriter_folds_constant_operands() {
    let (g, x, _) = scaled(2.0);
    let mut rw = Rewriter::new(&g);
    let a = rw.constant(ConstTensor::from_f32(&[2], &[1.0, 4.0]).unwrap());
    let b = rw.constant(ConstTensor::scalar_f32(2.0));

    let folded = rw.binary(BinaryOp::Div, a, b).unwrap();
    assert_eq!(rw.static_value(folded).map(ConstTensor::to_f32_vec), Some(vec![0.5, 2.0]));

    let column = rw.reshape(folded, &[-1, 1]).unwrap();
    assert_eq!(rw.static_value(column).map(|c| c.shape().to_vec()), Some(vec![2, 1]));

    let scaled = rw.binary(BinaryOp::Mul, x, b).unwrap();
    assert!(rw.static_value(scaled).is_none());
    assert_eq!(rw.info(scaled).unwrap().shape.as_slice(), &[4]);
}
