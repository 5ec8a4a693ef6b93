//! Guard predicates attached to pattern nodes.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::graph::{Graph, NodeId};
use crate::op::Op;

type Check = dyn Fn(&Graph, NodeId) -> bool + Send + Sync;

/// Named boolean check on a candidate node.
///
/// Predicates see the candidate only; they are evaluated after the kind check
/// and before any child pattern.
#[derive(Clone)]
pub struct Predicate {
    name: Cow<'static, str>,
    check: Arc<Check>,
}

impl Predicate {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        check: impl Fn(&Graph, NodeId) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), check: Arc::new(check) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, graph: &Graph, node: NodeId) -> bool {
        (self.check)(graph, node)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Predicate").field(&self.name).finish()
    }
}

/// Total consumer count of the candidate (all outputs, results included) equals `n`.
pub fn consumers_count(n: usize) -> Predicate {
    Predicate::new(format!("consumers_count({n})"), move |graph, node| graph.consumer_count(node) == n)
}

/// Candidate is a quantization node with `n` levels.
pub fn levels(n: u32) -> Predicate {
    Predicate::new(format!("levels({n})"), move |graph, node| {
        graph.node(node).is_some_and(|x| matches!(x.op(), Op::FakeQuantize { levels } if *levels == n))
    })
}

/// Candidate is a compile-time constant.
pub fn is_static() -> Predicate {
    Predicate::new("is_static", |graph, node| graph.node(node).is_some_and(|x| x.static_value().is_some()))
}
