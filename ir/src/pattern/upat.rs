//! Pattern template DSL.
//!
//! A [`Pat`] describes an expected subgraph shape rooted at one node. It
//! supports:
//!
//! - Wildcards (`Pat::var("x")` binds any single output)
//! - Operator kind constraints (`Pat::op(OpKind::Convolution, ...)`)
//! - Guard predicates evaluated on the candidate node (`.with_predicate(...)`)
//! - Named captures (matched tensors bound to names)
//! - Positional and commutative source matching
//!
//! # Example
//!
//! ```ignore
//! // Match: FakeQuantize(x * c, il, ih, ol, oh)
//! let pat = Pat::fake_quantize(
//!     Pat::commutative(BinaryOp::Mul, [Pat::var("x"), Pat::cvar("c")]).named("mul"),
//!     [Pat::var("il"), Pat::var("ih"), Pat::var("ol"), Pat::var("oh")],
//! );
//! ```

use std::collections::HashMap;

use smallvec::SmallVec;

use crate::graph::TensorRef;
use crate::types::{BinaryOp, OpKind};

use super::predicate::Predicate;

// ===== Binding Storage =====

/// Single binding entry: (variable_index, bound tensor).
pub type BindingEntry = (u8, TensorRef);

/// Stack-allocated binding storage for typical patterns.
pub type BindingStore = SmallVec<[BindingEntry; 8]>;

/// Variable name interning table.
/// Maps string names to compact u8 indices for efficient binding storage.
#[derive(Debug, Clone, Default)]
pub struct VarIntern {
    names: Vec<String>,
    indices: HashMap<String, u8>,
}

impl VarIntern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create an index for a variable name.
    pub fn get_or_insert(&mut self, name: &str) -> u8 {
        if let Some(&idx) = self.indices.get(name) {
            return idx;
        }
        let idx = self.names.len() as u8;
        self.names.push(name.to_string());
        self.indices.insert(name.to_string(), idx);
        idx
    }

    pub fn get_index(&self, name: &str) -> Option<u8> {
        self.indices.get(name).copied()
    }

    pub fn get_name(&self, idx: u8) -> Option<&str> {
        self.names.get(idx as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Extension methods for BindingStore.
pub trait BindingStoreExt {
    fn get_by_index(&self, idx: u8) -> Option<TensorRef>;

    /// Insert or update binding at index.
    fn set_binding(&mut self, idx: u8, tensor: TensorRef);
}

impl BindingStoreExt for BindingStore {
    fn get_by_index(&self, idx: u8) -> Option<TensorRef> {
        self.iter().find(|(i, _)| *i == idx).map(|(_, t)| *t)
    }

    fn set_binding(&mut self, idx: u8, tensor: TensorRef) {
        for (i, existing) in self.iter_mut() {
            if *i == idx {
                *existing = tensor;
                return;
            }
        }
        self.push((idx, tensor));
    }
}

// ===== Pattern AST =====

/// Pattern node.
#[derive(Debug, Clone)]
pub enum Pat {
    /// Matches exactly one producer output, unconditionally. Does not recurse.
    Wildcard { name: Option<String> },

    /// Matches a node whose kind is one of `kinds`.
    Node {
        kinds: SmallVec<[OpKind; 2]>,
        /// How to match the node's inputs (`None` = inputs unconstrained)
        src: Option<SrcPattern>,
        /// Guards evaluated on the candidate before its inputs are visited
        predicates: Vec<Predicate>,
        /// Bind the matched node's output to this name
        name: Option<String>,
    },
}

/// Pattern for matching a node's inputs.
#[derive(Debug, Clone)]
pub enum SrcPattern {
    /// One pattern per input, matched positionally. Arity must match exactly.
    Tuple(Vec<Pat>),

    /// Match inputs against patterns in any order (commutative operators).
    Permute(Vec<Pat>),
}

impl Pat {
    /// Anonymous wildcard.
    pub fn wildcard() -> Self {
        Pat::Wildcard { name: None }
    }

    /// Wildcard bound to `name`.
    pub fn var(name: impl Into<String>) -> Self {
        Pat::Wildcard { name: Some(name.into()) }
    }

    /// Node whose kind is in `kinds`, with one child pattern per input.
    pub fn type_node(
        kinds: impl IntoIterator<Item = OpKind>,
        children: Vec<Pat>,
        predicate: Option<Predicate>,
    ) -> Self {
        Pat::Node {
            kinds: kinds.into_iter().collect(),
            src: Some(SrcPattern::Tuple(children)),
            predicates: predicate.into_iter().collect(),
            name: None,
        }
    }

    /// Node of a single kind with positional children.
    pub fn op(kind: OpKind, children: Vec<Pat>) -> Self {
        Self::type_node([kind], children, None)
    }

    /// Node of a single kind, inputs unconstrained.
    pub fn leaf(kind: OpKind) -> Self {
        Pat::Node { kinds: [kind].into_iter().collect(), src: None, predicates: Vec::new(), name: None }
    }

    /// Any constant.
    pub fn constant() -> Self {
        Self::leaf(OpKind::Constant)
    }

    /// Constant bound to `name`.
    pub fn cvar(name: impl Into<String>) -> Self {
        Self::constant().named(name)
    }

    pub fn binary(op: BinaryOp, [lhs, rhs]: [Pat; 2]) -> Self {
        Self::op(op.into(), vec![lhs, rhs])
    }

    /// Binary op matching both `op(a, b)` and `op(b, a)`.
    pub fn commutative(op: BinaryOp, [lhs, rhs]: [Pat; 2]) -> Self {
        Pat::Node {
            kinds: [OpKind::from(op)].into_iter().collect(),
            src: Some(SrcPattern::Permute(vec![lhs, rhs])),
            predicates: Vec::new(),
            name: None,
        }
    }

    pub fn convert(src: Pat) -> Self {
        Self::op(OpKind::Convert, vec![src])
    }

    pub fn convolution(data: Pat, weights: Pat) -> Self {
        Self::op(OpKind::Convolution, vec![data, weights])
    }

    /// Quantization node: data followed by the four thresholds
    /// (input_low, input_high, output_low, output_high).
    pub fn fake_quantize(data: Pat, [il, ih, ol, oh]: [Pat; 4]) -> Self {
        Self::op(OpKind::FakeQuantize, vec![data, il, ih, ol, oh])
    }

    /// Bind the matched tensor to `name`.
    pub fn named(self, name: impl Into<String>) -> Self {
        let name = Some(name.into());
        match self {
            Pat::Wildcard { .. } => Pat::Wildcard { name },
            Pat::Node { kinds, src, predicates, .. } => Pat::Node { kinds, src, predicates, name },
        }
    }

    /// Add a guard. Wildcards are unconditional and ignore guards.
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        if let Pat::Node { predicates, .. } = &mut self {
            predicates.push(predicate);
        }
        self
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Pat::Wildcard { name } | Pat::Node { name, .. } => name.as_deref(),
        }
    }

    // ===== Variable Name Collection =====

    /// Collect all variable names from this pattern and build a VarIntern.
    pub fn collect_var_names(&self) -> VarIntern {
        let mut intern = VarIntern::new();
        self.collect_var_names_internal(&mut intern);
        intern
    }

    fn collect_var_names_internal(&self, intern: &mut VarIntern) {
        if let Some(n) = self.name() {
            intern.get_or_insert(n);
        }
        if let Pat::Node { src: Some(SrcPattern::Tuple(pats) | SrcPattern::Permute(pats)), .. } = self {
            for pat in pats {
                pat.collect_var_names_internal(intern);
            }
        }
    }
}
