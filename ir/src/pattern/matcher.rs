//! Structural matcher.
//!
//! Depth-first walk of a [`Pat`] against the live graph, starting at one
//! candidate root. For each pattern node: check the kind, run the guards on
//! the candidate, bind the name, then recurse into the inputs. Failure at
//! any point discards every binding made for the attempt.

use smallvec::SmallVec;

use crate::graph::{Graph, NodeId, TensorRef};

use super::upat::{BindingStore, BindingStoreExt, Pat, SrcPattern, VarIntern};

/// A compiled pattern: the template plus its interned capture names.
///
/// Built once, reused for every match attempt; holds no per-match state.
#[derive(Debug, Clone)]
pub struct Pattern {
    root: Pat,
    intern: VarIntern,
}

/// Bindings produced by a successful match.
#[derive(Debug, Clone)]
pub struct Match<'p> {
    root: NodeId,
    bindings: BindingStore,
    nodes: SmallVec<[NodeId; 8]>,
    intern: &'p VarIntern,
}

#[derive(Debug, Clone, Default)]
struct MatchState {
    bindings: BindingStore,
    nodes: SmallVec<[NodeId; 8]>,
}

impl Pattern {
    pub fn new(root: Pat) -> Self {
        let intern = root.collect_var_names();
        Self { root, intern }
    }

    pub fn root(&self) -> &Pat {
        &self.root
    }

    /// Match with `node` bound to the pattern root.
    pub fn match_at(&self, graph: &Graph, node: NodeId) -> Option<Match<'_>> {
        let mut state = MatchState::default();
        if !self.root.match_internal(graph, TensorRef::new(node, 0), &mut state, &self.intern) {
            return None;
        }
        tracing::trace!(root = ?node, bindings = state.bindings.len(), "pattern matched");
        Some(Match { root: node, bindings: state.bindings, nodes: state.nodes, intern: &self.intern })
    }
}

impl From<Pat> for Pattern {
    fn from(root: Pat) -> Self {
        Self::new(root)
    }
}

impl Match<'_> {
    /// The node bound to the pattern root.
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Tensor bound to `name`.
    pub fn get(&self, name: &str) -> Option<TensorRef> {
        self.intern.get_index(name).and_then(|idx| self.bindings.get_by_index(idx))
    }

    /// Producer node of the tensor bound to `name`.
    pub fn node(&self, name: &str) -> Option<NodeId> {
        self.get(name).map(|t| t.node)
    }

    /// Every node matched by a type-constrained pattern node (wildcards excluded).
    pub fn matched_nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// All named bindings.
    pub fn iter(&self) -> impl Iterator<Item = (&str, TensorRef)> + '_ {
        self.bindings.iter().filter_map(|(idx, t)| self.intern.get_name(*idx).map(|n| (n, *t)))
    }
}

impl Pat {
    fn match_internal(&self, graph: &Graph, tensor: TensorRef, state: &mut MatchState, intern: &VarIntern) -> bool {
        match self {
            Pat::Wildcard { name } => bind(name.as_deref(), tensor, state, intern),

            Pat::Node { kinds, src, predicates, name } => {
                let Some(node) = graph.node(tensor.node) else {
                    return false;
                };

                // 1. Kind
                if !kinds.contains(&node.kind()) {
                    return false;
                }

                // 2. Guards, before any recursion
                if let Some(p) = predicates.iter().find(|p| !p.check(graph, tensor.node)) {
                    tracing::trace!(node = node.name(), predicate = p.name(), "predicate rejected candidate");
                    return false;
                }

                // 3. Named binding
                if !bind(name.as_deref(), tensor, state, intern) {
                    return false;
                }
                if !state.nodes.contains(&tensor.node) {
                    state.nodes.push(tensor.node);
                }

                // 4. Inputs
                let inputs = node.inputs();
                match src {
                    None => true,
                    Some(SrcPattern::Tuple(pats)) => {
                        pats.len() == inputs.len()
                            && inputs.iter().zip(pats).all(|(&input, pat)| pat.match_internal(graph, input, state, intern))
                    }
                    Some(SrcPattern::Permute(pats)) => {
                        pats.len() == inputs.len() && Self::match_permuted(graph, inputs, pats, state, intern)
                    }
                }
            }
        }
    }

    /// Try every assignment of inputs to patterns, keep the first that matches.
    fn match_permuted(
        graph: &Graph,
        inputs: &[TensorRef],
        patterns: &[Pat],
        state: &mut MatchState,
        intern: &VarIntern,
    ) -> bool {
        let n = patterns.len();
        let mut indices: Vec<usize> = (0..n).collect();
        let mut c = vec![0usize; n];

        let try_order = |indices: &[usize], state: &mut MatchState| {
            let mut attempt = state.clone();
            let ok = indices
                .iter()
                .enumerate()
                .all(|(input, &pat)| patterns[pat].match_internal(graph, inputs[input], &mut attempt, intern));
            if ok {
                *state = attempt;
            }
            ok
        };

        if try_order(&indices, state) {
            return true;
        }

        // Heap's algorithm over the remaining orders
        let mut i = 0;
        while i < n {
            if c[i] < i {
                if i % 2 == 0 {
                    indices.swap(0, i);
                } else {
                    indices.swap(c[i], i);
                }
                if try_order(&indices, state) {
                    return true;
                }
                c[i] += 1;
                i = 0;
            } else {
                c[i] = 0;
                i += 1;
            }
        }
        false
    }
}

/// Bind `name`; a name bound twice must refer to the same tensor.
fn bind(name: Option<&str>, tensor: TensorRef, state: &mut MatchState, intern: &VarIntern) -> bool {
    let Some(idx) = name.and_then(|n| intern.get_index(n)) else {
        return true;
    };
    match state.bindings.get_by_index(idx) {
        Some(existing) => existing == tensor,
        None => {
            state.bindings.set_binding(idx, tensor);
            true
        }
    }
}
