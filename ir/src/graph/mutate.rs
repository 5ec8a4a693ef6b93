use snafu::OptionExt;

use crate::error::{CyclicReplacementSnafu, InvalidReplacementSnafu, ReplacementOutputMismatchSnafu, Result, UnknownNodeSnafu};
use crate::op::Op;

use super::{Graph, NodeId, TensorRef, Use};

impl Graph {
    /// Rewire every consumer of every output of `old` to the same output of
    /// `new`, then drop `old` if nothing references it any more.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> Result<()> {
        let old_node = self.node(old).context(UnknownNodeSnafu { node: old })?;
        let new_node = self.node(new).context(UnknownNodeSnafu { node: new })?;
        snafu::ensure!(
            old_node.outputs.len() == new_node.outputs.len(),
            ReplacementOutputMismatchSnafu { expected: old_node.outputs.len(), actual: new_node.outputs.len() }
        );
        for (expected, actual) in old_node.outputs.iter().zip(&new_node.outputs) {
            snafu::ensure!(
                expected == actual,
                InvalidReplacementSnafu { root: old, expected: expected.to_string(), actual: actual.to_string() }
            );
        }
        let outputs = old_node.outputs.len() as u32;
        snafu::ensure!(!self.depends_on(new, old), CyclicReplacementSnafu { root: old, through: new });

        for output in 0..outputs {
            self.rewire(TensorRef::new(old, output), TensorRef::new(new, output));
        }
        self.remove_dead(old);
        Ok(())
    }

    /// Merge the provenance of every node in `from` into every node in `to`.
    ///
    /// Unknown ids are skipped.
    pub fn copy_provenance(&mut self, from: &[NodeId], to: &[NodeId]) {
        let mut merged = crate::provenance::Provenance::new();
        for node in from.iter().filter_map(|&id| self.node(id)) {
            merged.merge(&node.provenance);
        }
        for &id in to {
            if let Some(node) = self.nodes.get_mut(id) {
                node.provenance.merge(&merged);
            }
        }
    }

    /// Remove every unreferenced node. Parameters are kept.
    ///
    /// Returns the number of removed nodes.
    pub fn sweep(&mut self) -> usize {
        let before = self.nodes.len();
        for id in self.topological_order().into_iter().rev() {
            if self.is_dead(id) {
                self.remove_node(id);
            }
        }
        before - self.nodes.len()
    }

    /// Move every consumer edge (and result reference) of `from` onto `to`.
    pub(super) fn rewire(&mut self, from: TensorRef, to: TensorRef) {
        let moved: Vec<Use> = self.consumers(from).collect();
        for u in &moved {
            if let Some(user) = self.nodes.get_mut(u.user) {
                user.inputs[u.input] = to;
            }
        }
        if let Some(uses) = self.uses.get_mut(from.node) {
            uses.retain(|u| !moved.contains(u));
        }
        if let Some(uses) = self.uses.get_mut(to.node) {
            uses.extend(moved);
        }
        for result in self.results.iter_mut().filter(|r| **r == from) {
            *result = to;
        }
    }

    fn is_dead(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| !matches!(n.op, Op::Parameter { .. })) && self.consumer_count(id) == 0
    }

    /// Remove `id` if unreferenced, then cascade into its producers.
    pub(super) fn remove_dead(&mut self, id: NodeId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            if !self.is_dead(id) {
                continue;
            }
            if let Some(node) = self.remove_node(id) {
                pending.extend(node.inputs.iter().map(|t| t.node));
            }
        }
    }

    fn remove_node(&mut self, id: NodeId) -> Option<super::Node> {
        let node = self.nodes.remove(id)?;
        self.uses.remove(id);
        for (input, tensor) in node.inputs.iter().enumerate() {
            if let Some(uses) = self.uses.get_mut(tensor.node) {
                uses.retain(|u| *u != Use { user: id, input });
            }
        }
        tracing::trace!(node.name = %node.name, node.op = %node.op, "removed node");
        Some(node)
    }
}
