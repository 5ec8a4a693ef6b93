//! All-or-nothing commit of a staged replacement subgraph.

use std::panic::Location;

use smallvec::SmallVec;
use snafu::OptionExt;

use crate::error::{
    CyclicReplacementSnafu, InvalidReplacementSnafu, ReplacementOutputMismatchSnafu, Result, UnknownNodeSnafu,
    UnknownStagedSnafu,
};
use crate::op::Op;
use crate::provenance::{Provenance, ProvenanceEvent};

use super::{Graph, NodeId, OutputInfo, TensorRef};

/// A tensor that is either already in the graph or produced by a staged node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Value {
    Existing(TensorRef),
    Staged { index: u32, output: u32 },
}

impl From<TensorRef> for Value {
    fn from(tensor: TensorRef) -> Self {
        Value::Existing(tensor)
    }
}

impl From<NodeId> for Value {
    fn from(node: NodeId) -> Self {
        Value::Existing(TensorRef::from(node))
    }
}

/// A node built by a rewrite but not yet inserted.
///
/// Staged inputs may only refer to earlier staged nodes.
#[derive(Debug, Clone)]
pub struct StagedNode {
    pub op: Op,
    pub inputs: SmallVec<[Value; 5]>,
    pub outputs: SmallVec<[OutputInfo; 1]>,
    pub name: Option<String>,
    pub location: &'static Location<'static>,
}

impl Graph {
    /// Replace the single output of `root` by `replacement`.
    ///
    /// Everything is validated before the first mutation: every referenced
    /// tensor exists, no existing operand depends on `root`, and the
    /// replacement has the dtype and shape of the replaced output. On error
    /// the graph is untouched.
    ///
    /// On success the staged nodes are inserted, consumers of `root` are
    /// rewired, the root's name moves to the replacement, provenance of all
    /// `matched` nodes is merged into every new node, and nodes left without
    /// consumers are removed.
    pub fn splice(
        &mut self,
        root: NodeId,
        staged: Vec<StagedNode>,
        replacement: Value,
        matched: &[NodeId],
        rule: &str,
    ) -> Result<TensorRef> {
        let root_node = self.node(root).context(UnknownNodeSnafu { node: root })?;
        snafu::ensure!(
            root_node.outputs.len() == 1,
            ReplacementOutputMismatchSnafu { expected: root_node.outputs.len(), actual: 1usize }
        );
        let expected = root_node.outputs[0].clone();
        let root_name = root_node.name.clone();

        for (index, node) in staged.iter().enumerate() {
            for &value in &node.inputs {
                self.check_value(root, value, &staged[..index])?;
            }
        }
        let actual = self.check_value(root, replacement, &staged)?;
        snafu::ensure!(
            *actual == expected,
            InvalidReplacementSnafu { root, expected: expected.to_string(), actual: actual.to_string() }
        );

        // Commit.
        let mut created: Vec<NodeId> = Vec::with_capacity(staged.len());
        for node in staged {
            let inputs = node.inputs.iter().map(|&v| resolve(v, &created)).collect();
            let provenance = Provenance::created(node.location);
            created.push(self.push_node(node.op, inputs, node.outputs, node.name, provenance));
        }
        let new = resolve(replacement, &created);
        self.rewire(TensorRef::new(root, 0), new);

        if matches!(replacement, Value::Staged { .. })
            && let Some(node) = self.nodes.get_mut(new.node)
        {
            node.name = root_name.clone();
        }

        self.copy_provenance(matched, &created);
        let event = ProvenanceEvent::Rewritten { rule: rule.to_string(), from: root_name };
        for &id in &created {
            if let Some(node) = self.nodes.get_mut(id) {
                node.provenance.push(event.clone());
            }
        }

        self.remove_dead(root);
        // Staged nodes that ended up unused, e.g. operands of a folded constant
        for &id in created.iter().rev() {
            self.remove_dead(id);
        }
        Ok(new)
    }

    /// Resolve the type of `value` and check it can be wired in without a cycle.
    fn check_value<'a>(&'a self, root: NodeId, value: Value, staged: &'a [StagedNode]) -> Result<&'a OutputInfo> {
        match value {
            Value::Existing(tensor) => {
                let info = self.output_info(tensor)?;
                snafu::ensure!(
                    !self.depends_on(tensor.node, root),
                    CyclicReplacementSnafu { root, through: tensor.node }
                );
                Ok(info)
            }
            Value::Staged { index, output } => {
                staged
                    .get(index as usize)
                    .and_then(|n| n.outputs.get(output as usize))
                    .context(UnknownStagedSnafu { index, output })
            }
        }
    }
}

fn resolve(value: Value, created: &[NodeId]) -> TensorRef {
    match value {
        Value::Existing(tensor) => tensor,
        Value::Staged { index, output } => TensorRef::new(created[index as usize], output),
    }
}
