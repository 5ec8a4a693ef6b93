//! Graph model.
//!
//! A [`Graph`] is an arena of [`Node`]s addressed by generational [`NodeId`]s.
//! Edges are [`TensorRef`]s (producer node plus output index) stored on the
//! consuming node; the reverse edges are kept per producer so consumer counts
//! and rewiring are cheap. The graph exclusively owns every node: a
//! `TensorRef` is a non-owning use.
//!
//! Nodes are never mutated in place. Rewrites insert new nodes, move consumer
//! edges over, and drop whatever became unreferenced.

use std::fmt;
use std::panic::Location;

use itertools::Itertools;
use qfold_dtype::DType;
use slotmap::{SecondaryMap, SlotMap};
use smallvec::SmallVec;
use snafu::OptionExt;

use crate::error::{OutputOutOfRangeSnafu, Result, UnknownNodeSnafu};
use crate::op::Op;
use crate::ops::{self, Operand};
use crate::provenance::Provenance;
use crate::shape::Shape;
use crate::tensor::ConstTensor;
use crate::types::OpKind;

mod mutate;
mod snapshot;
mod splice;

pub use snapshot::{GraphSnapshot, NodeSnapshot};
pub use splice::{StagedNode, Value};

slotmap::new_key_type! {
    /// Stable handle of a node. Stale handles of removed nodes never alias new nodes.
    pub struct NodeId;
}

/// One output of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorRef {
    pub node: NodeId,
    pub output: u32,
}

impl TensorRef {
    pub const fn new(node: NodeId, output: u32) -> Self {
        Self { node, output }
    }
}

impl From<NodeId> for TensorRef {
    fn from(node: NodeId) -> Self {
        Self::new(node, 0)
    }
}

/// Element type and shape of one output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutputInfo {
    pub dtype: DType,
    pub shape: Shape,
}

impl OutputInfo {
    pub fn new(dtype: DType, shape: Shape) -> Self {
        Self { dtype, shape }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }
}

impl fmt::Display for OutputInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.dtype, self.shape.as_slice())
    }
}

/// A consumer edge: input `input` of node `user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Use {
    pub user: NodeId,
    pub input: usize,
}

/// An operation in the graph.
#[derive(Debug, Clone)]
pub struct Node {
    op: Op,
    inputs: SmallVec<[TensorRef; 5]>,
    outputs: SmallVec<[OutputInfo; 1]>,
    name: String,
    provenance: Provenance,
    seq: u64,
}

impl Node {
    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    pub fn inputs(&self) -> &[TensorRef] {
        &self.inputs
    }

    pub fn input(&self, index: usize) -> Option<TensorRef> {
        self.inputs.get(index).copied()
    }

    pub fn outputs(&self) -> &[OutputInfo] {
        &self.outputs
    }

    pub fn output(&self, index: u32) -> Option<&OutputInfo> {
        self.outputs.get(index as usize)
    }

    /// Display label. Carried over to replacements, never interpreted.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Creation order, unique within a graph.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The constant payload, for `Constant` nodes.
    pub fn static_value(&self) -> Option<&ConstTensor> {
        self.op.as_constant()
    }
}

/// Dataflow graph of typed nodes.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: SlotMap<NodeId, Node>,
    uses: SecondaryMap<NodeId, Vec<Use>>,
    results: Vec<TensorRef>,
    next_seq: u64,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Construction =====

    /// Add a graph input.
    #[track_caller]
    pub fn parameter(&mut self, name: impl Into<String>, dtype: DType, shape: &[usize]) -> NodeId {
        let shape = Shape::from_slice(shape);
        let info = OutputInfo::new(dtype, shape.clone());
        let provenance = Provenance::created(Location::caller());
        self.push_node(Op::Parameter { dtype, shape }, SmallVec::new(), [info].into(), Some(name.into()), provenance)
    }

    /// Add a constant node.
    #[track_caller]
    pub fn constant(&mut self, tensor: ConstTensor) -> NodeId {
        let info = OutputInfo::new(tensor.dtype(), tensor.shape().clone());
        let provenance = Provenance::created(Location::caller());
        self.push_node(Op::Constant(tensor), SmallVec::new(), [info].into(), None, provenance)
    }

    /// Add a node, inferring its outputs from the inputs.
    #[track_caller]
    pub fn add_node(&mut self, op: Op, inputs: impl IntoIterator<Item = TensorRef>) -> Result<NodeId> {
        self.insert(op, inputs.into_iter().collect(), None, Location::caller())
    }

    /// Add a node with an explicit name.
    #[track_caller]
    pub fn add_named(
        &mut self,
        name: impl Into<String>,
        op: Op,
        inputs: impl IntoIterator<Item = TensorRef>,
    ) -> Result<NodeId> {
        self.insert(op, inputs.into_iter().collect(), Some(name.into()), Location::caller())
    }

    /// Mark an output as a graph result. Results count as consumers.
    pub fn add_result(&mut self, tensor: TensorRef) -> Result<()> {
        self.output_info(tensor)?;
        self.results.push(tensor);
        Ok(())
    }

    /// Attach an import origin to a node's provenance.
    pub fn tag_origin(&mut self, node: NodeId, origin: impl Into<String>) -> Result<()> {
        let n = self.nodes.get_mut(node).context(UnknownNodeSnafu { node })?;
        n.provenance.push(crate::provenance::ProvenanceEvent::Imported { origin: origin.into() });
        Ok(())
    }

    fn insert(
        &mut self,
        op: Op,
        inputs: SmallVec<[TensorRef; 5]>,
        name: Option<String>,
        location: &'static Location<'static>,
    ) -> Result<NodeId> {
        let outputs = {
            let operands = inputs.iter().map(|&t| self.operand(t)).collect::<Result<SmallVec<[_; 5]>>>()?;
            ops::infer(&op, &operands)?
        };
        Ok(self.push_node(op, inputs, outputs, name, Provenance::created(location)))
    }

    pub(crate) fn operand(&self, tensor: TensorRef) -> Result<Operand<'_>> {
        Ok(Operand { info: self.output_info(tensor)?, value: self.static_value(tensor) })
    }

    fn push_node(
        &mut self,
        op: Op,
        inputs: SmallVec<[TensorRef; 5]>,
        outputs: SmallVec<[OutputInfo; 1]>,
        name: Option<String>,
        provenance: Provenance,
    ) -> NodeId {
        let seq = self.next_seq;
        self.next_seq += 1;
        let name = name.unwrap_or_else(|| format!("{}_{seq}", op.kind()));
        let edges = inputs.clone();
        let id = self.nodes.insert(Node { op, inputs, outputs, name, provenance, seq });
        self.uses.insert(id, Vec::new());
        for (input, tensor) in edges.into_iter().enumerate() {
            if let Some(uses) = self.uses.get_mut(tensor.node) {
                uses.push(Use { user: id, input });
            }
        }
        id
    }

    // ===== Queries =====

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn results(&self) -> &[TensorRef] {
        &self.results
    }

    /// Node ids in creation order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().sorted_by_key(|(_, n)| n.seq).map(|(id, _)| id).collect()
    }

    /// Producers before consumers; ties broken by creation order.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut visited: SecondaryMap<NodeId, ()> = SecondaryMap::new();
        let mut stack: Vec<(NodeId, bool)> = Vec::new();

        for start in self.node_ids() {
            stack.push((start, false));
            while let Some((id, expanded)) = stack.pop() {
                if expanded {
                    order.push(id);
                    continue;
                }
                if visited.insert(id, ()).is_some() {
                    continue;
                }
                stack.push((id, true));
                if let Some(node) = self.nodes.get(id) {
                    for input in node.inputs.iter().rev() {
                        if !visited.contains_key(input.node) {
                            stack.push((input.node, false));
                        }
                    }
                }
            }
        }
        order
    }

    /// Consumer edges of every output of `id`.
    pub fn uses(&self, id: NodeId) -> &[Use] {
        self.uses.get(id).map_or(&[], Vec::as_slice)
    }

    /// Consumer edges of one output.
    pub fn consumers(&self, tensor: TensorRef) -> impl Iterator<Item = Use> + '_ {
        self.uses(tensor.node)
            .iter()
            .copied()
            .filter(move |u| self.nodes.get(u.user).and_then(|n| n.input(u.input)) == Some(tensor))
    }

    /// Consumer edges plus result references, summed over all outputs.
    pub fn consumer_count(&self, id: NodeId) -> usize {
        self.uses(id).len() + self.results.iter().filter(|t| t.node == id).count()
    }

    pub fn output_info(&self, tensor: TensorRef) -> Result<&OutputInfo> {
        let node = self.nodes.get(tensor.node).context(UnknownNodeSnafu { node: tensor.node })?;
        node.output(tensor.output).context(OutputOutOfRangeSnafu { tensor, outputs: node.outputs.len() })
    }

    /// Constant payload behind a tensor, if its producer is a constant.
    pub fn static_value(&self, tensor: TensorRef) -> Option<&ConstTensor> {
        self.nodes.get(tensor.node).filter(|_| tensor.output == 0).and_then(Node::static_value)
    }

    /// True if `target` is reachable from `node` through inputs (or is `node`).
    pub fn depends_on(&self, node: NodeId, target: NodeId) -> bool {
        let mut visited: SecondaryMap<NodeId, ()> = SecondaryMap::new();
        let mut stack = vec![node];
        while let Some(id) = stack.pop() {
            if id == target {
                return true;
            }
            if visited.insert(id, ()).is_some() {
                continue;
            }
            if let Some(n) = self.nodes.get(id) {
                stack.extend(n.inputs.iter().map(|t| t.node));
            }
        }
        false
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let seq = |t: &TensorRef| self.nodes.get(t.node).map_or(u64::MAX, |n| n.seq);
        for id in self.topological_order() {
            let Some(node) = self.nodes.get(id) else { continue };
            let inputs = node.inputs.iter().map(|t| format!("%{}:{}", seq(t), t.output)).join(", ");
            let outputs = node.outputs.iter().join(", ");
            writeln!(f, "%{} = {}({inputs}) -> {outputs}  \"{}\"", node.seq, node.op, node.name)?;
        }
        let results = self.results.iter().map(|t| format!("%{}:{}", seq(t), t.output)).join(", ");
        write!(f, "results: [{results}]")
    }
}
