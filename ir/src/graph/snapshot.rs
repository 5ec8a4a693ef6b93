use crate::op::Op;

use super::{Graph, OutputInfo};

/// Structural copy of a graph, keyed by creation order.
///
/// Two snapshots compare equal iff the graphs hold the same nodes (same
/// operators, attributes, constants, edges, names) and the same results.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub results: Vec<(u64, u32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeSnapshot {
    pub seq: u64,
    pub op: Op,
    pub inputs: Vec<(u64, u32)>,
    pub outputs: Vec<OutputInfo>,
    pub name: String,
}

impl Graph {
    pub fn snapshot(&self) -> GraphSnapshot {
        let seq = |t: &super::TensorRef| (self.node(t.node).map_or(u64::MAX, |n| n.seq), t.output);
        let nodes = self
            .node_ids()
            .into_iter()
            .filter_map(|id| self.node(id))
            .map(|n| NodeSnapshot {
                seq: n.seq,
                op: n.op.clone(),
                inputs: n.inputs.iter().map(seq).collect(),
                outputs: n.outputs.to_vec(),
                name: n.name.clone(),
            })
            .collect();
        GraphSnapshot { nodes, results: self.results.iter().map(seq).collect() }
    }
}
