//! Quantization fusion rules for qfold graphs.
//!
//! Every rule is a [`RewriteRule`](qfold_ir::RewriteRule): a pattern over the
//! graph plus a callback that validates constant operands and stages the
//! replacement. [`quantization_fusions`] assembles the enabled rules into a
//! [`RuleSet`] for [`graph_rewrite`](qfold_ir::graph_rewrite).
//!
//! Rules reject silently (a `tracing` debug event) whenever a structural or
//! numeric precondition fails; a rejected match never touches the graph.

pub mod algebra;
pub mod config;
pub mod rules;

#[cfg(test)]
mod test;

pub use config::FusionConfig;
pub use rules::quantization_fusions;

use qfold_ir::{Graph, Result, RewriteConfig, RewriteStats, graph_rewrite};

/// Run the enabled fusions over `graph` until nothing fires.
pub fn fuse_quantization(graph: &mut Graph, fusions: &FusionConfig, rewrite: &RewriteConfig) -> Result<RewriteStats> {
    let rules = quantization_fusions(fusions);
    graph_rewrite(graph, &rules, rewrite)
}
