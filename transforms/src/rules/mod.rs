//! Quantization fusion rules.
//!
//! Registration order is the priority order at a node:
//! - `dequantize`: `(convert(q) - zp) * scale` into a 256-level quantization
//! - `mul_fake_quantize`: fold `x * c` into the quantization thresholds
//! - `add_fake_quantize`: fold `x + c` into the quantization thresholds
//! - `binary_convolution`: lower binary conv to bit-packed XNOR-popcount
//! - `binarize_weights`, `binarize_weights_only`: normalized binary conv with rescaling

pub mod add_fake_quantize;
pub mod binarize_weights;
pub mod conv_to_binary_conv;
pub mod dequantize;
pub mod mul_fake_quantize;

use qfold_ir::{ConstTensor, Graph, Match, NodeId, Op, RuleSet, TensorRef};

use crate::config::FusionConfig;

/// Assemble the enabled fusions in priority order.
pub fn quantization_fusions(config: &FusionConfig) -> RuleSet {
    let mut rules = RuleSet::new();
    if config.dequantize {
        rules.push(dequantize::rule());
    }
    if config.mul_fake_quantize {
        rules.push(mul_fake_quantize::rule());
    }
    if config.add_fake_quantize {
        rules.push(add_fake_quantize::rule());
    }
    if config.binary_convolution {
        rules.push(conv_to_binary_conv::rule());
    }
    if config.binarize_weights {
        rules.push(binarize_weights::rule());
        rules.push(binarize_weights::weights_only_rule());
    }
    tracing::debug!(rules = ?rules.names().collect::<Vec<_>>(), "quantization fusions assembled");
    rules
}

// ============================================================================
// HELPERS
// ============================================================================

/// Log why a rule declined a match.
pub(crate) fn reject<T>(rule: &str, reason: &str) -> Option<T> {
    tracing::debug!(rule, reason, "fusion rejected");
    None
}

/// Turn a staging failure into a logged rejection.
pub(crate) trait OrReject<T> {
    fn or_reject(self, rule: &str) -> Option<T>;
}

impl<T> OrReject<T> for qfold_ir::Result<T> {
    fn or_reject(self, rule: &str) -> Option<T> {
        self.map_err(|error| tracing::debug!(rule, %error, "fusion could not be staged")).ok()
    }
}

/// Payload of the constant bound to `name`.
pub(crate) fn bound_constant<'g>(graph: &'g Graph, m: &Match<'_>, name: &str) -> Option<&'g ConstTensor> {
    m.get(name).and_then(|t| graph.static_value(t))
}

pub(crate) fn fq_levels(graph: &Graph, node: NodeId) -> Option<u32> {
    match graph.node(node)?.op() {
        Op::FakeQuantize { levels } => Some(*levels),
        _ => None,
    }
}

/// Whether two tensors have the same dtype and shape.
pub(crate) fn same_info(graph: &Graph, a: TensorRef, b: TensorRef) -> bool {
    matches!((graph.output_info(a), graph.output_info(b)), (Ok(a), Ok(b)) if a == b)
}
