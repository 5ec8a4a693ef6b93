//! Common imports for writing rewrite rules.
//!
//! ```rust,ignore
//! use qfold_ir::prelude::*;
//! ```

// Graph
pub use crate::graph::{Graph, NodeId, OutputInfo, TensorRef, Value};
pub use crate::op::Op;
pub use crate::tensor::ConstTensor;

// Operation types
pub use crate::types::{AutoPad, BinaryConvAttrs, BinaryConvMode, BinaryOp, ConstValue, ConvAttrs, OpKind};

// Patterns and rules
pub use crate::pattern::{Match, Pat, Pattern, Predicate, consumers_count, is_static, levels};
pub use crate::rewrite::{RewriteResult, RewriteRule, Rewriter, RuleSet};

pub use qfold_dtype::DType;
