//! Intermediate representation for the qfold graph rewriter.
//!
//! This crate defines the dataflow graph, the declarative pattern language,
//! the matcher and the rewrite runtime that quantization fusions are built on.
//!
//! # Module Organization
//!
//! - [`types`] - Constant values, operator kinds, convolution attributes
//! - [`op`] - Operation enum defining all graph operators
//! - [`graph`] - Node arena, consumer edges, splicing of replacements
//! - [`ops`] - Type and shape inference per operator
//! - [`pattern`] - Pattern templates, predicates and the matcher
//! - [`rewrite`] - Rules, rule sets and the fixed-point driver
//! - [`eval`] - Reference interpreter
//! - [`provenance`] - Where each node came from
//! - [`error`] - Error types and result handling
//! - [`shape`] - Static shape utilities

pub mod error;
pub mod eval;
pub mod graph;
pub mod op;
pub mod ops;
pub mod pattern;
pub mod prelude;
pub mod provenance;
pub mod rewrite;
pub mod shape;
pub mod tensor;
pub mod types;

#[cfg(any(test, feature = "proptest"))]
pub mod test;

pub use error::{Error, Result, log_provenance};
pub use eval::{evaluate, evaluate_results};
pub use graph::{Graph, GraphSnapshot, Node, NodeId, OutputInfo, TensorRef, Use, Value};
pub use op::Op;
pub use shape::Shape;
pub use tensor::{ConstTensor, TensorData};
pub use types::{AutoPad, BinaryConvAttrs, BinaryConvMode, BinaryOp, ConstValue, ConvAttrs, OpKind};

pub use pattern::{Match, Pat, Pattern, Predicate};
pub use rewrite::{RewriteConfig, RewriteResult, RewriteRule, RewriteStats, Rewriter, RuleSet, graph_rewrite};

pub use qfold_dtype::DType;
