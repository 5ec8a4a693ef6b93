//! Rewrite rule runtime.
//!
//! A [`RewriteRule`] owns a [`Pattern`](crate::pattern::Pattern) and a
//! callback. Callbacks stage replacement nodes on a [`Rewriter`]; the runtime
//! commits them with [`Graph::splice`](crate::Graph::splice) or discards them.
//! [`graph_rewrite`] drives a [`RuleSet`] to a fixed point.

pub mod engine;
pub mod rewriter;
pub mod rule;

pub use engine::{RewriteConfig, RewriteStats, graph_rewrite};
pub use rewriter::{RewriteResult, Rewriter};
pub use rule::{RewriteRule, RuleSet};
