//! Fixed-point rewrite driver.
//!
//! # Algorithm
//!
//! Each iteration scans the live nodes in topological order. At every node
//! still present, rules are tried in registration order and the first one
//! that fires wins; the scan then moves on to the next node. Iterations
//! repeat until a full scan fires nothing.
//!
//! Rules must be idempotent (a fired rule's output no longer matches its own
//! pattern); a rule set that keeps firing hits `max_iterations` and fails
//! with [`Error::RewriteLimitExceeded`].

use std::collections::BTreeMap;

use bon::bon;

use crate::error::{Error, Result};
use crate::graph::Graph;

use super::rule::RuleSet;

/// Rewrite driver configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteConfig {
    /// Maximum number of full graph scans before giving up.
    pub max_iterations: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self { max_iterations: 1000 }
    }
}

#[bon]
impl RewriteConfig {
    /// Create a rewrite configuration with builder pattern.
    #[builder]
    pub fn builder(#[builder(default = 1000)] max_iterations: usize) -> Self {
        Self { max_iterations }
    }

    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// * `QFOLD_MAX_ITERATIONS` - Maximum full scans (default: 1000)
    pub fn from_env() -> Self {
        let max_iterations =
            std::env::var("QFOLD_MAX_ITERATIONS").ok().and_then(|s| s.parse().ok()).unwrap_or(1000);
        Self { max_iterations }
    }
}

/// What a rewrite run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteStats {
    /// Full scans performed, including the final one that fired nothing.
    pub iterations: usize,
    /// Total number of rewrites.
    pub rewrites: usize,
    /// Rewrites per rule name.
    pub fired: BTreeMap<String, usize>,
}

impl RewriteStats {
    pub fn count(&self, rule: &str) -> usize {
        self.fired.get(rule).copied().unwrap_or(0)
    }
}

/// Apply `rules` to `graph` until nothing matches.
#[tracing::instrument(skip_all, fields(rules = rules.len(), nodes = graph.len()))]
pub fn graph_rewrite(graph: &mut Graph, rules: &RuleSet, config: &RewriteConfig) -> Result<RewriteStats> {
    let mut stats = RewriteStats::default();
    loop {
        if stats.iterations >= config.max_iterations {
            tracing::warn!(graph = %graph, "rewrite did not converge");
            return Err(Error::RewriteLimitExceeded { limit: config.max_iterations });
        }
        stats.iterations += 1;

        let mut fired = 0;
        for id in graph.topological_order() {
            if !graph.contains(id) {
                continue;
            }
            if let Some(rule) = rules.iter().find(|rule| rule.apply(graph, id)) {
                *stats.fired.entry(rule.name().to_string()).or_default() += 1;
                fired += 1;
            }
        }

        tracing::debug!(iteration = stats.iterations, fired, nodes = graph.len(), "rewrite scan finished");
        stats.rewrites += fired;
        if fired == 0 {
            break;
        }
    }
    tracing::trace!(graph = %graph, "rewrite reached fixed point");
    Ok(stats)
}
