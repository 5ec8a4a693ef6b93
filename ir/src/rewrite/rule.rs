//! Rewrite rules and the rule registry.

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use crate::error::log_provenance;
use crate::graph::{Graph, NodeId};
use crate::pattern::{Match, Pat, Pattern};

use super::rewriter::{RewriteResult, Rewriter};

type Callback = dyn Fn(&Match<'_>, &mut Rewriter<'_>) -> RewriteResult + Send + Sync;

/// A pattern plus the callback that rewrites its matches.
///
/// Stateless across invocations apart from the immutable pattern.
#[derive(Clone)]
pub struct RewriteRule {
    name: Cow<'static, str>,
    pattern: Pattern,
    callback: Arc<Callback>,
}

impl RewriteRule {
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        pattern: impl Into<Pattern>,
        callback: impl Fn(&Match<'_>, &mut Rewriter<'_>) -> RewriteResult + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), pattern: pattern.into(), callback: Arc::new(callback) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// Try the rule at `root`. Returns true iff the graph was rewritten.
    ///
    /// Structural non-match and value-level rejection both leave the graph
    /// exactly as found. A replacement that fails commit validation is logged
    /// and treated as a rejection.
    pub fn apply(&self, graph: &mut Graph, root: NodeId) -> bool {
        let Some(m) = self.pattern.match_at(graph, root) else {
            return false;
        };

        let mut rewriter = Rewriter::new(graph);
        let RewriteResult::Rewritten(replacement) = (self.callback)(&m, &mut rewriter) else {
            tracing::debug!(rule = %self.name, root = ?root, "rule rejected match");
            return false;
        };
        let staged = rewriter.into_staged();
        let created = staged.len();

        match graph.splice(root, staged, replacement, m.matched_nodes(), &self.name) {
            Ok(new) => {
                let name = graph.node(new.node).map(|n| n.name().to_string()).unwrap_or_default();
                tracing::debug!(rule = %self.name, root = %name, new_nodes = created, "rule fired");
                true
            }
            Err(error) => {
                log_provenance(graph, root, &error);
                tracing::warn!(rule = %self.name, %error, "replacement failed validation");
                false
            }
        }
    }
}

impl fmt::Debug for RewriteRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RewriteRule").field("name", &self.name).field("pattern", self.pattern.root()).finish()
    }
}

/// Explicit, ordered rule registry.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<RewriteRule>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, rule: RewriteRule) {
        self.rules.push(rule);
    }

    /// Builder-style [`push`](Self::push).
    pub fn with(mut self, rule: RewriteRule) -> Self {
        self.push(rule);
        self
    }

    /// Register a rule from its parts.
    pub fn register(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        pattern: Pat,
        callback: impl Fn(&Match<'_>, &mut Rewriter<'_>) -> RewriteResult + Send + Sync + 'static,
    ) {
        self.push(RewriteRule::new(name, pattern, callback));
    }

    pub fn get(&self, name: &str) -> Option<&RewriteRule> {
        self.rules.iter().find(|r| r.name() == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(RewriteRule::name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RewriteRule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl FromIterator<RewriteRule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = RewriteRule>>(iter: I) -> Self {
        Self { rules: iter.into_iter().collect() }
    }
}

impl Extend<RewriteRule> for RuleSet {
    fn extend<I: IntoIterator<Item = RewriteRule>>(&mut self, iter: I) {
        self.rules.extend(iter);
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a RewriteRule;
    type IntoIter = std::slice::Iter<'a, RewriteRule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}
