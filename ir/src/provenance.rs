//! Provenance tracking for graph nodes.
//!
//! Every node carries an event set describing where it came from:
//! - Where it was created (source location)
//! - Which external model node it was imported from (if applicable)
//! - Which rewrite rule produced it, and from which node
//!
//! Provenance is bookkeeping only. Matching and numerics never read it.
//! Rewrites merge the sets of all matched nodes into every new node, so the
//! history of a fused subgraph survives on its replacement.

use derive_more::Display;
use std::{
    borrow::Cow,
    fmt,
    panic::Location,
    path::{Path, PathBuf},
    sync::OnceLock,
};

/// Source code location with a workspace-relative path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
#[display("{file}:{line}:{column}")]
pub struct SourceLocation<'i> {
    /// Path relative to workspace root (e.g., "transforms/src/dequantize.rs")
    pub file: Cow<'i, str>,
    pub line: u32,
    pub column: u32,
}

impl SourceLocation<'static> {
    pub fn new<F: Into<String>>(file: F, line: u32, column: u32) -> Self {
        Self { file: Cow::Owned(file.into()), line, column }
    }

    /// Create a SourceLocation from a panic::Location, converting to workspace-relative path.
    pub fn from_caller(loc: &'static Location<'static>) -> Self {
        Self { file: Cow::Borrowed(get_relative_location(loc)), line: loc.line(), column: loc.column() }
    }
}

/// Individual provenance event in a node's history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display)]
pub enum ProvenanceEvent {
    /// Node was created at this source location
    #[display("created at {location}")]
    Created { location: SourceLocation<'static> },

    /// Node was imported from an external model node
    #[display("imported from {origin}")]
    Imported { origin: String },

    /// Node was produced by a rewrite rule replacing `from`
    #[display("rewritten from {from} by {rule}")]
    Rewritten { rule: String, from: String },
}

/// Set of provenance events attached to one node, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Provenance {
    events: Vec<ProvenanceEvent>,
}

impl Provenance {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provenance holding a single `Created` event for the caller location.
    pub fn created(location: &'static Location<'static>) -> Self {
        Self { events: vec![ProvenanceEvent::Created { location: SourceLocation::from_caller(location) }] }
    }

    /// Add an event unless it is already present.
    pub fn push(&mut self, event: ProvenanceEvent) {
        if !self.events.contains(&event) {
            self.events.push(event);
        }
    }

    /// Union with another set. Existing events are never replaced.
    pub fn merge(&mut self, other: &Provenance) {
        for event in &other.events {
            self.push(event.clone());
        }
    }

    pub fn events(&self) -> &[ProvenanceEvent] {
        &self.events
    }

    pub fn contains(&self, event: &ProvenanceEvent) -> bool {
        self.events.contains(event)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, event) in self.events.iter().enumerate() {
            write!(f, "\n  [{i}] {event}")?;
        }
        Ok(())
    }
}

/// Get the workspace root path, computed from CARGO_MANIFEST_DIR at compile time.
///
/// For workspace member crates (like "ir"), CARGO_MANIFEST_DIR points to the crate directory.
/// The workspace root is its parent.
fn workspace_root() -> &'static Path {
    static ROOT: OnceLock<PathBuf> = OnceLock::new();
    ROOT.get_or_init(|| {
        let manifest_dir = env!("CARGO_MANIFEST_DIR");
        let path = Path::new(manifest_dir);
        path.parent().map(|p| p.to_path_buf()).unwrap_or_else(|| PathBuf::from(manifest_dir))
    })
    .as_path()
}

/// Get a location string relative to the workspace root.
///
/// Returns a workspace-relative path (e.g., "ir/src/graph/mod.rs") when possible,
/// the full path otherwise.
pub(crate) fn get_relative_location(loc: &'static Location<'static>) -> &'static str {
    let file = loc.file();
    let Some(root) = workspace_root().to_str() else {
        return file;
    };

    if let Some(stripped) = file.strip_prefix(root) {
        stripped.strip_prefix('/').or_else(|| stripped.strip_prefix('\\')).unwrap_or(stripped)
    } else {
        file
    }
}
