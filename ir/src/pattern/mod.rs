//! Pattern matching infrastructure for qfold graphs.
//!
//! Patterns are pure descriptions: building or matching one never mutates
//! the graph. A [`Pattern`] is matched per candidate root with
//! [`Pattern::match_at`], producing an ephemeral [`Match`].

pub mod matcher;
pub mod predicate;
pub mod upat;

pub use matcher::{Match, Pattern};
pub use predicate::{Predicate, consumers_count, is_static, levels};
pub use upat::{BindingStore, BindingStoreExt, Pat, SrcPattern, VarIntern};
