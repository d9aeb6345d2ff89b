//! Type-erased reactive sources.
//!
//! Anything a computed, effect or binding can depend on implements
//! [`Source`]: signals, computeds and reactive objects. The tracking context
//! collects `SourceRef`s; dependents subscribe through [`Source::watch`]
//! without knowing the value type behind it.

use std::fmt;
use std::sync::Arc;

use crate::graph::{NodeId, NodeKind};

use super::subscriber::Subscription;

/// Change callback passed to [`Source::watch`].
pub type Notify = Arc<dyn Fn() + Send + Sync>;

/// Shared handle to a type-erased source.
pub type SourceRef = Arc<dyn Source>;

/// A reactive value that can be depended upon.
pub trait Source: Send + Sync {
    /// The node ID of this source.
    fn node_id(&self) -> NodeId;

    /// The kind of node this source is.
    fn kind(&self) -> NodeKind;

    /// Invoke `notify` every time this source changes.
    fn watch(&self, notify: Notify) -> Subscription;
}

impl fmt::Debug for dyn Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind().as_str(), self.node_id())
    }
}
