//! Graph Nodes
//!
//! This module defines the node types that live in the debug dependency graph.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Weak;

/// Unique identifier for a reactive node (signal, computed, effect or
/// reactive object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// A writable cell. Sources have dependents but no dependencies.
    Signal,

    /// A derived cell. Has dependencies and may have dependents.
    Computed,

    /// A side effect (including binder bindings). Effects are leaves.
    Effect,

    /// A deep-reactive object or array. Behaves like a source.
    Reactive,

    /// A node referenced by an edge before it was registered.
    Unknown,
}

impl NodeKind {
    /// Short lowercase name used in diagnostics.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Signal => "signal",
            NodeKind::Computed => "computed",
            NodeKind::Effect => "effect",
            NodeKind::Reactive => "reactive",
            NodeKind::Unknown => "unknown",
        }
    }
}

/// A node in the dependency graph.
///
/// The graph never owns the reactive value a node describes. It keeps a
/// non-owning liveness handle instead, so dropped values can be swept.
pub struct GraphNode {
    id: NodeId,
    kind: NodeKind,
    label: Option<String>,

    /// `None` for placeholder nodes whose owner is not known.
    liveness: Option<Weak<dyn Any + Send + Sync>>,

    /// Nodes that this node reads from.
    dependencies: HashSet<NodeId>,

    /// Nodes that read from this node.
    dependents: HashSet<NodeId>,
}

impl GraphNode {
    /// Create a new node for a live reactive value.
    pub fn new(id: NodeId, kind: NodeKind, liveness: Weak<dyn Any + Send + Sync>) -> Self {
        Self {
            id,
            kind,
            label: None,
            liveness: Some(liveness),
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
        }
    }

    /// Create a placeholder for a node seen only through an edge.
    pub fn placeholder(id: NodeId) -> Self {
        Self {
            id,
            kind: NodeKind::Unknown,
            label: None,
            liveness: None,
            dependencies: HashSet::new(),
            dependents: HashSet::new(),
        }
    }

    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Get the node's kind.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Get the diagnostic label, if one was set.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub(crate) fn set_label(&mut self, label: String) {
        self.label = Some(label);
    }

    /// Whether the value this node describes is still alive.
    ///
    /// Placeholder nodes count as alive.
    pub fn is_alive(&self) -> bool {
        match &self.liveness {
            Some(weak) => weak.strong_count() > 0,
            None => true,
        }
    }

    /// Add a dependency (a node that this node reads from).
    pub fn add_dependency(&mut self, node_id: NodeId) {
        self.dependencies.insert(node_id);
    }

    /// Remove a dependency.
    pub fn remove_dependency(&mut self, node_id: NodeId) {
        self.dependencies.remove(&node_id);
    }

    /// Get all dependencies.
    pub fn dependencies(&self) -> &HashSet<NodeId> {
        &self.dependencies
    }

    /// Add a dependent (a node that reads from this node).
    pub fn add_dependent(&mut self, node_id: NodeId) {
        self.dependents.insert(node_id);
    }

    /// Remove a dependent.
    pub fn remove_dependent(&mut self, node_id: NodeId) {
        self.dependents.remove(&node_id);
    }

    /// Get all dependents.
    pub fn dependents(&self) -> &HashSet<NodeId> {
        &self.dependents
    }

    /// Clear all dependencies, returning the previous set.
    pub fn take_dependencies(&mut self) -> HashSet<NodeId> {
        std::mem::take(&mut self.dependencies)
    }
}

impl fmt::Debug for GraphNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphNode")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("alive", &self.is_alive())
            .field("dependencies", &self.dependencies.len())
            .field("dependents", &self.dependents.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn liveness_follows_owner() {
        let owner: Arc<dyn Any + Send + Sync> = Arc::new(5_u32);
        let node = GraphNode::new(NodeId::new(), NodeKind::Signal, Arc::downgrade(&owner));
        assert!(node.is_alive());

        drop(owner);
        assert!(!node.is_alive());
    }

    #[test]
    fn placeholder_is_alive() {
        let node = GraphNode::placeholder(NodeId::new());
        assert_eq!(node.kind(), NodeKind::Unknown);
        assert!(node.is_alive());
    }

    #[test]
    fn dependency_management() {
        let mut node = GraphNode::placeholder(NodeId::new());
        let dep1 = NodeId::new();
        let dep2 = NodeId::new();

        node.add_dependency(dep1);
        node.add_dependency(dep2);
        assert_eq!(node.dependencies().len(), 2);

        node.remove_dependency(dep1);
        assert!(!node.dependencies().contains(&dep1));

        let taken = node.take_dependencies();
        assert!(taken.contains(&dep2));
        assert!(node.dependencies().is_empty());
    }
}
