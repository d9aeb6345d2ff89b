//! Dependency Graph
//!
//! A process-wide, debug-only record of who depends on whom.
//!
//! # Overview
//!
//! Signals, computeds, effects and reactive objects register themselves here
//! when the graph is enabled, and computeds/effects record their edges after
//! every evaluation. Edges point from a dependent to its dependency.
//!
//! The graph is never consulted when propagating changes: propagation is
//! driven by the subscriber lists owned by each cell. Disabling the graph
//! (the default) costs one atomic load per registration.
//!
//! # Design Decisions
//!
//! 1. Nodes hold non-owning `Weak` liveness handles. Dropped values linger
//!    until [`sweep`] removes them.
//!
//! 2. Recording edges for a node that closes a cycle logs a warning. Cycles
//!    are not prevented; the computed that re-enters itself is skipped at
//!    runtime.

mod node;
mod registry;

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{OnceLock, Weak};

use parking_lot::RwLock;
use tracing::warn;

pub use node::{GraphNode, NodeId, NodeKind};
pub use registry::DependencyGraph;

static ENABLED: AtomicBool = AtomicBool::new(false);
static GRAPH: OnceLock<RwLock<DependencyGraph>> = OnceLock::new();

fn graph() -> &'static RwLock<DependencyGraph> {
    GRAPH.get_or_init(|| RwLock::new(DependencyGraph::new()))
}

/// Start recording nodes and edges.
pub fn enable() {
    ENABLED.store(true, Ordering::Release);
}

/// Stop recording. Existing entries are kept until [`clear`].
pub fn disable() {
    ENABLED.store(false, Ordering::Release);
}

/// Whether the graph is currently recording.
pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Acquire)
}

/// Run `f` with read access to the graph.
pub fn with<R>(f: impl FnOnce(&DependencyGraph) -> R) -> R {
    f(&graph().read())
}

/// Attach a diagnostic label to a node.
pub fn set_label(id: NodeId, label: impl Into<String>) {
    if is_enabled() {
        graph().write().set_label(id, label);
    }
}

/// Remove nodes whose owners have been dropped.
pub fn sweep() -> usize {
    graph().write().sweep()
}

/// Remove every node.
pub fn clear() {
    graph().write().clear();
}

pub(crate) fn register(id: NodeId, kind: NodeKind, liveness: Weak<dyn Any + Send + Sync>) {
    if is_enabled() {
        graph().write().add_node(id, kind, liveness);
    }
}

pub(crate) fn record_dependencies(id: NodeId, dependencies: &[NodeId]) {
    if !is_enabled() {
        return;
    }

    let mut graph = graph().write();
    graph.set_dependencies(id, dependencies);
    if let Some(cycle) = graph.find_cycle_from(id) {
        let path: Vec<String> = cycle.iter().map(ToString::to_string).collect();
        warn!(node = %id, cycle = %path.join(" -> "), "dependency cycle detected");
    }
}

pub(crate) fn unregister(id: NodeId) {
    if is_enabled() {
        graph().write().remove_node(id);
    }
}
