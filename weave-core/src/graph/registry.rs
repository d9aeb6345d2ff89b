//! Dependency Registry
//!
//! An explicit arena of [`GraphNode`]s keyed by [`NodeId`], with forward
//! (dependencies) and reverse (dependents) edges kept in sync.
//!
//! Nothing in the propagation path reads this structure. It exists for
//! introspection: listing who depends on whom, ordering the graph and
//! finding cycles.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use std::sync::Weak;

use super::node::{GraphNode, NodeId, NodeKind};

/// Arena of reactive nodes and their edges.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: HashMap<NodeId, GraphNode>,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
        }
    }

    /// Register a live node. Re-registering an ID keeps its edges.
    pub fn add_node(&mut self, id: NodeId, kind: NodeKind, liveness: Weak<dyn Any + Send + Sync>) {
        let mut node = GraphNode::new(id, kind, liveness);
        if let Some(existing) = self.nodes.remove(&id) {
            for dep in existing.dependencies() {
                node.add_dependency(*dep);
            }
            for dependent in existing.dependents() {
                node.add_dependent(*dependent);
            }
            if let Some(label) = existing.label() {
                node.set_label(label.to_string());
            }
        }
        self.nodes.insert(id, node);
    }

    /// Remove a node from the graph.
    ///
    /// Also removes all edges involving this node.
    pub fn remove_node(&mut self, node_id: NodeId) {
        if let Some(node) = self.nodes.remove(&node_id) {
            for dep_id in node.dependencies() {
                if let Some(dep) = self.nodes.get_mut(dep_id) {
                    dep.remove_dependent(node_id);
                }
            }

            for dependent_id in node.dependents() {
                if let Some(dependent) = self.nodes.get_mut(dependent_id) {
                    dependent.remove_dependency(node_id);
                }
            }
        }
    }

    /// Get a reference to a node.
    pub fn get_node(&self, node_id: NodeId) -> Option<&GraphNode> {
        self.nodes.get(&node_id)
    }

    /// Attach a diagnostic label to a node.
    pub fn set_label(&mut self, node_id: NodeId, label: impl Into<String>) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.set_label(label.into());
        }
    }

    /// Add a dependency edge: `dependent` reads from `dependency`.
    ///
    /// Unknown endpoints are created as placeholders.
    pub fn add_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        self.nodes
            .entry(dependency)
            .or_insert_with(|| GraphNode::placeholder(dependency))
            .add_dependent(dependent);
        self.nodes
            .entry(dependent)
            .or_insert_with(|| GraphNode::placeholder(dependent))
            .add_dependency(dependency);
    }

    /// Remove a dependency edge.
    pub fn remove_edge(&mut self, dependency: NodeId, dependent: NodeId) {
        if let Some(dep_node) = self.nodes.get_mut(&dependency) {
            dep_node.remove_dependent(dependent);
        }
        if let Some(dependent_node) = self.nodes.get_mut(&dependent) {
            dependent_node.remove_dependency(dependency);
        }
    }

    /// Replace every outgoing edge of `dependent` with `dependencies`.
    pub fn set_dependencies(&mut self, dependent: NodeId, dependencies: &[NodeId]) {
        let previous = self
            .nodes
            .get_mut(&dependent)
            .map(GraphNode::take_dependencies)
            .unwrap_or_default();
        for old in previous {
            if let Some(node) = self.nodes.get_mut(&old) {
                node.remove_dependent(dependent);
            }
        }
        for &dependency in dependencies {
            self.add_edge(dependency, dependent);
        }
    }

    /// IDs this node reads from.
    pub fn dependencies_of(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<_> = self
            .nodes
            .get(&node_id)
            .map(|node| node.dependencies().iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// IDs that read from this node.
    pub fn dependents_of(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<_> = self
            .nodes
            .get(&node_id)
            .map(|node| node.dependents().iter().copied().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Order every node so that dependencies come before dependents.
    ///
    /// Nodes that sit on a cycle are left out of the result.
    pub fn topological_order(&self) -> Vec<NodeId> {
        let mut in_degree: HashMap<NodeId, usize> = HashMap::new();
        let mut result = Vec::with_capacity(self.nodes.len());
        let mut queue = VecDeque::new();

        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort();

        for &node_id in &ids {
            let degree = self.nodes[&node_id]
                .dependencies()
                .iter()
                .filter(|d| self.nodes.contains_key(d))
                .count();
            in_degree.insert(node_id, degree);
            if degree == 0 {
                queue.push_back(node_id);
            }
        }

        // Kahn's algorithm
        while let Some(node_id) = queue.pop_front() {
            result.push(node_id);

            let mut dependents: Vec<_> = self.nodes[&node_id].dependents().iter().copied().collect();
            dependents.sort();
            for dependent_id in dependents {
                if let Some(degree) = in_degree.get_mut(&dependent_id) {
                    *degree = degree.saturating_sub(1);
                    if *degree == 0 {
                        queue.push_back(dependent_id);
                    }
                }
            }
        }

        result
    }

    /// Find a dependency cycle reachable from `start`, if any.
    ///
    /// The returned path starts and ends with the same node.
    pub fn find_cycle_from(&self, start: NodeId) -> Option<Vec<NodeId>> {
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        let mut done = HashSet::new();
        self.visit(start, &mut path, &mut on_path, &mut done)
    }

    /// Find any dependency cycle in the graph.
    pub fn find_cycle(&self) -> Option<Vec<NodeId>> {
        let mut done = HashSet::new();
        let mut ids: Vec<_> = self.nodes.keys().copied().collect();
        ids.sort();
        for id in ids {
            if done.contains(&id) {
                continue;
            }
            let mut path = Vec::new();
            let mut on_path = HashSet::new();
            if let Some(cycle) = self.visit(id, &mut path, &mut on_path, &mut done) {
                return Some(cycle);
            }
        }
        None
    }

    fn visit(
        &self,
        node_id: NodeId,
        path: &mut Vec<NodeId>,
        on_path: &mut HashSet<NodeId>,
        done: &mut HashSet<NodeId>,
    ) -> Option<Vec<NodeId>> {
        if on_path.contains(&node_id) {
            let start = path.iter().position(|id| *id == node_id).unwrap_or(0);
            let mut cycle = path[start..].to_vec();
            cycle.push(node_id);
            return Some(cycle);
        }
        if done.contains(&node_id) {
            return None;
        }

        path.push(node_id);
        on_path.insert(node_id);

        if let Some(node) = self.nodes.get(&node_id) {
            let mut deps: Vec<_> = node.dependencies().iter().copied().collect();
            deps.sort();
            for dep in deps {
                if let Some(cycle) = self.visit(dep, path, on_path, done) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        on_path.remove(&node_id);
        done.insert(node_id);
        None
    }

    /// Drop every node whose owner has been dropped. Returns how many were
    /// removed.
    pub fn sweep(&mut self) -> usize {
        let dead: Vec<_> = self
            .nodes
            .values()
            .filter(|node| !node.is_alive())
            .map(GraphNode::id)
            .collect();
        for id in &dead {
            self.remove_node(*id);
        }
        dead.len()
    }

    /// Render the graph in Graphviz DOT format.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph weave {\n");
        for id in self.topological_order_with_cycles() {
            let node = &self.nodes[&id];
            let label = node.label().unwrap_or(node.kind().as_str());
            let _ = writeln!(out, "  n{} [label=\"{} {}\"];", id.raw(), id, label.replace('"', "'"));
            let mut deps: Vec<_> = node.dependencies().iter().copied().collect();
            deps.sort();
            for dep in deps {
                let _ = writeln!(out, "  n{} -> n{};", id.raw(), dep.raw());
            }
        }
        out.push_str("}\n");
        out
    }

    fn topological_order_with_cycles(&self) -> Vec<NodeId> {
        let mut ordered = self.topological_order();
        let seen: HashSet<_> = ordered.iter().copied().collect();
        let mut rest: Vec<_> = self.nodes.keys().filter(|id| !seen.contains(id)).copied().collect();
        rest.sort();
        ordered.extend(rest);
        ordered
    }

    /// Get the total number of nodes in the graph.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Get the total number of edges in the graph.
    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|node| node.dependencies().len()).sum()
    }

    /// Remove every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
    }
}
