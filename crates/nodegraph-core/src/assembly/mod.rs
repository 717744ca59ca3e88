//! Graph assembly and post-assembly filtering
//!
//! The assembler turns a [`Snapshot`](crate::source::Snapshot) into a
//! [`WorkingSet`] of nodes and edges; the filter pipeline then mutates that set
//! in place. Both operate on request-local state only.

mod assembler;
mod filter;

#[cfg(test)]
mod tests;

pub use assembler::{AssemblyMode, GraphAssembler, DEFAULT_DEPTH};
pub use filter::{reachable, FilterPipeline, Reachability};

use crate::models::{Edge, Node, Resource};
use std::collections::HashSet;

/// Insertion-ordered nodes and edges, deduplicated by identity
#[derive(Debug, Clone, Default)]
pub struct WorkingSet {
    nodes: Vec<Node>,
    node_index: HashSet<Resource>,
    edges: Vec<Edge>,
    edge_index: HashSet<Edge>,
}

impl WorkingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node unless one with the same identity exists. Returns whether
    /// it was added.
    pub fn insert_node(&mut self, node: Node) -> bool {
        if !self.node_index.insert(node.resource.clone()) {
            return false;
        }
        self.nodes.push(node);
        true
    }

    /// Add an edge unless the same directed edge exists
    pub fn insert_edge(&mut self, edge: Edge) -> bool {
        if !self.edge_index.insert(edge.clone()) {
            return false;
        }
        self.edges.push(edge);
        true
    }

    pub fn contains_node(&self, resource: &Resource) -> bool {
        self.node_index.contains(resource)
    }

    pub fn contains_edge(&self, edge: &Edge) -> bool {
        self.edge_index.contains(edge)
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node(&self, resource: &Resource) -> Option<&Node> {
        self.nodes.iter().find(|n| &n.resource == resource)
    }

    /// Keep only nodes matching `keep`. Edges touching a removed node go with
    /// it; edges to endpoints that never had a node are left alone.
    pub fn retain_nodes<F>(&mut self, mut keep: F)
    where
        F: FnMut(&Node) -> bool,
    {
        let mut removed = HashSet::new();
        self.nodes.retain(|n| {
            let kept = keep(n);
            if !kept {
                removed.insert(n.resource.clone());
            }
            kept
        });
        if removed.is_empty() {
            return;
        }

        for resource in &removed {
            self.node_index.remove(resource);
        }
        self.retain_edges(|e| !removed.contains(&e.source) && !removed.contains(&e.destination));
    }

    /// Keep only edges matching `keep`; nodes are untouched
    pub fn retain_edges<F>(&mut self, keep: F)
    where
        F: FnMut(&Edge) -> bool,
    {
        self.edges.retain(keep);
        self.edge_index = self.edges.iter().cloned().collect();
    }

    /// Edge endpoints that have no node of their own, in first-seen order
    pub fn dangling_endpoints(&self) -> Vec<Resource> {
        let mut seen = HashSet::new();
        self.edges
            .iter()
            .flat_map(|e| [&e.source, &e.destination])
            .filter(|r| !self.node_index.contains(*r) && seen.insert((*r).clone()))
            .cloned()
            .collect()
    }

    /// Drop edges referencing a missing node, so every emitted edge points
    /// at an emitted node.
    pub fn finalize(&mut self) {
        let index = &self.node_index;
        self.edges
            .retain(|e| index.contains(&e.source) && index.contains(&e.destination));
        self.edge_index = self.edges.iter().cloned().collect();
    }

    pub fn into_parts(self) -> (Vec<Node>, Vec<Edge>) {
        (self.nodes, self.edges)
    }
}
