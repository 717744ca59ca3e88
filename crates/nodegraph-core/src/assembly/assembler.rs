//! Candidate graph construction from a snapshot

use super::WorkingSet;
use crate::models::{Direction, Resource};
use crate::source::Snapshot;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

/// Hop budget used when none (or zero) is requested for expansion
pub const DEFAULT_DEPTH: usize = 1;

/// How the candidate graph is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssemblyMode {
    /// Breadth-first expansion from a root
    Expand,
    /// Every resource and edge in the snapshot, narrowed by filters afterwards
    Snapshot,
}

impl FromStr for AssemblyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "expand" => Ok(AssemblyMode::Expand),
            "snapshot" | "all" => Ok(AssemblyMode::Snapshot),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

/// Builds working sets from one snapshot
pub struct GraphAssembler<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> GraphAssembler<'a> {
    pub fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot }
    }

    /// Breadth-first expansion from `root`, at most `depth` hops (zero means
    /// [`DEFAULT_DEPTH`]). The root is always part of the result.
    pub fn expand(&self, root: &Resource, depth: usize, direction: Direction) -> WorkingSet {
        let depth = if depth == 0 { DEFAULT_DEPTH } else { depth };
        let root = self.snapshot.resolve_kind(root);

        let mut set = WorkingSet::new();
        set.insert_node(self.snapshot.node(&root));

        let mut frontier = vec![root];
        let mut hops = 0;

        while hops < depth && !frontier.is_empty() {
            hops += 1;
            let mut next = Vec::new();

            for resource in &frontier {
                for edge in self.snapshot.edges_of(resource, direction) {
                    for endpoint in [&edge.source, &edge.destination] {
                        if !set.contains_node(endpoint) {
                            set.insert_node(self.snapshot.node(endpoint));
                            next.push(endpoint.clone());
                        }
                    }
                    set.insert_edge(edge.clone());
                }
            }

            frontier = next;
        }

        debug!(
            root = %set.nodes()[0].resource,
            hops,
            nodes = set.nodes().len(),
            edges = set.edges().len(),
            "Expanded graph from root"
        );

        set
    }

    /// Every resource with metrics becomes a node and every valid edge
    /// sample an edge. Each edge endpoint is resolved to a node on its own,
    /// so a caller that reports no metrics still shows up with unknown ones.
    pub fn snapshot(&self) -> WorkingSet {
        let mut set = WorkingSet::new();

        for resource in self.snapshot.resources() {
            set.insert_node(self.snapshot.node(&resource));
        }
        for edge in self.snapshot.edges() {
            for endpoint in [&edge.source, &edge.destination] {
                if !set.contains_node(endpoint) {
                    set.insert_node(self.snapshot.node(endpoint));
                }
            }
            set.insert_edge(edge.clone());
        }

        debug!(
            nodes = set.nodes().len(),
            edges = set.edges().len(),
            "Assembled graph from whole snapshot"
        );

        set
    }
}
