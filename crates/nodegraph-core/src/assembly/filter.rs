//! Post-assembly filters
//!
//! Steps run in a fixed order, each seeing the effects of the previous one:
//! exclude-by-id, include-unmeshed, restrict-to-reachable, drop-orphans.
//! Edges whose endpoints have no node are pruned before the last two steps,
//! so neither walks or counts an edge that will not be emitted.

use super::WorkingSet;
use crate::models::{Direction, Edge, Node, Resource, ResourceKind};
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// Root and hop budget for the reachability restriction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachability {
    pub root: Resource,
    pub depth: usize,
    pub direction: Direction,
}

/// Optional transformations applied to a working set
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    /// Resources to remove along with every edge touching them. An entry of
    /// unknown kind matches any kind with the same namespace and name.
    pub ignore: Vec<Resource>,
    /// Give edge endpoints without metrics a node of their own
    pub include_unmeshed: bool,
    pub restrict: Option<Reachability>,
    /// Remove nodes left without edges
    pub drop_orphans: bool,
}

impl FilterPipeline {
    pub fn apply(&self, set: &mut WorkingSet) {
        if !self.ignore.is_empty() {
            self.exclude(set);
        }
        if self.include_unmeshed {
            include_unmeshed(set);
        }
        set.finalize();

        if let Some(reachability) = &self.restrict {
            restrict_to_reachable(set, reachability);
        }
        if self.drop_orphans {
            drop_orphans(set);
        }
    }

    fn is_ignored(&self, resource: &Resource) -> bool {
        self.ignore.iter().any(|ignored| {
            ignored == resource
                || (ignored.kind == ResourceKind::Unknown && ignored.same_workload(resource))
        })
    }

    fn exclude(&self, set: &mut WorkingSet) {
        let before = (set.nodes().len(), set.edges().len());

        set.retain_nodes(|n| !self.is_ignored(&n.resource));
        // endpoints without a node of their own are excluded too
        set.retain_edges(|e| !self.is_ignored(&e.source) && !self.is_ignored(&e.destination));

        debug!(
            removed_nodes = before.0 - set.nodes().len(),
            removed_edges = before.1 - set.edges().len(),
            "Excluded ignored resources"
        );
    }
}

fn include_unmeshed(set: &mut WorkingSet) {
    let unmeshed = set.dangling_endpoints();
    debug!(count = unmeshed.len(), "Adding unmeshed resources");

    for resource in unmeshed {
        set.insert_node(Node::unmeshed(resource));
    }
}

fn restrict_to_reachable(set: &mut WorkingSet, reachability: &Reachability) {
    if !set.contains_node(&reachability.root) {
        debug!(root = %reachability.root, "Root not in graph, skipping reachability restriction");
        return;
    }

    let keep = reachable(
        set.edges(),
        &reachability.root,
        reachability.depth,
        reachability.direction,
    );

    set.retain_nodes(|n| keep.contains(&n.resource));
    set.retain_edges(|e| keep.contains(&e.source) && keep.contains(&e.destination));
}

fn drop_orphans(set: &mut WorkingSet) {
    let connected: HashSet<Resource> = set
        .edges()
        .iter()
        .filter(|e| set.contains_node(&e.source) && set.contains_node(&e.destination))
        .flat_map(|e| [e.source.clone(), e.destination.clone()])
        .collect();

    set.retain_nodes(|n| connected.contains(&n.resource));
}

/// Resources reachable from `root` within `depth` hops, following edges the
/// same way expansion does for `direction`. The root itself is always
/// included, so a depth of zero yields only the root.
pub fn reachable(
    edges: &[Edge],
    root: &Resource,
    depth: usize,
    direction: Direction,
) -> HashSet<Resource> {
    let mut seen = HashSet::new();
    seen.insert(root.clone());

    let mut queue = VecDeque::new();
    queue.push_back((root, 0usize));

    while let Some((current, hops)) = queue.pop_front() {
        if hops >= depth {
            continue;
        }

        for edge in edges {
            let neighbour = if direction.follows_outbound() && &edge.source == current {
                Some(&edge.destination)
            } else if direction.follows_inbound() && &edge.destination == current {
                Some(&edge.source)
            } else {
                None
            };

            if let Some(neighbour) = neighbour {
                if seen.insert(neighbour.clone()) {
                    queue.push_back((neighbour, hops + 1));
                }
            }
        }
    }

    seen
}
