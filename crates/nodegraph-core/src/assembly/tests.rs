//! Assembly and filter tests
//!
//! Topologies are built from raw edge samples so the tests exercise the same
//! path the service does.

use super::*;
use crate::models::{Direction, Resource};
use crate::source::{Labels, Sample, Snapshot};

fn dep(name: &str) -> Resource {
    Resource::deployment("ns", name)
}

fn metric(resource: &Resource, value: f64) -> Sample {
    let mut labels = Labels::new();
    labels.insert("namespace".to_string(), resource.namespace.clone());
    labels.insert("deployment".to_string(), resource.name.clone());
    Sample {
        labels,
        value,
        timestamp_ms: 0,
    }
}

fn traffic(source: &Resource, destination: &Resource) -> Sample {
    let mut sample = metric(source, 1.0);
    sample
        .labels
        .insert("dst_namespace".to_string(), destination.namespace.clone());
    sample
        .labels
        .insert("dst_deployment".to_string(), destination.name.clone());
    sample
}

/// Snapshot where every listed resource has a success rate of 1.0
fn snapshot(resources: &[&Resource], edges: &[(&Resource, &Resource)]) -> Snapshot {
    Snapshot::from_samples(
        resources.iter().map(|r| metric(r, 1.0)).collect(),
        vec![],
        vec![],
        edges.iter().map(|(s, d)| traffic(s, d)).collect(),
    )
}

fn names(set: &WorkingSet) -> Vec<&str> {
    let mut names: Vec<&str> = set.nodes().iter().map(|n| n.resource.name.as_str()).collect();
    names.sort_unstable();
    names
}

/// a -> b -> c -> d, plus x -> a
fn chain() -> Snapshot {
    let (a, b, c, d, x) = (dep("a"), dep("b"), dep("c"), dep("d"), dep("x"));
    snapshot(
        &[&a, &b, &c, &d, &x],
        &[(&a, &b), (&b, &c), (&c, &d), (&x, &a)],
    )
}

mod expand_tests {
    use super::*;

    #[test]
    fn test_expand_default_depth_is_one() {
        let snapshot = chain();
        let assembler = GraphAssembler::new(&snapshot);

        let zero = assembler.expand(&dep("a"), 0, Direction::Both);
        let one = assembler.expand(&dep("a"), 1, Direction::Both);

        assert_eq!(names(&zero), vec!["a", "b", "x"]);
        assert_eq!(names(&zero), names(&one));
        assert_eq!(zero.edges().len(), 2);
    }

    #[test]
    fn test_expand_outbound_follows_callees() {
        let snapshot = chain();
        let set = GraphAssembler::new(&snapshot).expand(&dep("a"), 2, Direction::Outbound);

        assert_eq!(names(&set), vec!["a", "b", "c"]);
        assert!(set.contains_edge(&Edge::new(dep("a"), dep("b"))));
        assert!(set.contains_edge(&Edge::new(dep("b"), dep("c"))));
        assert_eq!(set.edges().len(), 2);
    }

    #[test]
    fn test_expand_inbound_follows_callers() {
        let snapshot = chain();
        let set = GraphAssembler::new(&snapshot).expand(&dep("c"), 5, Direction::Inbound);

        assert_eq!(names(&set), vec!["a", "b", "c", "x"]);
        assert_eq!(set.edges().len(), 3);
        assert!(!set.contains_node(&dep("d")));
    }

    #[test]
    fn test_expand_stops_when_frontier_is_empty() {
        let snapshot = chain();
        let set = GraphAssembler::new(&snapshot).expand(&dep("a"), 100, Direction::Both);

        assert_eq!(names(&set), vec!["a", "b", "c", "d", "x"]);
        assert_eq!(set.edges().len(), 4);
    }

    #[test]
    fn test_expand_deduplicates_cycles() {
        let (a, b) = (dep("a"), dep("b"));
        let snapshot = snapshot(&[&a, &b], &[(&a, &b), (&b, &a), (&a, &b)]);
        let set = GraphAssembler::new(&snapshot).expand(&a, 3, Direction::Both);

        assert_eq!(set.nodes().len(), 2);
        // a->b and b->a are distinct, the repeated a->b is not
        assert_eq!(set.edges().len(), 2);
    }

    #[test]
    fn test_expand_unknown_root_keeps_root() {
        let snapshot = chain();
        let set = GraphAssembler::new(&snapshot).expand(&dep("ghost"), 2, Direction::Both);

        assert_eq!(names(&set), vec!["ghost"]);
        assert!(set.edges().is_empty());
        assert_eq!(set.nodes()[0].success_rate, None);
    }

    #[test]
    fn test_expand_resolves_root_kind() {
        let snapshot = chain();
        let root = Resource::new("ns", "a", crate::models::ResourceKind::Unknown);
        let set = GraphAssembler::new(&snapshot).expand(&root, 1, Direction::Outbound);

        assert_eq!(set.nodes()[0].resource, dep("a"));
        assert_eq!(set.nodes().len(), 2);
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let snapshot = chain();
        let assembler = GraphAssembler::new(&snapshot);

        let first = assembler.expand(&dep("b"), 2, Direction::Both);
        let second = assembler.expand(&dep("b"), 2, Direction::Both);

        assert_eq!(first.nodes(), second.nodes());
        assert_eq!(first.edges(), second.edges());
    }
}

mod snapshot_mode_tests {
    use super::*;

    #[test]
    fn test_snapshot_mode_resolves_every_edge_endpoint() {
        // bot only ever shows up as a caller, outside only as a callee
        let (bot, a, b, outside) = (dep("bot"), dep("a"), dep("b"), dep("outside"));
        let snapshot = snapshot(&[&a, &b], &[(&bot, &a), (&a, &b), (&b, &outside)]);
        let set = GraphAssembler::new(&snapshot).snapshot();

        assert_eq!(names(&set), vec!["a", "b", "bot", "outside"]);
        assert_eq!(set.edges().len(), 3);
        assert!(set.dangling_endpoints().is_empty());

        assert_eq!(set.node(&a).unwrap().success_rate, Some(1.0));
        assert_eq!(set.node(&bot).unwrap().success_rate, None);
        assert_eq!(set.node(&outside).unwrap().request_volume, None);
    }

    #[test]
    fn test_snapshot_mode_keeps_metric_only_resources() {
        let (a, idle) = (dep("a"), dep("idle"));
        let snapshot = snapshot(&[&a, &idle], &[]);
        let set = GraphAssembler::new(&snapshot).snapshot();

        assert_eq!(names(&set), vec!["a", "idle"]);
        assert!(set.edges().is_empty());
    }
}

mod filter_tests {
    use super::*;

    #[test]
    fn test_exclude_removes_resource_and_its_edges_only() {
        let snapshot = chain();
        let mut set = GraphAssembler::new(&snapshot).snapshot();

        FilterPipeline {
            ignore: vec![dep("b")],
            ..Default::default()
        }
        .apply(&mut set);

        assert_eq!(names(&set), vec!["a", "c", "d", "x"]);
        assert_eq!(
            set.edges(),
            &[Edge::new(dep("c"), dep("d")), Edge::new(dep("x"), dep("a"))]
        );
    }

    #[test]
    fn test_exclude_unknown_kind_matches_any_kind() {
        let snapshot = chain();
        let mut set = GraphAssembler::new(&snapshot).snapshot();

        FilterPipeline {
            ignore: vec![Resource::new("ns", "b", crate::models::ResourceKind::Unknown)],
            ..Default::default()
        }
        .apply(&mut set);

        assert!(!set.contains_node(&dep("b")));
    }

    #[test]
    fn test_exclude_then_drop_orphans() {
        let snapshot = chain();
        let mut set = GraphAssembler::new(&snapshot).snapshot();

        FilterPipeline {
            ignore: vec![dep("a"), dep("c")],
            drop_orphans: true,
            ..Default::default()
        }
        .apply(&mut set);

        // every edge touched a or c
        assert!(set.nodes().is_empty());
        assert!(set.edges().is_empty());
    }

    #[test]
    fn test_drop_orphans_keeps_connected_nodes() {
        let (a, b, lonely) = (dep("a"), dep("b"), dep("lonely"));
        let snapshot = snapshot(&[&a, &b, &lonely], &[(&a, &b)]);
        let mut set = GraphAssembler::new(&snapshot).snapshot();

        FilterPipeline {
            drop_orphans: true,
            ..Default::default()
        }
        .apply(&mut set);

        assert_eq!(names(&set), vec!["a", "b"]);
        assert_eq!(set.edges().len(), 1);
    }

    /// Node for `a` only, with edges out to and back from `outside`
    fn half_meshed(a: &Resource, outside: &Resource) -> WorkingSet {
        let mut set = WorkingSet::new();
        set.insert_node(Node::unmeshed(a.clone()));
        set.insert_edge(Edge::new(a.clone(), outside.clone()));
        set.insert_edge(Edge::new(outside.clone(), a.clone()));
        set
    }

    #[test]
    fn test_include_unmeshed_adds_unknown_nodes() {
        let (a, outside) = (dep("a"), dep("outside"));
        let mut set = half_meshed(&a, &outside);

        FilterPipeline {
            include_unmeshed: true,
            ..Default::default()
        }
        .apply(&mut set);

        assert_eq!(names(&set), vec!["a", "outside"]);
        assert_eq!(set.edges().len(), 2);
        let node = set.node(&outside).unwrap();
        assert_eq!(node.success_rate, None);
        assert_eq!(node.request_volume, None);
    }

    #[test]
    fn test_pipeline_prunes_edges_to_missing_nodes() {
        let (a, outside) = (dep("a"), dep("outside"));
        let mut set = half_meshed(&a, &outside);

        FilterPipeline::default().apply(&mut set);

        assert_eq!(names(&set), vec!["a"]);
        assert!(set.edges().is_empty());
    }

    #[test]
    fn test_drop_orphans_ignores_edges_to_missing_nodes() {
        let (a, outside) = (dep("a"), dep("outside"));
        let mut set = half_meshed(&a, &outside);

        FilterPipeline {
            drop_orphans: true,
            ..Default::default()
        }
        .apply(&mut set);
        set.finalize();

        // a's only edges lead nowhere, so it is an orphan once they go
        assert!(set.nodes().is_empty());
        assert!(set.edges().is_empty());
    }

    #[test]
    fn test_drop_orphans_on_snapshot_with_unseen_callee() {
        let (a, ext) = (dep("a"), dep("ext"));
        let snapshot = snapshot(&[&a], &[(&a, &ext)]);
        let mut set = GraphAssembler::new(&snapshot).snapshot();

        FilterPipeline {
            drop_orphans: true,
            ..Default::default()
        }
        .apply(&mut set);
        set.finalize();

        assert_eq!(names(&set), vec!["a", "ext"]);
        assert_eq!(set.edges(), &[Edge::new(a, ext)]);
    }

    #[test]
    fn test_exclude_runs_before_include_unmeshed() {
        let (a, outside) = (dep("a"), dep("outside"));
        let snapshot = snapshot(&[&a], &[(&a, &outside)]);
        let mut set = GraphAssembler::new(&snapshot).snapshot();

        FilterPipeline {
            ignore: vec![outside.clone()],
            include_unmeshed: true,
            ..Default::default()
        }
        .apply(&mut set);

        assert!(!set.contains_node(&outside));
        assert!(set.edges().is_empty());
    }

    #[test]
    fn test_restrict_depth_one_yields_direct_neighbours() {
        // root calls b and c, d calls root, b calls e (two hops away)
        let (root, b, c, d, e) = (dep("root"), dep("b"), dep("c"), dep("d"), dep("e"));
        let snapshot = snapshot(
            &[&root, &b, &c, &d, &e],
            &[(&root, &b), (&root, &c), (&d, &root), (&b, &e)],
        );
        let mut set = GraphAssembler::new(&snapshot).snapshot();

        FilterPipeline {
            restrict: Some(Reachability {
                root: root.clone(),
                depth: 1,
                direction: Direction::Both,
            }),
            ..Default::default()
        }
        .apply(&mut set);

        assert_eq!(names(&set), vec!["b", "c", "d", "root"]);
        assert!(!set.contains_edge(&Edge::new(b, e)));
        assert_eq!(set.edges().len(), 3);
    }

    #[test]
    fn test_restrict_depth_zero_keeps_only_root() {
        let snapshot = chain();
        let mut set = GraphAssembler::new(&snapshot).snapshot();

        FilterPipeline {
            restrict: Some(Reachability {
                root: dep("b"),
                depth: 0,
                direction: Direction::Both,
            }),
            ..Default::default()
        }
        .apply(&mut set);

        assert_eq!(names(&set), vec!["b"]);
        assert!(set.edges().is_empty());
    }

    #[test]
    fn test_restrict_missing_root_is_noop() {
        let snapshot = chain();
        let mut set = GraphAssembler::new(&snapshot).snapshot();
        let before = set.clone();

        FilterPipeline {
            restrict: Some(Reachability {
                root: dep("ghost"),
                depth: 1,
                direction: Direction::Both,
            }),
            ..Default::default()
        }
        .apply(&mut set);

        assert_eq!(set.nodes(), before.nodes());
        assert_eq!(set.edges(), before.edges());
    }

    #[test]
    fn test_restrict_respects_direction() {
        let snapshot = chain();
        let mut set = GraphAssembler::new(&snapshot).snapshot();

        FilterPipeline {
            restrict: Some(Reachability {
                root: dep("b"),
                depth: 2,
                direction: Direction::Inbound,
            }),
            ..Default::default()
        }
        .apply(&mut set);

        assert_eq!(names(&set), vec!["a", "b", "x"]);
    }

    #[test]
    fn test_restrict_does_not_walk_through_missing_nodes() {
        // a -> ext <- b, where ext never got a node
        let (a, b, ext) = (dep("a"), dep("b"), dep("ext"));
        let mut set = WorkingSet::new();
        set.insert_node(Node::unmeshed(a.clone()));
        set.insert_node(Node::unmeshed(b.clone()));
        set.insert_edge(Edge::new(a.clone(), ext.clone()));
        set.insert_edge(Edge::new(b.clone(), ext));

        FilterPipeline {
            restrict: Some(Reachability {
                root: a,
                depth: 2,
                direction: Direction::Both,
            }),
            ..Default::default()
        }
        .apply(&mut set);

        assert_eq!(names(&set), vec!["a"]);
        assert!(set.edges().is_empty());
    }

    #[test]
    fn test_restrict_walks_through_unseen_callee_in_snapshot() {
        // a -> ext <- b, ext reports no metrics but still gets a node
        let (a, b, ext) = (dep("a"), dep("b"), dep("ext"));
        let snapshot = snapshot(&[&a, &b], &[(&a, &ext), (&b, &ext)]);
        let mut set = GraphAssembler::new(&snapshot).snapshot();

        FilterPipeline {
            restrict: Some(Reachability {
                root: a.clone(),
                depth: 1,
                direction: Direction::Both,
            }),
            ..Default::default()
        }
        .apply(&mut set);
        assert_eq!(names(&set), vec!["a", "ext"]);

        let mut set = GraphAssembler::new(&snapshot).snapshot();
        FilterPipeline {
            restrict: Some(Reachability {
                root: a,
                depth: 2,
                direction: Direction::Both,
            }),
            ..Default::default()
        }
        .apply(&mut set);
        assert_eq!(names(&set), vec!["a", "b", "ext"]);
        assert_eq!(set.edges().len(), 2);
    }

    #[test]
    fn test_reachable_set_is_bounded_by_depth() {
        let snapshot = chain();
        let edges = snapshot.edges();

        assert_eq!(reachable(edges, &dep("a"), 0, Direction::Both).len(), 1);
        assert_eq!(reachable(edges, &dep("a"), 1, Direction::Both).len(), 3);
        assert_eq!(reachable(edges, &dep("a"), 2, Direction::Outbound).len(), 3);
        assert_eq!(reachable(edges, &dep("a"), 10, Direction::Both).len(), 5);
    }
}
