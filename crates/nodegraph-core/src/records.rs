//! Node and edge records for the visualization panel

use crate::models::{Edge, Node};
use crate::nodegraph::{Field, GraphSpec, Record};
use serde_json::Value;
use std::sync::OnceLock;

/// Rendered in place of a metric the backend reported nothing for
pub const UNKNOWN_VALUE: &str = "N/A";

static GRAPH_SPEC: OnceLock<GraphSpec> = OnceLock::new();

/// Field declarations served by `/api/graph/fields` and enforced on every graph
pub fn graph_spec() -> &'static GraphSpec {
    GRAPH_SPEC.get_or_init(|| GraphSpec {
        nodes: vec![
            Field::string("id"),
            Field::string("title").display_name("Resource"),
            Field::string("mainStat").display_name("Success Rate"),
            Field::string("secondaryStat").display_name("Latency"),
            Field::string("detail__type").display_name("Type"),
            Field::string("detail__namespace").display_name("Namespace"),
            Field::string("detail__name").display_name("Name"),
            Field::string("detail__successRate").display_name("Success Rate"),
            Field::string("detail__latency_p95").display_name("p95"),
            Field::string("detail__volume").display_name("Request volume"),
            Field::number("arc__failed")
                .color("red")
                .display_name("Failed"),
            Field::number("arc__success")
                .color("green")
                .display_name("Success"),
        ],
        edges: vec![
            Field::string("id"),
            Field::string("source"),
            Field::string("target"),
        ],
    })
}

fn render(value: Option<f64>, format: impl Fn(f64) -> String) -> String {
    value.map(format).unwrap_or_else(|| UNKNOWN_VALUE.to_string())
}

pub fn node_record(node: &Node) -> Record {
    let resource = &node.resource;
    let percent = render(node.success_rate, |sr| format!("{:.2}%", sr * 100.0));
    let p95 = render(node.latency_p95_ms, |ms| format!("{:.1}ms", ms));
    let volume = render(node.request_volume, |rps| format!("{:.0}rd/s", rps));

    // Arcs must sum to one; an unknown rate is drawn as all failed
    let (success, failed) = match node.success_rate {
        Some(sr) => (sr, 1.0 - sr),
        None => (0.0, 1.0),
    };

    let mut record = Record::new();
    record.insert("id".into(), resource.id().into());
    record.insert("title".into(), resource.title().into());
    record.insert("mainStat".into(), format!("SR: {}", percent).into());
    record.insert("secondaryStat".into(), format!("p95: {}", p95).into());
    record.insert("detail__type".into(), resource.kind.as_str().into());
    record.insert("detail__namespace".into(), resource.namespace.clone().into());
    record.insert("detail__name".into(), resource.name.clone().into());
    record.insert("detail__successRate".into(), percent.into());
    record.insert("detail__latency_p95".into(), p95.into());
    record.insert("detail__volume".into(), volume.into());
    record.insert("arc__failed".into(), number(failed));
    record.insert("arc__success".into(), number(success));
    record
}

pub fn edge_record(edge: &Edge) -> Record {
    let mut record = Record::new();
    record.insert("id".into(), edge.id().into());
    record.insert("source".into(), edge.source.id().into());
    record.insert("target".into(), edge.destination.id().into());
    record
}

// Node metrics are finite by construction, so this never yields null
fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}
