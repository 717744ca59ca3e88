//! Schema-validated output graph
//!
//! The visualization panel consumes two record lists (nodes and edges) whose
//! keys and value types are declared up front by a [`GraphSpec`]. A [`Graph`]
//! can only be populated through [`Graph::add_nodes`] / [`Graph::add_edges`],
//! which reject a whole batch if any record disagrees with the spec.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single node or edge record
pub type Record = Map<String, Value>;

/// Primitive type of an output field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
}

impl FieldType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            // serde_json numbers cover every integer and float width
            FieldType::Number => value.is_number(),
        }
    }
}

/// Declaration of one output field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    #[serde(rename = "field_name")]
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(
        rename = "displayName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub display_name: Option<String>,
}

impl Field {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::String,
            color: None,
            display_name: None,
        }
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: FieldType::Number,
            color: None,
            display_name: None,
        }
    }

    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }
}

/// Field declarations for node and edge records
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GraphSpec {
    #[serde(rename = "nodes_fields")]
    pub nodes: Vec<Field>,
    #[serde(rename = "edges_fields")]
    pub edges: Vec<Field>,
}

/// Which record list a violation was found in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordTarget {
    Node,
    Edge,
}

impl std::fmt::Display for RecordTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordTarget::Node => f.write_str("node"),
            RecordTarget::Edge => f.write_str("edge"),
        }
    }
}

/// A record batch that does not conform to the graph spec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("schema violation: {target} record {index}, field '{field}': {reason}")]
    Violation {
        target: RecordTarget,
        index: usize,
        field: String,
        reason: String,
    },
}

/// Output graph. Fields are private so records always pass validation.
#[derive(Debug, Clone, Serialize)]
pub struct Graph {
    #[serde(skip)]
    spec: GraphSpec,
    nodes: Vec<Record>,
    edges: Vec<Record>,
}

impl Graph {
    pub fn new(spec: GraphSpec) -> Self {
        Self {
            spec,
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn spec(&self) -> &GraphSpec {
        &self.spec
    }

    pub fn nodes(&self) -> &[Record] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Record] {
        &self.edges
    }

    pub fn add_node(&mut self, node: Record) -> Result<(), SchemaError> {
        self.add_nodes(std::iter::once(node))
    }

    pub fn add_edge(&mut self, edge: Record) -> Result<(), SchemaError> {
        self.add_edges(std::iter::once(edge))
    }

    /// Append a batch of node records, all or nothing
    pub fn add_nodes<I>(&mut self, nodes: I) -> Result<(), SchemaError>
    where
        I: IntoIterator<Item = Record>,
    {
        let batch: Vec<Record> = nodes.into_iter().collect();
        validate_batch(&batch, &self.spec.nodes, RecordTarget::Node)?;
        self.nodes.extend(batch);
        Ok(())
    }

    /// Append a batch of edge records, all or nothing
    pub fn add_edges<I>(&mut self, edges: I) -> Result<(), SchemaError>
    where
        I: IntoIterator<Item = Record>,
    {
        let batch: Vec<Record> = edges.into_iter().collect();
        validate_batch(&batch, &self.spec.edges, RecordTarget::Edge)?;
        self.edges.extend(batch);
        Ok(())
    }
}

fn validate_batch(
    batch: &[Record],
    fields: &[Field],
    target: RecordTarget,
) -> Result<(), SchemaError> {
    for (index, record) in batch.iter().enumerate() {
        for field in fields {
            let reason = match record.get(&field.name) {
                None => "missing".to_string(),
                Some(value) if !field.field_type.accepts(value) => {
                    format!("expected {}, got {}", type_name(field.field_type), json_kind(value))
                }
                Some(_) => continue,
            };

            return Err(SchemaError::Violation {
                target,
                index,
                field: field.name.clone(),
                reason,
            });
        }
    }

    Ok(())
}

fn type_name(field_type: FieldType) -> &'static str {
    match field_type {
        FieldType::String => "string",
        FieldType::Number => "number",
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_spec() -> GraphSpec {
        GraphSpec {
            edges: vec![Field::string("foo"), Field::number("bar")],
            nodes: vec![
                Field::string("foo"),
                Field::number("bar"),
                Field::number("arc__foo").color("foo").display_name("foo"),
                Field::string("arc__bar").color("bar").display_name("bar"),
            ],
        }
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {}", other),
        }
    }

    #[test]
    fn test_spec_serialization() {
        let expected = r#"{"nodes_fields":[{"field_name":"foo","type":"string"},{"field_name":"bar","type":"number"},{"field_name":"arc__foo","type":"number","color":"foo","displayName":"foo"},{"field_name":"arc__bar","type":"string","color":"bar","displayName":"bar"}],"edges_fields":[{"field_name":"foo","type":"string"},{"field_name":"bar","type":"number"}]}"#;

        assert_eq!(serde_json::to_string(&test_spec()).unwrap(), expected);
    }

    #[test]
    fn test_graph_add_and_serialize() {
        let mut graph = Graph::new(test_spec());

        assert!(graph.add_edge(record(json!({"foo": "bar", "bar": 1}))).is_ok());
        // bar is declared as a number
        assert!(graph.add_edge(record(json!({"foo": "bar", "bar": "1"}))).is_err());

        assert!(graph
            .add_node(record(json!({
                "foo": "bar",
                "bar": 1,
                "arc__foo": 0.2,
                "arc__bar": "baz",
            })))
            .is_ok());
        // arc__foo is declared as a number
        assert!(graph
            .add_node(record(json!({
                "foo": "bar",
                "bar": 1,
                "arc__foo": "0.2",
                "arc__bar": "baz",
            })))
            .is_err());

        let expected = r#"{"nodes":[{"arc__bar":"baz","arc__foo":0.2,"bar":1,"foo":"bar"}],"edges":[{"bar":1,"foo":"bar"}]}"#;
        assert_eq!(serde_json::to_string(&graph).unwrap(), expected);
    }

    #[test]
    fn test_batch_is_all_or_nothing() {
        let mut graph = Graph::new(test_spec());
        graph
            .add_edges(vec![record(json!({"foo": "a", "bar": 1}))])
            .unwrap();

        let err = graph
            .add_edges(vec![
                record(json!({"foo": "b", "bar": 2})),
                record(json!({"foo": "c", "bar": 3.5})),
                record(json!({"foo": "d"})),
            ])
            .unwrap_err();

        assert_eq!(
            err,
            SchemaError::Violation {
                target: RecordTarget::Edge,
                index: 2,
                field: "bar".to_string(),
                reason: "missing".to_string(),
            }
        );
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.edges()[0]["foo"], "a");
    }

    #[test]
    fn test_batch_appends_in_order() {
        let mut graph = Graph::new(test_spec());
        graph
            .add_edges((0..5).map(|i| record(json!({"foo": format!("e{}", i), "bar": i}))))
            .unwrap();

        let names: Vec<&str> = graph
            .edges()
            .iter()
            .map(|e| e["foo"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["e0", "e1", "e2", "e3", "e4"]);
    }

    #[test]
    fn test_numbers_accept_integers_and_floats() {
        let mut graph = Graph::new(test_spec());
        let batch = vec![
            record(json!({"foo": "i32", "bar": -3i32})),
            record(json!({"foo": "u64", "bar": u64::MAX})),
            record(json!({"foo": "f32", "bar": 0.5f32})),
            record(json!({"foo": "f64", "bar": 0.25f64})),
        ];

        assert!(graph.add_edges(batch).is_ok());
        assert_eq!(graph.edges().len(), 4);
    }

    #[test]
    fn test_strings_reject_other_types() {
        let mut graph = Graph::new(test_spec());

        for bad in [json!(1), json!(null), json!(true), json!(["x"])] {
            let mut r = Record::new();
            r.insert("foo".to_string(), bad);
            r.insert("bar".to_string(), json!(1));
            assert!(graph.add_edge(r).is_err());
        }
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_spec_is_not_serialized() {
        let graph = Graph::new(test_spec());
        let value = serde_json::to_value(&graph).unwrap();

        assert_eq!(value, json!({"nodes": [], "edges": []}));
    }
}
