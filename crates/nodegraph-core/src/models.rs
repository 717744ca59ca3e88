//! Core data models for the node graph
//!
//! A [`Resource`] is a workload identified by namespace, name and kind. Its
//! identity is the tuple itself: `Resource` derives `Eq` and `Hash`, so sets and
//! maps keyed by it never depend on a joined string. [`Resource::id`] renders the
//! `namespace__name__kind` form used on the wire.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator used by the rendered resource id.
pub const ID_SEPARATOR: &str = "__";

/// Kind of workload backing a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Deployment,
    Statefulset,
    Unknown,
}

impl ResourceKind {
    /// Kinds the metrics backend reports traffic for
    pub const KNOWN: [ResourceKind; 2] = [ResourceKind::Deployment, ResourceKind::Statefulset];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Deployment => "deployment",
            ResourceKind::Statefulset => "statefulset",
            ResourceKind::Unknown => "unknown",
        }
    }

    /// Parse a kind as sent by the panel; anything unrecognised is `Unknown`.
    pub fn parse_lenient(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "deployment" | "deploy" => ResourceKind::Deployment,
            "statefulset" | "sts" => ResourceKind::Statefulset,
            _ => ResourceKind::Unknown,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named workload
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resource {
    pub namespace: String,
    pub name: String,
    pub kind: ResourceKind,
}

impl Resource {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn deployment(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, name, ResourceKind::Deployment)
    }

    pub fn statefulset(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(namespace, name, ResourceKind::Statefulset)
    }

    /// Rendered id, `namespace__name__kind`
    pub fn id(&self) -> String {
        format!(
            "{}{sep}{}{sep}{}",
            self.namespace,
            self.name,
            self.kind,
            sep = ID_SEPARATOR
        )
    }

    /// `namespace/name`, used as the node title
    pub fn title(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }

    /// Same namespace and name, regardless of kind
    pub fn same_workload(&self, other: &Resource) -> bool {
        self.namespace == other.namespace && self.name == other.name
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Error parsing a rendered resource id
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid resource id '{0}': expected namespace__name__kind")]
pub struct ParseResourceIdError(pub String);

impl FromStr for Resource {
    type Err = ParseResourceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Kubernetes names are DNS-1123 labels and never contain '_', so the
        // separator cannot occur inside a field.
        let mut parts = s.trim().splitn(3, ID_SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(namespace), Some(name), Some(kind))
                if !namespace.is_empty() && !name.is_empty() && !kind.contains(ID_SEPARATOR) =>
            {
                Ok(Resource::new(namespace, name, ResourceKind::parse_lenient(kind)))
            }
            _ => Err(ParseResourceIdError(s.to_string())),
        }
    }
}

/// A resource annotated with point-in-time metrics.
///
/// `None` means the backend reported nothing for that metric, which is
/// rendered differently from a measured zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub resource: Resource,
    pub success_rate: Option<f64>,
    pub latency_p95_ms: Option<f64>,
    pub request_volume: Option<f64>,
}

impl Node {
    /// Node with every metric unknown
    pub fn unmeshed(resource: Resource) -> Self {
        Self {
            resource,
            success_rate: None,
            latency_p95_ms: None,
            request_volume: None,
        }
    }
}

/// Directed observed traffic between two resources
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: Resource,
    pub destination: Resource,
}

impl Edge {
    pub fn new(source: Resource, destination: Resource) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// Rendered id, `<source id>__<destination id>`
    pub fn id(&self) -> String {
        format!("{}{}{}", self.source.id(), ID_SEPARATOR, self.destination.id())
    }

    pub fn touches(&self, resource: &Resource) -> bool {
        &self.source == resource || &self.destination == resource
    }
}

/// Which relation is expanded during traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Who calls me
    Inbound,
    /// Who do I call
    Outbound,
    #[default]
    Both,
}

impl Direction {
    pub fn follows_inbound(&self) -> bool {
        matches!(self, Direction::Inbound | Direction::Both)
    }

    pub fn follows_outbound(&self) -> bool {
        matches!(self, Direction::Outbound | Direction::Both)
    }
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inbound" => Ok(Direction::Inbound),
            "outbound" => Ok(Direction::Outbound),
            "" | "both" => Ok(Direction::Both),
            other => Err(format!("unknown direction '{}'", other)),
        }
    }
}
