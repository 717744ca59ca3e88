//! Service dependency graphs from mesh traffic metrics
//!
//! This crate provides the core functionality for:
//! - Querying a metrics backend for per-workload success rate, latency,
//!   volume and traffic edges
//! - Assembling a bounded, deduplicated graph around a root or from the whole
//!   snapshot, then filtering it
//! - Rendering schema-validated node and edge records for the panel
//! - Health checks and observability

pub mod assembly;
pub mod error;
pub mod health;
pub mod models;
pub mod nodegraph;
pub mod observability;
pub mod params;
pub mod records;
pub mod service;
pub mod source;

pub use error::GraphError;
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use nodegraph::{Graph, GraphSpec, SchemaError};
pub use observability::{GraphMetrics, StructuredLogger};
pub use params::{GraphQuery, Parameters};
pub use service::GraphService;
