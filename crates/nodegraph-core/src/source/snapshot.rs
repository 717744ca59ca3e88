//! Query snapshot for one graph request
//!
//! Four aggregate queries (success rate, p95 latency, request volume and
//! traffic by endpoint pair) are issued concurrently and joined. A single
//! failure aborts the others and fails the build; partial snapshots are never
//! returned.

use super::{Labels, MetricsSource, QueryContext, QueryWindow, Sample, SourceError};
use crate::error::GraphError;
use crate::models::{Direction, Edge, Node, Resource, ResourceKind};
use crate::observability::GraphMetrics;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

const NAMESPACE_LABEL: &str = "namespace";
const DEPLOYMENT_LABEL: &str = "deployment";
const STATEFULSET_LABEL: &str = "statefulset";
const DST_NAMESPACE_LABEL: &str = "dst_namespace";
const DST_DEPLOYMENT_LABEL: &str = "dst_deployment";
const DST_STATEFULSET_LABEL: &str = "dst_statefulset";

/// The four queries making up a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    SuccessRate,
    LatencyP95,
    RequestVolume,
    Edges,
}

impl QueryKind {
    pub const ALL: [QueryKind; 4] = [
        QueryKind::SuccessRate,
        QueryKind::LatencyP95,
        QueryKind::RequestVolume,
        QueryKind::Edges,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::SuccessRate => "success_rate",
            QueryKind::LatencyP95 => "latency_p95",
            QueryKind::RequestVolume => "request_volume",
            QueryKind::Edges => "edges",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Query expressions, with an optional extra label matcher appended to
/// every selector (e.g. `cluster="prod"`).
#[derive(Debug, Clone, Default)]
pub struct QuerySet {
    extra_labels: String,
}

impl QuerySet {
    pub fn new(extra_labels: impl AsRef<str>) -> Self {
        let labels = extra_labels.as_ref().trim().trim_matches(',').trim();
        let extra_labels = if labels.is_empty() {
            String::new()
        } else {
            format!(", {}", labels)
        };

        Self { extra_labels }
    }

    pub fn expression(&self, kind: QueryKind) -> String {
        let l = &self.extra_labels;
        match kind {
            QueryKind::SuccessRate => format!(
                r#"sum by (namespace, deployment, statefulset) (irate(response_total{{classification="success", direction="inbound", namespace!=""{l}}}[120s])) / sum by (namespace, deployment, statefulset) (irate(response_total{{direction="inbound", namespace!=""{l}}}[120s])) >= 0"#
            ),
            QueryKind::LatencyP95 => format!(
                r#"histogram_quantile(0.95, sum by (le, namespace, deployment, statefulset) (rate(response_latency_ms_bucket{{direction="inbound", namespace!=""{l}}}[120s])))"#
            ),
            QueryKind::RequestVolume => format!(
                r#"sum by (namespace, deployment, statefulset) (rate(request_total{{direction="inbound", namespace!=""{l}}}[120s]))"#
            ),
            QueryKind::Edges => format!(
                r#"sum by (namespace, deployment, statefulset, dst_namespace, dst_deployment, dst_statefulset) (rate(response_total{{namespace!="", dst_namespace!=""{l}}}[120s]))"#
            ),
        }
    }
}

/// Reduced query results for one request
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    success_rate: Vec<Sample>,
    latency_p95: Vec<Sample>,
    request_volume: Vec<Sample>,
    edges: Vec<Edge>,
}

impl Snapshot {
    /// Build a snapshot from already reduced samples. Edge samples missing
    /// either endpoint are discarded.
    pub fn from_samples(
        success_rate: Vec<Sample>,
        latency_p95: Vec<Sample>,
        request_volume: Vec<Sample>,
        edge_samples: Vec<Sample>,
    ) -> Self {
        let total = edge_samples.len();
        let edges: Vec<Edge> = edge_samples.iter().filter_map(edge_from_sample).collect();

        if edges.len() < total {
            debug!(
                discarded = total - edges.len(),
                kept = edges.len(),
                "Discarded edge samples without both endpoints"
            );
        }

        Self {
            success_rate,
            latency_p95,
            request_volume,
            edges,
        }
    }

    /// Resolve the metrics of a resource. Missing or non-finite values are unknown.
    pub fn node(&self, resource: &Resource) -> Node {
        Node {
            resource: resource.clone(),
            success_rate: find_value(&self.success_rate, resource),
            latency_p95_ms: find_value(&self.latency_p95, resource),
            request_volume: find_value(&self.request_volume, resource),
        }
    }

    /// Every resource reported by a metric query, in first-seen order
    pub fn resources(&self) -> Vec<Resource> {
        let mut seen = HashSet::new();
        self.success_rate
            .iter()
            .chain(&self.latency_p95)
            .chain(&self.request_volume)
            .filter_map(|s| {
                resource_from_labels(
                    &s.labels,
                    NAMESPACE_LABEL,
                    DEPLOYMENT_LABEL,
                    STATEFULSET_LABEL,
                )
            })
            .filter(|r| seen.insert(r.clone()))
            .collect()
    }

    /// Every valid traffic edge
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Edges originating at `resource`
    pub fn outbound_edges_of<'a>(
        &'a self,
        resource: &'a Resource,
    ) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| &e.source == resource)
    }

    /// Edges terminating at `resource`
    pub fn inbound_edges_of<'a>(
        &'a self,
        resource: &'a Resource,
    ) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| &e.destination == resource)
    }

    /// Edges to expand from `resource` for the given direction
    pub fn edges_of<'a>(&'a self, resource: &'a Resource, direction: Direction) -> Vec<&'a Edge> {
        let mut edges = Vec::new();
        if direction.follows_outbound() {
            edges.extend(self.outbound_edges_of(resource));
        }
        if direction.follows_inbound() {
            edges.extend(self.inbound_edges_of(resource));
        }
        edges
    }

    /// Resolve a resource of unknown kind to a kind the snapshot has seen,
    /// preferring deployments. Known kinds are returned unchanged.
    pub fn resolve_kind(&self, resource: &Resource) -> Resource {
        if resource.kind != ResourceKind::Unknown {
            return resource.clone();
        }

        let known: HashSet<&Resource> = self
            .edges
            .iter()
            .flat_map(|e| [&e.source, &e.destination])
            .collect();
        let from_metrics = self.resources();

        ResourceKind::KNOWN
            .iter()
            .map(|kind| Resource::new(&resource.namespace, &resource.name, *kind))
            .find(|candidate| known.contains(candidate) || from_metrics.contains(candidate))
            .unwrap_or_else(|| resource.clone())
    }
}

fn kind_label(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Statefulset => STATEFULSET_LABEL,
        ResourceKind::Deployment | ResourceKind::Unknown => DEPLOYMENT_LABEL,
    }
}

fn find_value(samples: &[Sample], resource: &Resource) -> Option<f64> {
    let label = kind_label(resource.kind);
    samples
        .iter()
        .find(|s| {
            s.labels.get(NAMESPACE_LABEL) == Some(&resource.namespace)
                && s.labels.get(label) == Some(&resource.name)
        })
        .map(|s| s.value)
        .filter(|v| v.is_finite())
}

fn resource_from_labels(
    labels: &Labels,
    namespace_label: &str,
    deployment_label: &str,
    statefulset_label: &str,
) -> Option<Resource> {
    let namespace = labels.get(namespace_label).filter(|v| !v.is_empty())?;

    if let Some(name) = labels.get(deployment_label).filter(|v| !v.is_empty()) {
        Some(Resource::deployment(namespace, name))
    } else if let Some(name) = labels.get(statefulset_label).filter(|v| !v.is_empty()) {
        Some(Resource::statefulset(namespace, name))
    } else {
        None
    }
}

fn edge_from_sample(sample: &Sample) -> Option<Edge> {
    let source = resource_from_labels(
        &sample.labels,
        NAMESPACE_LABEL,
        DEPLOYMENT_LABEL,
        STATEFULSET_LABEL,
    )?;
    let destination = resource_from_labels(
        &sample.labels,
        DST_NAMESPACE_LABEL,
        DST_DEPLOYMENT_LABEL,
        DST_STATEFULSET_LABEL,
    )?;

    Some(Edge::new(source, destination))
}

/// Issues the snapshot queries against a metrics source
#[derive(Clone)]
pub struct SnapshotBuilder {
    source: Arc<dyn MetricsSource>,
    queries: QuerySet,
    metrics: GraphMetrics,
}

impl SnapshotBuilder {
    pub fn new(source: Arc<dyn MetricsSource>, queries: QuerySet) -> Self {
        Self {
            source,
            queries,
            metrics: GraphMetrics::new(),
        }
    }

    /// Run the four queries concurrently and join them.
    ///
    /// The whole join is bounded by the context deadline; when it fires, or
    /// when one query fails, the remaining futures are dropped, which cancels
    /// their in-flight requests.
    pub async fn build(
        &self,
        ctx: &QueryContext,
        window: &QueryWindow,
    ) -> Result<Snapshot, GraphError> {
        let joined = tokio::time::timeout_at(ctx.deadline, async {
            tokio::try_join!(
                self.run(ctx, window, QueryKind::SuccessRate),
                self.run(ctx, window, QueryKind::LatencyP95),
                self.run(ctx, window, QueryKind::RequestVolume),
                self.run(ctx, window, QueryKind::Edges),
            )
        })
        .await;

        let (success_rate, latency_p95, request_volume, edges) = match joined {
            Ok(result) => result?,
            Err(_) => return Err(GraphError::DeadlineExceeded),
        };

        Ok(Snapshot::from_samples(
            success_rate,
            latency_p95,
            request_volume,
            edges,
        ))
    }

    async fn run(
        &self,
        ctx: &QueryContext,
        window: &QueryWindow,
        kind: QueryKind,
    ) -> Result<Vec<Sample>, GraphError> {
        let start = Instant::now();
        let expr = self.queries.expression(kind);

        let result = self.source.query(ctx, &expr, window).await;
        let elapsed = start.elapsed();
        self.metrics.observe_query_latency(kind.as_str(), elapsed.as_secs_f64());

        match result {
            Ok(result) => {
                let samples = result.into_samples();
                debug!(
                    query = %kind,
                    samples = samples.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Query complete"
                );
                Ok(samples)
            }
            Err(source) => {
                self.metrics.inc_query_errors(kind.as_str());
                Err(query_error(kind, source))
            }
        }
    }
}

fn query_error(query: QueryKind, source: SourceError) -> GraphError {
    match source {
        SourceError::DeadlineExceeded => GraphError::DeadlineExceeded,
        source => GraphError::Query { query, source },
    }
}
