//! Per-request graph orchestration
//!
//! parameters → snapshot → assembly → filters → records → graph

use crate::assembly::{
    AssemblyMode, FilterPipeline, GraphAssembler, Reachability, WorkingSet, DEFAULT_DEPTH,
};
use crate::error::GraphError;
use crate::health::{components, HealthRegistry};
use crate::nodegraph::Graph;
use crate::observability::{GraphMetrics, StructuredLogger};
use crate::params::Parameters;
use crate::records::{edge_record, graph_spec, node_record};
use crate::source::{QueryContext, Snapshot, SnapshotBuilder};
use std::time::Instant;

/// Builds one graph per request. Cheap to clone; clones share the backend
/// connection pool and health registry.
#[derive(Clone)]
pub struct GraphService {
    builder: SnapshotBuilder,
    health: HealthRegistry,
    metrics: GraphMetrics,
    logger: StructuredLogger,
}

impl GraphService {
    pub fn new(builder: SnapshotBuilder, health: HealthRegistry) -> Self {
        Self {
            builder,
            health,
            metrics: GraphMetrics::new(),
            logger: StructuredLogger::new("nodegraph"),
        }
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Build the graph for one request. Fails as a whole; no partial graph
    /// is ever returned.
    pub async fn graph(
        &self,
        params: &Parameters,
        ctx: &QueryContext,
    ) -> Result<Graph, GraphError> {
        let start = Instant::now();
        let root = params.root_id();

        let result = self.build(params, ctx).await;
        let elapsed = start.elapsed();
        self.metrics.observe_request_latency(elapsed.as_secs_f64());

        match &result {
            Ok(graph) => {
                self.metrics
                    .set_graph_size(graph.nodes().len(), graph.edges().len());
                self.logger.log_graph_built(
                    root.as_deref(),
                    mode_name(params.mode),
                    graph.nodes().len(),
                    graph.edges().len(),
                    elapsed.as_millis() as u64,
                );
            }
            Err(e) => {
                self.metrics.inc_requests_failed();
                self.logger.log_graph_failed(root.as_deref(), e);
            }
        }

        result
    }

    async fn build(&self, params: &Parameters, ctx: &QueryContext) -> Result<Graph, GraphError> {
        let snapshot = self.builder.build(ctx, &params.window).await;
        self.health
            .report(components::METRICS_BACKEND, &snapshot)
            .await;

        let graph = assemble(&snapshot?, params).and_then(render);
        match &graph {
            Ok(_) => self.health.set_healthy(components::GRAPH_ASSEMBLER).await,
            Err(e @ GraphError::Schema(_)) => {
                self.health
                    .set_unhealthy(components::GRAPH_ASSEMBLER, e.to_string())
                    .await
            }
            Err(_) => {}
        }

        graph
    }
}

fn mode_name(mode: AssemblyMode) -> &'static str {
    match mode {
        AssemblyMode::Expand => "expand",
        AssemblyMode::Snapshot => "snapshot",
    }
}

/// Assemble and filter the working set for `params`.
///
/// Expansion honours the depth itself, so the reachability restriction only
/// runs in snapshot mode, and only when a root was named.
pub fn assemble(snapshot: &Snapshot, params: &Parameters) -> Result<WorkingSet, GraphError> {
    let assembler = GraphAssembler::new(snapshot);
    let root = params.root.as_ref().map(|r| snapshot.resolve_kind(r));

    let (mut set, restrict) = match (params.mode, root) {
        (AssemblyMode::Expand, Some(root)) => {
            let depth = params.depth.unwrap_or(DEFAULT_DEPTH);
            (assembler.expand(&root, depth, params.direction), None)
        }
        (AssemblyMode::Expand, None) => {
            return Err(GraphError::InvalidParameter(
                "mode 'expand' needs a root resource".to_string(),
            ))
        }
        (AssemblyMode::Snapshot, root) => {
            let restrict = root.map(|root| Reachability {
                root,
                depth: params.depth.unwrap_or(DEFAULT_DEPTH),
                direction: params.direction,
            });
            (assembler.snapshot(), restrict)
        }
    };

    FilterPipeline {
        ignore: params.ignore.clone(),
        include_unmeshed: params.show_unmeshed,
        restrict,
        drop_orphans: params.no_orphans,
    }
    .apply(&mut set);
    set.finalize();

    Ok(set)
}

fn render(set: WorkingSet) -> Result<Graph, GraphError> {
    let (nodes, edges) = set.into_parts();

    let mut graph = Graph::new(graph_spec().clone());
    graph.add_nodes(nodes.iter().map(node_record))?;
    graph.add_edges(edges.iter().map(edge_record))?;

    Ok(graph)
}
