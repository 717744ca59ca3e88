//! Observability infrastructure for the graph service
//!
//! Provides:
//! - Prometheus metrics (request latency, per-query latency and errors, graph size)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge, Histogram, HistogramVec, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<GraphMetricsInner> = OnceLock::new();

struct GraphMetricsInner {
    request_latency_seconds: Histogram,
    query_latency_seconds: HistogramVec,
    query_errors: IntCounterVec,
    requests_failed: IntCounter,
    graph_nodes: IntGauge,
    graph_edges: IntGauge,
}

impl GraphMetricsInner {
    fn new() -> Self {
        Self {
            request_latency_seconds: register_histogram!(
                "nodegraph_request_latency_seconds",
                "Time spent building a graph for one request",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register request_latency_seconds"),

            query_latency_seconds: register_histogram_vec!(
                "nodegraph_query_latency_seconds",
                "Time spent waiting on one metrics backend query",
                &["query"],
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register query_latency_seconds"),

            query_errors: register_int_counter_vec!(
                "nodegraph_query_errors_total",
                "Total number of failed metrics backend queries",
                &["query"]
            )
            .expect("Failed to register query_errors_total"),

            requests_failed: register_int_counter!(
                "nodegraph_requests_failed_total",
                "Total number of graph requests that failed"
            )
            .expect("Failed to register requests_failed_total"),

            graph_nodes: register_int_gauge!(
                "nodegraph_graph_nodes",
                "Number of nodes in the last graph served"
            )
            .expect("Failed to register graph_nodes"),

            graph_edges: register_int_gauge!(
                "nodegraph_graph_edges",
                "Number of edges in the last graph served"
            )
            .expect("Failed to register graph_edges"),
        }
    }
}

/// Graph service metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct GraphMetrics {
    _private: (),
}

impl std::fmt::Debug for GraphMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphMetrics").finish()
    }
}

impl Default for GraphMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(GraphMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &GraphMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_request_latency(&self, duration_secs: f64) {
        self.inner().request_latency_seconds.observe(duration_secs);
    }

    pub fn observe_query_latency(&self, query: &str, duration_secs: f64) {
        self.inner()
            .query_latency_seconds
            .with_label_values(&[query])
            .observe(duration_secs);
    }

    pub fn inc_query_errors(&self, query: &str) {
        self.inner().query_errors.with_label_values(&[query]).inc();
    }

    pub fn inc_requests_failed(&self) {
        self.inner().requests_failed.inc();
    }

    /// Record the size of the graph just served
    pub fn set_graph_size(&self, nodes: usize, edges: usize) {
        self.inner().graph_nodes.set(nodes as i64);
        self.inner().graph_edges.set(edges as i64);
    }
}

/// Structured logger for service events
///
/// Keeps field names consistent across the server binary and the library.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log server startup
    pub fn log_startup(&self, version: &str, addr: &str, backend: &str) {
        info!(
            event = "server_started",
            service = %self.service,
            version = %version,
            addr = %addr,
            backend = %backend,
            "Node graph server started"
        );
    }

    /// Log server shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            service = %self.service,
            reason = %reason,
            "Node graph server shutting down"
        );
    }

    /// Log a successfully built graph
    pub fn log_graph_built(
        &self,
        root: Option<&str>,
        mode: &str,
        nodes: usize,
        edges: usize,
        elapsed_ms: u64,
    ) {
        info!(
            event = "graph_built",
            service = %self.service,
            root = root.unwrap_or("-"),
            mode = %mode,
            nodes = nodes,
            edges = edges,
            elapsed_ms = elapsed_ms,
            "Built node graph"
        );
    }

    /// Log a failed graph request
    pub fn log_graph_failed(&self, root: Option<&str>, error: &dyn std::error::Error) {
        warn!(
            event = "graph_failed",
            service = %self.service,
            root = root.unwrap_or("-"),
            error = %error,
            "Failed to build node graph"
        );
    }
}
