//! Metrics backends and the per-request query snapshot
//!
//! A [`MetricsSource`] evaluates a query expression over a [`QueryWindow`] and
//! returns raw samples. [`SnapshotBuilder`] issues the fixed set of aggregate
//! queries the graph needs and reduces their results into a [`Snapshot`].

mod prometheus;
mod snapshot;


pub use self::prometheus::{PrometheusConfig, PrometheusSource};
pub use snapshot::{QueryKind, QuerySet, Snapshot, SnapshotBuilder};

pub use async_trait::async_trait;

use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

/// Label set of a series
pub type Labels = BTreeMap<String, String>;

/// Single instantaneous value
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: Labels,
    pub value: f64,
    /// Milliseconds since the epoch
    pub timestamp_ms: i64,
}

/// Timestamped values of one series
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub labels: Labels,
    /// `(timestamp_ms, value)` pairs
    pub points: Vec<(i64, f64)>,
}

impl Series {
    /// Reduce the series to one sample holding the mean of its points.
    /// Returns `None` for a series without points.
    pub fn mean(&self) -> Option<Sample> {
        let (first_ts, _) = *self.points.first()?;
        let sum: f64 = self.points.iter().map(|(_, v)| v).sum();

        Some(Sample {
            labels: self.labels.clone(),
            value: sum / self.points.len() as f64,
            timestamp_ms: first_ts,
        })
    }
}

/// Result of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Vector(Vec<Sample>),
    Matrix(Vec<Series>),
}

impl QueryResult {
    /// Flatten into one sample per series, averaging windowed series
    pub fn into_samples(self) -> Vec<Sample> {
        match self {
            QueryResult::Vector(samples) => samples,
            QueryResult::Matrix(series) => series.iter().filter_map(Series::mean).collect(),
        }
    }
}

/// Time range a query is evaluated over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryWindow {
    /// Evaluate at the current time
    Instant,
    /// Evaluate over `[start_ms, end_ms]` at the given resolution
    Range {
        start_ms: i64,
        end_ms: i64,
        step: Duration,
    },
}

impl QueryWindow {
    /// Window for the panel's `from`/`to` parameters (epoch milliseconds).
    /// Missing or inverted bounds fall back to an instant query.
    pub fn from_millis(from: Option<i64>, to: Option<i64>, step: Duration) -> Self {
        match (from, to) {
            (Some(start_ms), Some(end_ms)) if start_ms > 0 && start_ms < end_ms => {
                QueryWindow::Range {
                    start_ms,
                    end_ms,
                    step,
                }
            }
            _ => QueryWindow::Instant,
        }
    }
}

/// Per-request context handed to every query
#[derive(Debug, Clone, Copy)]
pub struct QueryContext {
    pub deadline: Instant,
}

impl QueryContext {
    pub fn new(deadline: Instant) -> Self {
        Self { deadline }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Instant::now() + timeout)
    }

    /// Time left before the deadline, `None` once it has passed
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .checked_duration_since(Instant::now())
            .filter(|d| !d.is_zero())
    }
}

/// Errors returned by a metrics backend
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request to metrics backend failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("metrics backend returned {error_type}: {error}")]
    Backend { error_type: String, error: String },

    #[error("unexpected result type '{0}', expected vector or matrix")]
    UnexpectedResultType(String),

    #[error("could not decode backend response: {0}")]
    Decode(String),

    #[error("invalid backend address: {0}")]
    InvalidAddress(#[from] url::ParseError),

    #[error("could not read {}: {source}", path.display())]
    TlsFile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TLS settings: {0}")]
    TlsConfig(String),

    #[error("deadline exceeded before query was sent")]
    DeadlineExceeded,
}

/// Capability to evaluate metric queries
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn query(
        &self,
        ctx: &QueryContext,
        expr: &str,
        window: &QueryWindow,
    ) -> Result<QueryResult, SourceError>;
}
