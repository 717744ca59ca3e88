//! Errors surfaced by graph requests

use crate::nodegraph::SchemaError;
use crate::source::{QueryKind, SourceError};

/// Failure of a whole graph request. No partial graph is ever returned.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("failed to run {query} query: {source}")]
    Query {
        query: QueryKind,
        source: SourceError,
    },

    #[error("request deadline exceeded")]
    DeadlineExceeded,

    /// A record builder produced something the graph spec disagrees with
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl GraphError {
    /// Whether the caller sent a bad request, as opposed to an internal failure
    pub fn is_client_error(&self) -> bool {
        matches!(self, GraphError::InvalidParameter(_))
    }
}
