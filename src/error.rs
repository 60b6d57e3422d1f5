//! Typed errors for the aggregation and clustering core

use thiserror::Error;

/// Errors returned by the clustering engine and cluster attachment.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClusterError {
    /// A precondition on the input or configuration was violated.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A cluster lost all of its members and the configured policy is `Fail`.
    #[error(
        "cluster {cluster} has no members after assignment{}",
        .iteration.map(|i| format!(" in iteration {i}")).unwrap_or_default()
    )]
    DegenerateCluster {
        /// Index of the empty cluster.
        cluster: usize,
        /// One-based iteration in which it emptied, `None` for backends that
        /// do not report iterations.
        iteration: Option<usize>,
    },

    /// Label sequence and vector sequence differ in length.
    #[error("cannot attach {labels} labels to {vectors} feature vectors")]
    LengthMismatch {
        /// Number of labels supplied.
        labels: usize,
        /// Number of feature vectors supplied.
        vectors: usize,
    },

    /// The library-backed partitioner failed.
    #[error("clustering backend failed: {0}")]
    Backend(String),
}

/// Per-row failures recovered by the feature aggregator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    /// A numeric field did not parse as a finite decimal.
    #[error("field {field} has non-numeric value {value:?}")]
    InvalidNumber {
        /// Column the value came from.
        field: &'static str,
        /// Raw text as read.
        value: String,
    },
}
