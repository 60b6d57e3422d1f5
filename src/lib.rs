//! custseg: customer segmentation from transaction records
//!
//! Transaction rows are filtered to those with a customer id, folded into one
//! feature vector per customer (total spent, purchase count, distinct
//! products) and partitioned with K-Means. The clustering backend is
//! pluggable: a hand-written Lloyd iteration or linfa's K-Means.

pub mod backend;
pub mod cli;
pub mod data;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod viz;

// Re-export public items for easier access
pub use backend::{LinfaBackend, LloydBackend};
pub use cli::Args;
pub use data::{filter_rows, load_transactions, TransactionRow};
pub use error::{ClusterError, RowError};
pub use features::{aggregate_features, CustomerData, CustomerFeatures};
pub use model::{
    attach_clusters, fit_kmeans, BackendKind, ClusterModel, ClusteringBackend, ClusteringEngine,
    EmptyClusterPolicy, EngineConfig,
};
pub use pipeline::{run_pipeline, segment_customers, Segmentation};
pub use viz::generate_visualization_report;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
