//! End-to-end segmentation: rows -> filter -> features -> clusters

use crate::data::{filter_rows, load_transactions, TransactionRow};
use crate::features::{aggregate_features, AggregationStats, CustomerFeatures};
use crate::model::{attach_clusters, ClusterModel, ClusteringEngine};
use anyhow::Context;
use log::info;
use ndarray::Array2;
use std::path::Path;

/// Result of one segmentation run
#[derive(Debug, Clone)]
pub struct Segmentation {
    /// Customers in aggregation order, each with `cluster_id` set
    pub customers: Vec<CustomerFeatures>,
    /// Feature matrix the model was fitted on, row i <-> `customers[i]`
    pub features: Array2<f64>,
    pub model: ClusterModel,
    pub stats: AggregationStats,
    /// Rows dropped for lacking a customer id
    pub rows_without_customer: usize,
}

/// Segment customers from already loaded transaction rows
pub fn segment_customers(
    rows: &[TransactionRow],
    engine: &ClusteringEngine,
) -> crate::Result<Segmentation> {
    let filtered = filter_rows(rows);
    let rows_without_customer = rows.len() - filtered.len();

    let data = aggregate_features(&filtered);
    info!(
        "aggregated {} customers from {} rows ({} skipped, {} without customer)",
        data.customers.len(),
        data.stats.rows_seen,
        data.stats.rows_skipped,
        rows_without_customer
    );

    let features = data.feature_matrix();
    let model = engine
        .fit(&features)
        .with_context(|| format!("clustering {} customers failed", data.customers.len()))?;

    let mut customers = data.customers;
    attach_clusters(&mut customers, &model.labels.to_vec())?;

    Ok(Segmentation {
        customers,
        features,
        model,
        stats: data.stats,
        rows_without_customer,
    })
}

/// Load a transaction file and segment its customers
pub fn run_pipeline(
    input: impl AsRef<Path>,
    delimiter: u8,
    engine: &ClusteringEngine,
) -> crate::Result<Segmentation> {
    let rows = load_transactions(input, delimiter)?;
    segment_customers(&rows, engine)
}
