//! Per-cluster summaries of a segmentation

use crate::features::{CustomerFeatures, FEATURE_NAMES};
use crate::model::ClusterModel;

/// Totals and ranges of one cluster
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSummary {
    pub cluster: usize,
    pub customers: usize,
    pub total_spent: f64,
    pub total_purchases: usize,
    /// Sum of the members' distinct-product counts
    pub unique_products: usize,
    /// `(min, max)` of total spent, `None` for an empty cluster
    pub spent_range: Option<(f64, f64)>,
    /// `(min, max)` of purchase count, `None` for an empty cluster
    pub purchase_range: Option<(usize, usize)>,
}

impl ClusterSummary {
    fn empty(cluster: usize) -> Self {
        Self {
            cluster,
            customers: 0,
            total_spent: 0.0,
            total_purchases: 0,
            unique_products: 0,
            spent_range: None,
            purchase_range: None,
        }
    }

    fn add(&mut self, customer: &CustomerFeatures) {
        self.customers += 1;
        self.total_spent += customer.total_spent;
        self.total_purchases += customer.purchase_count;
        self.unique_products += customer.distinct_product_count;

        let spent = customer.total_spent;
        self.spent_range = Some(match self.spent_range {
            Some((lo, hi)) => (lo.min(spent), hi.max(spent)),
            None => (spent, spent),
        });

        let purchases = customer.purchase_count;
        self.purchase_range = Some(match self.purchase_range {
            Some((lo, hi)) => (lo.min(purchases), hi.max(purchases)),
            None => (purchases, purchases),
        });
    }
}

/// Summaries for clusters `0..n_clusters`, from customers with an attached cluster id
pub fn summarize_clusters(customers: &[CustomerFeatures], n_clusters: usize) -> Vec<ClusterSummary> {
    let mut summaries: Vec<ClusterSummary> = (0..n_clusters).map(ClusterSummary::empty).collect();
    for customer in customers {
        let Some(id) = customer.cluster_id else {
            continue;
        };
        if let Some(summary) = summaries.get_mut(id) {
            summary.add(customer);
        }
    }
    summaries
}

/// Print cluster statistics to console
pub fn print_cluster_report(customers: &[CustomerFeatures], model: &ClusterModel) {
    let total = customers.len();

    println!("\n=== Clustering Results ===");
    println!("Backend: {}", model.backend);
    println!("Number of clusters: {}", model.n_clusters);
    println!("Total customers: {}", total);
    match model.iterations {
        Some(iterations) => println!(
            "Iterations: {} ({})",
            iterations,
            if model.converged { "converged" } else { "iteration limit reached" }
        ),
        None => println!("Converged: {}", model.converged),
    }
    println!("Within-cluster sum of squares (Inertia): {:.2}", model.inertia);

    for summary in summarize_clusters(customers, model.n_clusters) {
        let percentage = if total > 0 {
            summary.customers as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        println!("\nCluster {}:", summary.cluster);
        println!("  Number of customers: {} ({:.1}%)", summary.customers, percentage);
        println!("  Total spent: {:.2}", summary.total_spent);
        println!("  Total purchases: {}", summary.total_purchases);
        println!("  Unique products: {}", summary.unique_products);
        if let (Some((lo_s, hi_s)), Some((lo_p, hi_p))) = (summary.spent_range, summary.purchase_range) {
            println!("  Spent range: {:.2} .. {:.2}", lo_s, hi_s);
            println!("  Purchase range: {} .. {}", lo_p, hi_p);
        }
    }

    println!("\nCluster centroids ({}):", FEATURE_NAMES.join(", "));
    for (i, centroid_row) in model.centroids.outer_iter().enumerate() {
        let values: Vec<String> = centroid_row.iter().map(|v| format!("{:.2}", v)).collect();
        println!("  Cluster {}: [{}]", i, values.join(", "));
    }
}
