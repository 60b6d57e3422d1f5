//! K-Means clustering engine and fitted model

use crate::backend::{LinfaBackend, LloydBackend};
use crate::error::ClusterError;
use crate::features::CustomerFeatures;
use clap::ValueEnum;
use log::info;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;

/// What to do with a centroid whose cluster has no members after assignment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum EmptyClusterPolicy {
    /// Leave the centroid where it was before the update step
    #[default]
    KeepPrevious,
    /// Move the centroid onto the point farthest from its own centroid
    ReseedFarthest,
    /// Abort the fit with [`ClusterError::DegenerateCluster`]
    Fail,
}

/// Available partitioning backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Hand-written Lloyd iteration
    #[default]
    Lloyd,
    /// `linfa-clustering` K-Means
    Linfa,
}

impl BackendKind {
    pub fn into_backend(self) -> Box<dyn ClusteringBackend> {
        match self {
            BackendKind::Lloyd => Box::new(LloydBackend),
            BackendKind::Linfa => Box::new(LinfaBackend),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Number of clusters
    pub k: usize,
    /// Upper bound on Lloyd iterations
    pub max_iterations: usize,
    /// Convergence threshold on centroid displacement
    pub tolerance: f64,
    /// Seed for centroid initialization; drawn from the thread RNG when unset
    pub seed: Option<u64>,
    pub empty_cluster: EmptyClusterPolicy,
}

impl EngineConfig {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            max_iterations: 100,
            tolerance: 1e-4,
            seed: None,
            empty_cluster: EmptyClusterPolicy::default(),
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_empty_cluster_policy(mut self, policy: EmptyClusterPolicy) -> Self {
        self.empty_cluster = policy;
        self
    }
}

/// Validated parameters handed to a backend
#[derive(Debug, Clone, PartialEq)]
pub struct FitParams {
    pub k: usize,
    pub max_iterations: usize,
    pub tolerance: f64,
    pub seed: u64,
    pub empty_cluster: EmptyClusterPolicy,
}

/// Raw result of one backend run
#[derive(Debug, Clone)]
pub struct Partition {
    /// k x D centroid matrix
    pub centroids: Array2<f64>,
    /// Cluster index per input row
    pub labels: Array1<usize>,
    /// Iterations performed, when the backend reports it
    pub iterations: Option<usize>,
    pub converged: bool,
}

/// A partitioning algorithm usable by [`ClusteringEngine`]
///
/// Implementations receive already validated input: `1 <= k <= n`, at least
/// one column, finite values. They must return `k` centroids and one label in
/// `0..k` per row, with labels equal to the nearest-centroid assignment
/// against the returned centroids.
pub trait ClusteringBackend {
    /// Short name for logs and reports
    fn name(&self) -> &'static str;

    /// Partition the rows of `records`
    fn partition(&self, records: ArrayView2<'_, f64>, params: &FitParams)
        -> Result<Partition, ClusterError>;
}

/// Validates input, resolves the seed and delegates to a backend
pub struct ClusteringEngine {
    backend: Box<dyn ClusteringBackend>,
    config: EngineConfig,
}

impl ClusteringEngine {
    /// Engine using the hand-written Lloyd backend
    pub fn new(config: EngineConfig) -> Self {
        Self::with_backend(Box::new(LloydBackend), config)
    }

    pub fn with_backend(backend: Box<dyn ClusteringBackend>, config: EngineConfig) -> Self {
        Self { backend, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Fit the engine on an N x D feature matrix
    pub fn fit(&self, records: &Array2<f64>) -> Result<ClusterModel, ClusterError> {
        let params = self.validate(records)?;
        let partition = self.backend.partition(records.view(), &params)?;

        let inertia = compute_inertia(records, &partition.labels, &partition.centroids);
        info!(
            "{} fit: k={} n={} iterations={:?} converged={} inertia={:.4}",
            self.backend.name(),
            params.k,
            records.nrows(),
            partition.iterations,
            partition.converged,
            inertia
        );

        Ok(ClusterModel {
            n_clusters: params.k,
            labels: partition.labels,
            centroids: partition.centroids,
            inertia,
            iterations: partition.iterations,
            converged: partition.converged,
            seed: params.seed,
            backend: self.backend.name(),
        })
    }

    fn validate(&self, records: &Array2<f64>) -> Result<FitParams, ClusterError> {
        let config = &self.config;
        let (n, d) = records.dim();

        if n == 0 {
            return Err(ClusterError::InvalidArgument("no feature vectors to cluster".into()));
        }
        if d == 0 {
            return Err(ClusterError::InvalidArgument(
                "feature vectors must have at least one dimension".into(),
            ));
        }
        if config.k == 0 {
            return Err(ClusterError::InvalidArgument("k must be at least 1".into()));
        }
        if config.k > n {
            return Err(ClusterError::InvalidArgument(format!(
                "cannot create {} clusters from {} feature vectors",
                config.k, n
            )));
        }
        if config.max_iterations == 0 {
            return Err(ClusterError::InvalidArgument(
                "max_iterations must be at least 1".into(),
            ));
        }
        if !config.tolerance.is_finite() || config.tolerance < 0.0 {
            return Err(ClusterError::InvalidArgument(format!(
                "tolerance must be a non-negative number, got {}",
                config.tolerance
            )));
        }
        if let Some((row, _)) = records
            .outer_iter()
            .enumerate()
            .find(|(_, row)| row.iter().any(|v| !v.is_finite()))
        {
            return Err(ClusterError::InvalidArgument(format!(
                "feature vector {row} contains a non-finite value"
            )));
        }

        Ok(FitParams {
            k: config.k,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            seed: config.seed.unwrap_or_else(|| rand::thread_rng().gen()),
            empty_cluster: config.empty_cluster,
        })
    }
}

/// Fitted clustering with its training assignment
#[derive(Debug, Clone)]
pub struct ClusterModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in feature space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
    /// Iterations run, if the backend reports them
    pub iterations: Option<usize>,
    /// Whether centroid displacement fell below the tolerance
    pub converged: bool,
    /// Seed actually used for initialization
    pub seed: u64,
    /// Backend that produced the partition
    pub backend: &'static str,
}

impl ClusterModel {
    /// Predict cluster for new data point
    pub fn predict(&self, features: &[f64]) -> Result<usize, ClusterError> {
        if features.len() != self.centroids.ncols() {
            return Err(ClusterError::InvalidArgument(format!(
                "feature vector must have exactly {} dimensions, got {}",
                self.centroids.ncols(),
                features.len()
            )));
        }
        if features.iter().any(|v| !v.is_finite()) {
            return Err(ClusterError::InvalidArgument(
                "feature vector contains a non-finite value".into(),
            ));
        }

        Ok(nearest_centroid(ArrayView1::from(features), self.centroids.view()))
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            sizes[label] += 1;
        }
        sizes
    }

    /// Compute basic silhouette coefficient for the first `sample_size` points
    pub fn compute_silhouette_sample(&self, features: &Array2<f64>, sample_size: usize) -> f64 {
        let n_samples = features.nrows().min(sample_size).min(self.labels.len());
        if n_samples < 2 {
            return 0.0;
        }

        let mut silhouette_sum = 0.0;

        for i in 0..n_samples {
            let point = features.row(i);
            let cluster_label = self.labels[i];

            let mut same_sum = 0.0;
            let mut same_count = 0usize;
            let mut other_sums = vec![0.0; self.n_clusters];
            let mut other_counts = vec![0usize; self.n_clusters];

            for j in 0..n_samples {
                if i == j {
                    continue;
                }

                let distance = euclidean_distance(point, features.row(j));
                let other_label = self.labels[j];

                if other_label == cluster_label {
                    same_sum += distance;
                    same_count += 1;
                } else {
                    other_sums[other_label] += distance;
                    other_counts[other_label] += 1;
                }
            }

            // Singletons contribute zero
            if same_count == 0 {
                continue;
            }
            let a_i = same_sum / same_count as f64;

            let b_i = other_sums
                .iter()
                .zip(&other_counts)
                .filter(|(_, count)| **count > 0)
                .map(|(sum, &count)| sum / count as f64)
                .fold(f64::INFINITY, f64::min);

            if b_i.is_finite() && a_i.max(b_i) > 0.0 {
                silhouette_sum += (b_i - a_i) / a_i.max(b_i);
            }
        }

        silhouette_sum / n_samples as f64
    }
}

/// Fit K-Means with the Lloyd backend
///
/// # Arguments
/// * `features` - N x D feature matrix
/// * `config` - cluster count, iteration cap, tolerance, seed and empty-cluster policy
///
/// # Returns
/// * Fitted `ClusterModel`
pub fn fit_kmeans(features: &Array2<f64>, config: &EngineConfig) -> Result<ClusterModel, ClusterError> {
    ClusteringEngine::new(config.clone()).fit(features)
}

/// Write each label onto the customer at the same position
pub fn attach_clusters(
    customers: &mut [CustomerFeatures],
    labels: &[usize],
) -> Result<(), ClusterError> {
    if customers.len() != labels.len() {
        return Err(ClusterError::LengthMismatch {
            labels: labels.len(),
            vectors: customers.len(),
        });
    }
    for (customer, &label) in customers.iter_mut().zip(labels) {
        customer.cluster_id = Some(label);
    }
    Ok(())
}

/// Index of the closest centroid; exact ties resolve to the lowest index
pub fn nearest_centroid(point: ArrayView1<'_, f64>, centroids: ArrayView2<'_, f64>) -> usize {
    let mut min_distance = f64::INFINITY;
    let mut closest_cluster = 0;

    for (cluster_idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < min_distance {
            min_distance = distance;
            closest_cluster = cluster_idx;
        }
    }

    closest_cluster
}

/// Nearest-centroid label for every row
pub fn assign_labels(records: ArrayView2<'_, f64>, centroids: ArrayView2<'_, f64>) -> Array1<usize> {
    records
        .axis_iter(Axis(0))
        .map(|point| nearest_centroid(point, centroids))
        .collect()
}

/// Compute within-cluster sum of squares (inertia)
pub fn compute_inertia(features: &Array2<f64>, labels: &Array1<usize>, centroids: &Array2<f64>) -> f64 {
    labels
        .iter()
        .enumerate()
        .map(|(i, &cluster)| squared_distance(features.row(i), centroids.row(cluster)))
        .sum()
}

pub(crate) fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn euclidean_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    squared_distance(a, b).sqrt()
}
