//! Partitioning backends: hand-written Lloyd iteration and linfa K-Means

use crate::error::ClusterError;
use crate::model::{
    assign_labels, squared_distance, ClusteringBackend, EmptyClusterPolicy, FitParams, Partition,
};
use linfa::prelude::*;
use linfa_clustering::{KMeans, KMeansInit};
use linfa_nn::distance::L2Dist;
use log::debug;
use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

/// Lloyd's algorithm with uniform sampling of initial centroids
///
/// Each iteration assigns every row to its nearest centroid, moves every
/// centroid to the mean of its members and stops once the Frobenius norm of
/// the centroid displacement drops below the tolerance. Clusters left without
/// members are handled by [`EmptyClusterPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LloydBackend;

impl ClusteringBackend for LloydBackend {
    fn name(&self) -> &'static str {
        "lloyd"
    }

    fn partition(
        &self,
        records: ArrayView2<'_, f64>,
        params: &FitParams,
    ) -> Result<Partition, ClusterError> {
        let run = lloyd_run(records, params)?;
        if let (Some(first), Some(last)) = (run.shifts.first(), run.shifts.last()) {
            debug!("lloyd shift went from {first:.6} to {last:.6}");
        }
        Ok(run.partition)
    }
}

/// Outcome of a Lloyd run together with the centroid shift of each iteration
#[derive(Debug)]
pub(crate) struct LloydRun {
    pub partition: Partition,
    pub shifts: Vec<f64>,
}

pub(crate) fn lloyd_run(
    records: ArrayView2<'_, f64>,
    params: &FitParams,
) -> Result<LloydRun, ClusterError> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    let initial = index::sample(&mut rng, records.nrows(), params.k).into_vec();
    let mut centroids = records.select(Axis(0), &initial);

    let mut shifts = Vec::new();
    let mut converged = false;

    for iteration in 1..=params.max_iterations {
        let labels = assign_labels(records, centroids.view());
        let (mut updated, counts) = cluster_means(records, &labels, params.k);
        resolve_empty_clusters(
            records,
            &labels,
            &centroids,
            &mut updated,
            &counts,
            params.empty_cluster,
            iteration,
        )?;

        let shift = displacement(&updated, &centroids);
        debug!("lloyd iteration {iteration}: centroid shift {shift:.6}");
        shifts.push(shift);
        centroids = updated;

        if within_tolerance(shift, params.tolerance) {
            converged = true;
            break;
        }
    }

    // Labels always describe the returned centroids
    let labels = assign_labels(records, centroids.view());

    Ok(LloydRun {
        partition: Partition {
            centroids,
            labels,
            iterations: Some(shifts.len()),
            converged,
        },
        shifts,
    })
}

/// Delegates to `linfa_clustering::KMeans`
///
/// Uses random initialization, a single run and the same seed, iteration cap
/// and tolerance as the Lloyd backend. linfa only accepts a positive tolerance,
/// so zero is raised to the smallest positive `f64`. linfa keeps empty clusters
/// in place on its own, so the empty-cluster policy is only consulted for
/// `Fail`, against the final assignment. The iteration count is not reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinfaBackend;

impl ClusteringBackend for LinfaBackend {
    fn name(&self) -> &'static str {
        "linfa"
    }

    fn partition(
        &self,
        records: ArrayView2<'_, f64>,
        params: &FitParams,
    ) -> Result<Partition, ClusterError> {
        let dataset = DatasetBase::from(records.to_owned());
        let rng = StdRng::seed_from_u64(params.seed);
        let tolerance = params.tolerance.max(f64::MIN_POSITIVE);

        let model = KMeans::params_with(params.k, rng, L2Dist)
            .n_runs(1)
            .init_method(KMeansInit::Random)
            .max_n_iterations(params.max_iterations as u64)
            .tolerance(tolerance)
            .fit(&dataset)
            .map_err(|err| ClusterError::Backend(err.to_string()))?;

        let centroids = model.centroids().to_owned();
        if centroids.iter().any(|v| !v.is_finite()) {
            return Err(ClusterError::Backend(
                "linfa returned a non-finite centroid".to_string(),
            ));
        }

        let labels = assign_labels(records, centroids.view());
        let (mut updated, counts) = cluster_means(records, &labels, params.k);

        if params.empty_cluster == EmptyClusterPolicy::Fail {
            if let Some(cluster) = counts.iter().position(|&count| count == 0) {
                return Err(ClusterError::DegenerateCluster {
                    cluster,
                    iteration: None,
                });
            }
        }
        resolve_empty_clusters(
            records,
            &labels,
            &centroids,
            &mut updated,
            &counts,
            EmptyClusterPolicy::KeepPrevious,
            0,
        )?;

        // A further Lloyd step that stays within tolerance means a fixed point
        let converged = within_tolerance(displacement(&updated, &centroids), params.tolerance);

        Ok(Partition {
            centroids,
            labels,
            iterations: None,
            converged,
        })
    }
}

/// Per-cluster coordinate means and member counts; empty clusters stay zero
fn cluster_means(
    records: ArrayView2<'_, f64>,
    labels: &Array1<usize>,
    k: usize,
) -> (Array2<f64>, Vec<usize>) {
    let mut sums = Array2::zeros((k, records.ncols()));
    let mut counts = vec![0usize; k];

    for (point, &label) in records.outer_iter().zip(labels.iter()) {
        let mut row = sums.row_mut(label);
        row += &point;
        counts[label] += 1;
    }

    for (mut row, &count) in sums.outer_iter_mut().zip(&counts) {
        if count > 0 {
            row /= count as f64;
        }
    }

    (sums, counts)
}

/// Overwrite the rows of empty clusters in `updated` according to `policy`
fn resolve_empty_clusters(
    records: ArrayView2<'_, f64>,
    labels: &Array1<usize>,
    previous: &Array2<f64>,
    updated: &mut Array2<f64>,
    counts: &[usize],
    policy: EmptyClusterPolicy,
    iteration: usize,
) -> Result<(), ClusterError> {
    let mut taken = vec![false; records.nrows()];

    for cluster in (0..counts.len()).filter(|&c| counts[c] == 0) {
        match policy {
            EmptyClusterPolicy::Fail => {
                return Err(ClusterError::DegenerateCluster {
                    cluster,
                    iteration: Some(iteration),
                });
            }
            EmptyClusterPolicy::KeepPrevious => {
                debug!("cluster {cluster} is empty, keeping its previous centroid");
                updated.row_mut(cluster).assign(&previous.row(cluster));
            }
            EmptyClusterPolicy::ReseedFarthest => {
                match farthest_point(records, labels, previous, &taken) {
                    Some(point) => {
                        debug!("cluster {cluster} is empty, reseeding at row {point}");
                        taken[point] = true;
                        updated.row_mut(cluster).assign(&records.row(point));
                    }
                    None => updated.row_mut(cluster).assign(&previous.row(cluster)),
                }
            }
        }
    }

    Ok(())
}

/// Row farthest from its assigned centroid, lowest index on ties
fn farthest_point(
    records: ArrayView2<'_, f64>,
    labels: &Array1<usize>,
    centroids: &Array2<f64>,
    taken: &[bool],
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;

    for (i, point) in records.outer_iter().enumerate() {
        if taken[i] {
            continue;
        }
        let distance = squared_distance(point, centroids.row(labels[i]));
        match best {
            Some((_, best_distance)) if best_distance >= distance => {}
            _ => best = Some((i, distance)),
        }
    }

    best.map(|(i, _)| i)
}

/// A shift below the tolerance, or no shift at all, ends the iteration
fn within_tolerance(shift: f64, tolerance: f64) -> bool {
    shift < tolerance || shift == 0.0
}

/// Frobenius norm of the centroid change
fn displacement(updated: &Array2<f64>, previous: &Array2<f64>) -> f64 {
    (updated - previous).mapv(|v| v * v).sum().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ClusteringEngine, EngineConfig};
    use ndarray::array;
    use rand::Rng;

    /// Three well separated blobs of `per_blob` points each
    fn generate_blobs(per_blob: usize, seed: u64) -> Array2<f64> {
        let centers = [[0.0, 0.0, 0.0], [50.0, 50.0, 10.0], [-40.0, 60.0, 30.0]];
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = Vec::with_capacity(per_blob * centers.len() * 3);
        for center in &centers {
            for _ in 0..per_blob {
                for &c in center {
                    data.push(c + rng.gen_range(-1.0..1.0));
                }
            }
        }
        Array2::from_shape_vec((per_blob * centers.len(), 3), data).unwrap()
    }

    fn lloyd(config: EngineConfig) -> ClusteringEngine {
        ClusteringEngine::with_backend(Box::new(LloydBackend), config)
    }

    fn linfa(config: EngineConfig) -> ClusteringEngine {
        ClusteringEngine::with_backend(Box::new(LinfaBackend), config)
    }

    #[test]
    fn test_labels_cover_every_point() {
        let records = generate_blobs(20, 1);
        for k in 1..=6 {
            let model = lloyd(EngineConfig::new(k).with_seed(42)).fit(&records).unwrap();
            assert_eq!(model.labels.len(), records.nrows());
            assert!(model.labels.iter().all(|&l| l < k));
            assert_eq!(model.centroids.shape(), &[k, 3]);
        }
    }

    #[test]
    fn test_assignment_is_idempotent() {
        let records = generate_blobs(15, 2);
        let model = lloyd(EngineConfig::new(4).with_seed(9)).fit(&records).unwrap();

        let relabeled = assign_labels(records.view(), model.centroids.view());
        assert_eq!(relabeled, model.labels);
    }

    #[test]
    fn test_fixed_seed_is_bit_identical() {
        let records = generate_blobs(25, 3);
        let config = EngineConfig::new(3).with_seed(1234);

        let first = lloyd(config.clone()).fit(&records).unwrap();
        let second = lloyd(config).fit(&records).unwrap();

        assert_eq!(first.labels, second.labels);
        for (a, b) in first.centroids.iter().zip(second.centroids.iter()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(first.iterations, second.iterations);
    }

    #[test]
    fn test_separated_blobs_converge_quickly() {
        let records = generate_blobs(30, 4);
        let model = lloyd(EngineConfig::new(3).with_seed(5)).fit(&records).unwrap();

        assert!(model.converged);
        assert!(model.iterations.unwrap() < 20);
        assert!(model.inertia.is_finite());
    }

    #[test]
    fn test_displacement_shrinks_on_separated_blobs() {
        let records = generate_blobs(30, 11);
        let mut monotone_runs = 0;

        for seed in 0..10 {
            let params = FitParams {
                k: 3,
                max_iterations: 100,
                tolerance: 1e-4,
                seed,
                empty_cluster: EmptyClusterPolicy::KeepPrevious,
            };
            let run = lloyd_run(records.view(), &params).unwrap();
            let shifts = &run.shifts;

            assert!(run.partition.converged, "seed {seed}: {shifts:?}");
            assert!(shifts.len() >= 2, "seed {seed}: {shifts:?}");
            assert!(shifts[shifts.len() - 1] < shifts[0], "seed {seed}: {shifts:?}");

            if shifts.windows(2).all(|pair| pair[1] <= pair[0]) {
                monotone_runs += 1;
            }
        }

        assert!(monotone_runs >= 5, "only {monotone_runs} of 10 runs shrank monotonically");
    }

    #[test]
    fn test_zero_tolerance_runs_on_both_backends() {
        let records = array![[0.0, 0.0], [0.0, 1.0], [10.0, 10.0], [10.0, 11.0]];
        let config = EngineConfig::new(2).with_seed(1).with_tolerance(0.0);

        // An exact fixed point counts as converged
        let model = lloyd(config.clone()).fit(&records).unwrap();
        assert!(model.converged);
        assert!(model.iterations.unwrap() < 100);
        assert_eq!(model.labels[0], model.labels[1]);
        assert_eq!(model.labels[2], model.labels[3]);
        assert_ne!(model.labels[0], model.labels[2]);

        let model = linfa(config).fit(&records).unwrap();
        assert_eq!(model.labels.len(), 4);
        assert!(model.labels.iter().all(|&l| l < 2));
        assert!(model.centroids.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_within_tolerance() {
        assert!(within_tolerance(0.5e-4, 1e-4));
        assert!(!within_tolerance(1e-4, 1e-4));
        assert!(within_tolerance(0.0, 0.0));
        assert!(!within_tolerance(1e-12, 0.0));
    }

    #[test]
    fn test_iteration_cap_is_a_soft_stop() {
        let records = generate_blobs(30, 6);
        let model = lloyd(EngineConfig::new(3).with_seed(8).with_max_iterations(1))
            .fit(&records)
            .unwrap();

        assert_eq!(model.iterations, Some(1));
        assert!(!model.converged);
        assert_eq!(model.labels.len(), records.nrows());
    }

    #[test]
    fn test_k_equal_to_n_gives_singletons() {
        let records = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 10.0], [0.5, 0.0, 1.0]];
        let model = lloyd(EngineConfig::new(4).with_seed(77)).fit(&records).unwrap();

        assert!(model.converged);
        assert_eq!(model.iterations, Some(1));
        assert_eq!(model.cluster_sizes(), vec![1, 1, 1, 1]);
        for (i, point) in records.outer_iter().enumerate() {
            assert_eq!(model.centroids.row(model.labels[i]), point);
        }
        assert_eq!(model.inertia, 0.0);
    }

    #[test]
    fn test_empty_clusters_keep_previous_centroid() {
        // Two distinct values, three clusters
        let records = array![[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [9.0, 9.0, 9.0]];
        let config = EngineConfig::new(3).with_seed(3);

        let first = lloyd(config.clone()).fit(&records).unwrap();
        let second = lloyd(config).fit(&records).unwrap();

        assert!(first.centroids.iter().all(|v| v.is_finite()));
        assert_eq!(first.labels, second.labels);
        assert_eq!(first.centroids, second.centroids);
        assert_eq!(first.labels[0], first.labels[1]);
        assert_eq!(first.labels[0], first.labels[2]);
        assert_ne!(first.labels[0], first.labels[3]);
        assert!(first.cluster_sizes().contains(&0));
    }

    #[test]
    fn test_all_identical_points() {
        let records = Array2::from_elem((5, 3), 2.5);

        for policy in [EmptyClusterPolicy::KeepPrevious, EmptyClusterPolicy::ReseedFarthest] {
            let config = EngineConfig::new(3)
                .with_seed(10)
                .with_empty_cluster_policy(policy);
            let model = lloyd(config).fit(&records).unwrap();

            assert!(model.converged);
            assert!(model.labels.iter().all(|&l| l == 0));
            assert!(model.centroids.iter().all(|&v| v == 2.5));
        }

        let config = EngineConfig::new(3)
            .with_seed(10)
            .with_empty_cluster_policy(EmptyClusterPolicy::Fail);
        let err = lloyd(config).fit(&records).unwrap_err();
        assert_eq!(
            err,
            ClusterError::DegenerateCluster {
                cluster: 1,
                iteration: Some(1)
            }
        );
    }

    #[test]
    fn test_reseed_moves_empty_centroid_to_farthest_point() {
        let records = array![[0.0, 0.0], [1.0, 0.0], [10.0, 0.0]];
        let labels = Array1::from(vec![0, 0, 0]);
        let previous = array![[0.0, 0.0], [0.0, 0.0]];
        let (mut updated, counts) = cluster_means(records.view(), &labels, 2);
        assert_eq!(counts, vec![3, 0]);

        resolve_empty_clusters(
            records.view(),
            &labels,
            &previous,
            &mut updated,
            &counts,
            EmptyClusterPolicy::ReseedFarthest,
            1,
        )
        .unwrap();

        assert_eq!(updated.row(1), records.row(2));
        assert!((updated[[0, 0]] - 11.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_displacement_is_frobenius_norm() {
        let a = array![[0.0, 0.0], [1.0, 1.0]];
        let b = array![[3.0, 0.0], [1.0, 5.0]];
        assert_eq!(displacement(&a, &b), 5.0);
    }

    #[test]
    fn test_linfa_backend_contract() {
        let records = generate_blobs(20, 7);
        let config = EngineConfig::new(3).with_seed(21);

        let model = linfa(config.clone()).fit(&records).unwrap();
        assert_eq!(model.backend, "linfa");
        assert_eq!(model.labels.len(), records.nrows());
        assert!(model.labels.iter().all(|&l| l < 3));
        assert_eq!(model.centroids.shape(), &[3, 3]);
        assert_eq!(assign_labels(records.view(), model.centroids.view()), model.labels);

        let again = linfa(config).fit(&records).unwrap();
        assert_eq!(model.labels, again.labels);
        assert_eq!(model.centroids, again.centroids);
    }
}
