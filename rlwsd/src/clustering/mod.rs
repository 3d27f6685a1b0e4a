//! Clustering of a word's observed contexts.
//!
//! [`KMeans`] runs plain (Euclidean) or spherical (cosine) k-means.
//! [`cluster_vectors`] wraps it into the four [`ClusterMethod`]s, two of
//! which use dictionary sense centers: one seeds one cluster per sense, the
//! other maps freely discovered clusters to their nearest sense center.

pub mod artifact;
pub mod report;

use std::collections::{BTreeMap, HashSet};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::config::{ClusterMethod, ClusteringConfig};
use crate::error::{Result, WsdError};
use crate::sense::SenseId;
use crate::vector::{cosine_similarity, euclidean_distance, ContextVector};

pub use artifact::{ClusteringParams, ContextArtifact, ContextEntry};
pub use report::{cluster_report, ClusterSummary};

/// Distance used for assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Euclidean distance, mean centroids.
    Euclidean,
    /// `1 - cos`, normalized mean centroids.
    Cosine,
}

impl Metric {
    /// Distance between two vectors.
    #[must_use]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::Euclidean => euclidean_distance(a, b),
            Self::Cosine => 1.0 - cosine_similarity(a, b),
        }
    }
}

/// Initial centroids.
#[derive(Debug, Clone)]
pub enum Seeding {
    /// k-means++ from a seeded RNG.
    Random {
        /// RNG seed.
        seed: u64,
    },
    /// Start at the given centers; `k` is their number.
    Centers(Vec<Vec<f32>>),
}

/// Output of one k-means run.
#[derive(Debug, Clone)]
pub struct KMeansFit {
    /// Final centroids.
    pub centroids: Vec<Vec<f32>>,
    /// Cluster of each point.
    pub assignment: Vec<usize>,
    /// Distance of each point to its centroid.
    pub distances: Vec<f32>,
    /// Update steps run.
    pub iterations: usize,
    /// Whether assignments stabilized before the cap.
    pub converged: bool,
}

/// k-means engine.
#[derive(Debug, Clone)]
pub struct KMeans {
    metric: Metric,
    max_iterations: usize,
}

impl KMeans {
    /// Engine with the given metric and 100 iterations.
    #[must_use]
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            max_iterations: 100,
        }
    }

    /// Set the iteration cap.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// The metric.
    #[must_use]
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Cluster `points` into `k` groups (ignored for [`Seeding::Centers`]).
    ///
    /// `k` larger than the number of points is reduced to it. Hitting the
    /// iteration cap is not an error; the last assignment is returned.
    ///
    /// # Errors
    ///
    /// [`WsdError::EmptyInput`] without points, [`WsdError::Clustering`] for
    /// `k == 0` or no centers, [`WsdError::DimensionMismatch`] for ragged input.
    pub fn fit(&self, points: &[Vec<f32>], k: usize, seeding: Seeding) -> Result<KMeansFit> {
        let Some(first) = points.first() else {
            return Err(WsdError::EmptyInput("nothing to cluster".into()));
        };
        let dim = first.len();
        if let Some(bad) = points.iter().find(|p| p.len() != dim) {
            return Err(WsdError::DimensionMismatch {
                expected: dim,
                actual: bad.len(),
            });
        }

        let mut centroids = match seeding {
            Seeding::Random { seed } => {
                if k == 0 {
                    return Err(WsdError::Clustering("k must be positive".into()));
                }
                let k = k.min(points.len());
                self.kmeans_plus_plus_init(points, k, seed)
            }
            Seeding::Centers(centers) => {
                if centers.is_empty() {
                    return Err(WsdError::Clustering("no initial centers".into()));
                }
                if let Some(bad) = centers.iter().find(|c| c.len() != dim) {
                    return Err(WsdError::DimensionMismatch {
                        expected: dim,
                        actual: bad.len(),
                    });
                }
                centers
            }
        };
        if self.metric == Metric::Cosine {
            for c in &mut centroids {
                normalize_in_place(c);
            }
        }

        let mut assignment = self.assign(points, &centroids);
        let mut converged = false;
        let mut iterations = 0;
        for iteration in 0..self.max_iterations {
            iterations = iteration + 1;
            centroids = self.update(points, &assignment, centroids);
            let next = self.assign(points, &centroids);
            let changed = next.iter().zip(&assignment).filter(|(a, b)| a != b).count();
            tracing::debug!("k-means iteration {}: {} reassigned", iteration, changed);
            assignment = next;
            if changed == 0 {
                converged = true;
                break;
            }
        }
        if !converged {
            tracing::warn!(
                "k-means stopped at the iteration cap ({}) before converging",
                self.max_iterations
            );
        }

        let distances = points
            .iter()
            .zip(&assignment)
            .map(|(p, &c)| self.metric.distance(p, &centroids[c]))
            .collect();
        Ok(KMeansFit {
            centroids,
            assignment,
            distances,
            iterations,
            converged,
        })
    }

    /// Index of the nearest centroid, lowest index on ties.
    #[must_use]
    pub fn nearest(&self, point: &[f32], centroids: &[Vec<f32>]) -> usize {
        nearest(self.metric, point, centroids)
    }

    fn assign(&self, points: &[Vec<f32>], centroids: &[Vec<f32>]) -> Vec<usize> {
        points.iter().map(|p| self.nearest(p, centroids)).collect()
    }

    #[allow(clippy::cast_precision_loss)]
    fn update(&self, points: &[Vec<f32>], assignment: &[usize], old: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
        let dim = old.first().map_or(0, Vec::len);
        let mut sums = vec![vec![0.0f32; dim]; old.len()];
        let mut counts = vec![0usize; old.len()];
        for (point, &c) in points.iter().zip(assignment) {
            counts[c] += 1;
            for (s, x) in sums[c].iter_mut().zip(point) {
                *s += x;
            }
        }
        sums.into_iter()
            .zip(counts)
            .zip(old)
            .map(|((mut sum, count), previous)| {
                // Empty clusters keep their centroid.
                if count == 0 {
                    return previous;
                }
                match self.metric {
                    Metric::Euclidean => {
                        for s in &mut sum {
                            *s /= count as f32;
                        }
                        sum
                    }
                    Metric::Cosine => {
                        if normalize_in_place(&mut sum) {
                            sum
                        } else {
                            previous
                        }
                    }
                }
            })
            .collect()
    }

    fn kmeans_plus_plus_init(&self, points: &[Vec<f32>], k: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut centroids = Vec::with_capacity(k);
        centroids.push(points[rng.gen_range(0..points.len())].clone());

        while centroids.len() < k {
            let weights: Vec<f32> = points
                .iter()
                .map(|p| {
                    let d = centroids
                        .iter()
                        .map(|c| self.metric.distance(p, c).max(0.0))
                        .fold(f32::MAX, f32::min);
                    d * d
                })
                .collect();
            let total: f32 = weights.iter().sum();
            let idx = if total > 0.0 && total.is_finite() {
                let mut target = rng.gen_range(0.0..total);
                let mut chosen = points.len() - 1;
                for (i, w) in weights.iter().enumerate() {
                    if target < *w {
                        chosen = i;
                        break;
                    }
                    target -= w;
                }
                chosen
            } else {
                rng.gen_range(0..points.len())
            };
            centroids.push(points[idx].clone());
        }
        centroids
    }
}

fn nearest(metric: Metric, point: &[f32], centroids: &[Vec<f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::INFINITY;
    for (i, c) in centroids.iter().enumerate() {
        let d = metric.distance(point, c);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

fn normalize_in_place(v: &mut [f32]) -> bool {
    let len = crate::vector::norm(v);
    if len == 0.0 || !len.is_finite() {
        return false;
    }
    for x in v.iter_mut() {
        *x /= len;
    }
    true
}

/// Cluster id to canonical sense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenseMapping {
    /// `senses[cluster]` is the cluster's sense.
    senses: Vec<SenseId>,
    /// Dictionary senses that were available as targets.
    inventory: Vec<SenseId>,
}

impl SenseMapping {
    /// Mapping from per-cluster senses and the candidate senses.
    #[must_use]
    pub fn new(senses: Vec<SenseId>, inventory: Vec<SenseId>) -> Self {
        Self { senses, inventory }
    }

    /// Sense of `cluster`.
    #[must_use]
    pub fn get(&self, cluster: usize) -> Option<&SenseId> {
        self.senses.get(cluster)
    }

    /// Number of mapped clusters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.senses.len()
    }

    /// Whether no cluster is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.senses.is_empty()
    }

    /// Every candidate sense receives exactly one cluster.
    #[must_use]
    pub fn is_bijective(&self) -> bool {
        let distinct: HashSet<&SenseId> = self.senses.iter().collect();
        distinct.len() == self.senses.len() && self.senses.len() == self.inventory.len()
    }
}

/// A persisted clustering run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringResult {
    /// Method that produced it.
    pub method: ClusterMethod,
    /// Assignment metric.
    pub metric: Metric,
    /// Final centroids.
    pub centroids: Vec<Vec<f32>>,
    /// Cluster of each clustered context.
    pub assignment: Vec<usize>,
    /// Distance of each clustered context to its centroid.
    pub distances: Vec<f32>,
    /// Update steps run.
    pub iterations: usize,
    /// Whether assignments stabilized.
    pub converged: bool,
    /// Cluster-to-sense mapping, for dictionary methods.
    pub mapping: Option<SenseMapping>,
}

impl ClusteringResult {
    /// Number of clusters.
    #[must_use]
    pub fn n_clusters(&self) -> usize {
        self.centroids.len()
    }

    /// Nearest cluster of one vector.
    #[must_use]
    pub fn predict_one(&self, vector: &[f32]) -> usize {
        nearest(self.metric, vector, &self.centroids)
    }

    /// Nearest cluster of each vector.
    #[must_use]
    pub fn predict(&self, vectors: &[ContextVector]) -> Vec<usize> {
        vectors.iter().map(|v| self.predict_one(v.as_slice())).collect()
    }

    /// Contexts per cluster.
    #[must_use]
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters()];
        for &c in &self.assignment {
            if let Some(size) = sizes.get_mut(c) {
                *size += 1;
            }
        }
        sizes
    }

    /// Mapped sense of `cluster`.
    #[must_use]
    pub fn sense_of(&self, cluster: usize) -> Option<&SenseId> {
        self.mapping.as_ref().and_then(|m| m.get(cluster))
    }

    /// Clustered contexts per mapped sense.
    #[must_use]
    pub fn sense_sizes(&self) -> BTreeMap<SenseId, usize> {
        let mut sizes = BTreeMap::new();
        for &c in &self.assignment {
            if let Some(sense) = self.sense_of(c) {
                *sizes.entry(sense.clone()).or_insert(0) += 1;
            }
        }
        sizes
    }
}

/// Run `config.method` over `vectors`.
///
/// # Errors
///
/// Engine errors, and [`WsdError::Clustering`] when a dictionary method has
/// no sense centers.
pub fn cluster_vectors(
    vectors: &[Vec<f32>],
    config: &ClusteringConfig,
    sense_centers: &[(SenseId, ContextVector)],
) -> Result<ClusteringResult> {
    let method = config.method;
    if method.needs_dictionary() && sense_centers.is_empty() {
        return Err(WsdError::Clustering(format!(
            "{method} needs dictionary sense centers"
        )));
    }
    let metric = match method {
        ClusterMethod::KMeans => Metric::Euclidean,
        _ => Metric::Cosine,
    };
    let engine = KMeans::new(metric).with_max_iterations(config.max_iterations);
    let seeding = match method {
        ClusterMethod::SphericalKMeansDictInit => Seeding::Centers(
            sense_centers
                .iter()
                .map(|(_, c)| c.as_slice().to_vec())
                .collect(),
        ),
        _ => Seeding::Random { seed: config.seed },
    };
    let fit = engine.fit(vectors, config.n_clusters, seeding)?;
    let inventory: Vec<SenseId> = sense_centers.iter().map(|(s, _)| s.clone()).collect();

    let mapping = match method {
        ClusterMethod::KMeans | ClusterMethod::SphericalKMeans => None,
        // Clusters keep the order of the centers they started from.
        ClusterMethod::SphericalKMeansDictInit => Some(SenseMapping::new(inventory.clone(), inventory)),
        ClusterMethod::SphericalKMeansDictMapping => {
            let senses = fit
                .centroids
                .iter()
                .map(|centroid| {
                    let mut best = 0;
                    let mut best_sim = f32::NEG_INFINITY;
                    for (i, (_, center)) in sense_centers.iter().enumerate() {
                        let sim = cosine_similarity(centroid, center.as_slice());
                        if sim > best_sim {
                            best_sim = sim;
                            best = i;
                        }
                    }
                    sense_centers[best].0.clone()
                })
                .collect();
            Some(SenseMapping::new(senses, inventory))
        }
    };

    tracing::info!(
        "{}: {} contexts in {} clusters after {} iterations (converged: {})",
        method,
        vectors.len(),
        fit.centroids.len(),
        fit.iterations,
        fit.converged
    );
    Ok(ClusteringResult {
        method,
        metric,
        centroids: fit.centroids,
        assignment: fit.assignment,
        distances: fit.distances,
        iterations: fit.iterations,
        converged: fit.converged,
        mapping,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f32>> {
        vec![
            vec![1.0, 0.0],
            vec![0.99, 0.1],
            vec![0.98, -0.1],
            vec![0.0, 1.0],
            vec![0.1, 0.99],
            vec![-0.1, 0.98],
        ]
    }

    #[test]
    fn test_spherical_separates_blobs() {
        let fit = KMeans::new(Metric::Cosine)
            .fit(&blobs(), 2, Seeding::Random { seed: 7 })
            .unwrap();
        assert!(fit.converged);
        assert_eq!(fit.assignment[0], fit.assignment[1]);
        assert_eq!(fit.assignment[0], fit.assignment[2]);
        assert_eq!(fit.assignment[3], fit.assignment[4]);
        assert_ne!(fit.assignment[0], fit.assignment[3]);
        for c in &fit.centroids {
            assert!((crate::vector::norm(c) - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_same_seed_same_partition() {
        let engine = KMeans::new(Metric::Euclidean);
        let a = engine.fit(&blobs(), 2, Seeding::Random { seed: 3 }).unwrap();
        let b = engine.fit(&blobs(), 2, Seeding::Random { seed: 3 }).unwrap();
        assert_eq!(a.assignment, b.assignment);
    }

    #[test]
    fn test_k_larger_than_points() {
        let points = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let fit = KMeans::new(Metric::Euclidean)
            .fit(&points, 5, Seeding::Random { seed: 1 })
            .unwrap();
        assert_eq!(fit.centroids.len(), 2);
    }

    #[test]
    fn test_iteration_cap_is_not_an_error() {
        let fit = KMeans::new(Metric::Cosine)
            .with_max_iterations(1)
            .fit(&blobs(), 2, Seeding::Centers(vec![vec![1.0, 1.0], vec![-1.0, 0.1]]))
            .unwrap();
        assert_eq!(fit.iterations, 1);
        assert_eq!(fit.assignment.len(), 6);
    }

    #[test]
    fn test_errors() {
        let engine = KMeans::new(Metric::Cosine);
        assert!(matches!(
            engine.fit(&[], 2, Seeding::Random { seed: 1 }),
            Err(WsdError::EmptyInput(_))
        ));
        assert!(engine.fit(&blobs(), 0, Seeding::Random { seed: 1 }).is_err());
        assert!(matches!(
            engine.fit(&blobs(), 1, Seeding::Centers(vec![vec![1.0, 0.0, 0.0]])),
            Err(WsdError::DimensionMismatch { .. })
        ));
    }

    fn centers() -> Vec<(SenseId, ContextVector)> {
        vec![
            (SenseId::from("1"), ContextVector::normalize(vec![1.0, 0.0]).unwrap()),
            (SenseId::from("2"), ContextVector::normalize(vec![0.0, 1.0]).unwrap()),
        ]
    }

    #[test]
    fn test_dict_init_maps_by_construction() {
        let config = ClusteringConfig {
            method: ClusterMethod::SphericalKMeansDictInit,
            ..ClusteringConfig::default()
        };
        let result = cluster_vectors(&blobs(), &config, &centers()).unwrap();
        assert_eq!(result.n_clusters(), 2);
        let mapping = result.mapping.as_ref().unwrap();
        assert!(mapping.is_bijective());
        assert_eq!(result.sense_of(result.assignment[0]), Some(&SenseId::from("1")));
        assert_eq!(result.sense_of(result.assignment[3]), Some(&SenseId::from("2")));
    }

    #[test]
    fn test_dict_mapping_nearest_center() {
        let config = ClusteringConfig {
            method: ClusterMethod::SphericalKMeansDictMapping,
            n_clusters: 3,
            ..ClusteringConfig::default()
        };
        let result = cluster_vectors(&blobs(), &config, &centers()).unwrap();
        let mapping = result.mapping.as_ref().unwrap();
        assert_eq!(mapping.len(), 3);
        // three clusters onto two senses cannot be one-to-one
        assert!(!mapping.is_bijective());
        assert_eq!(result.sense_of(result.assignment[0]), Some(&SenseId::from("1")));
        assert_eq!(result.sense_of(result.assignment[4]), Some(&SenseId::from("2")));
    }

    #[test]
    fn test_dictionary_method_needs_centers() {
        let config = ClusteringConfig {
            method: ClusterMethod::SphericalKMeansDictInit,
            ..ClusteringConfig::default()
        };
        assert!(matches!(
            cluster_vectors(&blobs(), &config, &[]),
            Err(WsdError::Clustering(_))
        ));
    }

    #[test]
    fn test_predict_matches_assignment() {
        let config = ClusteringConfig {
            n_clusters: 2,
            ..ClusteringConfig::default()
        };
        let result = cluster_vectors(&blobs(), &config, &[]).unwrap();
        assert!(result.mapping.is_none());
        for (p, &c) in blobs().iter().zip(&result.assignment) {
            assert_eq!(result.predict_one(p), c);
        }
        assert_eq!(result.cluster_sizes().iter().sum::<usize>(), 6);
    }
}
