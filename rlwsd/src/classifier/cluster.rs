//! Classification through a clustering result.

use super::{Prediction, VectorClassifier};
use crate::clustering::{ClusteringResult, Metric, SenseMapping};
use crate::error::{Result, WsdError};
use crate::sense::SenseId;
use crate::vector::ContextVector;

/// Nearest-centroid cluster, mapped to a sense. Confidence is always 0.
#[derive(Debug, Clone)]
pub struct ClusterModel {
    metric: Metric,
    centroids: Vec<Vec<f32>>,
    mapping: SenseMapping,
    dominant: SenseId,
}

impl ClusterModel {
    /// Wrap a result that carries a mapping.
    ///
    /// # Errors
    ///
    /// [`WsdError::Clustering`] when the result has no mapping, or the
    /// mapping does not cover every cluster.
    pub fn new(result: &ClusteringResult) -> Result<Self> {
        let Some(mapping) = result.mapping.clone() else {
            return Err(WsdError::Clustering(format!(
                "{} results have no cluster-to-sense mapping",
                result.method
            )));
        };
        if mapping.len() != result.n_clusters() {
            return Err(WsdError::Clustering(format!(
                "mapping covers {} of {} clusters",
                mapping.len(),
                result.n_clusters()
            )));
        }
        let mut dominant: Option<(SenseId, usize)> = None;
        for (sense, size) in result.sense_sizes() {
            if dominant.as_ref().map_or(true, |(_, best)| size > *best) {
                dominant = Some((sense, size));
            }
        }
        let dominant = match dominant {
            Some((sense, _)) => sense,
            None => mapping
                .get(0)
                .cloned()
                .ok_or_else(|| WsdError::Clustering("empty clustering".into()))?,
        };
        Ok(Self {
            metric: result.metric,
            centroids: result.centroids.clone(),
            mapping,
            dominant,
        })
    }

    /// Sense receiving the most clustered contexts.
    #[must_use]
    pub fn dominant_sense(&self) -> &SenseId {
        &self.dominant
    }
}

impl VectorClassifier for ClusterModel {
    fn classify_vector(&self, vector: &ContextVector) -> Prediction {
        let mut best = 0;
        let mut best_dist = f32::INFINITY;
        for (i, c) in self.centroids.iter().enumerate() {
            let d = self.metric.distance(vector.as_slice(), c);
            if d < best_dist {
                best_dist = d;
                best = i;
            }
        }
        let sense = self.mapping.get(best).unwrap_or(&self.dominant);
        Prediction::new(sense.clone(), 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ClusterMethod, ClusteringConfig};
    use crate::clustering::cluster_vectors;

    fn v(x: f32, y: f32) -> ContextVector {
        ContextVector::normalize(vec![x, y]).unwrap()
    }

    #[test]
    fn test_maps_nearest_cluster() {
        let points = vec![vec![1.0, 0.0], vec![0.9, 0.1], vec![0.0, 1.0]];
        let centers = vec![(SenseId::from("1"), v(1.0, 0.0)), (SenseId::from("2"), v(0.0, 1.0))];
        let config = ClusteringConfig {
            method: ClusterMethod::SphericalKMeansDictInit,
            ..ClusteringConfig::default()
        };
        let result = cluster_vectors(&points, &config, &centers).unwrap();
        let model = ClusterModel::new(&result).unwrap();
        assert_eq!(model.dominant_sense(), &SenseId::from("1"));
        let p = model.classify_vector(&v(0.1, 1.0));
        assert_eq!(p.sense, SenseId::from("2"));
        assert_eq!(p.confidence, 0.0);
    }

    #[test]
    fn test_unmapped_result_rejected() {
        let points = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let result = cluster_vectors(&points, &ClusteringConfig::default(), &[]).unwrap();
        assert!(matches!(ClusterModel::new(&result), Err(WsdError::Clustering(_))));
    }
}
