//! k-nearest-neighbor voting.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use super::{Prediction, TrainingSet, VectorClassifier};
use crate::config::KnnConfig;
use crate::error::{Result, WsdError};
use crate::sense::SenseId;
use crate::vector::ContextVector;

/// Keeps every training vector. The `k` most similar vote.
///
/// Count ties go to the sense whose voting neighbors have the higher mean
/// similarity, then to the lower sense id. Confidence is always 1.0.
#[derive(Debug, Clone)]
pub struct KNearestModel {
    k: usize,
    samples: Vec<(SenseId, ContextVector)>,
}

impl KNearestModel {
    /// Store the training vectors.
    ///
    /// # Errors
    ///
    /// [`WsdError::Config`] for `k == 0`.
    pub fn train(set: &TrainingSet, config: &KnnConfig) -> Result<Self> {
        if config.k == 0 {
            return Err(WsdError::Config("knn.k must be positive".into()));
        }
        let samples = set
            .samples()
            .iter()
            .map(|s| (s.sense.clone(), s.vector.clone()))
            .collect();
        Ok(Self { k: config.k, samples })
    }

    /// Number of voting neighbors.
    #[must_use]
    pub fn k(&self) -> usize {
        self.k
    }
}

impl VectorClassifier for KNearestModel {
    #[allow(clippy::cast_precision_loss)]
    fn classify_vector(&self, vector: &ContextVector) -> Prediction {
        let mut ranked: Vec<(usize, f32)> = self
            .samples
            .iter()
            .enumerate()
            .map(|(i, (_, v))| (i, vector.closeness(v)))
            .collect();
        // Stable by training order among equal similarities.
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        let mut votes: BTreeMap<&SenseId, (usize, f32)> = BTreeMap::new();
        for &(i, sim) in ranked.iter().take(self.k) {
            let entry = votes.entry(&self.samples[i].0).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += sim;
        }

        let mut best: Option<(&SenseId, usize, f32)> = None;
        for (sense, (count, total)) in votes {
            let mean = total / count as f32;
            let better = match best {
                None => true,
                Some((_, c, m)) => count > c || (count == c && mean > m),
            };
            if better {
                best = Some((sense, count, mean));
            }
        }
        match best {
            Some((sense, _, _)) => Prediction::new(sense.clone(), 1.0),
            None => Prediction::new(SenseId::from(SenseId::UNDEFINED), 0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32, y: f32) -> ContextVector {
        ContextVector::normalize(vec![x, y]).unwrap()
    }

    #[test]
    fn test_majority_of_neighbors() {
        let set = TrainingSet::from_vectors([
            (SenseId::from("1"), v(1.0, 0.0)),
            (SenseId::from("1"), v(1.0, 0.2)),
            (SenseId::from("2"), v(0.9, 0.1)),
            (SenseId::from("2"), v(0.0, 1.0)),
        ])
        .unwrap();
        let model = KNearestModel::train(&set, &KnnConfig { k: 3 }).unwrap();
        let p = model.classify_vector(&v(1.0, 0.05));
        assert_eq!(p.sense, SenseId::from("1"));
        assert_eq!(p.confidence, 1.0);
    }

    #[test]
    fn test_count_tie_goes_to_higher_mean_similarity() {
        // One vote each; sense 3's neighbor is closer.
        let set = TrainingSet::from_vectors([
            (SenseId::from("2"), v(0.6, 0.8)),
            (SenseId::from("3"), v(1.0, 0.1)),
        ])
        .unwrap();
        let model = KNearestModel::train(&set, &KnnConfig { k: 2 }).unwrap();
        let query = v(1.0, 0.0);
        let first = model.classify_vector(&query);
        for _ in 0..10 {
            assert_eq!(model.classify_vector(&query), first);
        }
        assert_eq!(first.sense, SenseId::from("3"));
    }

    #[test]
    fn test_zero_k_rejected() {
        let set = TrainingSet::from_vectors([(SenseId::from("1"), v(1.0, 0.0))]).unwrap();
        assert!(KNearestModel::train(&set, &KnnConfig { k: 0 }).is_err());
    }
}
