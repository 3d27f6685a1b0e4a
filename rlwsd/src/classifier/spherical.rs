//! Nearest-centroid classification.

use super::{Prediction, TrainingSet, VectorClassifier};
use crate::sense::SenseId;
use crate::vector::{cosine_similarity, mean, ContextVector};

/// One centroid per sense with vectors; the closest centroid wins.
///
/// Confidence is the cosine margin between the best and second-best sense,
/// zero with a single sense.
#[derive(Debug, Clone)]
pub struct SphericalModel {
    centroids: Vec<(SenseId, Vec<f32>)>,
}

impl SphericalModel {
    /// Average each sense's training vectors.
    #[must_use]
    pub fn train(set: &TrainingSet) -> Self {
        let centroids = set
            .by_sense()
            .into_iter()
            .filter_map(|(sense, vectors)| {
                mean(vectors.iter().map(|v| v.as_slice())).map(|c| (sense.clone(), c))
            })
            .collect();
        Self { centroids }
    }

    /// Sense centroids in sense order. Not renormalized.
    #[must_use]
    pub fn centroids(&self) -> &[(SenseId, Vec<f32>)] {
        &self.centroids
    }

    /// Cosine similarity of `vector` to every centroid, in sense order.
    #[must_use]
    pub fn similarities(&self, vector: &ContextVector) -> Vec<(&SenseId, f32)> {
        self.centroids
            .iter()
            .map(|(sense, c)| (sense, cosine_similarity(vector.as_slice(), c)))
            .collect()
    }
}

impl VectorClassifier for SphericalModel {
    fn classify_vector(&self, vector: &ContextVector) -> Prediction {
        let mut best: Option<(&SenseId, f32)> = None;
        let mut second = f32::NEG_INFINITY;
        for (sense, sim) in self.similarities(vector) {
            match best {
                Some((_, b)) if sim <= b => second = second.max(sim),
                _ => {
                    if let Some((_, b)) = best {
                        second = b;
                    }
                    best = Some((sense, sim));
                }
            }
        }
        match best {
            Some((sense, sim)) => {
                let confidence = if second.is_finite() { sim - second } else { 0.0 };
                Prediction::new(sense.clone(), confidence)
            }
            // A TrainingSet always has at least one vector.
            None => Prediction::new(SenseId::from(SenseId::UNDEFINED), 0.0),
        }
    }
}
