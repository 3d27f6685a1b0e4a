//! Gaussian mixture with one component per sense.
//!
//! Components have diagonal covariances. Means start at the sense centroids,
//! weights are uniform, variances start at the pooled per-dimension variance.
//! EM then runs over all training vectors without labels, and a query gets
//! the sense of its highest-posterior component.

use std::f64::consts::PI;

use super::{Prediction, TrainingSet, VectorClassifier};
use crate::config::MixtureConfig;
use crate::error::{Result, WsdError};
use crate::sense::SenseId;
use crate::vector::ContextVector;

#[derive(Debug, Clone)]
struct Component {
    sense: SenseId,
    log_weight: f64,
    mean: Vec<f64>,
    variance: Vec<f64>,
}

impl Component {
    fn log_density(&self, x: &[f64]) -> f64 {
        let mut acc = 0.0;
        for ((xi, mu), var) in x.iter().zip(&self.mean).zip(&self.variance) {
            let d = xi - mu;
            acc += (2.0 * PI * var).ln() + d * d / var;
        }
        -0.5 * acc
    }

    fn log_joint(&self, x: &[f64]) -> f64 {
        self.log_weight + self.log_density(x)
    }
}

fn log_sum_exp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    max + values.iter().map(|v| (v - max).exp()).sum::<f64>().ln()
}

// Collapsed components keep a stale weight; rescale so the weights sum to 1.
fn normalize_log_weights(components: &mut [Component]) {
    let weights: Vec<f64> = components.iter().map(|c| c.log_weight).collect();
    let norm = log_sum_exp(&weights);
    if norm.is_finite() {
        for component in components {
            component.log_weight -= norm;
        }
    }
}

fn to_f64(v: &ContextVector) -> Vec<f64> {
    v.as_slice().iter().map(|&x| f64::from(x)).collect()
}

/// Mixture-density classifier.
#[derive(Debug, Clone)]
pub struct MixtureModel {
    components: Vec<Component>,
    iterations: usize,
    log_likelihood: f64,
}

impl MixtureModel {
    /// Fit the mixture with EM.
    ///
    /// # Errors
    ///
    /// [`WsdError::Training`] when the likelihood becomes non-finite.
    #[allow(clippy::cast_precision_loss)]
    pub fn train(set: &TrainingSet, config: &MixtureConfig) -> Result<Self> {
        let data: Vec<Vec<f64>> = set.samples().iter().map(|s| to_f64(&s.vector)).collect();
        let n = data.len() as f64;
        let dim = set.dimension();

        let mut pooled_mean = vec![0.0; dim];
        for x in &data {
            for (m, xi) in pooled_mean.iter_mut().zip(x) {
                *m += xi / n;
            }
        }
        let mut pooled_var = vec![config.variance_floor; dim];
        for x in &data {
            for ((v, xi), m) in pooled_var.iter_mut().zip(x).zip(&pooled_mean) {
                *v += (xi - m) * (xi - m) / n;
            }
        }

        let groups = set.by_sense();
        let k = groups.len() as f64;
        let mut components: Vec<Component> = groups
            .into_iter()
            .map(|(sense, vectors)| {
                let mut mean = vec![0.0; dim];
                let count = vectors.len() as f64;
                for v in vectors {
                    for (m, x) in mean.iter_mut().zip(v.as_slice()) {
                        *m += f64::from(*x) / count;
                    }
                }
                Component {
                    sense: sense.clone(),
                    log_weight: -k.ln(),
                    mean,
                    variance: pooled_var.clone(),
                }
            })
            .collect();

        let mut log_likelihood = f64::NEG_INFINITY;
        let mut iterations = 0;
        let mut resp = vec![vec![0.0; components.len()]; data.len()];
        for iteration in 0..config.max_iterations {
            iterations = iteration + 1;

            // E-step
            let mut total = 0.0;
            for (x, r) in data.iter().zip(resp.iter_mut()) {
                let joint: Vec<f64> = components.iter().map(|c| c.log_joint(x)).collect();
                let norm = log_sum_exp(&joint);
                total += norm;
                for (ri, j) in r.iter_mut().zip(joint) {
                    *ri = (j - norm).exp();
                }
            }
            let mean_ll = total / n;
            if !mean_ll.is_finite() {
                return Err(WsdError::Training(format!(
                    "mixture log-likelihood diverged at iteration {iteration}"
                )));
            }
            tracing::debug!("EM iteration {}: mean log-likelihood {:.4}", iteration, mean_ll);
            let converged = (mean_ll - log_likelihood).abs() < config.tolerance;
            log_likelihood = mean_ll;
            if converged {
                break;
            }

            // M-step
            for (ci, component) in components.iter_mut().enumerate() {
                let nk: f64 = resp.iter().map(|r| r[ci]).sum();
                if nk < 1e-10 {
                    continue;
                }
                component.log_weight = (nk / n).ln();
                let mut mean = vec![0.0; dim];
                for (x, r) in data.iter().zip(&resp) {
                    for (m, xi) in mean.iter_mut().zip(x) {
                        *m += r[ci] * xi / nk;
                    }
                }
                let mut variance = vec![config.variance_floor; dim];
                for (x, r) in data.iter().zip(&resp) {
                    for ((v, xi), m) in variance.iter_mut().zip(x).zip(&mean) {
                        *v += r[ci] * (xi - m) * (xi - m) / nk;
                    }
                }
                component.mean = mean;
                component.variance = variance;
            }
            normalize_log_weights(&mut components);
        }

        Ok(Self {
            components,
            iterations,
            log_likelihood,
        })
    }

    /// EM iterations run.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Final mean log-likelihood of the training vectors.
    #[must_use]
    pub fn log_likelihood(&self) -> f64 {
        self.log_likelihood
    }

    /// Mixing weights, in sense order.
    #[must_use]
    pub fn weights(&self) -> Vec<(&SenseId, f64)> {
        self.components
            .iter()
            .map(|c| (&c.sense, c.log_weight.exp()))
            .collect()
    }

    /// Component posteriors of `vector`, in sense order.
    #[must_use]
    pub fn posteriors(&self, vector: &ContextVector) -> Vec<(&SenseId, f64)> {
        let x = to_f64(vector);
        let joint: Vec<f64> = self.components.iter().map(|c| c.log_joint(&x)).collect();
        let norm = log_sum_exp(&joint);
        self.components
            .iter()
            .zip(joint)
            .map(|(c, j)| (&c.sense, (j - norm).exp()))
            .collect()
    }
}

impl VectorClassifier for MixtureModel {
    fn classify_vector(&self, vector: &ContextVector) -> Prediction {
        let x = to_f64(vector);
        let mut best: Option<(&SenseId, f64)> = None;
        for component in &self.components {
            let score = component.log_joint(&x);
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((&component.sense, score));
            }
        }
        match best {
            Some((sense, _)) => Prediction::new(sense.clone(), 1.0),
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

    fn set() -> TrainingSet {
        TrainingSet::from_vectors([
            (SenseId::from("1"), v(1.0, 0.0)),
            (SenseId::from("1"), v(1.0, 0.1)),
            (SenseId::from("1"), v(1.0, -0.1)),
            (SenseId::from("2"), v(0.0, 1.0)),
            (SenseId::from("2"), v(0.1, 1.0)),
            (SenseId::from("2"), v(-0.1, 1.0)),
        ])
        .unwrap()
    }

    #[test]
    fn test_separated_senses() {
        let model = MixtureModel::train(&set(), &MixtureConfig::default()).unwrap();
        assert!(model.iterations() >= 1);
        assert!(model.log_likelihood().is_finite());
        assert_eq!(model.classify_vector(&v(0.95, 0.05)).sense, SenseId::from("1"));
        assert_eq!(model.classify_vector(&v(0.05, 0.95)).sense, SenseId::from("2"));
    }

    #[test]
    fn test_posteriors_sum_to_one() {
        let model = MixtureModel::train(&set(), &MixtureConfig::default()).unwrap();
        let total: f64 = model.posteriors(&v(0.7, 0.7)).iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let model = MixtureModel::train(&set(), &MixtureConfig::default()).unwrap();
        let total: f64 = model.weights().iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_collapsed_component_weights_renormalized() {
        let component = |sense: &str, weight: f64| Component {
            sense: SenseId::from(sense),
            log_weight: weight.ln(),
            mean: vec![0.0],
            variance: vec![1.0],
        };
        // "3" collapsed and kept its stale weight
        let mut components = vec![
            component("1", 0.6),
            component("2", 0.4),
            component("3", 0.5),
        ];
        normalize_log_weights(&mut components);
        let weights: Vec<f64> = components.iter().map(|c| c.log_weight.exp()).collect();
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((weights[0] - 0.4).abs() < 1e-12);
        assert!((weights[2] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_log_sum_exp_stable() {
        let v = log_sum_exp(&[-1000.0, -1000.0]);
        assert!((v - (-1000.0 + 2f64.ln())).abs() < 1e-9);
    }
}
