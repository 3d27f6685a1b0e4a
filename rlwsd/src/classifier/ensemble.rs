//! Ensemble of small feed-forward networks.
//!
//! Each member is `input -> hidden (ReLU, dropout) -> senses` trained with
//! AdamW on cross-entropy. Members differ only in their seed. At query time
//! the per-sense maximum of the members' softmax outputs is taken and its
//! arg-max is the prediction.

use candle_core::{Device, Shape, Tensor, Var, D};
use candle_nn::{Linear, Module, Optimizer, ParamsAdamW};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Prediction, TrainingSet, VectorClassifier};
use crate::config::EnsembleConfig;
use crate::error::{Result, WsdError};
use crate::sense::SenseId;
use crate::vector::ContextVector;

/// Copies of an example with `tokens` surviving tokens when oversampling.
#[must_use]
pub fn oversample_copies(tokens: usize, tokens_per_copy: usize, max_copies: usize) -> usize {
    tokens
        .div_ceil(tokens_per_copy.max(1))
        .clamp(1, max_copies.max(1))
}

#[allow(clippy::cast_precision_loss)]
fn uniform_var<S: Into<Shape>>(
    rng: &mut ChaCha8Rng,
    shape: S,
    fan_in: usize,
    device: &Device,
) -> Result<Var> {
    let shape = shape.into();
    let bound = 1.0 / (fan_in as f32).sqrt();
    let data: Vec<f32> = (0..shape.elem_count())
        .map(|_| rng.gen_range(-bound..bound))
        .collect();
    Ok(Var::from_tensor(&Tensor::from_vec(data, shape, device)?)?)
}

#[derive(Debug)]
struct Member {
    hidden: Linear,
    output: Linear,
}

impl Member {
    fn init(
        input: usize,
        hidden: usize,
        classes: usize,
        rng: &mut ChaCha8Rng,
        device: &Device,
    ) -> Result<(Self, Vec<Var>)> {
        let w1 = uniform_var(rng, (hidden, input), input, device)?;
        let b1 = uniform_var(rng, hidden, input, device)?;
        let w2 = uniform_var(rng, (classes, hidden), hidden, device)?;
        let b2 = uniform_var(rng, classes, hidden, device)?;
        let member = Self {
            hidden: Linear::new(w1.as_tensor().clone(), Some(b1.as_tensor().clone())),
            output: Linear::new(w2.as_tensor().clone(), Some(b2.as_tensor().clone())),
        };
        Ok((member, vec![w1, b1, w2, b2]))
    }

    fn logits(&self, x: &Tensor, dropout_mask: Option<&Tensor>) -> Result<Tensor> {
        let mut h = self.hidden.forward(x)?.relu()?;
        if let Some(mask) = dropout_mask {
            h = h.mul(mask)?;
        }
        Ok(self.output.forward(&h)?)
    }
}

/// Trained ensemble.
#[derive(Debug)]
pub struct EnsembleModel {
    senses: Vec<SenseId>,
    members: Vec<Member>,
    input_dim: usize,
    device: Device,
}

impl EnsembleModel {
    /// Train `config.members` networks on the set's vectors.
    ///
    /// # Errors
    ///
    /// [`WsdError::Training`] for a zero-sized network, and tensor errors.
    pub fn train(set: &TrainingSet, config: &EnsembleConfig) -> Result<Self> {
        if config.members == 0 || config.hidden_size == 0 || config.batch_size == 0 {
            return Err(WsdError::Training(
                "ensemble needs members, hidden units and a batch size".into(),
            ));
        }
        let device = Device::Cpu;
        let senses: Vec<SenseId> = set.by_sense().into_keys().cloned().collect();
        let input_dim = set.dimension();

        let mut rows: Vec<f32> = Vec::new();
        let mut labels: Vec<u32> = Vec::new();
        for sample in set.samples() {
            let Some(label) = senses.iter().position(|s| *s == sample.sense) else {
                continue;
            };
            let copies = if config.oversample {
                oversample_copies(sample.tokens, config.tokens_per_copy, config.max_copies)
            } else {
                1
            };
            for _ in 0..copies {
                rows.extend_from_slice(sample.vector.as_slice());
                #[allow(clippy::cast_possible_truncation)]
                labels.push(label as u32);
            }
        }
        let n = labels.len();
        let inputs = Tensor::from_vec(rows, (n, input_dim), &device)?;
        let targets = Tensor::from_vec(labels, n, &device)?;

        let mut members = Vec::with_capacity(config.members);
        for i in 0..config.members {
            let seed = config.seed.wrapping_add(i as u64);
            let member = train_member(&inputs, &targets, senses.len(), seed, config, &device)?;
            members.push(member);
        }
        tracing::debug!(
            "Trained {} ensemble members on {} rows, {} senses",
            members.len(),
            n,
            senses.len()
        );
        Ok(Self {
            senses,
            members,
            input_dim,
            device,
        })
    }

    /// Senses in output order.
    #[must_use]
    pub fn senses(&self) -> &[SenseId] {
        &self.senses
    }

    /// Per-sense maximum of the members' probabilities.
    ///
    /// # Errors
    ///
    /// [`WsdError::DimensionMismatch`] for a vector of the wrong size, and
    /// tensor errors.
    pub fn probabilities(&self, vector: &ContextVector) -> Result<Vec<f32>> {
        if vector.dim() != self.input_dim {
            return Err(WsdError::DimensionMismatch {
                expected: self.input_dim,
                actual: vector.dim(),
            });
        }
        let x = Tensor::from_slice(vector.as_slice(), (1, self.input_dim), &self.device)?;
        let mut agg = vec![0.0f32; self.senses.len()];
        for member in &self.members {
            let probs = candle_nn::ops::softmax(&member.logits(&x, None)?, D::Minus1)?;
            let probs = probs.squeeze(0)?.to_vec1::<f32>()?;
            for (a, p) in agg.iter_mut().zip(probs) {
                *a = a.max(p);
            }
        }
        Ok(agg)
    }
}

fn train_member(
    inputs: &Tensor,
    targets: &Tensor,
    classes: usize,
    seed: u64,
    config: &EnsembleConfig,
    device: &Device,
) -> Result<Member> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let (n, input_dim) = inputs.dims2()?;
    let (member, vars) = Member::init(input_dim, config.hidden_size, classes, &mut rng, device)?;
    let params = ParamsAdamW {
        lr: config.learning_rate,
        weight_decay: config.weight_decay,
        ..ParamsAdamW::default()
    };
    let mut opt = candle_nn::AdamW::new(vars, params)?;

    let keep = 1.0 - config.dropout;
    let mut order: Vec<u32> = (0..n)
        .map(|i| u32::try_from(i).map_err(|e| WsdError::Training(e.to_string())))
        .collect::<Result<_>>()?;
    let mut last_loss = f32::NAN;
    for epoch in 0..config.epochs {
        order.shuffle(&mut rng);
        for batch in order.chunks(config.batch_size) {
            let idx = Tensor::from_slice(batch, batch.len(), device)?;
            let x = inputs.index_select(&idx, 0)?;
            let y = targets.index_select(&idx, 0)?;
            let mask = if config.dropout > 0.0 {
                let values: Vec<f32> = (0..batch.len() * config.hidden_size)
                    .map(|_| if rng.gen::<f32>() < keep { 1.0 / keep } else { 0.0 })
                    .collect();
                Some(Tensor::from_vec(values, (batch.len(), config.hidden_size), device)?)
            } else {
                None
            };
            let logits = member.logits(&x, mask.as_ref())?;
            let loss = candle_nn::loss::cross_entropy(&logits, &y)?;
            opt.backward_step(&loss)
                .map_err(|e| WsdError::Training(format!("optimizer step failed: {e}")))?;
            last_loss = loss.to_scalar::<f32>()?;
        }
        if epoch + 1 == config.epochs {
            tracing::debug!("Member seed {} final loss {:.4}", seed, last_loss);
        }
    }
    Ok(member)
}

impl VectorClassifier for EnsembleModel {
    fn classify_vector(&self, vector: &ContextVector) -> Prediction {
        let probs = match self.probabilities(vector) {
            Ok(probs) => probs,
            Err(e) => {
                tracing::warn!("Ensemble prediction failed: {}", e);
                return Prediction::new(self.senses[0].clone(), 0.0);
            }
        };
        let mut best = 0;
        let mut top = f32::NEG_INFINITY;
        let mut second = 0.0f32;
        for (i, &p) in probs.iter().enumerate() {
            if p > top {
                if top.is_finite() {
                    second = top;
                }
                top = p;
                best = i;
            } else if p > second {
                second = p;
            }
        }
        Prediction::new(self.senses[best].clone(), top - second)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32, y: f32) -> ContextVector {
        ContextVector::normalize(vec![x, y]).unwrap()
    }

    fn config() -> EnsembleConfig {
        EnsembleConfig {
            members: 3,
            hidden_size: 8,
            epochs: 60,
            batch_size: 4,
            learning_rate: 0.05,
            dropout: 0.1,
            ..EnsembleConfig::default()
        }
    }

    fn set() -> TrainingSet {
        TrainingSet::from_vectors([
            (SenseId::from("1"), v(1.0, 0.0)),
            (SenseId::from("1"), v(1.0, 0.2)),
            (SenseId::from("1"), v(0.9, -0.2)),
            (SenseId::from("2"), v(0.0, 1.0)),
            (SenseId::from("2"), v(0.2, 1.0)),
            (SenseId::from("2"), v(-0.2, 0.9)),
        ])
        .unwrap()
    }

    #[test]
    fn test_oversample_copies() {
        assert_eq!(oversample_copies(0, 5, 4), 1);
        assert_eq!(oversample_copies(5, 5, 4), 1);
        assert_eq!(oversample_copies(6, 5, 4), 2);
        assert_eq!(oversample_copies(100, 5, 4), 4);
    }

    #[test]
    fn test_learns_separable_senses() {
        let model = EnsembleModel::train(&set(), &config()).unwrap();
        let p = model.classify_vector(&v(1.0, 0.1));
        assert_eq!(p.sense, SenseId::from("1"));
        assert!((0.0..=1.0).contains(&p.confidence));
        assert_eq!(model.classify_vector(&v(0.1, 1.0)).sense, SenseId::from("2"));
    }

    #[test]
    fn test_same_seed_same_probabilities() {
        let a = EnsembleModel::train(&set(), &config()).unwrap();
        let b = EnsembleModel::train(&set(), &config()).unwrap();
        let q = v(0.6, 0.8);
        let (pa, pb) = (a.probabilities(&q).unwrap(), b.probabilities(&q).unwrap());
        for (x, y) in pa.iter().zip(&pb) {
            assert!((x - y).abs() < 1e-6);
        }
    }

    #[test]
    fn test_wrong_dimension() {
        let model = EnsembleModel::train(&set(), &config()).unwrap();
        let q = ContextVector::normalize(vec![1.0, 0.0, 0.0]).unwrap();
        assert!(matches!(
            model.probabilities(&q),
            Err(WsdError::DimensionMismatch { .. })
        ));
    }
}
