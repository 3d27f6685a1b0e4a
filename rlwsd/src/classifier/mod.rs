//! Sense classifiers.
//!
//! Every strategy turns a [`TrainingSet`] of context vectors into a
//! [`VectorClassifier`]. [`SenseModel`] is the closed set of strategies and
//! [`Model`] binds one to a [`ContextVectorBuilder`], so callers classify raw
//! [`Context`]s and never see undefined vectors: those fall back to the
//! dominant sense with zero confidence.
//!
//! # Example
//!
//! ```rust
//! use rlwsd::classifier::{SenseModel, TrainingSet, VectorClassifier};
//! use rlwsd::config::{ClassifierConfig, ClassifierKind};
//! use rlwsd::{ContextVector, SenseId};
//!
//! let v = |x: f32, y: f32| ContextVector::normalize(vec![x, y]).unwrap();
//! let set = TrainingSet::from_vectors([
//!     (SenseId::from("1"), v(1.0, 0.1)),
//!     (SenseId::from("1"), v(0.9, 0.0)),
//!     (SenseId::from("2"), v(0.0, 1.0)),
//! ])?;
//! let model = SenseModel::train(&set, &ClassifierConfig::new(ClassifierKind::Spherical))?;
//! assert_eq!(model.classify_vector(&v(1.0, 0.2)).sense, SenseId::from("1"));
//! # Ok::<(), rlwsd::WsdError>(())
//! ```

pub mod cluster;
pub mod ensemble;
pub mod knn;
pub mod mixture;
pub mod spherical;

use std::collections::BTreeMap;

pub use cluster::ClusterModel;
pub use ensemble::EnsembleModel;
pub use knn::KNearestModel;
pub use mixture::MixtureModel;
pub use spherical::SphericalModel;

use crate::clustering::ClusteringResult;
use crate::config::{ClassifierConfig, ClassifierKind, VectorLayout};
use crate::context::ContextVectorBuilder;
use crate::error::{Result, WsdError};
use crate::sense::{Context, LabeledExample, SenseId};
use crate::vector::ContextVector;

/// Abstention threshold of cluster-backed models.
pub const CLUSTER_ABSTENTION_THRESHOLD: f32 = 0.5;

/// A predicted sense and how sure the model is, in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Predicted sense.
    pub sense: SenseId,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Prediction {
    /// Create a prediction, clamping the confidence into `[0, 1]`.
    #[must_use]
    pub fn new(sense: SenseId, confidence: f32) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self { sense, confidence }
    }
}

/// Classification of a defined context vector.
pub trait VectorClassifier {
    /// Predict the sense of `vector`.
    fn classify_vector(&self, vector: &ContextVector) -> Prediction;
}

/// One defined training vector.
#[derive(Debug, Clone)]
pub struct TrainingSample {
    /// Gold sense.
    pub sense: SenseId,
    /// Context vector.
    pub vector: ContextVector,
    /// Tokens that contributed to the vector.
    pub tokens: usize,
}

/// Training vectors of one word.
///
/// Example counts include examples whose vector is undefined, so the
/// dominant sense reflects the labeled data rather than vocabulary coverage.
#[derive(Debug, Clone)]
pub struct TrainingSet {
    samples: Vec<TrainingSample>,
    counts: BTreeMap<SenseId, usize>,
    dominant: SenseId,
    empty_senses: Vec<SenseId>,
}

impl TrainingSet {
    /// Build vectors for `examples`.
    ///
    /// # Errors
    ///
    /// [`WsdError::EmptyInput`] without examples, [`WsdError::Training`] when
    /// no example has a defined vector.
    pub fn build(
        builder: &ContextVectorBuilder<'_>,
        layout: VectorLayout,
        examples: &[LabeledExample],
    ) -> Result<Self> {
        if examples.is_empty() {
            return Err(WsdError::EmptyInput("no training examples".into()));
        }
        let mut counts = BTreeMap::new();
        let mut samples = Vec::with_capacity(examples.len());
        for example in examples {
            *counts.entry(example.sense.clone()).or_insert(0) += 1;
            if let Some((vector, tokens)) = builder.build_with(layout, &example.context) {
                samples.push(TrainingSample {
                    sense: example.sense.clone(),
                    vector,
                    tokens,
                });
            }
        }
        tracing::debug!(
            "{} of {} training contexts have vectors",
            samples.len(),
            examples.len()
        );
        Self::from_parts(samples, counts)
    }

    /// Training set from ready vectors, one token each.
    ///
    /// # Errors
    ///
    /// See [`TrainingSet::build`]; also [`WsdError::DimensionMismatch`].
    pub fn from_vectors<I>(vectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = (SenseId, ContextVector)>,
    {
        let mut counts = BTreeMap::new();
        let samples: Vec<TrainingSample> = vectors
            .into_iter()
            .map(|(sense, vector)| {
                *counts.entry(sense.clone()).or_insert(0) += 1;
                TrainingSample {
                    sense,
                    vector,
                    tokens: 1,
                }
            })
            .collect();
        if samples.is_empty() {
            return Err(WsdError::EmptyInput("no training examples".into()));
        }
        Self::from_parts(samples, counts)
    }

    fn from_parts(samples: Vec<TrainingSample>, counts: BTreeMap<SenseId, usize>) -> Result<Self> {
        let Some(first) = samples.first() else {
            return Err(WsdError::Training(
                "no training example has a context vector".into(),
            ));
        };
        let dim = first.vector.dim();
        if let Some(bad) = samples.iter().find(|s| s.vector.dim() != dim) {
            return Err(WsdError::DimensionMismatch {
                expected: dim,
                actual: bad.vector.dim(),
            });
        }

        let mut dominant: Option<(&SenseId, usize)> = None;
        for (sense, &count) in &counts {
            if dominant.map_or(true, |(_, best)| count > best) {
                dominant = Some((sense, count));
            }
        }
        let dominant = dominant.map(|(s, _)| s.clone()).unwrap_or_else(|| first.sense.clone());

        let empty_senses: Vec<SenseId> = counts
            .keys()
            .filter(|s| !samples.iter().any(|x| &x.sense == *s))
            .cloned()
            .collect();
        for sense in &empty_senses {
            tracing::warn!("Sense {} has no training vectors and will never be predicted", sense);
        }

        Ok(Self {
            samples,
            counts,
            dominant,
            empty_senses,
        })
    }

    /// Defined training vectors.
    #[must_use]
    pub fn samples(&self) -> &[TrainingSample] {
        &self.samples
    }

    /// Number of defined vectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Always false for a constructed set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Vector dimension.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.samples.first().map_or(0, |s| s.vector.dim())
    }

    /// Examples per sense, undefined vectors included.
    #[must_use]
    pub fn counts(&self) -> &BTreeMap<SenseId, usize> {
        &self.counts
    }

    /// Sense with the most examples, lowest id on ties.
    #[must_use]
    pub fn dominant_sense(&self) -> &SenseId {
        &self.dominant
    }

    /// Senses that have examples but no defined vector.
    #[must_use]
    pub fn empty_senses(&self) -> &[SenseId] {
        &self.empty_senses
    }

    /// Vectors grouped by sense, in sense order.
    #[must_use]
    pub fn by_sense(&self) -> BTreeMap<&SenseId, Vec<&ContextVector>> {
        let mut groups: BTreeMap<&SenseId, Vec<&ContextVector>> = BTreeMap::new();
        for sample in &self.samples {
            groups.entry(&sample.sense).or_default().push(&sample.vector);
        }
        groups
    }
}

/// The closed set of classification strategies.
#[derive(Debug)]
pub enum SenseModel {
    /// Nearest centroid.
    Spherical(SphericalModel),
    /// k nearest neighbors.
    KNearest(KNearestModel),
    /// Per-sense Gaussian mixture.
    Mixture(MixtureModel),
    /// Feed-forward ensemble.
    Ensemble(EnsembleModel),
    /// Clustering with a cluster-to-sense mapping.
    Cluster(ClusterModel),
}

impl SenseModel {
    /// Train the configured supervised strategy.
    ///
    /// # Errors
    ///
    /// Strategy-specific training errors.
    pub fn train(set: &TrainingSet, config: &ClassifierConfig) -> Result<Self> {
        let model = match config.kind {
            ClassifierKind::Spherical => Self::Spherical(SphericalModel::train(set)),
            ClassifierKind::KNearest => Self::KNearest(KNearestModel::train(set, &config.knn)?),
            ClassifierKind::Mixture => Self::Mixture(MixtureModel::train(set, &config.mixture)?),
            ClassifierKind::Ensemble => {
                Self::Ensemble(EnsembleModel::train(set, &config.ensemble)?)
            }
        };
        Ok(model)
    }

    /// Strategy name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Spherical(_) => ClassifierKind::Spherical.name(),
            Self::KNearest(_) => ClassifierKind::KNearest.name(),
            Self::Mixture(_) => ClassifierKind::Mixture.name(),
            Self::Ensemble(_) => ClassifierKind::Ensemble.name(),
            Self::Cluster(_) => "cluster",
        }
    }
}

impl VectorClassifier for SenseModel {
    fn classify_vector(&self, vector: &ContextVector) -> Prediction {
        match self {
            Self::Spherical(m) => m.classify_vector(vector),
            Self::KNearest(m) => m.classify_vector(vector),
            Self::Mixture(m) => m.classify_vector(vector),
            Self::Ensemble(m) => m.classify_vector(vector),
            Self::Cluster(m) => m.classify_vector(vector),
        }
    }
}

/// A trained classifier bound to the builder that produced its vectors.
pub struct Model<'a> {
    builder: &'a ContextVectorBuilder<'a>,
    layout: VectorLayout,
    fallback: SenseId,
    inner: SenseModel,
    abstention_threshold: f32,
}

impl<'a> Model<'a> {
    /// Bind a strategy to a builder.
    #[must_use]
    pub fn new(
        builder: &'a ContextVectorBuilder<'a>,
        layout: VectorLayout,
        fallback: SenseId,
        inner: SenseModel,
        abstention_threshold: f32,
    ) -> Self {
        Self {
            builder,
            layout,
            fallback,
            inner,
            abstention_threshold,
        }
    }

    /// Wrap a clustering result that carries a sense mapping.
    ///
    /// The fallback is the sense receiving the most clustered contexts.
    ///
    /// # Errors
    ///
    /// [`WsdError::Clustering`] when the result has no mapping.
    pub fn from_clustering(
        builder: &'a ContextVectorBuilder<'a>,
        result: &ClusteringResult,
    ) -> Result<Self> {
        let cluster = ClusterModel::new(result)?;
        let fallback = cluster.dominant_sense().clone();
        Ok(Self::new(
            builder,
            VectorLayout::Averaged,
            fallback,
            SenseModel::Cluster(cluster),
            CLUSTER_ABSTENTION_THRESHOLD,
        ))
    }

    /// Classify a context; undefined vectors get the fallback sense with zero confidence.
    #[must_use]
    pub fn classify(&self, context: &Context) -> Prediction {
        match self.builder.build_with(self.layout, context) {
            Some((vector, _)) => self.inner.classify_vector(&vector),
            None => Prediction::new(self.fallback.clone(), 0.0),
        }
    }

    /// Classify, keeping only the sense.
    #[must_use]
    pub fn predict(&self, context: &Context) -> SenseId {
        self.classify(context).sense
    }

    /// Accuracy on `examples`, usually the training set. Zero when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn train_accuracy(&self, examples: &[LabeledExample]) -> f64 {
        if examples.is_empty() {
            return 0.0;
        }
        let correct = examples
            .iter()
            .filter(|e| self.predict(&e.context) == e.sense)
            .count();
        correct as f64 / examples.len() as f64
    }

    /// Fallback for undefined vectors.
    #[must_use]
    pub fn fallback_sense(&self) -> &SenseId {
        &self.fallback
    }

    /// Confidence above which a prediction counts as known.
    #[must_use]
    pub fn abstention_threshold(&self) -> f32 {
        self.abstention_threshold
    }

    /// The wrapped strategy.
    #[must_use]
    pub fn inner(&self) -> &SenseModel {
        &self.inner
    }
}

/// Build vectors for `examples` and train the configured strategy.
///
/// # Errors
///
/// See [`TrainingSet::build`] and [`SenseModel::train`].
pub fn train_model<'a>(
    builder: &'a ContextVectorBuilder<'a>,
    examples: &[LabeledExample],
    config: &ClassifierConfig,
) -> Result<Model<'a>> {
    let layout = match config.kind {
        ClassifierKind::Ensemble => config.ensemble.layout,
        _ => VectorLayout::Averaged,
    };
    let set = TrainingSet::build(builder, layout, examples)?;
    let inner = SenseModel::train(&set, config)?;
    tracing::debug!(
        "Trained {} model on {} vectors, {} senses",
        inner.name(),
        set.len(),
        set.counts().len()
    );
    Ok(Model::new(
        builder,
        layout,
        set.dominant_sense().clone(),
        inner,
        config.abstention_threshold(),
    ))
}
