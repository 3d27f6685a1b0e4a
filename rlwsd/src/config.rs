//! Configuration parsing and validation.
//!
//! Strategy names (classifier kind, clustering method, weighting mode) are
//! enums, so an unknown name is rejected when the YAML is parsed rather than
//! on first use.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, WsdError};

/// Top-level configuration for an evaluation or clustering run.
///
/// # Example
///
/// ```rust
/// use rlwsd::WsdConfig;
/// use rlwsd::config::ClassifierKind;
///
/// let yaml = r#"
/// resources:
///   embeddings: vectors.txt
/// classifier:
///   kind: knn
///   knn:
///     k: 7
/// "#;
/// let config: WsdConfig = serde_yaml::from_str(yaml).unwrap();
/// config.validate().unwrap();
/// assert_eq!(config.classifier.kind, ClassifierKind::KNearest);
/// assert_eq!(config.classifier.knn.k, 7);
/// assert_eq!(config.evaluation.n_runs, 4);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WsdConfig {
    /// External resources.
    #[serde(default)]
    pub resources: ResourcesConfig,

    /// Context vector construction.
    #[serde(default)]
    pub vectors: ContextVectorOptions,

    /// Supervised classifier.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Evaluation harness.
    #[serde(default)]
    pub evaluation: EvaluationConfig,

    /// Clustering engine.
    #[serde(default)]
    pub clustering: ClusteringConfig,
}

/// Paths to embeddings, stopwords, lemmas and weight tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// word2vec text file with the embeddings.
    #[serde(default)]
    pub embeddings: Option<PathBuf>,

    /// `word count` file with corpus frequencies.
    #[serde(default)]
    pub counts: Option<PathBuf>,

    /// Stopword list.
    #[serde(default)]
    pub stopwords: Option<PathBuf>,

    /// `form lemma` dictionary.
    #[serde(default)]
    pub lemmas: Option<PathBuf>,

    /// Directory holding `<word>.txt` weight tables.
    #[serde(default = "default_weights_dir")]
    pub weights_dir: PathBuf,
}

fn default_weights_dir() -> PathBuf {
    PathBuf::from("cdict")
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            embeddings: None,
            counts: None,
            stopwords: None,
            lemmas: None,
            weights_dir: default_weights_dir(),
        }
    }
}

/// How context tokens are weighted before averaging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightingMode {
    /// Every token weighs 1.0.
    Uniform,
    /// Per-word weight table, 1.0 when the table or entry is missing.
    #[default]
    Table,
    /// Similarity between token and target embeddings.
    Similarity,
}

/// Averaged or order-preserving context vectors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorLayout {
    /// Weighted mean of token embeddings.
    #[default]
    Averaged,
    /// Concatenation of per-position embeddings.
    Ordered,
}

/// Options of the context vector builder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextVectorOptions {
    /// Tokens kept on each side of the target, nearest first. `None` keeps all.
    #[serde(default = "default_window")]
    pub window: Option<usize>,

    /// Drop stopwords before lookup.
    #[serde(default = "default_true")]
    pub exclude_stopwords: bool,

    /// Token weighting.
    #[serde(default)]
    pub weighting: WeightingMode,
}

#[allow(clippy::unnecessary_wraps)]
fn default_window() -> Option<usize> {
    Some(10)
}
fn default_true() -> bool {
    true
}

impl Default for ContextVectorOptions {
    fn default() -> Self {
        Self {
            window: default_window(),
            exclude_stopwords: true,
            weighting: WeightingMode::Table,
        }
    }
}

impl ContextVectorOptions {
    /// Set the window.
    #[must_use]
    pub const fn with_window(mut self, window: Option<usize>) -> Self {
        self.window = window;
        self
    }

    /// Set stopword exclusion.
    #[must_use]
    pub const fn with_exclude_stopwords(mut self, exclude: bool) -> Self {
        self.exclude_stopwords = exclude;
        self
    }

    /// Set the weighting mode.
    #[must_use]
    pub const fn with_weighting(mut self, weighting: WeightingMode) -> Self {
        self.weighting = weighting;
        self
    }
}

/// Supervised classification strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassifierKind {
    /// Nearest sense centroid by cosine.
    #[default]
    #[serde(rename = "spherical")]
    Spherical,
    /// Majority vote of the k most similar training vectors.
    #[serde(rename = "knn")]
    KNearest,
    /// One Gaussian per sense, fitted with EM.
    #[serde(rename = "mixture")]
    Mixture,
    /// Ensemble of small feed-forward networks.
    #[serde(rename = "ensemble")]
    Ensemble,
}

impl ClassifierKind {
    /// All supervised strategies.
    pub const ALL: [Self; 4] = [Self::Spherical, Self::KNearest, Self::Mixture, Self::Ensemble];

    /// Configuration name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Spherical => "spherical",
            Self::KNearest => "knn",
            Self::Mixture => "mixture",
            Self::Ensemble => "ensemble",
        }
    }

    /// Confidence above which a prediction counts as "known".
    #[must_use]
    pub const fn default_abstention_threshold(self) -> f32 {
        match self {
            Self::Spherical | Self::Ensemble => 0.05,
            Self::KNearest | Self::Mixture => 0.5,
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClassifierKind {
    type Err = WsdError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| WsdError::Config(format!("unknown classifier: {s}")))
    }
}

/// k-nearest-neighbor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnnConfig {
    /// Number of neighbors that vote.
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    5
}

impl Default for KnnConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

/// Mixture-density settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixtureConfig {
    /// EM iteration cap.
    #[serde(default = "default_em_iterations")]
    pub max_iterations: usize,

    /// Stop when the mean log-likelihood improves by less than this.
    #[serde(default = "default_em_tolerance")]
    pub tolerance: f64,

    /// Floor added to every variance.
    #[serde(default = "default_variance_floor")]
    pub variance_floor: f64,
}

fn default_em_iterations() -> usize {
    100
}
fn default_em_tolerance() -> f64 {
    1e-3
}
fn default_variance_floor() -> f64 {
    1e-3
}

impl Default for MixtureConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_em_iterations(),
            tolerance: default_em_tolerance(),
            variance_floor: default_variance_floor(),
        }
    }
}

/// Discriminative ensemble settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Independently initialized members.
    #[serde(default = "default_members")]
    pub members: usize,

    /// Hidden layer width.
    #[serde(default = "default_hidden")]
    pub hidden_size: usize,

    /// Dropout probability on the hidden layer.
    #[serde(default = "default_dropout")]
    pub dropout: f32,

    /// Passes over the training data.
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Mini-batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// AdamW learning rate.
    #[serde(default = "default_lr")]
    pub learning_rate: f64,

    /// AdamW weight decay.
    #[serde(default)]
    pub weight_decay: f64,

    /// Repeat examples in proportion to their surviving token count.
    #[serde(default)]
    pub oversample: bool,

    /// Tokens per extra copy when oversampling.
    #[serde(default = "default_tokens_per_copy")]
    pub tokens_per_copy: usize,

    /// Upper bound on copies of one example.
    #[serde(default = "default_max_copies")]
    pub max_copies: usize,

    /// Input representation.
    #[serde(default)]
    pub layout: VectorLayout,

    /// Base seed; member `i` uses `seed + i`.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_members() -> usize {
    5
}
fn default_hidden() -> usize {
    64
}
fn default_dropout() -> f32 {
    0.5
}
fn default_epochs() -> usize {
    40
}
fn default_batch_size() -> usize {
    16
}
fn default_lr() -> f64 {
    1e-2
}
fn default_tokens_per_copy() -> usize {
    5
}
fn default_max_copies() -> usize {
    4
}
fn default_seed() -> u64 {
    42
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            members: default_members(),
            hidden_size: default_hidden(),
            dropout: default_dropout(),
            epochs: default_epochs(),
            batch_size: default_batch_size(),
            learning_rate: default_lr(),
            weight_decay: 0.0,
            oversample: false,
            tokens_per_copy: default_tokens_per_copy(),
            max_copies: default_max_copies(),
            layout: VectorLayout::Averaged,
            seed: default_seed(),
        }
    }
}

/// Classifier selection and per-strategy settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Which strategy to train.
    #[serde(default)]
    pub kind: ClassifierKind,

    /// k-nearest-neighbor settings.
    #[serde(default)]
    pub knn: KnnConfig,

    /// Mixture-density settings.
    #[serde(default)]
    pub mixture: MixtureConfig,

    /// Ensemble settings.
    #[serde(default)]
    pub ensemble: EnsembleConfig,

    /// Overrides the strategy's default abstention threshold.
    #[serde(default)]
    pub abstention_threshold: Option<f32>,
}

impl ClassifierConfig {
    /// Config for `kind` with default settings.
    #[must_use]
    pub fn new(kind: ClassifierKind) -> Self {
        Self {
            kind,
            ..Self::default()
        }
    }

    /// Effective abstention threshold.
    #[must_use]
    pub fn abstention_threshold(&self) -> f32 {
        self.abstention_threshold
            .unwrap_or_else(|| self.kind.default_abstention_threshold())
    }
}

/// How labeled data is split into train and test sets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitStrategy {
    /// Fixed number of training examples, the rest is test.
    TrainCount(usize),
    /// Fraction of examples held out for testing.
    TestRatio(f32),
}

/// Evaluation harness settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Number of training examples per run.
    #[serde(default = "default_n_train")]
    pub n_train: Option<usize>,

    /// Fraction held out for testing (alternative to `n_train`).
    #[serde(default)]
    pub test_ratio: Option<f32>,

    /// Repeated random splits per word.
    #[serde(default = "default_n_runs")]
    pub n_runs: usize,

    /// Seed of the split RNG.
    #[serde(default = "default_eval_seed")]
    pub seed: u64,

    /// Score on the training data instead of the test data.
    #[serde(default)]
    pub perplexity: bool,

    /// Write `<stem>.errors<run>.tsv` next to each input file.
    #[serde(default)]
    pub write_errors: bool,
}

#[allow(clippy::unnecessary_wraps)]
fn default_n_train() -> Option<usize> {
    Some(50)
}
fn default_n_runs() -> usize {
    4
}
fn default_eval_seed() -> u64 {
    1
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            n_train: default_n_train(),
            test_ratio: None,
            n_runs: default_n_runs(),
            seed: default_eval_seed(),
            perplexity: false,
            write_errors: false,
        }
    }
}

impl EvaluationConfig {
    /// The configured split.
    ///
    /// # Errors
    ///
    /// Returns [`WsdError::Config`] unless exactly one of `n_train` and
    /// `test_ratio` is set.
    pub fn split_strategy(&self) -> Result<SplitStrategy> {
        match (self.n_train, self.test_ratio) {
            (Some(n), None) => Ok(SplitStrategy::TrainCount(n)),
            (None, Some(r)) => Ok(SplitStrategy::TestRatio(r)),
            _ => Err(WsdError::Config(
                "exactly one of n_train and test_ratio must be set".into(),
            )),
        }
    }
}

/// Clustering method; its name is also the artifact cache key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClusterMethod {
    /// Euclidean k-means.
    #[serde(rename = "kmeans")]
    KMeans,
    /// Spherical k-means with random seeding.
    #[default]
    #[serde(rename = "skmeans")]
    SphericalKMeans,
    /// Spherical k-means seeded at dictionary sense centers.
    #[serde(rename = "skmeans-dict-init")]
    SphericalKMeansDictInit,
    /// Spherical k-means, clusters mapped to the nearest dictionary sense.
    #[serde(rename = "skmeans-dict-mapping")]
    SphericalKMeansDictMapping,
}

impl ClusterMethod {
    /// All methods.
    pub const ALL: [Self; 4] = [
        Self::KMeans,
        Self::SphericalKMeans,
        Self::SphericalKMeansDictInit,
        Self::SphericalKMeansDictMapping,
    ];

    /// Configuration name and cache key.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::KMeans => "kmeans",
            Self::SphericalKMeans => "skmeans",
            Self::SphericalKMeansDictInit => "skmeans-dict-init",
            Self::SphericalKMeansDictMapping => "skmeans-dict-mapping",
        }
    }

    /// Whether the method needs dictionary sense centers.
    #[must_use]
    pub const fn needs_dictionary(self) -> bool {
        matches!(
            self,
            Self::SphericalKMeansDictInit | Self::SphericalKMeansDictMapping
        )
    }
}

impl fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ClusterMethod {
    type Err = WsdError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name() == s)
            .ok_or_else(|| WsdError::Config(format!("unknown clustering method: {s}")))
    }
}

/// Clustering engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    /// Method.
    #[serde(default)]
    pub method: ClusterMethod,

    /// Number of clusters for methods not seeded from the dictionary.
    #[serde(default = "default_n_clusters")]
    pub n_clusters: usize,

    /// Iteration cap.
    #[serde(default = "default_cluster_iterations")]
    pub max_iterations: usize,

    /// Seed for random initialization.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Recompute even when the artifact has a cached result.
    #[serde(default)]
    pub rebuild: bool,
}

fn default_n_clusters() -> usize {
    12
}
fn default_cluster_iterations() -> usize {
    100
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            method: ClusterMethod::SphericalKMeans,
            n_clusters: default_n_clusters(),
            max_iterations: default_cluster_iterations(),
            seed: default_seed(),
            rebuild: false,
        }
    }
}

impl WsdConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// IO errors and invalid YAML, including unknown strategy names.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    ///
    /// # Errors
    ///
    /// IO and serialization errors.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`WsdError::Config`] describing the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.vectors.window == Some(0) {
            return Err(WsdError::Config("window must be positive".into()));
        }
        if self.classifier.knn.k == 0 {
            return Err(WsdError::Config("knn.k must be positive".into()));
        }
        let ensemble = &self.classifier.ensemble;
        if ensemble.members == 0 || ensemble.hidden_size == 0 {
            return Err(WsdError::Config(
                "ensemble needs at least one member and a non-empty hidden layer".into(),
            ));
        }
        if !(0.0..1.0).contains(&ensemble.dropout) {
            return Err(WsdError::Config(format!(
                "dropout must be in [0, 1), got {}",
                ensemble.dropout
            )));
        }
        if ensemble.batch_size == 0 || ensemble.tokens_per_copy == 0 || ensemble.max_copies == 0 {
            return Err(WsdError::Config(
                "ensemble batch_size, tokens_per_copy and max_copies must be positive".into(),
            ));
        }
        if ensemble.layout == VectorLayout::Ordered && self.vectors.window.is_none() {
            return Err(WsdError::Config(
                "ordered layout requires a fixed window".into(),
            ));
        }
        if let Some(threshold) = self.classifier.abstention_threshold {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(WsdError::Config(format!(
                    "abstention_threshold must be in [0, 1], got {threshold}"
                )));
            }
        }
        if let SplitStrategy::TestRatio(r) = self.evaluation.split_strategy()? {
            if !(r > 0.0 && r < 1.0) {
                return Err(WsdError::Config(format!("test_ratio must be in (0, 1), got {r}")));
            }
        }
        if self.evaluation.n_runs == 0 {
            return Err(WsdError::Config("n_runs must be positive".into()));
        }
        if self.clustering.n_clusters == 0 || self.clustering.max_iterations == 0 {
            return Err(WsdError::Config(
                "n_clusters and max_iterations must be positive".into(),
            ));
        }
        Ok(())
    }
}
