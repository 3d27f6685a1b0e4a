//! Per-word bundle of corpus contexts, their vectors and cached clusterings.

use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::report::{cluster_report, ClusterSummary};
use super::{cluster_vectors, ClusteringResult};
use crate::config::{ClusterMethod, ClusteringConfig};
use crate::context::ContextVectorBuilder;
use crate::error::Result;
use crate::language::LanguageResources;
use crate::sense::SenseId;
use crate::vector::{ContextVector, NORM_EPSILON};

/// One distinct corpus context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    /// Context tokens.
    pub tokens: Vec<String>,
    /// Its vector, `None` when no token had an embedding.
    pub vector: Option<ContextVector>,
}

/// Settings a cached clustering was computed with.
///
/// The seed and iteration cap are not part of it, so changing them reuses the
/// cached result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringParams {
    /// Requested clusters; the number of senses for dictionary seeding.
    pub n_clusters: usize,
    /// Dictionary sense centers, empty for methods that ignore them.
    #[serde(default)]
    pub sense_centers: Vec<(SenseId, ContextVector)>,
}

impl ClusteringParams {
    /// Parameters that determine the result of `config.method`.
    #[must_use]
    pub fn new(config: &ClusteringConfig, sense_centers: &[(SenseId, ContextVector)]) -> Self {
        let n_clusters = match config.method {
            ClusterMethod::SphericalKMeansDictInit => sense_centers.len(),
            _ => config.n_clusters,
        };
        let sense_centers = if config.method.needs_dictionary() {
            sense_centers.to_vec()
        } else {
            Vec::new()
        };
        Self {
            n_clusters,
            sense_centers,
        }
    }

    /// Same cluster count and sense centers, up to float noise from reloading.
    #[must_use]
    pub fn matches(&self, other: &Self) -> bool {
        self.n_clusters == other.n_clusters
            && self.sense_centers.len() == other.sense_centers.len()
            && self
                .sense_centers
                .iter()
                .zip(&other.sense_centers)
                .all(|((a, u), (b, v))| {
                    a == b
                        && u.dim() == v.dim()
                        && u.as_slice()
                            .iter()
                            .zip(v.as_slice())
                            .all(|(x, y)| (x - y).abs() <= NORM_EPSILON)
                })
    }
}

/// Contexts of one word and the clusterings computed over them.
///
/// Clusterings are keyed by method name and only cover contexts with a vector,
/// in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextArtifact {
    /// Target word.
    pub word: String,
    /// Distinct contexts in first-seen order.
    pub contexts: Vec<ContextEntry>,
    /// Cached results by method name.
    #[serde(default)]
    pub clusterings: BTreeMap<String, ClusteringResult>,
    /// Parameters of each cached result, by method name.
    #[serde(default)]
    pub parameters: BTreeMap<String, ClusteringParams>,
}

impl ContextArtifact {
    /// Vectorize whitespace-tokenized context lines, skipping duplicates.
    pub fn build<I, S>(word: &str, lines: I, builder: &ContextVectorBuilder<'_>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut contexts = Vec::new();
        for line in lines {
            let tokens: Vec<String> = line.as_ref().split_whitespace().map(String::from).collect();
            if tokens.is_empty() || !seen.insert(tokens.join(" ")) {
                continue;
            }
            let vector = builder.vector_from_tokens(word, &tokens);
            contexts.push(ContextEntry { tokens, vector });
        }
        let artifact = Self {
            word: word.to_string(),
            contexts,
            clusterings: BTreeMap::new(),
            parameters: BTreeMap::new(),
        };
        tracing::info!(
            "{}: {} contexts, {} with vectors",
            word,
            artifact.contexts.len(),
            artifact.vectors().len()
        );
        artifact
    }

    /// Read a JSON artifact.
    ///
    /// # Errors
    ///
    /// IO and JSON errors.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Write the artifact as JSON.
    ///
    /// # Errors
    ///
    /// IO and JSON errors.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Vectors of the clusterable contexts.
    #[must_use]
    pub fn vectors(&self) -> Vec<Vec<f32>> {
        self.contexts
            .iter()
            .filter_map(|c| c.vector.as_ref().map(|v| v.as_slice().to_vec()))
            .collect()
    }

    /// Tokens of the clusterable contexts, aligned with assignments.
    #[must_use]
    pub fn clustered_tokens(&self) -> Vec<&[String]> {
        self.contexts
            .iter()
            .filter(|c| c.vector.is_some())
            .map(|c| c.tokens.as_slice())
            .collect()
    }

    /// Cached result of `method`.
    #[must_use]
    pub fn clustering(&self, method: ClusterMethod) -> Option<&ClusteringResult> {
        self.clusterings.get(method.name())
    }

    /// Cluster with `config`, reusing the cached result unless `config.rebuild`
    /// or its recorded parameters differ from the current ones.
    ///
    /// # Errors
    ///
    /// See [`cluster_vectors`].
    pub fn cluster(
        &mut self,
        config: &ClusteringConfig,
        sense_centers: &[(SenseId, ContextVector)],
    ) -> Result<&ClusteringResult> {
        let key = config.method.name().to_string();
        let params = ClusteringParams::new(config, sense_centers);
        if !config.rebuild && self.clusterings.contains_key(&key) {
            match self.parameters.get(&key) {
                Some(cached) if cached.matches(&params) => {
                    tracing::info!("{}: using cached {} clustering", self.word, key);
                    return Ok(&self.clusterings[&key]);
                }
                Some(cached) => tracing::warn!(
                    "{}: cached {} clustering used {} clusters and {} sense centers, rebuilding",
                    self.word,
                    key,
                    cached.n_clusters,
                    cached.sense_centers.len()
                ),
                None => tracing::warn!(
                    "{}: cached {} clustering has no recorded parameters, rebuilding",
                    self.word,
                    key
                ),
            }
        }
        let result = cluster_vectors(&self.vectors(), config, sense_centers)?;
        self.parameters.insert(key.clone(), params);
        self.clusterings.insert(key.clone(), result);
        Ok(&self.clusterings[&key])
    }

    /// Summaries of a cached clustering.
    #[must_use]
    pub fn report(
        &self,
        method: ClusterMethod,
        language: &LanguageResources,
        n_words: usize,
        n_contexts: usize,
    ) -> Option<Vec<ClusterSummary>> {
        let result = self.clustering(method)?;
        Some(cluster_report(
            result,
            &self.clustered_tokens(),
            &self.word,
            language,
            n_words,
            n_contexts,
        ))
    }
}
