//! Word embedding provider.
//!
//! The embedding service is an external collaborator; this module defines the
//! protocol the rest of the crate consumes ([`EmbeddingProvider`]) and an
//! in-memory implementation backed by word2vec text files.
//!
//! Unknown words yield `None`, never an error. Batched lookups exist so a
//! remote implementation can serve many words per round trip.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::{Result, WsdError};

/// Lookup of word vectors and corpus counts.
pub trait EmbeddingProvider {
    /// Dimension of every returned vector.
    fn dimension(&self) -> usize;

    /// Vector for `word`, `None` when out of vocabulary.
    fn vector(&self, word: &str) -> Option<Vec<f32>>;

    /// Corpus frequency of `word`, `None` when out of vocabulary.
    fn count(&self, word: &str) -> Option<u64>;

    /// Total number of tokens in the corpus the counts come from.
    fn total_count(&self) -> u64;

    /// Batched [`EmbeddingProvider::vector`], one entry per input word.
    fn vectors(&self, words: &[String]) -> Vec<Option<Vec<f32>>> {
        words.iter().map(|w| self.vector(w)).collect()
    }

    /// Batched [`EmbeddingProvider::count`], one entry per input word.
    fn counts(&self, words: &[String]) -> Vec<Option<u64>> {
        words.iter().map(|w| self.count(w)).collect()
    }
}

/// Embeddings held in memory.
///
/// # Example
///
/// ```
/// use rlwsd::embedding::{EmbeddingProvider, InMemoryEmbeddings};
///
/// let mut emb = InMemoryEmbeddings::new(2);
/// emb.insert("river", vec![0.0, 1.0]).unwrap();
/// emb.set_count("river", 12);
///
/// assert_eq!(emb.vector("river"), Some(vec![0.0, 1.0]));
/// assert_eq!(emb.count("river"), Some(12));
/// assert!(emb.vector("unknown").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryEmbeddings {
    dimension: usize,
    vectors: HashMap<String, Vec<f32>>,
    counts: HashMap<String, u64>,
    total_count: u64,
}

impl InMemoryEmbeddings {
    /// Create an empty store for vectors of the given dimension.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ..Self::default()
        }
    }

    /// Add or replace a word vector.
    ///
    /// # Errors
    ///
    /// Returns [`WsdError::DimensionMismatch`] when the vector length differs
    /// from the store dimension.
    pub fn insert(&mut self, word: impl Into<String>, vector: Vec<f32>) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(WsdError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        self.vectors.insert(word.into(), vector);
        Ok(())
    }

    /// Set the corpus count of a word, keeping the total in sync.
    pub fn set_count(&mut self, word: impl Into<String>, count: u64) {
        if let Some(old) = self.counts.insert(word.into(), count) {
            self.total_count -= old;
        }
        self.total_count += count;
    }

    /// Number of words with a vector.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Whether no vectors are loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Load vectors from a word2vec text file.
    ///
    /// An optional first line `n_words dimension` is accepted; every other line
    /// is `word v1 v2 .. vn`.
    ///
    /// # Errors
    ///
    /// IO errors, unparsable numbers and inconsistent dimensions.
    pub fn from_word2vec_text<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut store: Option<Self> = None;

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = i + 1;
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else {
                continue;
            };
            let values: Vec<&str> = fields.collect();

            if line_no == 1 && values.len() == 1 && word.parse::<usize>().is_ok() {
                let dim = values[0]
                    .parse::<usize>()
                    .map_err(|e| WsdError::parse(line_no, format!("bad header: {e}")))?;
                store = Some(Self::new(dim));
                continue;
            }

            let vector = values
                .iter()
                .map(|v| v.parse::<f32>())
                .collect::<std::result::Result<Vec<f32>, _>>()
                .map_err(|e| WsdError::parse(line_no, format!("bad vector component: {e}")))?;
            let store = store.get_or_insert_with(|| Self::new(vector.len()));
            store.insert(word, vector).map_err(|e| match e {
                WsdError::DimensionMismatch { expected, actual } => WsdError::parse(
                    line_no,
                    format!("expected {expected} components, got {actual}"),
                ),
                other => other,
            })?;
        }

        let store = store.ok_or_else(|| WsdError::EmptyInput("embedding file has no vectors".into()))?;
        tracing::info!("Loaded {} word vectors (dim {})", store.len(), store.dimension);
        Ok(store)
    }

    /// Load corpus counts from a `word count` file.
    ///
    /// # Errors
    ///
    /// IO errors and malformed lines.
    pub fn load_counts<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let (Some(word), Some(count), None) = (fields.next(), fields.next(), fields.next()) else {
                if line.trim().is_empty() {
                    continue;
                }
                return Err(WsdError::parse(i + 1, "expected `word count`"));
            };
            let count = count
                .parse::<u64>()
                .map_err(|e| WsdError::parse(i + 1, format!("bad count: {e}")))?;
            self.set_count(word, count);
        }
        Ok(())
    }
}

impl EmbeddingProvider for InMemoryEmbeddings {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vector(&self, word: &str) -> Option<Vec<f32>> {
        self.vectors.get(word).cloned()
    }

    fn count(&self, word: &str) -> Option<u64> {
        self.counts.get(word).copied()
    }

    fn total_count(&self) -> u64 {
        self.total_count
    }
}
