//! Per-word context weights derived from corpus statistics.
//!
//! For one target word, every context word `w` gets
//! `max(0, ln(local(w) / predicted(w)))`, where `local` is its count in the
//! word's contexts and `predicted = global(w) * context_tokens / corpus_tokens`.
//! Words missing from the table weigh 1.0.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, WsdError};

/// Default minimum local count for a word to receive a weight.
pub const DEFAULT_MIN_COUNT: usize = 4;

/// Static lookup of context-word weights for one target word.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightingTable {
    // Kept in file order, which is descending local count when built here.
    entries: Vec<(String, f32)>,
    index: HashMap<String, f32>,
}

impl WeightingTable {
    /// Build a table from `(word, weight)` pairs. Negative weights are clamped to 0.
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, f32)>,
        S: Into<String>,
    {
        let entries: Vec<(String, f32)> = entries
            .into_iter()
            .map(|(w, weight)| (w.into(), weight.max(0.0)))
            .collect();
        let index = entries.iter().cloned().collect();
        Self { entries, index }
    }

    /// Weight of `word`, 1.0 when absent.
    ///
    /// ```
    /// use rlwsd::WeightingTable;
    ///
    /// let table = WeightingTable::from_entries([("robbery", 2.5)]);
    /// assert_eq!(table.get("robbery"), 2.5);
    /// assert_eq!(table.get("the"), 1.0);
    /// ```
    #[must_use]
    pub fn get(&self, word: &str) -> f32 {
        self.index.get(word).copied().unwrap_or(1.0)
    }

    /// Number of weighted words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over `(word, weight)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.entries.iter().map(|(w, x)| (w.as_str(), *x))
    }

    /// Read a `word weight` file.
    ///
    /// # Errors
    ///
    /// IO errors, and a parse error naming the line for malformed rows.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut entries = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [] => {}
                [word, weight] => {
                    let weight = weight
                        .parse::<f32>()
                        .map_err(|e| WsdError::parse(i + 1, format!("bad weight: {e}")))?;
                    entries.push(((*word).to_string(), weight));
                }
                _ => return Err(WsdError::parse(i + 1, "expected `word weight`")),
            }
        }
        Ok(Self::from_entries(entries))
    }

    /// Path of the weight file for `word` inside `dir`.
    #[must_use]
    pub fn path_for_word(dir: &Path, word: &str) -> PathBuf {
        dir.join(format!("{word}.txt"))
    }

    /// Load `<dir>/<word>.txt` if it exists.
    ///
    /// An absent file means "no weighting configured" and only logs a warning.
    ///
    /// # Errors
    ///
    /// Errors from [`WeightingTable::from_file`] when the file exists but is invalid.
    pub fn load_for_word(dir: &Path, word: &str) -> Result<Option<Self>> {
        let path = Self::path_for_word(dir, word);
        if path.exists() {
            Self::from_file(&path).map(Some)
        } else {
            tracing::warn!("Weight file {:?} not found, using uniform weights", path);
            Ok(None)
        }
    }

    /// Compute weights from whitespace-tokenized context lines.
    ///
    /// Identical lines are counted once. Words seen fewer than `min_count`
    /// times, or unknown to the provider, get no entry.
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
    pub fn build<I, S>(contexts: I, provider: &dyn EmbeddingProvider, min_count: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut counts: HashMap<String, usize> = HashMap::new();
        for line in contexts {
            let line = line.as_ref().trim();
            if !seen.insert(line.to_string()) {
                continue;
            }
            for w in line.split_whitespace() {
                *counts.entry(w.to_string()).or_insert(0) += 1;
            }
        }

        let contexts_count: usize = counts.values().sum();
        let total_count = provider.total_count();
        let words: Vec<String> = counts.keys().cloned().collect();
        let global_counts = provider.counts(&words);

        let mut rows: Vec<(String, usize, u64)> = words
            .into_iter()
            .zip(global_counts)
            .filter_map(|(w, gc)| {
                let c = counts[&w];
                match gc {
                    Some(gc) if c >= min_count && gc > 0 => Some((w, c, gc)),
                    _ => None,
                }
            })
            .collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let scale = if total_count == 0 {
            0.0
        } else {
            contexts_count as f64 / total_count as f64
        };
        let entries = rows.into_iter().map(|(w, c, gc)| {
            let predicted = gc as f64 * scale;
            let weight = if predicted > 0.0 {
                (c as f64 / predicted).ln().max(0.0)
            } else {
                0.0
            };
            (w, weight as f32)
        });
        let table = Self::from_entries(entries);
        tracing::debug!(
            "Built weighting table with {} entries from {} context tokens",
            table.len(),
            contexts_count
        );
        table
    }

    /// Write the table as `word weight` lines.
    ///
    /// # Errors
    ///
    /// IO errors.
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut out = BufWriter::new(File::create(path.as_ref())?);
        for (word, weight) in &self.entries {
            writeln!(out, "{word} {weight}")?;
        }
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::InMemoryEmbeddings;
    use std::io::Write as _;

    fn provider() -> InMemoryEmbeddings {
        let mut emb = InMemoryEmbeddings::new(1);
        emb.set_count("robbery", 10);
        emb.set_count("the", 9_000);
        emb.set_count("rare", 10);
        emb.set_count("filler", 980);
        emb
    }

    #[test]
    fn test_build_weights_local_vs_global() {
        let contexts = [
            "the robbery rare",
            "the robbery",
            "the robbery",
            "the robbery rare",
            "robbery the",
            "robbery the robbery",
            "the robbery",
        ];
        let table = WeightingTable::build(contexts, &provider(), 4);

        // "rare" is seen once after duplicate lines are dropped.
        assert!(table.iter().all(|(w, _)| w != "rare"));
        // "robbery" is far more frequent locally than globally.
        assert!(table.get("robbery") > 1.0);
        // "the" is over-represented globally, clamped at zero.
        assert_eq!(table.get("the"), 0.0);
        assert!(table.iter().all(|(_, x)| x >= 0.0));
    }

    #[test]
    fn test_from_file_and_missing_default() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "robbery 1.5").unwrap();
        writeln!(file, "heist 0.25").unwrap();
        let table = WeightingTable::from_file(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("heist"), 0.25);
        assert_eq!(table.get("absent"), 1.0);
    }

    #[test]
    fn test_from_file_malformed_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "robbery 1.5").unwrap();
        writeln!(file, "robbery").unwrap();
        let err = WeightingTable::from_file(file.path()).unwrap_err();
        assert!(matches!(err, WsdError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_load_for_word_absent_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WeightingTable::load_for_word(dir.path(), "bank").unwrap().is_none());
    }

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let table = WeightingTable::from_entries([("robbery", 2.0), ("heist", 0.5)]);
        let path = WeightingTable::path_for_word(dir.path(), "bank");
        table.write_to(&path).unwrap();
        let loaded = WeightingTable::load_for_word(dir.path(), "bank").unwrap().unwrap();
        assert_eq!(loaded, table);
    }
}
