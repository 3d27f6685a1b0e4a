//! Dictionary sense inventories.
//!
//! An inventory is read from the dictionary pipeline's JSON record:
//!
//! ```json
//! {"word": "bank", "meanings": [
//!     {"id": "1", "name": "financial institution", "contexts": ["a bank robbery"]},
//!     {"id": "2", "name": "river side", "contexts": ["the bank of the river"]}
//! ]}
//! ```
//!
//! Ids may be JSON strings or integers. The description is read from
//! `description`, `name` or `meaning`, whichever is present.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::context::ContextVectorBuilder;
use crate::error::{Result, WsdError};
use crate::language::LanguageResources;
use crate::sense::{Context, LabeledExample, SenseId};
use crate::vector::{add_scaled, ContextVector};

/// One dictionary meaning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meaning {
    /// Sense id.
    #[serde(deserialize_with = "sense_id_from_any")]
    pub id: SenseId,
    /// Human-readable description.
    #[serde(default, alias = "name", alias = "meaning")]
    pub description: String,
    /// Example sentences using the word in this sense.
    #[serde(default)]
    pub contexts: Vec<String>,
}

fn sense_id_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<SenseId, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }
    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => SenseId::new(s),
        RawId::Number(n) => SenseId::new(n.to_string()),
    })
}

/// Sense inventory of one word.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenseInventory {
    /// The word.
    pub word: String,
    /// Meanings in dictionary order.
    pub meanings: Vec<Meaning>,
}

impl SenseInventory {
    /// Parse an inventory from JSON, dropping reserved meanings.
    ///
    /// # Errors
    ///
    /// Invalid JSON, or [`WsdError::Inventory`] for duplicate ids or an
    /// inventory without senses.
    pub fn from_json(json: &str) -> Result<Self> {
        let mut inventory: Self = serde_json::from_str(json)?;
        inventory.meanings.retain(|m| !m.id.is_reserved());
        inventory.validate()?;
        Ok(inventory)
    }

    /// Read an inventory file.
    ///
    /// # Errors
    ///
    /// See [`SenseInventory::from_json`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let inventory = Self::from_json(&content)?;
        tracing::debug!(
            "Loaded {} meanings for {:?} from {:?}",
            inventory.meanings.len(),
            inventory.word,
            path.as_ref()
        );
        Ok(inventory)
    }

    fn validate(&self) -> Result<()> {
        if self.meanings.is_empty() {
            return Err(WsdError::Inventory(format!("{}: no senses", self.word)));
        }
        let mut seen = HashSet::new();
        for meaning in &self.meanings {
            if !seen.insert(&meaning.id) {
                return Err(WsdError::Inventory(format!(
                    "{}: duplicate sense id {}",
                    self.word, meaning.id
                )));
            }
        }
        Ok(())
    }

    /// Sense id to description.
    #[must_use]
    pub fn senses(&self) -> BTreeMap<SenseId, String> {
        self.meanings
            .iter()
            .map(|m| (m.id.clone(), m.description.clone()))
            .collect()
    }

    /// Look up a meaning.
    #[must_use]
    pub fn get(&self, id: &SenseId) -> Option<&Meaning> {
        self.meanings.iter().find(|m| &m.id == id)
    }

    /// Number of senses.
    #[must_use]
    pub fn len(&self) -> usize {
        self.meanings.len()
    }

    /// Whether there are no senses.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.meanings.is_empty()
    }

    /// Turn dictionary example sentences into labeled contexts.
    ///
    /// Each sentence is lemmatized and split around the first occurrence of
    /// the target lemma. Sentences without it are skipped.
    #[must_use]
    pub fn dictionary_examples(&self, language: &LanguageResources) -> Vec<LabeledExample> {
        let target = target_lemma(language, &self.word);
        let mut examples = Vec::new();
        for meaning in &self.meanings {
            for sentence in &meaning.contexts {
                let words = language.words(sentence);
                let Some(idx) = words.iter().position(|w| *w == target) else {
                    tracing::debug!("{:?} not found in example {:?}", target, sentence);
                    continue;
                };
                let before = words[..idx].join(" ");
                let after = words[idx + 1..]
                    .iter()
                    .filter(|w| **w != target)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" ");
                examples.push(LabeledExample::new(
                    Context::new(before, target.clone(), after),
                    meaning.id.clone(),
                ));
            }
        }
        examples
    }

    /// Per-sense center: the normalized sum of the sense's example vectors.
    ///
    /// Returned in dictionary order. Senses whose examples yield no vector
    /// are left out with a warning.
    #[must_use]
    pub fn sense_centers(&self, builder: &ContextVectorBuilder<'_>) -> Vec<(SenseId, ContextVector)> {
        let target = target_lemma(builder.language(), &self.word);
        let dim = builder.embeddings().dimension();
        let mut centers = Vec::with_capacity(self.meanings.len());
        for meaning in &self.meanings {
            let mut sum = vec![0.0f32; dim];
            for sentence in &meaning.contexts {
                let tokens = builder.language().words(sentence);
                if let Some(v) = builder.vector_from_tokens(&target, &tokens) {
                    add_scaled(&mut sum, v.as_slice(), 1.0);
                }
            }
            match ContextVector::normalize(sum) {
                Some(center) => centers.push((meaning.id.clone(), center)),
                None => tracing::warn!(
                    "Sense {} of {:?} has no example vectors",
                    meaning.id,
                    self.word
                ),
            }
        }
        centers
    }
}

fn target_lemma(language: &LanguageResources, word: &str) -> String {
    language
        .words(word)
        .into_iter()
        .next()
        .unwrap_or_else(|| word.trim().to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContextVectorOptions, WeightingMode};
    use crate::embedding::InMemoryEmbeddings;

    const BANK: &str = r#"{
        "word": "bank",
        "meanings": [
            {"id": 1, "name": "financial institution",
             "contexts": ["The bank robbery.", "A heist at the bank"]},
            {"id": "2", "description": "river side",
             "contexts": ["The river bank was wet", "no target here"]},
            {"id": "0", "name": "undefined", "contexts": []}
        ]
    }"#;

    #[test]
    fn test_parse_mixed_ids_and_reserved() {
        let inv = SenseInventory::from_json(BANK).unwrap();
        assert_eq!(inv.len(), 2);
        assert_eq!(inv.meanings[0].id, SenseId::from("1"));
        assert_eq!(inv.get(&SenseId::from("2")).unwrap().description, "river side");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let json = r#"{"word": "w", "meanings": [{"id": 1}, {"id": "1"}]}"#;
        assert!(matches!(
            SenseInventory::from_json(json),
            Err(WsdError::Inventory(_))
        ));
    }

    #[test]
    fn test_dictionary_examples_split_on_target() {
        let inv = SenseInventory::from_json(BANK).unwrap();
        let lang = LanguageResources::new();
        let examples = inv.dictionary_examples(&lang);
        assert_eq!(examples.len(), 3);
        assert_eq!(examples[0].context, Context::new("the", "bank", "robbery"));
        assert_eq!(examples[1].context, Context::new("a heist at the", "bank", ""));
        assert_eq!(examples[2].sense, SenseId::from("2"));
        assert_eq!(examples[2].context, Context::new("the river", "bank", "was wet"));
    }

    #[test]
    fn test_sense_centers_are_unit() {
        let mut emb = InMemoryEmbeddings::new(2);
        emb.insert("robbery", vec![1.0, 0.0]).unwrap();
        emb.insert("heist", vec![0.9, 0.1]).unwrap();
        emb.insert("river", vec![0.0, 1.0]).unwrap();
        let lang = LanguageResources::new();
        let options = ContextVectorOptions::default().with_weighting(WeightingMode::Uniform);
        let builder = ContextVectorBuilder::new(&emb, &lang, options);

        let inv = SenseInventory::from_json(BANK).unwrap();
        let centers = inv.sense_centers(&builder);
        assert_eq!(centers.len(), 2);
        assert!(centers[0].1.as_slice()[0] > 0.9);
        assert!((centers[1].1.as_slice()[1] - 1.0).abs() < 1e-6);
    }
}
