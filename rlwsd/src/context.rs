//! Context vector construction.
//!
//! A context `(before, word, after)` becomes a single unit vector:
//!
//! 1. lemmatize the target and both sides,
//! 2. keep word-like tokens that are not the target itself,
//! 3. truncate each side to the window, nearest tokens first,
//! 4. optionally drop stopwords,
//! 5. look up embeddings in one batch, dropping unknown tokens,
//! 6. weight, average and L2-normalize.
//!
//! If no token survives the result is `None`.

use crate::config::{ContextVectorOptions, VectorLayout, WeightingMode};
use crate::embedding::EmbeddingProvider;
use crate::language::{is_word_like, LanguageResources};
use crate::sense::Context;
use crate::vector::{add_scaled, cosine_similarity, ContextVector};
use crate::weights::WeightingTable;

/// Per-token weighting applied during aggregation.
#[derive(Debug, Clone, Default)]
pub enum Weighting {
    /// Every token weighs 1.0.
    #[default]
    Uniform,
    /// Look tokens up in a weighting table.
    Table(WeightingTable),
    /// `max(0, cos(token, target))`, 1.0 when the target is unknown.
    TargetSimilarity,
}

impl Weighting {
    /// Resolve a configured mode against an optional table.
    ///
    /// `Table` without a table degrades to `Uniform`.
    #[must_use]
    pub fn from_mode(mode: WeightingMode, table: Option<WeightingTable>) -> Self {
        match (mode, table) {
            (WeightingMode::Uniform, _) | (WeightingMode::Table, None) => Self::Uniform,
            (WeightingMode::Table, Some(table)) => Self::Table(table),
            (WeightingMode::Similarity, _) => Self::TargetSimilarity,
        }
    }
}

/// Filtered tokens of one context, split around the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextTokens {
    /// Normalized target word.
    pub target: String,
    /// Tokens before the target, in text order.
    pub before: Vec<String>,
    /// Tokens after the target, in text order.
    pub after: Vec<String>,
}

impl ContextTokens {
    /// Before and after tokens concatenated.
    #[must_use]
    pub fn all(&self) -> Vec<String> {
        self.before.iter().chain(&self.after).cloned().collect()
    }

    /// Number of tokens on both sides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.before.len() + self.after.len()
    }

    /// Whether both sides are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// Builds [`ContextVector`]s from contexts.
///
/// Borrows the embedding provider and language resources for the duration of
/// a run.
pub struct ContextVectorBuilder<'a> {
    embeddings: &'a dyn EmbeddingProvider,
    language: &'a LanguageResources,
    options: ContextVectorOptions,
    weighting: Weighting,
}

impl<'a> ContextVectorBuilder<'a> {
    /// Create a builder with uniform weighting.
    pub fn new(
        embeddings: &'a dyn EmbeddingProvider,
        language: &'a LanguageResources,
        options: ContextVectorOptions,
    ) -> Self {
        Self {
            embeddings,
            language,
            options,
            weighting: Weighting::Uniform,
        }
    }

    /// Set the weighting.
    #[must_use]
    pub fn with_weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    /// Builder options.
    #[must_use]
    pub fn options(&self) -> &ContextVectorOptions {
        &self.options
    }

    /// Active weighting.
    #[must_use]
    pub fn weighting(&self) -> &Weighting {
        &self.weighting
    }

    /// The embedding provider.
    #[must_use]
    pub fn embeddings(&self) -> &'a dyn EmbeddingProvider {
        self.embeddings
    }

    /// The language resources.
    #[must_use]
    pub fn language(&self) -> &'a LanguageResources {
        self.language
    }

    /// Normalize a target word to its first lemma.
    #[must_use]
    pub fn normalize_target(&self, word: &str) -> String {
        self.language
            .words(word)
            .into_iter()
            .next()
            .unwrap_or_else(|| word.trim().to_lowercase())
    }

    /// Apply tokenization, filtering, windowing and stopword removal.
    #[must_use]
    pub fn tokens(&self, context: &Context) -> ContextTokens {
        let target = self.normalize_target(&context.word);
        let side = |text: &str| -> Vec<String> {
            self.language
                .lemmatize(text)
                .into_iter()
                .filter(|w| is_word_like(w) && *w != target)
                .collect()
        };
        let mut before = side(&context.before);
        let mut after = side(&context.after);

        if let Some(window) = self.options.window {
            if before.len() > window {
                before.drain(..before.len() - window);
            }
            after.truncate(window);
        }
        if self.options.exclude_stopwords {
            before.retain(|w| !self.language.is_stopword(w));
            after.retain(|w| !self.language.is_stopword(w));
        }
        ContextTokens {
            target,
            before,
            after,
        }
    }

    /// Averaged context vector.
    #[must_use]
    pub fn build(&self, context: &Context) -> Option<ContextVector> {
        self.build_with(VectorLayout::Averaged, context)
            .map(|(v, _)| v)
    }

    /// Order-preserving context vector of dimension `2 * window * dim`.
    ///
    /// Before-tokens fill the first `window` slots right-aligned, after-tokens
    /// fill the last `window` slots left-aligned, empty slots are zeros.
    /// Returns `None` without a window.
    #[must_use]
    pub fn build_ordered(&self, context: &Context) -> Option<ContextVector> {
        self.build_with(VectorLayout::Ordered, context)
            .map(|(v, _)| v)
    }

    /// Build with the given layout, also returning the number of tokens that
    /// had an embedding.
    #[must_use]
    pub fn build_with(
        &self,
        layout: VectorLayout,
        context: &Context,
    ) -> Option<(ContextVector, usize)> {
        let tokens = self.tokens(context);
        match layout {
            VectorLayout::Averaged => self.average(&tokens.target, &tokens.all()),
            VectorLayout::Ordered => self.concatenate(&tokens),
        }
    }

    /// Averaged vector of pre-tokenized context words.
    ///
    /// The target word is removed, stopwords are dropped when configured; no
    /// lemmatization or windowing is applied.
    #[must_use]
    pub fn vector_from_tokens(&self, target: &str, tokens: &[String]) -> Option<ContextVector> {
        let words: Vec<String> = tokens
            .iter()
            .filter(|w| w.as_str() != target)
            .filter(|w| !(self.options.exclude_stopwords && self.language.is_stopword(w)))
            .cloned()
            .collect();
        self.average(target, &words).map(|(v, _)| v)
    }

    fn target_vector(&self, target: &str) -> Option<Vec<f32>> {
        match self.weighting {
            Weighting::TargetSimilarity => self.embeddings.vector(target),
            _ => None,
        }
    }

    fn weight(&self, word: &str, vector: &[f32], target: Option<&[f32]>) -> f32 {
        match &self.weighting {
            Weighting::Uniform => 1.0,
            Weighting::Table(table) => table.get(word),
            Weighting::TargetSimilarity => {
                target.map_or(1.0, |t| cosine_similarity(vector, t).max(0.0))
            }
        }
    }

    fn average(&self, target: &str, words: &[String]) -> Option<(ContextVector, usize)> {
        let target_vec = self.target_vector(target);
        let mut acc = vec![0.0f32; self.embeddings.dimension()];
        let mut found = 0usize;
        for (word, vector) in words.iter().zip(self.embeddings.vectors(words)) {
            let Some(vector) = vector else {
                continue;
            };
            let weight = self.weight(word, &vector, target_vec.as_deref());
            add_scaled(&mut acc, &vector, weight);
            found += 1;
        }
        if found == 0 {
            return None;
        }
        // The mean's 1/n factor vanishes under normalization.
        ContextVector::normalize(acc).map(|v| (v, found))
    }

    fn concatenate(&self, tokens: &ContextTokens) -> Option<(ContextVector, usize)> {
        let window = self.options.window?;
        let dim = self.embeddings.dimension();
        let target_vec = self.target_vector(&tokens.target);
        let mut out = vec![0.0f32; 2 * window * dim];
        let mut found = 0usize;

        let before_vectors = self.embeddings.vectors(&tokens.before);
        let offset = window - tokens.before.len().min(window);
        for (slot, (word, vector)) in tokens.before.iter().zip(before_vectors).enumerate() {
            if let Some(vector) = vector {
                let weight = self.weight(word, &vector, target_vec.as_deref());
                let start = (offset + slot) * dim;
                add_scaled(&mut out[start..start + dim], &vector, weight);
                found += 1;
            }
        }

        let after_vectors = self.embeddings.vectors(&tokens.after);
        for (slot, (word, vector)) in tokens.after.iter().zip(after_vectors).enumerate() {
            if let Some(vector) = vector {
                let weight = self.weight(word, &vector, target_vec.as_deref());
                let start = (window + slot) * dim;
                add_scaled(&mut out[start..start + dim], &vector, weight);
                found += 1;
            }
        }

        if found == 0 {
            return None;
        }
        ContextVector::normalize(out).map(|v| (v, found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::InMemoryEmbeddings;
    use crate::vector::{norm, NORM_EPSILON};

    fn embeddings() -> InMemoryEmbeddings {
        let mut emb = InMemoryEmbeddings::new(2);
        emb.insert("bank", vec![0.7, 0.7]).unwrap();
        emb.insert("robbery", vec![1.0, 0.0]).unwrap();
        emb.insert("river", vec![0.0, 1.0]).unwrap();
        emb.insert("the", vec![0.5, 0.5]).unwrap();
        emb
    }

    fn options() -> ContextVectorOptions {
        ContextVectorOptions::default().with_weighting(WeightingMode::Uniform)
    }

    #[test]
    fn test_tokens_filters_target_punctuation_and_window() {
        let emb = embeddings();
        let lang = LanguageResources::new().with_stopwords(["the"]);
        let builder = ContextVectorBuilder::new(&emb, &lang, options().with_window(Some(2)));

        let ctx = Context::new("one two , the bank three", "Bank", "four five six");
        let tokens = builder.tokens(&ctx);
        assert_eq!(tokens.target, "bank");
        // window keeps "the three", then the stopword goes
        assert_eq!(tokens.before, vec!["three"]);
        assert_eq!(tokens.after, vec!["four", "five"]);
    }

    #[test]
    fn test_build_is_unit_norm() {
        let emb = embeddings();
        let lang = LanguageResources::new();
        let builder = ContextVectorBuilder::new(&emb, &lang, options());

        let v = builder
            .build(&Context::new("the", "bank", "robbery"))
            .unwrap();
        assert!((norm(v.as_slice()) - 1.0).abs() < NORM_EPSILON);
    }

    #[test]
    fn test_build_undefined_when_nothing_known() {
        let emb = embeddings();
        let lang = LanguageResources::new();
        let builder = ContextVectorBuilder::new(&emb, &lang, options());
        assert!(builder.build(&Context::new("zzz", "bank", "qqq , !")).is_none());
        // the target itself does not count
        assert!(builder.build(&Context::new("bank", "bank", "")).is_none());
    }

    #[test]
    fn test_table_weighting_shifts_vector() {
        let emb = embeddings();
        let lang = LanguageResources::new();
        let table = WeightingTable::from_entries([("robbery", 3.0), ("river", 0.0)]);
        let builder = ContextVectorBuilder::new(&emb, &lang, options())
            .with_weighting(Weighting::Table(table));

        let v = builder
            .build(&Context::new("river", "bank", "robbery"))
            .unwrap();
        assert!((v.as_slice()[0] - 1.0).abs() < 1e-6);
        assert!(v.as_slice()[1].abs() < 1e-6);
    }

    #[test]
    fn test_similarity_weighting_is_non_negative() {
        let mut emb = embeddings();
        emb.insert("opposite", vec![-0.7, -0.7]).unwrap();
        let lang = LanguageResources::new();
        let builder = ContextVectorBuilder::new(&emb, &lang, options())
            .with_weighting(Weighting::TargetSimilarity);

        // "opposite" has negative similarity to "bank", so it weighs zero.
        let v = builder
            .build(&Context::new("opposite", "bank", "robbery"))
            .unwrap();
        assert!((v.as_slice()[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_ordered_layout_positions() {
        let emb = embeddings();
        let lang = LanguageResources::new();
        let builder = ContextVectorBuilder::new(&emb, &lang, options().with_window(Some(2)));

        let (v, found) = builder
            .build_with(VectorLayout::Ordered, &Context::new("robbery", "bank", "river"))
            .unwrap();
        assert_eq!(found, 2);
        assert_eq!(v.dim(), 2 * 2 * 2);
        let s = 1.0 / 2.0f32.sqrt();
        let expected = [0.0, 0.0, s, 0.0, 0.0, s, 0.0, 0.0];
        for (a, b) in v.as_slice().iter().zip(expected) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ordered_needs_window() {
        let emb = embeddings();
        let lang = LanguageResources::new();
        let builder = ContextVectorBuilder::new(&emb, &lang, options().with_window(None));
        assert!(builder.build_ordered(&Context::new("robbery", "bank", "")).is_none());
    }

    #[test]
    fn test_vector_from_tokens_skips_target() {
        let emb = embeddings();
        let lang = LanguageResources::new();
        let builder = ContextVectorBuilder::new(&emb, &lang, options());
        let tokens: Vec<String> = ["bank", "river"].iter().map(|s| s.to_string()).collect();
        let v = builder.vector_from_tokens("bank", &tokens).unwrap();
        assert_eq!(v.as_slice(), &[0.0, 1.0]);
    }
}
