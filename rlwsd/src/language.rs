//! Language resources: tokenization, lemmatization and stopwords.
//!
//! A [`LanguageResources`] handle is built once per run and passed to every
//! component that needs it. Lemmatization results are memoized per input
//! string for the lifetime of the handle; the cache is unbounded.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::rc::Rc;

use crate::error::{Result, WsdError};

/// Whether a token looks like a word: its first character is alphanumeric or `_`.
///
/// ```
/// use rlwsd::language::is_word_like;
///
/// assert!(is_word_like("bank"));
/// assert!(is_word_like("1990s"));
/// assert!(!is_word_like(","));
/// assert!(!is_word_like(""));
/// ```
#[must_use]
pub fn is_word_like(token: &str) -> bool {
    token
        .chars()
        .next()
        .is_some_and(|c| c.is_alphanumeric() || c == '_')
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Stopwords, lemma dictionary and the lemmatization cache.
#[derive(Debug, Default)]
pub struct LanguageResources {
    stopwords: HashSet<String>,
    lemmas: HashMap<String, String>,
    cache: RefCell<HashMap<String, Rc<[String]>>>,
}

impl LanguageResources {
    /// Resources with no stopwords and identity lemmatization.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stopword set.
    #[must_use]
    pub fn with_stopwords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.stopwords = words
            .into_iter()
            .map(|w| w.as_ref().trim().to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        self
    }

    /// Replace the lemma dictionary (`form -> lemma`).
    #[must_use]
    pub fn with_lemmas(mut self, lemmas: HashMap<String, String>) -> Self {
        self.lemmas = lemmas;
        self.cache.borrow_mut().clear();
        self
    }

    /// Load a stopword file: one word per line, `|` starts a comment.
    ///
    /// # Errors
    ///
    /// IO errors.
    pub fn load_stopwords<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut words = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let word = line.split('|').next().unwrap_or_default();
            words.push(word.to_string());
        }
        let resources = self.with_stopwords(words);
        tracing::debug!("Loaded {} stopwords", resources.stopwords.len());
        Ok(resources)
    }

    /// Load a lemma dictionary: `form lemma` per line.
    ///
    /// # Errors
    ///
    /// IO errors and lines that do not have exactly two fields.
    pub fn load_lemmas<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let mut lemmas = HashMap::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                [] => {}
                [form, lemma] => {
                    lemmas.insert(form.to_lowercase(), lemma.to_lowercase());
                }
                _ => return Err(WsdError::parse(i + 1, "expected `form lemma`")),
            }
        }
        Ok(self.with_lemmas(lemmas))
    }

    /// Whether `word` is a stopword.
    #[must_use]
    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(word)
    }

    /// Number of stopwords.
    #[must_use]
    pub fn stopword_count(&self) -> usize {
        self.stopwords.len()
    }

    /// Lowercase, tokenize and lemmatize `text`.
    ///
    /// Word runs are mapped through the lemma dictionary; punctuation runs are
    /// kept as separate tokens so callers can filter them with [`is_word_like`].
    ///
    /// ```
    /// use rlwsd::LanguageResources;
    ///
    /// let lang = LanguageResources::new();
    /// assert_eq!(lang.lemmatize("The Bank, robbed!"), vec!["the", "bank", ",", "robbed", "!"]);
    /// ```
    pub fn lemmatize(&self, text: &str) -> Vec<String> {
        if let Some(hit) = self.cache.borrow().get(text) {
            return hit.to_vec();
        }
        let tokens: Rc<[String]> = tokenize(text)
            .into_iter()
            .map(|t| match self.lemmas.get(&t) {
                Some(lemma) => lemma.clone(),
                None => t,
            })
            .collect();
        self.cache
            .borrow_mut()
            .insert(text.to_string(), Rc::clone(&tokens));
        tokens.to_vec()
    }

    /// Lemmatize and keep only word-like tokens.
    pub fn words(&self, text: &str) -> Vec<String> {
        self.lemmatize(text)
            .into_iter()
            .filter(|t| is_word_like(t))
            .collect()
    }

    /// Number of memoized inputs.
    #[must_use]
    pub fn cached_entries(&self) -> usize {
        self.cache.borrow().len()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_is_word = false;

    for c in lower.chars() {
        if c.is_whitespace() {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
            continue;
        }
        let is_word = is_word_char(c);
        if !current.is_empty() && is_word != current_is_word {
            tokens.push(std::mem::take(&mut current));
        }
        current_is_word = is_word;
        current.push(c);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_tokenize_splits_punctuation() {
        assert_eq!(tokenize("Hello,world ...ok"), vec!["hello", ",", "world", "...", "ok"]);
    }

    #[test]
    fn test_lemmatize_uses_dictionary_and_cache() {
        let mut lemmas = HashMap::new();
        lemmas.insert("banks".to_string(), "bank".to_string());
        let lang = LanguageResources::new().with_lemmas(lemmas);

        assert_eq!(lang.lemmatize("Banks"), vec!["bank"]);
        assert_eq!(lang.cached_entries(), 1);
        assert_eq!(lang.lemmatize("Banks"), vec!["bank"]);
        assert_eq!(lang.cached_entries(), 1);
    }

    #[test]
    fn test_words_filters_punctuation() {
        let lang = LanguageResources::new();
        assert_eq!(lang.words("a -- b."), vec!["a", "b"]);
    }

    #[test]
    fn test_load_stopwords_strips_comments() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "The | article").unwrap();
        writeln!(file, "   ").unwrap();
        writeln!(file, "and").unwrap();
        let lang = LanguageResources::new().load_stopwords(file.path()).unwrap();
        assert_eq!(lang.stopword_count(), 2);
        assert!(lang.is_stopword("the"));
        assert!(lang.is_stopword("and"));
    }

    #[test]
    fn test_load_lemmas_rejects_bad_line() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "banks bank").unwrap();
        writeln!(file, "broken").unwrap();
        let err = LanguageResources::new().load_lemmas(file.path()).unwrap_err();
        assert!(matches!(err, WsdError::Parse { line: 2, .. }));
    }
}
