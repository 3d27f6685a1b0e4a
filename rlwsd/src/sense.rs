//! Sense identifiers, contexts and labeled examples.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of one sense within a word's inventory.
///
/// Ordering is numeric when both ids are integers, so `"2" < "10"`.
///
/// ```
/// use rlwsd::SenseId;
///
/// let mut ids = vec![SenseId::from("10"), SenseId::from("2"), SenseId::from("1")];
/// ids.sort();
/// assert_eq!(ids, vec![SenseId::from("1"), SenseId::from("2"), SenseId::from("10")]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenseId(String);

impl SenseId {
    /// The "undefined" label used by annotators.
    pub const UNDEFINED: &'static str = "0";
    /// The "other" marker.
    pub const OTHER: &'static str = "other";

    /// Create a sense id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into().trim().to_string())
    }

    /// Borrow as `&str`.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id is excluded from training and metrics.
    ///
    /// `"0"` (undefined) and `"other"` are always reserved.
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        self.0 == Self::UNDEFINED || self.0.eq_ignore_ascii_case(Self::OTHER)
    }

    fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl Ord for SenseId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.numeric(), other.numeric()) {
            (Some(a), Some(b)) => a.cmp(&b).then_with(|| self.0.cmp(&other.0)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for SenseId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for SenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SenseId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SenseId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

/// One occurrence of a target word: raw text before it, the word, raw text after it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Context {
    /// Text preceding the target word.
    pub before: String,
    /// The target word as written.
    pub word: String,
    /// Text following the target word.
    pub after: String,
}

impl Context {
    /// Create a context.
    pub fn new(before: impl Into<String>, word: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            before: before.into(),
            word: word.into(),
            after: after.into(),
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.before, self.word, self.after)
    }
}

/// A context with its gold sense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledExample {
    /// The occurrence.
    pub context: Context,
    /// Annotated sense.
    pub sense: SenseId,
}

impl LabeledExample {
    /// Create a labeled example.
    pub fn new(context: Context, sense: impl Into<SenseId>) -> Self {
        Self {
            context,
            sense: sense.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_ids() {
        assert!(SenseId::from("0").is_reserved());
        assert!(SenseId::from("Other").is_reserved());
        assert!(!SenseId::from("3").is_reserved());
    }

    #[test]
    fn test_mixed_ordering() {
        let mut ids: Vec<SenseId> = ["b", "3", "a", "1"].into_iter().map(SenseId::from).collect();
        ids.sort();
        let ids: Vec<&str> = ids.iter().map(SenseId::as_str).collect();
        assert_eq!(ids, vec!["1", "3", "a", "b"]);
    }

    #[test]
    fn test_context_display() {
        let ctx = Context::new("the", "bank", "robbery");
        assert_eq!(ctx.to_string(), "the [bank] robbery");
    }
}
