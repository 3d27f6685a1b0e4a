//! Dense vector helpers and the unit-norm [`ContextVector`].
//!
//! All similarity in this crate is cosine closeness. A [`ContextVector`] can
//! only be obtained through normalization, so "no vector" is always
//! `Option::None` and never a zero vector.

use serde::{Deserialize, Serialize};

/// Tolerance used when checking unit norm.
pub const NORM_EPSILON: f32 = 1e-4;

/// A unit-normalized context representation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f32>", into = "Vec<f32>")]
pub struct ContextVector(Vec<f32>);

impl ContextVector {
    /// Normalize `values` to unit length.
    ///
    /// Returns `None` for empty, zero-length or non-finite input.
    ///
    /// ```
    /// use rlwsd::ContextVector;
    ///
    /// let v = ContextVector::normalize(vec![3.0, 4.0]).unwrap();
    /// assert!((v.as_slice()[0] - 0.6).abs() < 1e-6);
    /// assert!(ContextVector::normalize(vec![0.0, 0.0]).is_none());
    /// ```
    #[must_use]
    pub fn normalize(mut values: Vec<f32>) -> Option<Self> {
        let len = norm(&values);
        if values.is_empty() || !len.is_finite() || len == 0.0 {
            return None;
        }
        for x in &mut values {
            *x /= len;
        }
        Some(Self(values))
    }

    /// Dimension of the vector.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.0.len()
    }

    /// Borrow the components.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Consume into the raw components.
    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }

    /// Cosine closeness to another unit vector.
    #[must_use]
    pub fn closeness(&self, other: &Self) -> f32 {
        dot(&self.0, &other.0)
    }
}

impl TryFrom<Vec<f32>> for ContextVector {
    type Error = String;

    fn try_from(values: Vec<f32>) -> std::result::Result<Self, Self::Error> {
        Self::normalize(values).ok_or_else(|| "context vector must have non-zero norm".to_string())
    }
}

impl From<ContextVector> for Vec<f32> {
    fn from(v: ContextVector) -> Self {
        v.0
    }
}

impl AsRef<[f32]> for ContextVector {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Dot product over the common prefix of `a` and `b`.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// L2 norm.
#[must_use]
pub fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity in `[-1, 1]`; 0 when either side has zero norm.
///
/// ```
/// use rlwsd::vector::cosine_similarity;
///
/// let sim = cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]);
/// assert!((sim - 1.0).abs() < 1e-6);
/// ```
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = norm(a);
    let norm_b = norm(b);
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

/// Euclidean distance.
#[must_use]
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// `acc += scale * v`, component-wise.
pub fn add_scaled(acc: &mut [f32], v: &[f32], scale: f32) {
    for (a, x) in acc.iter_mut().zip(v) {
        *a += scale * x;
    }
}

/// Component-wise mean of equally sized vectors, `None` when empty.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean<'a, I>(vectors: I) -> Option<Vec<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let mut iter = vectors.into_iter();
    let mut acc = iter.next()?.to_vec();
    let mut n = 1usize;
    for v in iter {
        add_scaled(&mut acc, v, 1.0);
        n += 1;
    }
    for x in &mut acc {
        *x /= n as f32;
    }
    Some(acc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_has_unit_norm() {
        let v = ContextVector::normalize(vec![1.0, -2.0, 2.0]).unwrap();
        assert!((norm(v.as_slice()) - 1.0).abs() < NORM_EPSILON);
    }

    #[test]
    fn test_normalize_rejects_degenerate() {
        assert!(ContextVector::normalize(Vec::new()).is_none());
        assert!(ContextVector::normalize(vec![0.0; 4]).is_none());
        assert!(ContextVector::normalize(vec![f32::NAN, 1.0]).is_none());
    }

    #[test]
    fn test_closeness_is_symmetric() {
        let a = ContextVector::normalize(vec![0.3, 0.9, -0.2]).unwrap();
        let b = ContextVector::normalize(vec![-0.5, 0.1, 0.7]).unwrap();
        assert_eq!(a.closeness(&b), b.closeness(&a));
        assert_eq!(
            cosine_similarity(a.as_slice(), b.as_slice()),
            cosine_similarity(b.as_slice(), a.as_slice())
        );
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_mean() {
        let a = [1.0f32, 2.0];
        let b = [3.0f32, 4.0];
        let m = mean([&a[..], &b[..]]).unwrap();
        assert_eq!(m, vec![2.0, 3.0]);
        assert!(mean(std::iter::empty::<&[f32]>()).is_none());
    }

    #[test]
    fn test_serde_renormalizes() {
        let v: ContextVector = serde_json::from_str("[2.0, 0.0]").unwrap();
        assert_eq!(v.as_slice(), &[1.0, 0.0]);
        assert!(serde_json::from_str::<ContextVector>("[0.0, 0.0]").is_err());
    }
}
