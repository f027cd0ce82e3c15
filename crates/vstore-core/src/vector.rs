use crate::error::{VdbError, VdbResult};
use serde::{Deserialize, Serialize};

/// A dense, finite-valued embedding vector with runtime dimension.
///
/// Dimension is fixed per library, not per type: libraries choose `D` at
/// creation time, so the vector itself carries no compile-time length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding(Vec<f64>);

impl Embedding {
    /// Validates every component is finite (not NaN, not +/-inf).
    pub fn new(coords: Vec<f64>) -> VdbResult<Self> {
        if coords.iter().any(|c| !c.is_finite()) {
            return Err(VdbError::InvalidArgument(
                "embedding contains a non-finite component".into(),
            ));
        }
        Ok(Self(coords))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<f64> {
        self.0
    }

    pub fn require_dim(&self, expected: usize) -> VdbResult<()> {
        if self.0.len() != expected {
            return Err(VdbError::DimensionMismatch {
                expected,
                got: self.0.len(),
            });
        }
        Ok(())
    }
}

/// Distance metric selectable per library. Lower is always better,
/// consistent with the negated dot-product convention below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Metric {
    Cosine,
    Euclidean,
    Dot,
}

impl Metric {
    pub fn distance(self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Cosine => cosine(a, b),
            Metric::Euclidean => euclidean(a, b),
            Metric::Dot => dot(a, b),
        }
    }
}

/// `1 - cos(theta)`. Zero-norm vectors are defined to be maximally distant
/// (distance 1) rather than producing NaN.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut dot_ab = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for i in 0..a.len() {
        dot_ab += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot_ab / (norm_a.sqrt() * norm_b.sqrt())
}

pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut sum_sq = 0.0;
    for i in 0..a.len() {
        let d = a[i] - b[i];
        sum_sq += d * d;
    }
    sum_sq.sqrt()
}

/// Negated dot product so that, like the other two kernels, lower means
/// closer.
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = 0.0;
    for i in 0..a.len() {
        acc += a[i] * b[i];
    }
    -acc
}
