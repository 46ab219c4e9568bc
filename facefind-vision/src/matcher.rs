use ndarray::ArrayView1;

use crate::error::ScoreError;
use crate::face::{FeatureVector, FEATURE_LEN};

/// Distance below which two faces are considered the same person.
pub const DEFAULT_THRESHOLD: f32 = 0.78;

/// Euclidean distance between two feature vectors.
///
/// Both inputs must be [`FEATURE_LEN`] long. Any `NaN` component makes the
/// result `NaN`.
pub fn distance(a: ArrayView1<'_, f32>, b: ArrayView1<'_, f32>) -> Result<f32, ScoreError> {
    if a.len() != FEATURE_LEN || b.len() != FEATURE_LEN {
        return Err(ScoreError::LengthMismatch {
            left: a.len(),
            right: b.len(),
            expected: FEATURE_LEN,
        });
    }

    let sum: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum();

    Ok(sum.sqrt())
}

/// Match decision for an already computed distance.
///
/// A `NaN` distance never matches.
pub fn within_threshold(distance: f32, threshold: f32) -> bool {
    if distance.is_nan() {
        return false;
    }
    distance < threshold
}

pub fn is_match(
    a: ArrayView1<'_, f32>,
    b: ArrayView1<'_, f32>,
    threshold: f32,
) -> Result<bool, ScoreError> {
    Ok(within_threshold(distance(a, b)?, threshold))
}

/// Scorer with an injected threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matcher {
    pub threshold: f32,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

/// Scoring result for one pair of faces.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    pub distance: f32,
    pub is_match: bool,
}

impl Matcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn score(&self, a: &FeatureVector, b: &FeatureVector) -> Result<Score, ScoreError> {
        let distance = distance(a.view(), b.view())?;
        Ok(Score {
            distance,
            is_match: within_threshold(distance, self.threshold),
        })
    }
}
