//! Pluggable similarity scoring between labelled, attributed items.
//!
//! Used in two places with the same policy so merge behavior is consistent:
//! the candidate store, to decide whether a new extraction hit reinforces an
//! existing candidate, and the promotion engine's check-and-commit, to decide
//! whether a promoted candidate folds into an existing graph entity.

use std::collections::HashMap;

use crate::candidates::CandidateEntity;
use crate::graph::Entity;

/// A borrowed view of the fields similarity is computed over.
pub struct SimilarityView<'a> {
    pub label: &'a str,
    pub aliases: &'a [String],
    pub attributes: &'a HashMap<String, serde_json::Value>,
}

impl<'a> From<&'a Entity> for SimilarityView<'a> {
    fn from(entity: &'a Entity) -> Self {
        Self {
            label: &entity.label,
            aliases: &entity.aliases,
            attributes: &entity.attributes,
        }
    }
}

impl<'a> From<&'a CandidateEntity> for SimilarityView<'a> {
    fn from(candidate: &'a CandidateEntity) -> Self {
        Self {
            label: &candidate.label,
            aliases: &candidate.aliases,
            attributes: &candidate.attributes,
        }
    }
}

/// Policy for scoring how likely two same-typed items are the same thing.
pub trait SimilarityPolicy: Send + Sync {
    /// Similarity in `[0.0, 1.0]`; higher means more likely the same.
    fn score(&self, a: &SimilarityView<'_>, b: &SimilarityView<'_>) -> f64;
}

/// Default policy: Jaro-Winkler over normalized labels (with exact-match and
/// containment short-circuits), blended with Jaccard overlap of attribute
/// keys at 0.8 / 0.2.
#[derive(Debug, Clone)]
pub struct LabelAttributeSimilarity {
    pub label_weight: f64,
    pub attribute_weight: f64,
}

impl Default for LabelAttributeSimilarity {
    fn default() -> Self {
        Self {
            label_weight: 0.8,
            attribute_weight: 0.2,
        }
    }
}

impl LabelAttributeSimilarity {
    /// Best label-to-label score across labels and aliases of both sides.
    fn label_score(a: &SimilarityView<'_>, b: &SimilarityView<'_>) -> f64 {
        let a_labels: Vec<&str> = std::iter::once(a.label)
            .chain(a.aliases.iter().map(String::as_str))
            .collect();
        let b_labels: Vec<&str> = std::iter::once(b.label)
            .chain(b.aliases.iter().map(String::as_str))
            .collect();

        let mut best: f64 = 0.0;
        for la in &a_labels {
            for lb in &b_labels {
                best = best.max(score_labels(la, lb));
                if best >= 1.0 {
                    return 1.0;
                }
            }
        }
        best
    }

    /// Jaccard overlap of attribute key sets. Two items with no attributes
    /// at all are neutral (1.0) rather than dissimilar.
    fn attribute_score(a: &SimilarityView<'_>, b: &SimilarityView<'_>) -> f64 {
        if a.attributes.is_empty() && b.attributes.is_empty() {
            return 1.0;
        }
        let intersection = a
            .attributes
            .keys()
            .filter(|k| b.attributes.contains_key(*k))
            .count();
        let union = a.attributes.len() + b.attributes.len() - intersection;
        if union == 0 {
            1.0
        } else {
            intersection as f64 / union as f64
        }
    }
}

impl SimilarityPolicy for LabelAttributeSimilarity {
    fn score(&self, a: &SimilarityView<'_>, b: &SimilarityView<'_>) -> f64 {
        let label = Self::label_score(a, b);
        let attrs = Self::attribute_score(a, b);
        (self.label_weight * label + self.attribute_weight * attrs).clamp(0.0, 1.0)
    }
}

/// Score a single pair of labels.
fn score_labels(a: &str, b: &str) -> f64 {
    let a_lower = a.trim().to_lowercase();
    let b_lower = b.trim().to_lowercase();

    if a_lower == b_lower {
        return 1.0;
    }
    if a_lower.contains(&b_lower) || b_lower.contains(&a_lower) {
        return 0.9;
    }
    strsim::jaro_winkler(&a_lower, &b_lower)
}
