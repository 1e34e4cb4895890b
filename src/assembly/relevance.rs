//! Pluggable relevance scoring for context fragments.

use chrono::{DateTime, Duration, Utc};

/// The features a fragment is scored on.
#[derive(Debug, Clone)]
pub struct RelevanceInput {
    /// When the underlying content was last updated.
    pub last_updated: DateTime<Utc>,
    /// Reference time for recency. Derived from the newest content in the
    /// pool rather than the wall clock, so identical state scores
    /// identically on every call.
    pub reference_time: DateTime<Utc>,
    /// Whether the query named a focus area at all.
    pub has_focus: bool,
    /// BFS distance from the nearest focus match (0 = direct match); `None`
    /// when the fragment is not connected to the focus.
    pub focus_distance: Option<usize>,
    /// Number of edges touching the underlying entity.
    pub degree: usize,
    /// Largest degree in the pool, for normalization.
    pub max_degree: usize,
}

/// Policy ranking fragments for assembly.
pub trait RelevancePolicy: Send + Sync {
    /// Relevance in `[0.0, 1.0]`.
    fn score(&self, input: &RelevanceInput) -> f64;
}

/// Default policy: weighted blend of recency (exponential half-life decay),
/// focus match (distance-scaled), and degree centrality.
#[derive(Debug, Clone)]
pub struct WeightedRelevance {
    pub recency_weight: f64,
    pub focus_weight: f64,
    pub centrality_weight: f64,
    /// Recency half-life.
    pub half_life: Duration,
}

impl Default for WeightedRelevance {
    fn default() -> Self {
        Self {
            recency_weight: 0.3,
            focus_weight: 0.45,
            centrality_weight: 0.25,
            half_life: Duration::days(7),
        }
    }
}

impl RelevancePolicy for WeightedRelevance {
    fn score(&self, input: &RelevanceInput) -> f64 {
        let age_secs = (input.reference_time - input.last_updated)
            .num_seconds()
            .max(0) as f64;
        let half_life_secs = self.half_life.num_seconds().max(1) as f64;
        let recency = 0.5_f64.powf(age_secs / half_life_secs);

        let focus = if !input.has_focus {
            // No focus requested: neutral.
            0.5
        } else {
            match input.focus_distance {
                Some(0) => 1.0,
                Some(d) => 1.0 / (1.0 + d as f64),
                None => 0.2,
            }
        };

        let centrality = if input.max_degree == 0 {
            0.0
        } else {
            input.degree as f64 / input.max_degree as f64
        };

        (self.recency_weight * recency
            + self.focus_weight * focus
            + self.centrality_weight * centrality)
            .clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(focus_distance: Option<usize>, degree: usize) -> RelevanceInput {
        let now = Utc::now();
        RelevanceInput {
            last_updated: now,
            reference_time: now,
            has_focus: true,
            focus_distance,
            degree,
            max_degree: 4,
        }
    }

    #[test]
    fn test_direct_focus_match_outranks_neighbors() {
        let policy = WeightedRelevance::default();
        let direct = policy.score(&input(Some(0), 2));
        let neighbor = policy.score(&input(Some(1), 2));
        let unconnected = policy.score(&input(None, 2));
        assert!(direct > neighbor);
        assert!(neighbor > unconnected);
    }

    #[test]
    fn test_recency_decays() {
        let policy = WeightedRelevance::default();
        let now = Utc::now();
        let fresh = RelevanceInput {
            last_updated: now,
            reference_time: now,
            has_focus: false,
            focus_distance: None,
            degree: 0,
            max_degree: 0,
        };
        let old = RelevanceInput {
            last_updated: now - Duration::days(30),
            ..fresh.clone()
        };
        assert!(policy.score(&fresh) > policy.score(&old));
    }

    #[test]
    fn test_centrality_contributes() {
        let policy = WeightedRelevance::default();
        assert!(policy.score(&input(Some(1), 4)) > policy.score(&input(Some(1), 0)));
    }

    #[test]
    fn test_score_is_bounded() {
        let policy = WeightedRelevance::default();
        let score = policy.score(&input(Some(0), 4));
        assert!((0.0..=1.0).contains(&score));
    }
}
