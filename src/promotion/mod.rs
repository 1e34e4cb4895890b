//! Candidate promotion: similarity-driven merging and thresholded entry
//! into the permanent graph.

mod engine;
mod similarity;

pub use engine::{PromotionConfig, PromotionEngine, PromotionOutcome};
pub use similarity::{LabelAttributeSimilarity, SimilarityPolicy, SimilarityView};
