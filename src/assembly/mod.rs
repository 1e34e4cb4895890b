//! Bounded, relevance-ranked context assembly.

mod assembler;
mod relevance;
mod types;

pub use assembler::ContextAssembler;
pub use relevance::{RelevanceInput, RelevancePolicy, WeightedRelevance};
pub use types::{AssemblyStats, Context, ContextFragment, FragmentKind};
