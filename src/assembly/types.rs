//! Context assembly result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::snapshot::DetailLevel;

/// What a fragment was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FragmentKind {
    /// A rendered entity with its immediate relations.
    EntityCard,
    /// An excerpt of a stored snapshot.
    SnapshotExcerpt,
}

/// A scored, token-estimated piece of assembled context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFragment {
    /// Stable fragment id ("entity:<id>" or "snapshot:<id>").
    pub id: String,
    /// What the fragment was built from.
    pub kind: FragmentKind,
    /// Short title.
    pub title: String,
    /// Rendered text.
    pub text: String,
    /// Relevance score assigned during assembly.
    pub score: f64,
    /// Estimated token cost of `text`.
    pub estimated_tokens: usize,
}

/// Statistics about one assembly run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssemblyStats {
    /// Fragments considered before cutoff and budget.
    pub pool_size: usize,
    /// Fragments included in the result.
    pub selected: usize,
    /// Fragments dropped by the detail-level relevance cutoff.
    pub dropped_below_cutoff: usize,
    /// Whether the budget cut the selection short.
    pub truncated_by_budget: bool,
}

/// A bounded, relevance-ranked context slice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Context {
    /// Detail level the context was assembled at.
    pub detail_level: DetailLevel,
    /// Focus area, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
    /// The requested token budget.
    pub token_budget: usize,
    /// Selected fragments in descending relevance order.
    pub fragments: Vec<ContextFragment>,
    /// Total estimated token cost; never exceeds `token_budget`.
    pub estimated_tokens: usize,
    /// When the context was assembled (metadata only; fragment ordering and
    /// content depend only on graph/snapshot state and the arguments).
    pub assembled_at: DateTime<Utc>,
    /// Assembly statistics.
    pub stats: AssemblyStats,
}

impl Context {
    /// Render the context as one text block.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for fragment in &self.fragments {
            out.push_str(&fragment.text);
            out.push_str("\n\n");
        }
        out
    }
}
