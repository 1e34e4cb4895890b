//! Snapshot types: immutable, timestamped captures of graph state at a
//! chosen detail level.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::graph::TypeTag;

/// Version written into every snapshot so old captures remain loadable
/// after the taxonomy and view layout evolve.
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// How much of the graph a capture or context slice includes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailLevel {
    /// Only top-ranked content.
    Summary,
    /// The usual working set.
    #[default]
    Standard,
    /// Everything, including attributes and provenance.
    Detailed,
}

impl std::fmt::Display for DetailLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DetailLevel::Summary => "summary",
            DetailLevel::Standard => "standard",
            DetailLevel::Detailed => "detailed",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for DetailLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" | "minimal" => Ok(DetailLevel::Summary),
            "standard" => Ok(DetailLevel::Standard),
            "detailed" | "comprehensive" => Ok(DetailLevel::Detailed),
            _ => Err(format!(
                "Invalid detail level: '{s}'. Valid options: summary, standard, detailed"
            )),
        }
    }
}

// ============================================================================
// Graph Views
// ============================================================================

/// An entity as captured in a snapshot. Attribute maps are ordered so the
/// serialized form is stable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityView {
    pub id: String,
    pub entity_type: TypeTag,
    pub label: String,
    pub appearance_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_documents: Option<Vec<String>>,
    pub updated_at: DateTime<Utc>,
}

/// A relationship as captured in a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipView {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
    pub relation_type: TypeTag,
    pub appearance_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attributes: Option<BTreeMap<String, serde_json::Value>>,
}

/// The serialized excerpt a snapshot stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphView {
    pub schema_version: u32,
    pub captured_at: DateTime<Utc>,
    pub detail_level: DetailLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
    pub entity_types: Vec<TypeTag>,
    pub relation_types: Vec<TypeTag>,
    pub entities: Vec<EntityView>,
    pub relationships: Vec<RelationshipView>,
}

// ============================================================================
// Snapshots
// ============================================================================

/// An immutable, timestamped capture. "Updating" a snapshot means capturing
/// a new one; the store never rewrites content after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier.
    pub id: String,
    /// When the capture happened.
    pub created_at: DateTime<Utc>,
    /// Detail level of the capture.
    pub detail_level: DetailLevel,
    /// Optional focus area the capture was narrowed to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
    /// Schema version of the serialized view.
    pub schema_version: u32,
    /// The serialized [`GraphView`] JSON.
    pub content: String,
    /// SHA-256 hash of the content.
    pub content_hash: String,
    /// Number of entities captured.
    pub entity_count: usize,
    /// Number of relationships captured.
    pub relationship_count: usize,
}

impl Snapshot {
    /// Compute the SHA-256 hash of snapshot content.
    pub fn compute_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Deserialize the captured view.
    pub fn view(&self) -> Result<GraphView> {
        Ok(serde_json::from_str(&self.content)?)
    }
}

/// Lightweight snapshot descriptor for listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub detail_level: DetailLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
    pub content_hash: String,
    pub entity_count: usize,
    pub relationship_count: usize,
}

impl From<&Snapshot> for SnapshotMetadata {
    fn from(s: &Snapshot) -> Self {
        Self {
            id: s.id.clone(),
            created_at: s.created_at,
            detail_level: s.detail_level,
            focus_area: s.focus_area.clone(),
            content_hash: s.content_hash.clone(),
            entity_count: s.entity_count,
            relationship_count: s.relationship_count,
        }
    }
}

/// Filter criteria for listing snapshots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SnapshotFilter {
    /// Filter by detail level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail_level: Option<DetailLevel>,
    /// Filter by focus area (exact match).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus_area: Option<String>,
    /// Filter by capture time range.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
    /// Maximum number of results (0 = unlimited).
    #[serde(default)]
    pub limit: usize,
}

impl SnapshotFilter {
    /// Check whether a snapshot matches this filter.
    pub fn matches(&self, snapshot: &Snapshot) -> bool {
        if let Some(level) = self.detail_level {
            if snapshot.detail_level != level {
                return false;
            }
        }
        if let Some(ref focus) = self.focus_area {
            if snapshot.focus_area.as_deref() != Some(focus.as_str()) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if snapshot.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if snapshot.created_at > before {
                return false;
            }
        }
        true
    }
}
