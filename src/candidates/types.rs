//! Candidate records: provisional entities and relationships awaiting
//! promotion into the permanent graph.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::graph::{DocumentRef, TypeTag};

// ============================================================================
// Payloads
// ============================================================================

/// A provisional entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateEntity {
    /// Proposed type tag.
    pub entity_type: TypeTag,
    /// Primary label.
    pub label: String,
    /// Alternative labels.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl CandidateEntity {
    pub fn new(entity_type: TypeTag, label: impl Into<String>) -> Self {
        Self {
            entity_type,
            label: label.into(),
            aliases: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// Where a relationship endpoint currently lives: already in the permanent
/// graph, or still pending in the candidate store. Candidate relationships
/// referencing candidate entities are allowed and tracked; the promotion
/// engine resolves them before anything reaches the graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRef {
    /// A promoted entity in the graph.
    Entity(String),
    /// A pending candidate entity.
    Candidate(String),
}

impl EndpointRef {
    pub fn id(&self) -> &str {
        match self {
            EndpointRef::Entity(id) | EndpointRef::Candidate(id) => id,
        }
    }
}

/// A provisional relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRelationship {
    /// Proposed relationship type tag.
    pub relation_type: TypeTag,
    /// Source endpoint.
    pub source: EndpointRef,
    /// Target endpoint.
    pub target: EndpointRef,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

/// The payload wrapped by a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidatePayload {
    Entity(CandidateEntity),
    Relationship(CandidateRelationship),
}

impl CandidatePayload {
    /// A short human-readable description for logs and reports.
    pub fn describe(&self) -> String {
        match self {
            CandidatePayload::Entity(e) => format!("{} '{}'", e.entity_type, e.label),
            CandidatePayload::Relationship(r) => format!(
                "{} ({} -> {})",
                r.relation_type,
                r.source.id(),
                r.target.id()
            ),
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Why a candidate was retired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetireReason {
    /// No reinforcement within the configured stale window.
    Stale,
    /// Folded into another candidate or entity.
    Duplicate { of: String },
    /// Retired by an operator or external policy.
    Manual(String),
}

/// Lifecycle state of a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    /// Awaiting promotion.
    Pending,
    /// Promoted; ownership transferred to the graph under `graph_id`.
    Promoted { graph_id: String },
    /// Retired with a recorded reason. Never silently dropped.
    Retired { reason: RetireReason },
}

/// A provisional entity or relationship with its reinforcement history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    /// Unique identifier.
    pub id: String,
    /// The wrapped payload.
    pub payload: CandidatePayload,
    /// Lifecycle state.
    pub status: CandidateStatus,
    /// How many extraction hits matched this candidate.
    pub appearance_count: u32,
    /// Highest confidence among matching hits.
    pub confidence: f32,
    /// Saturating promotion score; see [`Candidate::recompute_score`].
    pub promotion_score: f64,
    /// When the candidate was first seen.
    pub first_seen: DateTime<Utc>,
    /// When the candidate was last reinforced.
    pub last_seen: DateTime<Utc>,
    /// Source documents, deduplicated by document id.
    pub source_refs: Vec<DocumentRef>,
}

impl Candidate {
    /// Create a fresh pending candidate from its first extraction hit.
    pub fn new(payload: CandidatePayload, doc_ref: DocumentRef, confidence: f32) -> Self {
        let now = Utc::now();
        let mut candidate = Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            status: CandidateStatus::Pending,
            appearance_count: 1,
            confidence: confidence.clamp(0.0, 1.0),
            promotion_score: 0.0,
            first_seen: now,
            last_seen: now,
            source_refs: vec![doc_ref],
        };
        candidate.recompute_score();
        candidate
    }

    /// Record another matching extraction hit.
    pub fn reinforce(&mut self, doc_ref: DocumentRef, confidence: f32) {
        self.appearance_count += 1;
        self.confidence = self.confidence.max(confidence.clamp(0.0, 1.0));
        if !self
            .source_refs
            .iter()
            .any(|r| r.document_id == doc_ref.document_id)
        {
            self.source_refs.push(doc_ref);
        }
        self.last_seen = Utc::now();
        self.recompute_score();
    }

    /// Recompute the promotion score as `1 − (1 − confidence)^appearances`:
    /// repeated independent sightings saturate toward 1.0.
    pub fn recompute_score(&mut self) {
        let miss = 1.0 - f64::from(self.confidence);
        self.promotion_score = 1.0 - miss.powi(self.appearance_count as i32);
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, CandidateStatus::Pending)
    }
}

// ============================================================================
// Filtering
// ============================================================================

/// Coarse payload kind for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Entity,
    Relationship,
}

/// Coarse status for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusFilter {
    Pending,
    Promoted,
    Retired,
}

/// Filter criteria for listing candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFilter {
    /// Filter by payload kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<CandidateKind>,
    /// Filter by lifecycle status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusFilter>,
    /// Filter by type tag (entity or relationship type).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<TypeTag>,
    /// Filter by source document id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_document_id: Option<String>,
    /// Maximum number of results.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    100
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            kind: None,
            status: None,
            type_tag: None,
            source_document_id: None,
            limit: 100,
        }
    }
}

impl CandidateFilter {
    /// Filter for pending candidates only.
    pub fn pending() -> Self {
        Self {
            status: Some(StatusFilter::Pending),
            ..Default::default()
        }
    }

    /// Check whether a candidate matches this filter.
    pub fn matches(&self, candidate: &Candidate) -> bool {
        if let Some(kind) = self.kind {
            let actual = match candidate.payload {
                CandidatePayload::Entity(_) => CandidateKind::Entity,
                CandidatePayload::Relationship(_) => CandidateKind::Relationship,
            };
            if actual != kind {
                return false;
            }
        }
        if let Some(status) = self.status {
            let actual = match candidate.status {
                CandidateStatus::Pending => StatusFilter::Pending,
                CandidateStatus::Promoted { .. } => StatusFilter::Promoted,
                CandidateStatus::Retired { .. } => StatusFilter::Retired,
            };
            if actual != status {
                return false;
            }
        }
        if let Some(ref tag) = self.type_tag {
            let actual = match &candidate.payload {
                CandidatePayload::Entity(e) => &e.entity_type,
                CandidatePayload::Relationship(r) => &r.relation_type,
            };
            if actual != tag {
                return false;
            }
        }
        if let Some(ref doc_id) = self.source_document_id {
            if !candidate
                .source_refs
                .iter()
                .any(|r| &r.document_id == doc_id)
            {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// Audit Log
// ============================================================================

/// What happened to a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// First extraction hit created the candidate.
    Submitted,
    /// A later hit reinforced it.
    Reinforced,
    /// Promoted into the graph.
    Promoted { graph_id: String },
    /// Retired with a reason.
    Retired { reason: RetireReason },
}

/// An append-only audit record for provenance queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Monotonic sequence number within the store.
    pub seq: u64,
    /// When the event happened.
    pub at: DateTime<Utc>,
    /// The candidate involved.
    pub candidate_id: String,
    /// The source document, when the event came from a submission.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// What happened.
    pub action: AuditAction,
}

// ============================================================================
// Submission Results
// ============================================================================

/// How a submission landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    /// A new candidate was created.
    Created,
    /// An existing candidate was reinforced.
    Reinforced,
}

/// Result of submitting an extraction hit to the candidate store.
#[derive(Debug, Clone)]
pub struct Submission {
    /// The candidate the hit landed on.
    pub candidate_id: String,
    /// Created or reinforced.
    pub outcome: SubmissionOutcome,
    /// Appearance count after the submission.
    pub appearance_count: u32,
    /// Promotion score after the submission.
    pub promotion_score: f64,
}

/// Statistics about the candidate store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateStats {
    pub pending: usize,
    pub promoted: usize,
    pub retired: usize,
    pub audit_events: usize,
}
