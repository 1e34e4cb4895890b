//! The candidate store: pending entities and relationships, their
//! reinforcement lifecycle, and the append-only audit log.
//!
//! Submissions from independent documents may run fully in parallel; the
//! store only appends or reinforces, and a single write guard per submission
//! guarantees that two simultaneous hits for the same logical candidate land
//! on one record.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;

use crate::candidates::types::{
    AuditAction, AuditEvent, Candidate, CandidateFilter, CandidatePayload, CandidateStats,
    CandidateStatus, EndpointRef, RetireReason, Submission, SubmissionOutcome,
};
use crate::error::{Result, WeftError};
use crate::graph::DocumentRef;
use crate::promotion::{SimilarityPolicy, SimilarityView};

#[derive(Default)]
struct CandidateData {
    /// Candidates indexed by id.
    candidates: HashMap<String, Candidate>,
    /// Insertion order, for deterministic matching.
    order: Vec<String>,
    /// Append-only audit log.
    audit: Vec<AuditEvent>,
    /// Next audit sequence number.
    next_seq: u64,
}

impl CandidateData {
    fn log(&mut self, candidate_id: &str, document_id: Option<String>, action: AuditAction) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.audit.push(AuditEvent {
            seq,
            at: Utc::now(),
            candidate_id: candidate_id.to_string(),
            document_id,
            action,
        });
    }
}

/// Store of unconfirmed entities and relationships pending promotion.
pub struct CandidateStore {
    data: RwLock<CandidateData>,
    /// Similarity policy used to match new hits against pending candidates.
    policy: Arc<dyn SimilarityPolicy>,
    /// Hits scoring at or above this fold into an existing candidate.
    merge_threshold: f64,
}

impl CandidateStore {
    pub fn new(policy: Arc<dyn SimilarityPolicy>, merge_threshold: f64) -> Self {
        Self {
            data: RwLock::new(CandidateData::default()),
            policy,
            merge_threshold,
        }
    }

    // ========================================================================
    // Submission
    // ========================================================================

    /// Submit an extraction hit. Either reinforces the best-matching pending
    /// candidate (same type, similarity at or above the merge threshold for
    /// entities; identical endpoints and type for relationships) or creates
    /// a new one. Every submission is audit-logged.
    pub async fn submit(
        &self,
        payload: CandidatePayload,
        doc_ref: DocumentRef,
        confidence: f32,
    ) -> Result<Submission> {
        let mut data = self.data.write().await;

        let existing_id = self.find_match(&data, &payload);
        let submission = match existing_id {
            Some(id) => {
                let document_id = doc_ref.document_id.clone();
                let candidate = data
                    .candidates
                    .get_mut(&id)
                    .expect("matched candidate must exist");
                candidate.reinforce(doc_ref, confidence);
                let submission = Submission {
                    candidate_id: id.clone(),
                    outcome: SubmissionOutcome::Reinforced,
                    appearance_count: candidate.appearance_count,
                    promotion_score: candidate.promotion_score,
                };
                data.log(&id, Some(document_id), AuditAction::Reinforced);
                tracing::debug!(
                    "Reinforced candidate {} (appearances: {})",
                    id,
                    submission.appearance_count
                );
                submission
            }
            None => {
                let document_id = doc_ref.document_id.clone();
                let candidate = Candidate::new(payload, doc_ref, confidence);
                let id = candidate.id.clone();
                let submission = Submission {
                    candidate_id: id.clone(),
                    outcome: SubmissionOutcome::Created,
                    appearance_count: candidate.appearance_count,
                    promotion_score: candidate.promotion_score,
                };
                tracing::debug!("New candidate {}: {}", id, candidate.payload.describe());
                data.order.push(id.clone());
                data.candidates.insert(id.clone(), candidate);
                data.log(&id, Some(document_id), AuditAction::Submitted);
                submission
            }
        };

        Ok(submission)
    }

    /// Find the pending candidate a payload should fold into, if any.
    /// Candidates are checked oldest-first so matching is deterministic.
    fn find_match(&self, data: &CandidateData, payload: &CandidatePayload) -> Option<String> {
        match payload {
            CandidatePayload::Entity(new) => {
                let mut best: Option<(f64, &String)> = None;
                for id in &data.order {
                    let Some(candidate) = data.candidates.get(id) else {
                        continue;
                    };
                    if !candidate.is_pending() {
                        continue;
                    }
                    let CandidatePayload::Entity(existing) = &candidate.payload else {
                        continue;
                    };
                    if existing.entity_type != new.entity_type {
                        continue;
                    }
                    let score = self
                        .policy
                        .score(&SimilarityView::from(new), &SimilarityView::from(existing));
                    if score >= self.merge_threshold
                        && best.is_none_or(|(best_score, _)| score > best_score)
                    {
                        best = Some((score, id));
                    }
                }
                best.map(|(_, id)| id.to_string())
            }
            CandidatePayload::Relationship(new) => {
                for id in &data.order {
                    let Some(candidate) = data.candidates.get(id) else {
                        continue;
                    };
                    if !candidate.is_pending() {
                        continue;
                    }
                    let CandidatePayload::Relationship(existing) = &candidate.payload else {
                        continue;
                    };
                    if existing.relation_type == new.relation_type
                        && existing.source == new.source
                        && existing.target == new.target
                    {
                        return Some(id.clone());
                    }
                }
                None
            }
        }
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Get a candidate by id.
    pub async fn get(&self, id: &str) -> Result<Candidate> {
        let data = self.data.read().await;
        data.candidates
            .get(id)
            .cloned()
            .ok_or_else(|| WeftError::not_found("candidate", id))
    }

    /// List candidates matching a filter, oldest first.
    pub async fn list(&self, filter: &CandidateFilter) -> Vec<Candidate> {
        let data = self.data.read().await;
        data.order
            .iter()
            .filter_map(|id| data.candidates.get(id))
            .filter(|c| filter.matches(c))
            .take(filter.limit)
            .cloned()
            .collect()
    }

    /// Best pending entity candidate matching a bare label, if any scores at
    /// or above the merge threshold. Used for endpoint resolution.
    pub async fn best_entity_match(&self, label: &str) -> Option<String> {
        let aliases: Vec<String> = Vec::new();
        let attributes = HashMap::new();
        let probe = SimilarityView {
            label,
            aliases: &aliases,
            attributes: &attributes,
        };

        let data = self.data.read().await;
        let mut best: Option<(f64, &String)> = None;
        for id in &data.order {
            let Some(candidate) = data.candidates.get(id) else {
                continue;
            };
            if !candidate.is_pending() {
                continue;
            }
            let CandidatePayload::Entity(existing) = &candidate.payload else {
                continue;
            };
            let score = self.policy.score(&probe, &SimilarityView::from(existing));
            if score >= self.merge_threshold
                && best.is_none_or(|(best_score, _)| score > best_score)
            {
                best = Some((score, id));
            }
        }
        best.map(|(_, id)| id.to_string())
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Retire a candidate. Idempotent: retiring an already-retired candidate
    /// is a no-op. Retiring a promoted candidate is a constraint violation:
    /// ownership has already transferred to the graph.
    pub async fn retire(&self, id: &str, reason: RetireReason) -> Result<()> {
        let mut data = self.data.write().await;
        let candidate = data
            .candidates
            .get_mut(id)
            .ok_or_else(|| WeftError::not_found("candidate", id))?;

        match &candidate.status {
            CandidateStatus::Retired { .. } => Ok(()),
            CandidateStatus::Promoted { graph_id } => Err(WeftError::constraint(format!(
                "candidate {} was already promoted as entity {}",
                id, graph_id
            ))),
            CandidateStatus::Pending => {
                candidate.status = CandidateStatus::Retired {
                    reason: reason.clone(),
                };
                data.log(id, None, AuditAction::Retired { reason });
                Ok(())
            }
        }
    }

    /// Retire pending candidates not reinforced within the window. Returns
    /// the retired candidate ids.
    pub async fn retire_stale(&self, window: chrono::Duration) -> Vec<String> {
        let cutoff = Utc::now() - window;
        let mut data = self.data.write().await;

        let stale: Vec<String> = data
            .order
            .iter()
            .filter(|id| {
                data.candidates
                    .get(*id)
                    .is_some_and(|c| c.is_pending() && c.last_seen < cutoff)
            })
            .cloned()
            .collect();

        for id in &stale {
            if let Some(candidate) = data.candidates.get_mut(id) {
                candidate.status = CandidateStatus::Retired {
                    reason: RetireReason::Stale,
                };
            }
            data.log(id, None, AuditAction::Retired {
                reason: RetireReason::Stale,
            });
        }
        if !stale.is_empty() {
            tracing::info!("Retired {} stale candidates", stale.len());
        }
        stale
    }

    /// Mark a candidate as promoted under the given graph id. Fails with a
    /// conflict if another promotion already claimed it; the caller then
    /// retries as reinforcement of the winning graph record.
    pub async fn mark_promoted(&self, id: &str, graph_id: &str) -> Result<()> {
        let mut data = self.data.write().await;
        let candidate = data
            .candidates
            .get_mut(id)
            .ok_or_else(|| WeftError::not_found("candidate", id))?;

        match &candidate.status {
            CandidateStatus::Promoted { graph_id: winner } => Err(WeftError::Conflict {
                candidate_id: id.to_string(),
                existing_id: winner.clone(),
            }),
            CandidateStatus::Retired { .. } => Err(WeftError::constraint(format!(
                "cannot promote retired candidate {}",
                id
            ))),
            CandidateStatus::Pending => {
                candidate.status = CandidateStatus::Promoted {
                    graph_id: graph_id.to_string(),
                };
                data.log(id, None, AuditAction::Promoted {
                    graph_id: graph_id.to_string(),
                });
                Ok(())
            }
        }
    }

    /// Re-point candidate-entity endpoints at a freshly promoted graph
    /// entity, so pending relationship candidates stay resolvable.
    pub async fn rebind_endpoint(&self, candidate_id: &str, graph_id: &str) {
        let mut data = self.data.write().await;
        for candidate in data.candidates.values_mut() {
            if !candidate.is_pending() {
                continue;
            }
            if let CandidatePayload::Relationship(rel) = &mut candidate.payload {
                if rel.source == EndpointRef::Candidate(candidate_id.to_string()) {
                    rel.source = EndpointRef::Entity(graph_id.to_string());
                }
                if rel.target == EndpointRef::Candidate(candidate_id.to_string()) {
                    rel.target = EndpointRef::Entity(graph_id.to_string());
                }
            }
        }
    }

    // ========================================================================
    // Audit & Stats
    // ========================================================================

    /// Audit events for a candidate, oldest first.
    pub async fn audit_for(&self, candidate_id: &str) -> Vec<AuditEvent> {
        let data = self.data.read().await;
        data.audit
            .iter()
            .filter(|e| e.candidate_id == candidate_id)
            .cloned()
            .collect()
    }

    /// Audit events that originated from a source document, oldest first.
    pub async fn audit_for_source(&self, document_id: &str) -> Vec<AuditEvent> {
        let data = self.data.read().await;
        data.audit
            .iter()
            .filter(|e| e.document_id.as_deref() == Some(document_id))
            .cloned()
            .collect()
    }

    /// Statistics about the store.
    pub async fn stats(&self) -> CandidateStats {
        let data = self.data.read().await;
        let mut stats = CandidateStats {
            audit_events: data.audit.len(),
            ..Default::default()
        };
        for candidate in data.candidates.values() {
            match candidate.status {
                CandidateStatus::Pending => stats.pending += 1,
                CandidateStatus::Promoted { .. } => stats.promoted += 1,
                CandidateStatus::Retired { .. } => stats.retired += 1,
            }
        }
        stats
    }
}
