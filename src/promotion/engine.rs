//! The promotion engine: decides whether each extraction hit merges with an
//! existing candidate or entity, stays pending, or crosses into the graph.
//!
//! Promotion is atomic with respect to the graph invariants: the duplicate
//! check re-runs under the graph's write guard immediately before commit, so
//! racing promotions of the same logical candidate resolve as one insert and
//! the rest reinforce it. Promoting a relationship whose endpoints are still
//! pending candidate entities cascades, promoting the endpoints first; the
//! permanent graph never gains a dangling edge.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::candidates::{
    Candidate, CandidateEntity, CandidatePayload, CandidateRelationship, CandidateStatus,
    CandidateStore, EndpointRef,
};
use crate::error::{Result, WeftError};
use crate::graph::{DocumentRef, Entity, EntityGraph, Relationship, TypeTag};
use crate::promotion::similarity::{SimilarityPolicy, SimilarityView};
use crate::taxonomy::Taxonomy;

/// Relationship endpoints are entities, so cascades are shallow; this bound
/// exists to fail loudly on corrupted endpoint chains.
const MAX_CASCADE_DEPTH: usize = 8;

/// Promotion thresholds.
#[derive(Debug, Clone)]
pub struct PromotionConfig {
    /// Promote once a candidate has been seen this many times.
    pub appearance_threshold: u32,
    /// Promote once the promotion score reaches this value.
    pub score_threshold: f64,
    /// Similarity at or above this folds a hit into an existing record.
    pub merge_similarity_threshold: f64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            appearance_threshold: 3,
            score_threshold: 0.8,
            merge_similarity_threshold: 0.85,
        }
    }
}

/// Where a submitted hit ended up.
#[derive(Debug, Clone)]
pub enum PromotionOutcome {
    /// A candidate crossed the threshold and now lives in the graph. The
    /// graph id may belong to a pre-existing entity the promotion folded into.
    Promoted {
        candidate_id: String,
        graph_id: String,
    },
    /// The hit reinforced an existing graph record directly; no candidate
    /// was involved.
    Reinforced { graph_id: String },
    /// The hit landed on a candidate still below the thresholds.
    Pending { candidate_id: String },
}

impl PromotionOutcome {
    /// The graph id, if the hit reached the graph.
    pub fn graph_id(&self) -> Option<&str> {
        match self {
            PromotionOutcome::Promoted { graph_id, .. }
            | PromotionOutcome::Reinforced { graph_id } => Some(graph_id),
            PromotionOutcome::Pending { .. } => None,
        }
    }
}

/// Evaluates candidates against thresholds and moves them into the graph.
pub struct PromotionEngine {
    config: PromotionConfig,
    policy: Arc<dyn SimilarityPolicy>,
    candidates: Arc<CandidateStore>,
    graph: Arc<EntityGraph>,
    taxonomy: Arc<Taxonomy>,
}

impl PromotionEngine {
    pub fn new(
        config: PromotionConfig,
        policy: Arc<dyn SimilarityPolicy>,
        candidates: Arc<CandidateStore>,
        graph: Arc<EntityGraph>,
        taxonomy: Arc<Taxonomy>,
    ) -> Self {
        Self {
            config,
            policy,
            candidates,
            graph,
            taxonomy,
        }
    }

    // ========================================================================
    // Hit Submission
    // ========================================================================

    /// Submit an extracted entity hit. If an equivalent entity already lives
    /// in the graph it is reinforced directly; otherwise the hit lands in the
    /// candidate store and is promoted if it crosses a threshold.
    pub async fn submit_entity_hit(
        &self,
        payload: CandidateEntity,
        doc_ref: DocumentRef,
        confidence: f32,
    ) -> Result<PromotionOutcome> {
        if let Some(graph_id) = self
            .find_graph_match(&payload.entity_type, &SimilarityView::from(&payload))
            .await
        {
            self.graph
                .reinforce_entity(&graph_id, doc_ref, confidence)
                .await?;
            return Ok(PromotionOutcome::Reinforced { graph_id });
        }

        let submission = self
            .candidates
            .submit(CandidatePayload::Entity(payload), doc_ref, confidence)
            .await?;
        self.promote_if_eligible(&submission.candidate_id).await
    }

    /// Submit an extracted relationship hit with endpoints given by label.
    /// Endpoints resolve to graph entities, pending candidates, or freshly
    /// created candidate entities. If both endpoints are promoted and the
    /// edge already exists, it is reinforced directly.
    pub async fn submit_relationship_hit(
        &self,
        relation_type: TypeTag,
        source_label: &str,
        target_label: &str,
        attributes: HashMap<String, serde_json::Value>,
        doc_ref: DocumentRef,
        confidence: f32,
    ) -> Result<PromotionOutcome> {
        let source = self
            .resolve_endpoint(source_label, &doc_ref, confidence)
            .await?;
        let target = self
            .resolve_endpoint(target_label, &doc_ref, confidence)
            .await?;

        if let (EndpointRef::Entity(src), EndpointRef::Entity(tgt)) = (&source, &target) {
            if let Some(rel_id) = self.graph.find_relationship(src, tgt, &relation_type).await {
                self.graph
                    .reinforce_relationship(&rel_id, doc_ref, confidence)
                    .await?;
                return Ok(PromotionOutcome::Reinforced { graph_id: rel_id });
            }
        }

        let payload = CandidatePayload::Relationship(CandidateRelationship {
            relation_type,
            source,
            target,
            attributes,
        });
        let submission = self.candidates.submit(payload, doc_ref, confidence).await?;
        self.promote_if_eligible(&submission.candidate_id).await
    }

    /// Resolve an endpoint label: best graph match, then best pending
    /// candidate, then a new candidate entity created from this hit.
    pub async fn resolve_endpoint(
        &self,
        label: &str,
        doc_ref: &DocumentRef,
        confidence: f32,
    ) -> Result<EndpointRef> {
        let aliases: Vec<String> = Vec::new();
        let attributes = HashMap::new();
        let probe = SimilarityView {
            label,
            aliases: &aliases,
            attributes: &attributes,
        };

        let (entities, _) = self.graph.contents().await;
        let mut best: Option<(f64, String)> = None;
        for entity in &entities {
            let score = self.policy.score(&probe, &SimilarityView::from(entity));
            if score >= self.config.merge_similarity_threshold
                && best.as_ref().is_none_or(|(s, _)| score > *s)
            {
                best = Some((score, entity.id.clone()));
            }
        }
        if let Some((_, id)) = best {
            return Ok(EndpointRef::Entity(id));
        }

        if let Some(candidate_id) = self.candidates.best_entity_match(label).await {
            return Ok(EndpointRef::Candidate(candidate_id));
        }

        // Unknown endpoint: track it as a candidate entity of its own, so
        // the relationship hit is also an appearance of the endpoint.
        let submission = self
            .candidates
            .submit(
                CandidatePayload::Entity(CandidateEntity::new(TypeTag::new("concept"), label)),
                doc_ref.clone(),
                confidence,
            )
            .await?;
        Ok(EndpointRef::Candidate(submission.candidate_id))
    }

    // ========================================================================
    // Promotion
    // ========================================================================

    /// Whether a candidate currently qualifies for promotion.
    pub fn is_eligible(&self, candidate: &Candidate) -> bool {
        candidate.appearance_count >= self.config.appearance_threshold
            || candidate.promotion_score >= self.config.score_threshold
    }

    /// Promote the candidate if it crosses a threshold; otherwise report it
    /// as still pending.
    pub async fn promote_if_eligible(&self, candidate_id: &str) -> Result<PromotionOutcome> {
        let candidate = self.candidates.get(candidate_id).await?;
        if !self.is_eligible(&candidate) {
            return Ok(PromotionOutcome::Pending {
                candidate_id: candidate_id.to_string(),
            });
        }
        self.promote(candidate_id).await
    }

    /// Promote a candidate unconditionally (threshold checks are the
    /// caller's concern; cascades use this directly).
    pub async fn promote(&self, candidate_id: &str) -> Result<PromotionOutcome> {
        self.promote_inner(candidate_id, 0).await
    }

    fn promote_inner<'a>(
        &'a self,
        candidate_id: &'a str,
        depth: usize,
    ) -> BoxFuture<'a, Result<PromotionOutcome>> {
        Box::pin(async move {
            if depth > MAX_CASCADE_DEPTH {
                return Err(WeftError::constraint(format!(
                    "promotion cascade exceeded depth {} at candidate {}",
                    MAX_CASCADE_DEPTH, candidate_id
                )));
            }

            let candidate = self.candidates.get(candidate_id).await?;
            match &candidate.status {
                CandidateStatus::Promoted { graph_id } => {
                    // Another writer already promoted it; nothing to do.
                    return Ok(PromotionOutcome::Promoted {
                        candidate_id: candidate_id.to_string(),
                        graph_id: graph_id.clone(),
                    });
                }
                CandidateStatus::Retired { .. } => {
                    return Err(WeftError::constraint(format!(
                        "cannot promote retired candidate {}",
                        candidate_id
                    )));
                }
                CandidateStatus::Pending => {}
            }

            match candidate.payload.clone() {
                CandidatePayload::Entity(payload) => {
                    self.promote_entity(&candidate, payload).await
                }
                CandidatePayload::Relationship(payload) => {
                    self.promote_relationship(&candidate, payload, depth).await
                }
            }
        })
    }

    async fn promote_entity(
        &self,
        candidate: &Candidate,
        payload: CandidateEntity,
    ) -> Result<PromotionOutcome> {
        // New type tags are committed through the explicit registry call.
        self.taxonomy
            .register_entity_type(payload.entity_type.clone(), "promotion")
            .await;

        let mut entity = Entity::new(payload.entity_type, payload.label);
        entity.aliases = payload.aliases;
        entity.attributes = payload.attributes;
        entity.appearance_count = candidate.appearance_count;
        entity.confidence = candidate.confidence;
        for doc_ref in candidate.source_refs.clone() {
            entity.add_source_ref(doc_ref);
        }

        let threshold = self.config.merge_similarity_threshold;
        let policy = self.policy.clone();
        let outcome = self
            .graph
            .commit_entity_checked(entity, move |new, existing| {
                policy.score(&SimilarityView::from(new), &SimilarityView::from(existing))
                    >= threshold
            })
            .await?;
        let graph_id = outcome.graph_id().to_string();

        match self.candidates.mark_promoted(&candidate.id, &graph_id).await {
            Ok(()) => {}
            Err(WeftError::Conflict { existing_id, .. }) => {
                // Lost the race; the winning promotion's graph record stands.
                tracing::debug!(
                    "Candidate {} was promoted concurrently as {}",
                    candidate.id,
                    existing_id
                );
                return Ok(PromotionOutcome::Promoted {
                    candidate_id: candidate.id.clone(),
                    graph_id: existing_id,
                });
            }
            Err(e) => return Err(e),
        }

        self.candidates
            .rebind_endpoint(&candidate.id, &graph_id)
            .await;
        tracing::info!(
            "Promoted candidate {} to entity {} (appearances: {})",
            candidate.id,
            graph_id,
            candidate.appearance_count
        );
        Ok(PromotionOutcome::Promoted {
            candidate_id: candidate.id.clone(),
            graph_id,
        })
    }

    async fn promote_relationship(
        &self,
        candidate: &Candidate,
        payload: CandidateRelationship,
        depth: usize,
    ) -> Result<PromotionOutcome> {
        let source_id = self.resolve_for_commit(&payload.source, depth).await?;
        let target_id = self.resolve_for_commit(&payload.target, depth).await?;

        self.taxonomy
            .register_relation_type(payload.relation_type.clone(), "promotion")
            .await;

        let mut rel = Relationship::new(source_id, payload.relation_type, target_id);
        rel.attributes = payload.attributes;
        rel.appearance_count = candidate.appearance_count;
        rel.confidence = candidate.confidence;
        for doc_ref in candidate.source_refs.clone() {
            rel.add_source_ref(doc_ref);
        }

        let outcome = self.graph.commit_relationship(rel).await?;
        let graph_id = outcome.graph_id().to_string();

        match self.candidates.mark_promoted(&candidate.id, &graph_id).await {
            Ok(()) => {}
            Err(WeftError::Conflict { existing_id, .. }) => {
                return Ok(PromotionOutcome::Promoted {
                    candidate_id: candidate.id.clone(),
                    graph_id: existing_id,
                });
            }
            Err(e) => return Err(e),
        }

        tracing::info!(
            "Promoted candidate {} to relationship {}",
            candidate.id,
            graph_id
        );
        Ok(PromotionOutcome::Promoted {
            candidate_id: candidate.id.clone(),
            graph_id,
        })
    }

    /// Turn an endpoint ref into a committed graph entity id, cascading
    /// promotion of pending candidate endpoints.
    async fn resolve_for_commit(&self, endpoint: &EndpointRef, depth: usize) -> Result<String> {
        match endpoint {
            EndpointRef::Entity(id) => {
                if self.graph.get_entity(id).await?.is_none() {
                    return Err(WeftError::constraint(format!(
                        "relationship endpoint references missing entity {}",
                        id
                    )));
                }
                Ok(id.clone())
            }
            EndpointRef::Candidate(candidate_id) => {
                let outcome = self.promote_inner(candidate_id, depth + 1).await?;
                match outcome.graph_id() {
                    Some(graph_id) => Ok(graph_id.to_string()),
                    None => Err(WeftError::constraint(format!(
                        "endpoint candidate {} did not resolve to a graph entity",
                        candidate_id
                    ))),
                }
            }
        }
    }

    /// Best graph entity of the given type scoring at or above the merge
    /// threshold against the probe view.
    async fn find_graph_match(
        &self,
        entity_type: &TypeTag,
        probe: &SimilarityView<'_>,
    ) -> Option<String> {
        let (entities, _) = self.graph.contents().await;
        let mut best: Option<(f64, String)> = None;
        for entity in &entities {
            if &entity.entity_type != entity_type {
                continue;
            }
            let score = self.policy.score(probe, &SimilarityView::from(entity));
            if score >= self.config.merge_similarity_threshold
                && best.as_ref().is_none_or(|(s, _)| score > *s)
            {
                best = Some((score, entity.id.clone()));
            }
        }
        best.map(|(_, id)| id)
    }
}
