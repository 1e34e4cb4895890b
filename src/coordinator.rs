//! The coordinator wires the engine together and drives the full pipeline:
//! documents in through the extraction boundary, candidate submission and
//! promotion, snapshot capture, stale retirement, and context assembly out
//! to consumers.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::assembly::{Context, ContextAssembler, RelevancePolicy, WeightedRelevance};
use crate::budget::TokenBudgeter;
use crate::candidates::{CandidateStats, CandidateStore};
use crate::config::Config;
use crate::error::{Result, WeftError};
use crate::extraction::{ExtractedItem, Extractor, StubExtractor};
use crate::graph::{DocumentRef, EntityGraph, GraphStats};
use crate::promotion::{
    LabelAttributeSimilarity, PromotionConfig, PromotionEngine, PromotionOutcome, SimilarityPolicy,
};
use crate::snapshot::{DetailLevel, Snapshot, SnapshotStore};
use crate::taxonomy::Taxonomy;

/// Per-item result of an ingest run.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    /// Short description of the extracted item.
    pub description: String,
    /// Where the item ended up.
    pub outcome: PromotionOutcome,
}

/// Result of ingesting one document.
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// The document that was ingested.
    pub document_id: String,
    /// Items the extractor returned.
    pub items_extracted: usize,
    /// Items that were promoted (or folded into the graph by promotion).
    pub promoted: usize,
    /// Items that reinforced existing graph records directly.
    pub reinforced: usize,
    /// Items still pending in the candidate store.
    pub pending: usize,
    /// Per-item outcomes, in extraction order (entities before
    /// relationships).
    pub outcomes: Vec<IngestOutcome>,
}

/// Combined engine statistics.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub graph: GraphStats,
    pub candidates: CandidateStats,
    pub snapshot_count: usize,
    pub entity_types: usize,
    pub relation_types: usize,
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`GraphCoordinator`].
pub struct GraphCoordinatorBuilder {
    config: Config,
    extractor: Option<Arc<dyn Extractor>>,
    similarity: Option<Arc<dyn SimilarityPolicy>>,
    relevance: Option<Arc<dyn RelevancePolicy>>,
}

impl GraphCoordinatorBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            extractor: None,
            similarity: None,
            relevance: None,
        }
    }

    /// Supply the external extraction capability. Without one, a no-op stub
    /// is used and ingestion yields nothing.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Override the similarity policy.
    pub fn with_similarity_policy(mut self, policy: Arc<dyn SimilarityPolicy>) -> Self {
        self.similarity = Some(policy);
        self
    }

    /// Override the relevance policy.
    pub fn with_relevance_policy(mut self, policy: Arc<dyn RelevancePolicy>) -> Self {
        self.relevance = Some(policy);
        self
    }

    /// Build the coordinator, setting up persistence when configured.
    pub async fn build(self) -> Result<GraphCoordinator> {
        self.config.validate()?;

        let taxonomy = Arc::new(Taxonomy::with_defaults());
        let similarity = self
            .similarity
            .unwrap_or_else(|| Arc::new(LabelAttributeSimilarity::default()));
        let relevance = self
            .relevance
            .unwrap_or_else(|| Arc::new(WeightedRelevance::default()));
        let extractor = self
            .extractor
            .unwrap_or_else(|| Arc::new(StubExtractor::new()));

        let graph = if self.config.storage.persist_graph {
            let data_dir = self.config.data_dir()?;
            Arc::new(EntityGraph::with_persistence(taxonomy.clone(), &data_dir).await?)
        } else {
            Arc::new(EntityGraph::new(taxonomy.clone()))
        };

        let snapshots = if self.config.storage.persist_snapshots {
            let data_dir = self.config.data_dir()?;
            Arc::new(SnapshotStore::with_persistence(&data_dir).await?)
        } else {
            Arc::new(SnapshotStore::new())
        };

        let candidates = Arc::new(CandidateStore::new(
            similarity.clone(),
            self.config.promotion.merge_similarity_threshold,
        ));

        let promotion = Arc::new(PromotionEngine::new(
            PromotionConfig {
                appearance_threshold: self.config.promotion.appearance_threshold,
                score_threshold: self.config.promotion.score_threshold,
                merge_similarity_threshold: self.config.promotion.merge_similarity_threshold,
            },
            similarity,
            candidates.clone(),
            graph.clone(),
            taxonomy.clone(),
        ));

        let assembler = ContextAssembler::new(
            graph.clone(),
            snapshots.clone(),
            TokenBudgeter::new(self.config.budgeter.chars_per_token),
            relevance,
        );

        info!("Graph coordinator ready");
        Ok(GraphCoordinator {
            config: self.config,
            taxonomy,
            candidates,
            graph,
            promotion,
            snapshots,
            assembler,
            extractor,
        })
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// The assembled engine.
pub struct GraphCoordinator {
    config: Config,
    taxonomy: Arc<Taxonomy>,
    candidates: Arc<CandidateStore>,
    graph: Arc<EntityGraph>,
    promotion: Arc<PromotionEngine>,
    snapshots: Arc<SnapshotStore>,
    assembler: ContextAssembler,
    extractor: Arc<dyn Extractor>,
}

impl GraphCoordinator {
    /// Start building a coordinator.
    pub fn builder(config: Config) -> GraphCoordinatorBuilder {
        GraphCoordinatorBuilder::new(config)
    }

    /// Ingest one document: extract, submit every item, and promote what
    /// qualifies. Entities are submitted before relationships so endpoints
    /// resolve against them. An extraction failure propagates with the
    /// source reference intact; the document is never silently dropped.
    pub async fn ingest_document(&self, text: &str, doc_ref: DocumentRef) -> Result<IngestReport> {
        let items = self
            .extractor
            .extract(text, &doc_ref)
            .await
            .map_err(|e| match e {
                e @ WeftError::UpstreamExtraction { .. } => e,
                other => WeftError::UpstreamExtraction {
                    source_ref: doc_ref.document_id.clone(),
                    message: other.to_string(),
                },
            })?;

        let mut report = IngestReport {
            document_id: doc_ref.document_id.clone(),
            items_extracted: items.len(),
            promoted: 0,
            reinforced: 0,
            pending: 0,
            outcomes: Vec::new(),
        };

        let (entities, relationships): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|item| matches!(item, ExtractedItem::Entity(_)));

        for item in entities.into_iter().chain(relationships) {
            let (description, outcome) = match item {
                ExtractedItem::Entity(extracted) => {
                    let description =
                        format!("{} '{}'", extracted.entity_type, extracted.label);
                    let payload = crate::candidates::CandidateEntity {
                        entity_type: extracted.entity_type,
                        label: extracted.label,
                        aliases: Vec::new(),
                        attributes: extracted.attributes,
                    };
                    let outcome = self
                        .promotion
                        .submit_entity_hit(payload, doc_ref.clone(), extracted.confidence)
                        .await?;
                    (description, outcome)
                }
                ExtractedItem::Relationship(extracted) => {
                    let description = format!(
                        "{} ('{}' -> '{}')",
                        extracted.relation_type, extracted.source_label, extracted.target_label
                    );
                    let outcome = self
                        .promotion
                        .submit_relationship_hit(
                            extracted.relation_type,
                            &extracted.source_label,
                            &extracted.target_label,
                            extracted.attributes,
                            doc_ref.clone(),
                            extracted.confidence,
                        )
                        .await?;
                    (description, outcome)
                }
            };

            match &outcome {
                PromotionOutcome::Promoted { .. } => report.promoted += 1,
                PromotionOutcome::Reinforced { .. } => report.reinforced += 1,
                PromotionOutcome::Pending { .. } => report.pending += 1,
            }
            debug!("Ingested {}: {:?}", description, outcome);
            report.outcomes.push(IngestOutcome {
                description,
                outcome,
            });
        }

        info!(
            "Ingested document {}: {} items ({} promoted, {} reinforced, {} pending)",
            report.document_id,
            report.items_extracted,
            report.promoted,
            report.reinforced,
            report.pending
        );
        Ok(report)
    }

    /// Ingest several documents concurrently. Documents are independent, so
    /// their submissions may interleave freely; each report (or failure) is
    /// returned in input order.
    pub async fn ingest_documents(
        &self,
        documents: Vec<(String, DocumentRef)>,
    ) -> Vec<Result<IngestReport>> {
        let futures = documents
            .iter()
            .map(|(text, doc_ref)| self.ingest_document(text, doc_ref.clone()));
        join_all(futures).await
    }

    /// Assemble a bounded context slice for a consumer.
    pub async fn assemble_context(
        &self,
        detail_level: DetailLevel,
        focus_area: Option<&str>,
        token_budget: usize,
    ) -> Result<Context> {
        self.assembler
            .assemble(detail_level, focus_area, token_budget)
            .await
    }

    /// Capture an immutable snapshot of the current graph state.
    pub async fn capture_snapshot(
        &self,
        detail_level: DetailLevel,
        focus_area: Option<&str>,
    ) -> Result<Snapshot> {
        self.snapshots
            .capture(&self.graph, &self.taxonomy, detail_level, focus_area)
            .await
    }

    /// Retire pending candidates that went stale per the configured window.
    pub async fn retire_stale(&self) -> Vec<String> {
        let retired = self
            .candidates
            .retire_stale(self.config.candidate.stale_window())
            .await;
        if !retired.is_empty() {
            warn!("{} candidates went stale without promotion", retired.len());
        }
        retired
    }

    /// Combined statistics across the engine.
    pub async fn stats(&self) -> EngineStats {
        EngineStats {
            graph: self.graph.stats().await,
            candidates: self.candidates.stats().await,
            snapshot_count: self.snapshots.len().await,
            entity_types: self.taxonomy.entity_types().await.len(),
            relation_types: self.taxonomy.relation_types().await.len(),
        }
    }

    // ========================================================================
    // Component Access
    // ========================================================================

    pub fn graph(&self) -> &Arc<EntityGraph> {
        &self.graph
    }

    pub fn candidates(&self) -> &Arc<CandidateStore> {
        &self.candidates
    }

    pub fn snapshots(&self) -> &Arc<SnapshotStore> {
        &self.snapshots
    }

    pub fn taxonomy(&self) -> &Arc<Taxonomy> {
        &self.taxonomy
    }

    pub fn promotion(&self) -> &Arc<PromotionEngine> {
        &self.promotion
    }
}
