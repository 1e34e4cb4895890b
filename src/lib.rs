//! Weft: incremental knowledge-graph construction with candidate promotion
//! and budgeted context assembly.
//!
//! Unstructured notes flow through an external extraction capability into a
//! candidate store; repeated sightings promote candidates into the permanent
//! entity graph; immutable snapshots capture graph state at multiple detail
//! levels; and consumers receive bounded, relevance-ranked context slices
//! under a token budget.

pub mod assembly;
pub mod budget;
pub mod candidates;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod extraction;
pub mod graph;
pub mod promotion;
pub mod snapshot;
pub mod taxonomy;

pub use assembly::{
    AssemblyStats, Context, ContextAssembler, ContextFragment, FragmentKind, RelevanceInput,
    RelevancePolicy, WeightedRelevance,
};
pub use budget::TokenBudgeter;
pub use candidates::{
    AuditAction, AuditEvent, Candidate, CandidateEntity, CandidateFilter, CandidateKind,
    CandidatePayload, CandidateRelationship, CandidateStats, CandidateStatus, CandidateStore,
    EndpointRef, RetireReason, StatusFilter, Submission, SubmissionOutcome,
};
pub use config::{BudgeterSettings, CandidateSettings, Config, PromotionSettings, StorageSettings};
pub use coordinator::{
    EngineStats, GraphCoordinator, GraphCoordinatorBuilder, IngestOutcome, IngestReport,
};
pub use error::{ConfigError, Result, WeftError};
pub use extraction::{
    ExtractedEntity, ExtractedItem, ExtractedRelationship, Extractor, StubExtractor,
};
pub use graph::{
    CommitOutcome, DocumentRef, Entity, EntityGraph, GraphItem, GraphPattern, GraphStats,
    MergePolicy, Relationship, TypeTag, GRAPH_SCHEMA_VERSION,
};
pub use promotion::{
    LabelAttributeSimilarity, PromotionConfig, PromotionEngine, PromotionOutcome,
    SimilarityPolicy, SimilarityView,
};
pub use snapshot::{
    DetailLevel, EntityView, GraphView, RelationshipView, Snapshot, SnapshotFilter,
    SnapshotMetadata, SnapshotStore, SNAPSHOT_SCHEMA_VERSION,
};
pub use taxonomy::{TagKind, Taxonomy, TaxonomyEvent, DEFAULT_ENTITY_TYPES, DEFAULT_RELATION_TYPES};
