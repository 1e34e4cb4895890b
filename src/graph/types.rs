//! Core types for the entity graph.
//!
//! Entities and relationships are typed against the evolving taxonomy, so
//! their types are open string tags rather than compile-time enums.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Type Tags
// ============================================================================

/// A normalized entity or relationship type tag.
///
/// Tags are lowercased with whitespace collapsed to underscores so that
/// `"Person"`, `"person"` and `" person "` all name the same taxonomy entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeTag(String);

impl TypeTag {
    /// Create a normalized tag.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let normalized = raw
            .as_ref()
            .trim()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("_");
        Self(normalized)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TypeTag {
    fn from(raw: &str) -> Self {
        TypeTag::new(raw)
    }
}

// ============================================================================
// Source References
// ============================================================================

/// A reference to a source document an entity or relationship was seen in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Document identifier in the ingesting system.
    pub document_id: String,
    /// The text the item was extracted from, if available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Confidence of this particular extraction.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    1.0
}

impl DocumentRef {
    /// Create a new document reference.
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            excerpt: None,
            confidence: 1.0,
        }
    }

    /// Set the extracted text.
    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = Some(excerpt.into());
        self
    }

    /// Set the confidence.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

// ============================================================================
// Entities
// ============================================================================

/// A confirmed node in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier.
    pub id: String,
    /// Type tag; must be registered in the taxonomy.
    pub entity_type: TypeTag,
    /// Primary label.
    pub label: String,
    /// Alternative labels, unioned in on merges.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Source documents this entity was seen in, deduplicated by document id.
    #[serde(default)]
    pub source_refs: Vec<DocumentRef>,
    /// How many extraction hits contributed to this entity.
    #[serde(default = "default_appearance")]
    pub appearance_count: u32,
    /// Confidence score (0.0-1.0), the max over contributing extractions.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// When the entity was created.
    pub created_at: DateTime<Utc>,
    /// When the entity was last reinforced or updated.
    pub updated_at: DateTime<Utc>,
}

fn default_appearance() -> u32 {
    1
}

impl Entity {
    /// Create a new entity with the given type and label.
    pub fn new(entity_type: TypeTag, label: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type,
            label: label.into(),
            aliases: Vec::new(),
            attributes: HashMap::new(),
            source_refs: Vec::new(),
            appearance_count: 1,
            confidence: 1.0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add an alias.
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Add a source document reference.
    pub fn with_source_ref(mut self, doc_ref: DocumentRef) -> Self {
        self.add_source_ref(doc_ref);
        self
    }

    /// Set the confidence score.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Union in a source reference, keyed by document id.
    pub fn add_source_ref(&mut self, doc_ref: DocumentRef) {
        if !self
            .source_refs
            .iter()
            .any(|r| r.document_id == doc_ref.document_id)
        {
            self.source_refs.push(doc_ref);
        }
    }

    /// Check if the label or any alias contains the query (case-insensitive).
    pub fn matches_text(&self, query: &str) -> bool {
        let query_lower = query.to_lowercase();
        self.label.to_lowercase().contains(&query_lower)
            || self
                .aliases
                .iter()
                .any(|a| a.to_lowercase().contains(&query_lower))
    }
}

// ============================================================================
// Relationships
// ============================================================================

/// A confirmed directed edge in the knowledge graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relationship {
    /// Unique identifier.
    pub id: String,
    /// Source entity id.
    pub source_id: String,
    /// Target entity id.
    pub target_id: String,
    /// Type tag; must be registered in the taxonomy.
    pub relation_type: TypeTag,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Source documents this relationship was seen in.
    #[serde(default)]
    pub source_refs: Vec<DocumentRef>,
    /// How many extraction hits contributed to this relationship.
    #[serde(default = "default_appearance")]
    pub appearance_count: u32,
    /// Confidence score (0.0-1.0).
    #[serde(default = "default_confidence")]
    pub confidence: f32,
    /// When the relationship was created.
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    /// Create a new relationship between two entities.
    pub fn new(
        source_id: impl Into<String>,
        relation_type: TypeTag,
        target_id: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_id: source_id.into(),
            target_id: target_id.into(),
            relation_type,
            attributes: HashMap::new(),
            source_refs: Vec::new(),
            appearance_count: 1,
            confidence: 1.0,
            created_at: Utc::now(),
        }
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Add a source document reference.
    pub fn with_source_ref(mut self, doc_ref: DocumentRef) -> Self {
        self.add_source_ref(doc_ref);
        self
    }

    /// Set the confidence score.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Union in a source reference, keyed by document id.
    pub fn add_source_ref(&mut self, doc_ref: DocumentRef) {
        if !self
            .source_refs
            .iter()
            .any(|r| r.document_id == doc_ref.document_id)
        {
            self.source_refs.push(doc_ref);
        }
    }
}

// ============================================================================
// Merge Policy
// ============================================================================

/// How attribute conflicts are resolved when two entities merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// The attribute of the most recently updated entity wins.
    #[default]
    NewestWins,
    /// Attributes of the surviving entity always win.
    PreferSurvivor,
    /// Attributes of the absorbed entity always win.
    PreferAbsorbed,
}

// ============================================================================
// Query Types
// ============================================================================

/// A query pattern over the graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphPattern {
    /// Restrict to these entity types (empty = all).
    #[serde(default)]
    pub entity_types: Vec<TypeTag>,
    /// Restrict relationships to these types (empty = all).
    #[serde(default)]
    pub relation_types: Vec<TypeTag>,
    /// Case-insensitive text filter over entity labels and aliases.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Traverse outward from this entity instead of scanning the whole graph.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_id: Option<String>,
    /// Traversal depth from the seed (ignored without a seed).
    #[serde(default = "default_depth")]
    pub depth: usize,
    /// Maximum number of results.
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_depth() -> usize {
    1
}

fn default_limit() -> usize {
    100
}

impl GraphPattern {
    /// Pattern matching entities of the given type.
    pub fn by_entity_type(tag: TypeTag) -> Self {
        Self {
            entity_types: vec![tag],
            ..Default::default()
        }
    }

    /// Pattern matching entities whose label or alias contains `text`.
    pub fn by_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// Pattern traversing outward from a seed entity.
    pub fn from_seed(seed_id: impl Into<String>, depth: usize) -> Self {
        Self {
            seed_id: Some(seed_id.into()),
            depth,
            ..Default::default()
        }
    }

    /// Set the result limit.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// A single query result: either an entity or a relationship.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphItem {
    Entity(Entity),
    Relationship(Relationship),
}

// ============================================================================
// Statistics
// ============================================================================

/// Statistics about the entity graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphStats {
    /// Total number of entities.
    pub entity_count: usize,
    /// Number of entities by type tag.
    pub entities_by_type: HashMap<String, usize>,
    /// Total number of relationships.
    pub relationship_count: usize,
    /// Number of relationships by type tag.
    pub relationships_by_type: HashMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_tag_normalization() {
        assert_eq!(TypeTag::new("Person"), TypeTag::new("person"));
        assert_eq!(TypeTag::new("  Calendar Event "), TypeTag::new("calendar_event"));
        assert_eq!(TypeTag::new("depends_on").as_str(), "depends_on");
    }

    #[test]
    fn test_entity_creation() {
        let entity = Entity::new(TypeTag::new("person"), "Heinz");
        assert_eq!(entity.label, "Heinz");
        assert_eq!(entity.entity_type, TypeTag::new("person"));
        assert!(!entity.id.is_empty());
        assert_eq!(entity.appearance_count, 1);
    }

    #[test]
    fn test_entity_source_ref_dedup() {
        let mut entity = Entity::new(TypeTag::new("person"), "Heinz")
            .with_source_ref(DocumentRef::new("doc-a"));
        entity.add_source_ref(DocumentRef::new("doc-a"));
        entity.add_source_ref(DocumentRef::new("doc-b"));
        assert_eq!(entity.source_refs.len(), 2);
    }

    #[test]
    fn test_entity_matches_text() {
        let entity = Entity::new(TypeTag::new("person"), "Heinz Doofenshmirtz")
            .with_alias("Dr. D");
        assert!(entity.matches_text("heinz"));
        assert!(entity.matches_text("dr. d"));
        assert!(!entity.matches_text("perry"));
    }

    #[test]
    fn test_relationship_creation() {
        let rel = Relationship::new("e1", TypeTag::new("depends_on"), "e2");
        assert_eq!(rel.source_id, "e1");
        assert_eq!(rel.target_id, "e2");
        assert_eq!(rel.relation_type, TypeTag::new("depends_on"));
    }

    #[test]
    fn test_graph_pattern_builders() {
        let pattern = GraphPattern::by_entity_type(TypeTag::new("person")).with_limit(5);
        assert_eq!(pattern.limit, 5);
        assert!(pattern.seed_id.is_none());

        let pattern = GraphPattern::from_seed("e1", 2);
        assert_eq!(pattern.depth, 2);
    }
}
