//! The evolving taxonomy of entity and relationship types.
//!
//! Types are open-ended string tags, not compile-time enums: new kinds of
//! entities and relationships appear as documents are ingested. The registry
//! is append-only (tags are registered, never removed) and every addition
//! is recorded as an event so consumers (extraction biasing, promotion
//! validation) can observe how the taxonomy evolved.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::graph::TypeTag;

/// The default entity types the registry is seeded with.
pub const DEFAULT_ENTITY_TYPES: &[&str] = &[
    "document",
    "concept",
    "person",
    "organization",
    "project",
    "task",
    "decision",
    "component",
    "workflow",
];

/// The default relationship types the registry is seeded with.
pub const DEFAULT_RELATION_TYPES: &[&str] = &[
    "contains",
    "references",
    "depends_on",
    "created_by",
    "part_of",
    "related_to",
    "precedes",
    "influences",
];

/// Which namespace a tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Entity,
    Relation,
}

/// An append-only record of a tag being registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaxonomyEvent {
    /// The tag that was added.
    pub tag: TypeTag,
    /// Entity or relationship namespace.
    pub kind: TagKind,
    /// When the tag was registered.
    pub registered_at: DateTime<Utc>,
    /// Where the registration came from (e.g. "seed", "promotion").
    pub origin: String,
}

#[derive(Debug, Default)]
struct TaxonomyInner {
    entity_tags: HashSet<TypeTag>,
    relation_tags: HashSet<TypeTag>,
    events: Vec<TaxonomyEvent>,
}

/// Append-only registry of known entity and relationship type tags.
///
/// Consulted by the graph on every mutation and by the promotion engine when
/// validating candidates. New tags are committed through the explicit
/// `register_*` operations, never inferred implicitly.
#[derive(Debug, Default)]
pub struct Taxonomy {
    inner: RwLock<TaxonomyInner>,
}

impl Taxonomy {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with the standard types.
    pub fn with_defaults() -> Self {
        let now = Utc::now();
        let mut inner = TaxonomyInner::default();
        for tag in DEFAULT_ENTITY_TYPES {
            let tag = TypeTag::new(tag);
            inner.events.push(TaxonomyEvent {
                tag: tag.clone(),
                kind: TagKind::Entity,
                registered_at: now,
                origin: "seed".to_string(),
            });
            inner.entity_tags.insert(tag);
        }
        for tag in DEFAULT_RELATION_TYPES {
            let tag = TypeTag::new(tag);
            inner.events.push(TaxonomyEvent {
                tag: tag.clone(),
                kind: TagKind::Relation,
                registered_at: now,
                origin: "seed".to_string(),
            });
            inner.relation_tags.insert(tag);
        }
        Self {
            inner: RwLock::new(inner),
        }
    }

    /// Register an entity type tag. Returns `true` if the tag was new.
    ///
    /// Registering an already-known tag is a no-op and emits no event.
    pub async fn register_entity_type(&self, tag: TypeTag, origin: impl Into<String>) -> bool {
        let mut inner = self.inner.write().await;
        if inner.entity_tags.contains(&tag) {
            return false;
        }
        let origin = origin.into();
        tracing::debug!("Registering entity type '{}' (origin: {})", tag, origin);
        inner.events.push(TaxonomyEvent {
            tag: tag.clone(),
            kind: TagKind::Entity,
            registered_at: Utc::now(),
            origin,
        });
        inner.entity_tags.insert(tag);
        true
    }

    /// Register a relationship type tag. Returns `true` if the tag was new.
    pub async fn register_relation_type(&self, tag: TypeTag, origin: impl Into<String>) -> bool {
        let mut inner = self.inner.write().await;
        if inner.relation_tags.contains(&tag) {
            return false;
        }
        let origin = origin.into();
        tracing::debug!("Registering relation type '{}' (origin: {})", tag, origin);
        inner.events.push(TaxonomyEvent {
            tag: tag.clone(),
            kind: TagKind::Relation,
            registered_at: Utc::now(),
            origin,
        });
        inner.relation_tags.insert(tag);
        true
    }

    /// Check whether a tag is a registered entity type.
    pub async fn is_entity_type(&self, tag: &TypeTag) -> bool {
        self.inner.read().await.entity_tags.contains(tag)
    }

    /// Check whether a tag is a registered relationship type.
    pub async fn is_relation_type(&self, tag: &TypeTag) -> bool {
        self.inner.read().await.relation_tags.contains(tag)
    }

    /// All registered entity type tags, sorted.
    pub async fn entity_types(&self) -> Vec<TypeTag> {
        let inner = self.inner.read().await;
        let mut tags: Vec<TypeTag> = inner.entity_tags.iter().cloned().collect();
        tags.sort();
        tags
    }

    /// All registered relationship type tags, sorted.
    pub async fn relation_types(&self) -> Vec<TypeTag> {
        let inner = self.inner.read().await;
        let mut tags: Vec<TypeTag> = inner.relation_tags.iter().cloned().collect();
        tags.sort();
        tags
    }

    /// The full registration history, oldest first.
    pub async fn events(&self) -> Vec<TaxonomyEvent> {
        self.inner.read().await.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_defaults_are_seeded() {
        let taxonomy = Taxonomy::with_defaults();
        assert!(taxonomy.is_entity_type(&TypeTag::new("person")).await);
        assert!(taxonomy.is_relation_type(&TypeTag::new("depends_on")).await);
        assert!(!taxonomy.is_entity_type(&TypeTag::new("spaceship")).await);

        let events = taxonomy.events().await;
        assert_eq!(
            events.len(),
            DEFAULT_ENTITY_TYPES.len() + DEFAULT_RELATION_TYPES.len()
        );
    }

    #[tokio::test]
    async fn test_register_is_append_only() {
        let taxonomy = Taxonomy::with_defaults();
        let before = taxonomy.entity_types().await.len();

        assert!(
            taxonomy
                .register_entity_type(TypeTag::new("spaceship"), "promotion")
                .await
        );
        assert_eq!(taxonomy.entity_types().await.len(), before + 1);

        // Re-registering is a no-op, not an error, and emits no event.
        let events_before = taxonomy.events().await.len();
        assert!(
            !taxonomy
                .register_entity_type(TypeTag::new("spaceship"), "promotion")
                .await
        );
        assert_eq!(taxonomy.events().await.len(), events_before);
        assert_eq!(taxonomy.entity_types().await.len(), before + 1);
    }

    #[tokio::test]
    async fn test_namespaces_are_separate() {
        let taxonomy = Taxonomy::new();
        taxonomy
            .register_entity_type(TypeTag::new("topic"), "test")
            .await;
        assert!(taxonomy.is_entity_type(&TypeTag::new("topic")).await);
        assert!(!taxonomy.is_relation_type(&TypeTag::new("topic")).await);
    }
}
