//! The authoritative entity graph.
//!
//! All confirmed entities and relationships live here, behind a single
//! `RwLock` so every mutation commits atomically and readers always observe
//! a consistent graph. Promotion uses the check-and-commit operations to
//! serialize racing writers: the check is re-run under the write guard
//! immediately before the commit, and a losing writer lands as a
//! reinforcement of the existing record instead of a duplicate.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, RwLock};

use crate::error::{Result, WeftError};
use crate::graph::types::{
    DocumentRef, Entity, GraphItem, GraphPattern, GraphStats, MergePolicy, Relationship, TypeTag,
};
use crate::taxonomy::Taxonomy;

/// Version written into the persisted graph file.
pub const GRAPH_SCHEMA_VERSION: u32 = 1;

/// Outcome of a check-and-commit operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A new record was inserted with this id.
    Inserted(String),
    /// An equivalent record already existed; it was reinforced instead.
    Reinforced(String),
}

impl CommitOutcome {
    /// The graph id the commit landed on, either way.
    pub fn graph_id(&self) -> &str {
        match self {
            CommitOutcome::Inserted(id) | CommitOutcome::Reinforced(id) => id,
        }
    }
}

// ============================================================================
// Internal Data Structure
// ============================================================================

#[derive(Debug, Default)]
struct GraphData {
    /// Entities indexed by id.
    entities: HashMap<String, Entity>,
    /// Relationships indexed by id.
    relationships: HashMap<String, Relationship>,
    /// Index: source entity id -> relationship ids.
    rel_by_source: HashMap<String, Vec<String>>,
    /// Index: target entity id -> relationship ids.
    rel_by_target: HashMap<String, Vec<String>>,
    /// Index: entity type tag -> entity ids, in insertion order.
    entities_by_type: HashMap<TypeTag, Vec<String>>,
    /// Index: document id -> entity ids.
    entities_by_doc: HashMap<String, Vec<String>>,
}

impl GraphData {
    fn index_entity(&mut self, entity: &Entity) {
        self.entities_by_type
            .entry(entity.entity_type.clone())
            .or_default()
            .push(entity.id.clone());
        for doc_ref in &entity.source_refs {
            self.entities_by_doc
                .entry(doc_ref.document_id.clone())
                .or_default()
                .push(entity.id.clone());
        }
    }

    fn unindex_entity(&mut self, entity: &Entity) {
        if let Some(ids) = self.entities_by_type.get_mut(&entity.entity_type) {
            ids.retain(|id| id != &entity.id);
        }
        for ids in self.entities_by_doc.values_mut() {
            ids.retain(|id| id != &entity.id);
        }
    }

    fn index_entity_doc(&mut self, entity_id: &str, document_id: &str) {
        let ids = self
            .entities_by_doc
            .entry(document_id.to_string())
            .or_default();
        if !ids.iter().any(|id| id == entity_id) {
            ids.push(entity_id.to_string());
        }
    }

    fn index_relationship(&mut self, rel: &Relationship) {
        self.rel_by_source
            .entry(rel.source_id.clone())
            .or_default()
            .push(rel.id.clone());
        self.rel_by_target
            .entry(rel.target_id.clone())
            .or_default()
            .push(rel.id.clone());
    }

    fn unindex_relationship(&mut self, rel: &Relationship) {
        if let Some(ids) = self.rel_by_source.get_mut(&rel.source_id) {
            ids.retain(|id| id != &rel.id);
        }
        if let Some(ids) = self.rel_by_target.get_mut(&rel.target_id) {
            ids.retain(|id| id != &rel.id);
        }
    }

    /// Relationship ids involving an entity, deduplicated.
    fn rels_involving(&self, entity_id: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for id in self
            .rel_by_source
            .get(entity_id)
            .into_iter()
            .flatten()
            .chain(self.rel_by_target.get(entity_id).into_iter().flatten())
        {
            if seen.insert(id.clone()) {
                ids.push(id.clone());
            }
        }
        ids
    }

    /// An existing edge with the same endpoints and type, if any.
    fn find_equivalent_relationship(&self, rel: &Relationship) -> Option<String> {
        self.rel_by_source
            .get(&rel.source_id)
            .into_iter()
            .flatten()
            .filter_map(|id| self.relationships.get(id))
            .find(|existing| {
                existing.target_id == rel.target_id && existing.relation_type == rel.relation_type
            })
            .map(|existing| existing.id.clone())
    }
}

/// Persisted graph layout, versioned so old files stay loadable.
#[derive(Serialize, Deserialize)]
struct PersistedGraph {
    schema_version: u32,
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
}

// ============================================================================
// Entity Graph
// ============================================================================

/// In-memory entity graph with optional JSON persistence.
pub struct EntityGraph {
    /// All data behind a single lock for consistent reads and atomic writes.
    data: RwLock<GraphData>,
    /// The taxonomy every type tag is validated against.
    taxonomy: Arc<Taxonomy>,
    /// Optional persistence file path.
    persistence_path: Option<PathBuf>,
    /// Serializes persistence writes.
    persist_lock: AsyncMutex<()>,
}

impl EntityGraph {
    /// Create a new in-memory graph without persistence.
    pub fn new(taxonomy: Arc<Taxonomy>) -> Self {
        Self {
            data: RwLock::new(GraphData::default()),
            taxonomy,
            persistence_path: None,
            persist_lock: AsyncMutex::new(()),
        }
    }

    /// Create a graph persisted to `graph.json` under the given directory,
    /// loading existing data if present.
    pub async fn with_persistence(taxonomy: Arc<Taxonomy>, data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let persistence_path = data_dir.join("graph.json");
        let graph = Self {
            data: RwLock::new(GraphData::default()),
            taxonomy,
            persistence_path: Some(persistence_path.clone()),
            persist_lock: AsyncMutex::new(()),
        };
        if persistence_path.exists() {
            graph.load_from_file(&persistence_path).await?;
        }
        Ok(graph)
    }

    async fn load_from_file(&self, path: &Path) -> Result<()> {
        let content = tokio::fs::read_to_string(path).await?;
        let persisted: PersistedGraph = serde_json::from_str(&content)?;

        if persisted.schema_version > GRAPH_SCHEMA_VERSION {
            return Err(WeftError::constraint(format!(
                "graph file {} has schema version {} but this build supports up to {}",
                path.display(),
                persisted.schema_version,
                GRAPH_SCHEMA_VERSION
            )));
        }

        let mut data = self.data.write().await;
        for entity in persisted.entities {
            // Persisted tags are re-registered so the taxonomy survives restarts.
            self.taxonomy
                .register_entity_type(entity.entity_type.clone(), "persistence")
                .await;
            data.index_entity(&entity);
            data.entities.insert(entity.id.clone(), entity);
        }
        for rel in persisted.relationships {
            self.taxonomy
                .register_relation_type(rel.relation_type.clone(), "persistence")
                .await;
            data.index_relationship(&rel);
            data.relationships.insert(rel.id.clone(), rel);
        }

        tracing::info!(
            "Loaded {} entities and {} relationships from {}",
            data.entities.len(),
            data.relationships.len(),
            path.display()
        );
        Ok(())
    }

    /// Persist to file if persistence is enabled, via temp file + rename.
    async fn persist(&self) -> Result<()> {
        let Some(ref path) = self.persistence_path else {
            return Ok(());
        };
        let _lock = self.persist_lock.lock().await;

        let data = self.data.read().await;
        let persisted = PersistedGraph {
            schema_version: GRAPH_SCHEMA_VERSION,
            entities: data.entities.values().cloned().collect(),
            relationships: data.relationships.values().cloned().collect(),
        };
        drop(data);

        let content = serde_json::to_string_pretty(&persisted)?;
        let temp_path = path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, content).await?;
        tokio::fs::rename(&temp_path, path).await?;
        Ok(())
    }

    // ========================================================================
    // Entity Operations
    // ========================================================================

    /// Add a new entity. Fails with a constraint error on a duplicate id or
    /// an unregistered type tag.
    pub async fn add_entity(&self, entity: Entity) -> Result<String> {
        if !self.taxonomy.is_entity_type(&entity.entity_type).await {
            return Err(WeftError::constraint(format!(
                "entity type '{}' is not registered in the taxonomy (entity '{}')",
                entity.entity_type, entity.label
            )));
        }

        let mut data = self.data.write().await;
        if data.entities.contains_key(&entity.id) {
            return Err(WeftError::constraint(format!(
                "duplicate entity id: {}",
                entity.id
            )));
        }
        let id = entity.id.clone();
        data.index_entity(&entity);
        data.entities.insert(id.clone(), entity);
        drop(data);

        self.persist().await?;
        Ok(id)
    }

    /// Get an entity by id.
    pub async fn get_entity(&self, id: &str) -> Result<Option<Entity>> {
        let data = self.data.read().await;
        Ok(data.entities.get(id).cloned())
    }

    /// Reinforce an existing entity: bump its appearance count, union in the
    /// source reference, and raise its confidence floor. This is the landing
    /// path for promotion races resolved as reinforcement.
    pub async fn reinforce_entity(
        &self,
        id: &str,
        doc_ref: DocumentRef,
        confidence: f32,
    ) -> Result<Entity> {
        let mut data = self.data.write().await;
        let document_id = doc_ref.document_id.clone();
        let entity = data
            .entities
            .get_mut(id)
            .ok_or_else(|| WeftError::not_found("entity", id))?;

        entity.appearance_count += 1;
        entity.confidence = entity.confidence.max(confidence.clamp(0.0, 1.0));
        entity.add_source_ref(doc_ref);
        entity.updated_at = Utc::now();
        let updated = entity.clone();
        data.index_entity_doc(id, &document_id);
        drop(data);

        self.persist().await?;
        Ok(updated)
    }

    /// Atomically insert the entity unless `is_duplicate` identifies an
    /// existing entity of the same type as equivalent, in which case that
    /// entity is reinforced instead. The duplicate check runs under the write
    /// guard, immediately before the commit, so concurrent promotions of the
    /// same logical entity cannot both insert; the first writer wins and
    /// later writers land as reinforcement.
    pub async fn commit_entity_checked<F>(
        &self,
        entity: Entity,
        is_duplicate: F,
    ) -> Result<CommitOutcome>
    where
        F: Fn(&Entity, &Entity) -> bool + Send,
    {
        if !self.taxonomy.is_entity_type(&entity.entity_type).await {
            return Err(WeftError::constraint(format!(
                "entity type '{}' is not registered in the taxonomy (entity '{}')",
                entity.entity_type, entity.label
            )));
        }

        let mut data = self.data.write().await;

        // Re-check immediately before commit. Oldest entities are checked
        // first, so the earliest committed record absorbs later arrivals.
        let existing_id = data
            .entities_by_type
            .get(&entity.entity_type)
            .into_iter()
            .flatten()
            .filter_map(|id| data.entities.get(id))
            .find(|existing| is_duplicate(&entity, existing))
            .map(|existing| existing.id.clone());

        let outcome = match existing_id {
            Some(id) => {
                let doc_ids: Vec<String> = entity
                    .source_refs
                    .iter()
                    .map(|r| r.document_id.clone())
                    .collect();
                {
                    let existing = data
                        .entities
                        .get_mut(&id)
                        .expect("indexed entity must exist");
                    existing.appearance_count += entity.appearance_count;
                    existing.confidence = existing.confidence.max(entity.confidence);
                    if !existing.label.eq_ignore_ascii_case(&entity.label)
                        && !existing.aliases.contains(&entity.label)
                    {
                        existing.aliases.push(entity.label.clone());
                    }
                    for doc_ref in entity.source_refs.clone() {
                        existing.add_source_ref(doc_ref);
                    }
                    existing.updated_at = Utc::now();
                    tracing::debug!(
                        "Promotion of '{}' reinforced existing entity {}",
                        existing.label,
                        id
                    );
                }
                for doc_id in &doc_ids {
                    data.index_entity_doc(&id, doc_id);
                }
                CommitOutcome::Reinforced(id)
            }
            None => {
                let id = entity.id.clone();
                data.index_entity(&entity);
                data.entities.insert(id.clone(), entity);
                CommitOutcome::Inserted(id)
            }
        };
        drop(data);

        self.persist().await?;
        Ok(outcome)
    }

    // ========================================================================
    // Relationship Operations
    // ========================================================================

    /// Add a new relationship. Fails with a constraint error if either
    /// endpoint does not exist or the type tag is unregistered.
    pub async fn add_relationship(&self, rel: Relationship) -> Result<String> {
        match self.commit_relationship(rel).await? {
            CommitOutcome::Inserted(id) | CommitOutcome::Reinforced(id) => Ok(id),
        }
    }

    /// Get a relationship by id.
    pub async fn get_relationship(&self, id: &str) -> Result<Option<Relationship>> {
        let data = self.data.read().await;
        Ok(data.relationships.get(id).cloned())
    }

    /// Atomically insert the relationship, or reinforce an existing edge with
    /// the same endpoints and type. Endpoint existence is verified under the
    /// same write guard, so the permanent graph can never gain a dangling edge.
    pub async fn commit_relationship(&self, rel: Relationship) -> Result<CommitOutcome> {
        if !self.taxonomy.is_relation_type(&rel.relation_type).await {
            return Err(WeftError::constraint(format!(
                "relation type '{}' is not registered in the taxonomy",
                rel.relation_type
            )));
        }

        let mut data = self.data.write().await;
        if !data.entities.contains_key(&rel.source_id) {
            return Err(WeftError::constraint(format!(
                "relationship {} references missing source entity {}",
                rel.id, rel.source_id
            )));
        }
        if !data.entities.contains_key(&rel.target_id) {
            return Err(WeftError::constraint(format!(
                "relationship {} references missing target entity {}",
                rel.id, rel.target_id
            )));
        }

        let outcome = match data.find_equivalent_relationship(&rel) {
            Some(id) => {
                let existing = data
                    .relationships
                    .get_mut(&id)
                    .expect("indexed relationship must exist");
                existing.appearance_count += rel.appearance_count;
                existing.confidence = existing.confidence.max(rel.confidence);
                for doc_ref in rel.source_refs {
                    existing.add_source_ref(doc_ref);
                }
                CommitOutcome::Reinforced(id)
            }
            None => {
                let id = rel.id.clone();
                data.index_relationship(&rel);
                data.relationships.insert(id.clone(), rel);
                CommitOutcome::Inserted(id)
            }
        };
        drop(data);

        self.persist().await?;
        Ok(outcome)
    }

    /// The id of the edge with these endpoints and type, if present.
    pub async fn find_relationship(
        &self,
        source_id: &str,
        target_id: &str,
        relation_type: &TypeTag,
    ) -> Option<String> {
        let data = self.data.read().await;
        data.rel_by_source
            .get(source_id)
            .into_iter()
            .flatten()
            .filter_map(|id| data.relationships.get(id))
            .find(|r| r.target_id == target_id && &r.relation_type == relation_type)
            .map(|r| r.id.clone())
    }

    /// Reinforce an existing relationship: bump its appearance count and
    /// union in the source reference.
    pub async fn reinforce_relationship(
        &self,
        id: &str,
        doc_ref: DocumentRef,
        confidence: f32,
    ) -> Result<Relationship> {
        let mut data = self.data.write().await;
        let rel = data
            .relationships
            .get_mut(id)
            .ok_or_else(|| WeftError::not_found("relationship", id))?;
        rel.appearance_count += 1;
        rel.confidence = rel.confidence.max(confidence.clamp(0.0, 1.0));
        rel.add_source_ref(doc_ref);
        let updated = rel.clone();
        drop(data);

        self.persist().await?;
        Ok(updated)
    }

    // ========================================================================
    // Merging
    // ========================================================================

    /// Merge two entities believed to be duplicates, keeping `keep_id` and
    /// absorbing `absorb_id`. Attribute conflicts follow the merge policy;
    /// aliases and source refs are unioned; every edge touching the absorbed
    /// entity is re-pointed at the survivor (self-loops produced by the
    /// re-point are dropped, parallel duplicates are folded together). The
    /// whole merge happens under one write guard, so concurrent reads never
    /// observe a half-merged graph.
    pub async fn merge_entities(
        &self,
        keep_id: &str,
        absorb_id: &str,
        policy: MergePolicy,
    ) -> Result<String> {
        if keep_id == absorb_id {
            return Err(WeftError::constraint(format!(
                "cannot merge entity {} with itself",
                keep_id
            )));
        }

        let mut data = self.data.write().await;
        if !data.entities.contains_key(keep_id) {
            return Err(WeftError::not_found("entity", keep_id));
        }
        let absorbed = data
            .entities
            .remove(absorb_id)
            .ok_or_else(|| WeftError::not_found("entity", absorb_id))?;
        data.unindex_entity(&absorbed);

        // Merge the absorbed entity's fields into the survivor.
        {
            let keep = data.entities.get_mut(keep_id).expect("checked above");
            let absorbed_wins = match policy {
                MergePolicy::NewestWins => absorbed.updated_at > keep.updated_at,
                MergePolicy::PreferSurvivor => false,
                MergePolicy::PreferAbsorbed => true,
            };
            for (key, value) in &absorbed.attributes {
                if absorbed_wins || !keep.attributes.contains_key(key) {
                    keep.attributes.insert(key.clone(), value.clone());
                }
            }
            if !keep.label.eq_ignore_ascii_case(&absorbed.label)
                && !keep.aliases.contains(&absorbed.label)
            {
                keep.aliases.push(absorbed.label.clone());
            }
            for alias in &absorbed.aliases {
                if !keep.aliases.contains(alias) && !keep.label.eq_ignore_ascii_case(alias) {
                    keep.aliases.push(alias.clone());
                }
            }
            keep.appearance_count += absorbed.appearance_count;
            keep.confidence = keep.confidence.max(absorbed.confidence);
            for doc_ref in absorbed.source_refs.clone() {
                keep.add_source_ref(doc_ref);
            }
            keep.updated_at = Utc::now();
        }
        for doc_ref in &absorbed.source_refs {
            data.index_entity_doc(keep_id, &doc_ref.document_id);
        }

        // Re-point every edge touching the absorbed entity.
        for rel_id in data.rels_involving(absorb_id) {
            let Some(mut rel) = data.relationships.remove(&rel_id) else {
                continue;
            };
            data.unindex_relationship(&rel);

            if rel.source_id == absorb_id {
                rel.source_id = keep_id.to_string();
            }
            if rel.target_id == absorb_id {
                rel.target_id = keep_id.to_string();
            }
            if rel.source_id == rel.target_id {
                // Self-loop created by the merge; drop it.
                continue;
            }
            match data.find_equivalent_relationship(&rel) {
                Some(existing_id) => {
                    let existing = data
                        .relationships
                        .get_mut(&existing_id)
                        .expect("indexed relationship must exist");
                    existing.appearance_count += rel.appearance_count;
                    existing.confidence = existing.confidence.max(rel.confidence);
                    for doc_ref in rel.source_refs {
                        existing.add_source_ref(doc_ref);
                    }
                }
                None => {
                    data.index_relationship(&rel);
                    data.relationships.insert(rel.id.clone(), rel);
                }
            }
        }
        drop(data);

        tracing::info!("Merged entity {} into {}", absorb_id, keep_id);
        self.persist().await?;
        Ok(keep_id.to_string())
    }

    // ========================================================================
    // Querying
    // ========================================================================

    /// Query the graph with a pattern. Results are collected under one read
    /// guard (a consistent moment-in-time view), owned, finite, and ordered
    /// deterministically: entities by most recent update then id, followed by
    /// relationships by creation time then id.
    pub async fn query(&self, pattern: &GraphPattern) -> Result<Vec<GraphItem>> {
        let data = self.data.read().await;

        let (entity_ids, rel_ids): (Vec<String>, Vec<String>) = match &pattern.seed_id {
            Some(seed) => {
                if !data.entities.contains_key(seed) {
                    return Err(WeftError::not_found("entity", seed.clone()));
                }
                Self::traverse(&data, seed, pattern.depth)
            }
            None => (
                data.entities.keys().cloned().collect(),
                if pattern.relation_types.is_empty() {
                    Vec::new()
                } else {
                    data.relationships.keys().cloned().collect()
                },
            ),
        };

        let mut entities: Vec<Entity> = entity_ids
            .iter()
            .filter_map(|id| data.entities.get(id))
            .filter(|e| {
                (pattern.entity_types.is_empty()
                    || pattern.entity_types.contains(&e.entity_type))
                    && pattern.text.as_deref().is_none_or(|t| e.matches_text(t))
            })
            .cloned()
            .collect();
        entities.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));

        let kept_ids: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
        let mut relationships: Vec<Relationship> = rel_ids
            .iter()
            .filter_map(|id| data.relationships.get(id))
            .filter(|r| {
                (pattern.relation_types.is_empty()
                    || pattern.relation_types.contains(&r.relation_type))
                    && kept_ids.contains(r.source_id.as_str())
                    && kept_ids.contains(r.target_id.as_str())
            })
            .cloned()
            .collect();
        relationships
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(entities
            .into_iter()
            .map(GraphItem::Entity)
            .chain(relationships.into_iter().map(GraphItem::Relationship))
            .take(pattern.limit)
            .collect())
    }

    /// BFS outward from a seed, collecting entity and relationship ids within
    /// the given depth.
    fn traverse(data: &GraphData, seed: &str, depth: usize) -> (Vec<String>, Vec<String>) {
        let mut visited: HashSet<String> = HashSet::new();
        let mut rel_ids: Vec<String> = Vec::new();
        let mut seen_rels: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        let mut order: Vec<String> = Vec::new();

        visited.insert(seed.to_string());
        order.push(seed.to_string());
        queue.push_back((seed.to_string(), 0));

        while let Some((id, dist)) = queue.pop_front() {
            if dist >= depth {
                continue;
            }
            for rel_id in data.rels_involving(&id) {
                let Some(rel) = data.relationships.get(&rel_id) else {
                    continue;
                };
                if seen_rels.insert(rel_id.clone()) {
                    rel_ids.push(rel_id);
                }
                let other = if rel.source_id == id {
                    &rel.target_id
                } else {
                    &rel.source_id
                };
                if visited.insert(other.clone()) {
                    order.push(other.clone());
                    queue.push_back((other.clone(), dist + 1));
                }
            }
        }
        (order, rel_ids)
    }

    /// BFS distances from a set of seed entities, up to `depth` hops.
    pub async fn distances_from(
        &self,
        seeds: &[String],
        depth: usize,
    ) -> HashMap<String, usize> {
        let data = self.data.read().await;
        let mut dist: HashMap<String, usize> = HashMap::new();
        let mut queue: VecDeque<(String, usize)> = VecDeque::new();
        for seed in seeds {
            if data.entities.contains_key(seed) && !dist.contains_key(seed) {
                dist.insert(seed.clone(), 0);
                queue.push_back((seed.clone(), 0));
            }
        }
        while let Some((id, d)) = queue.pop_front() {
            if d >= depth {
                continue;
            }
            for rel_id in data.rels_involving(&id) {
                let Some(rel) = data.relationships.get(&rel_id) else {
                    continue;
                };
                let other = if rel.source_id == id {
                    rel.target_id.clone()
                } else {
                    rel.source_id.clone()
                };
                if !dist.contains_key(&other) {
                    dist.insert(other.clone(), d + 1);
                    queue.push_back((other, d + 1));
                }
            }
        }
        dist
    }

    // ========================================================================
    // Bulk Reads
    // ========================================================================

    /// Clone the full graph contents under one read guard. Used by snapshot
    /// capture and context assembly for a moment-in-time view.
    pub async fn contents(&self) -> (Vec<Entity>, Vec<Relationship>) {
        let data = self.data.read().await;
        (
            data.entities.values().cloned().collect(),
            data.relationships.values().cloned().collect(),
        )
    }

    /// Statistics about the graph.
    pub async fn stats(&self) -> GraphStats {
        let data = self.data.read().await;
        let mut stats = GraphStats {
            entity_count: data.entities.len(),
            relationship_count: data.relationships.len(),
            ..Default::default()
        };
        for entity in data.entities.values() {
            *stats
                .entities_by_type
                .entry(entity.entity_type.to_string())
                .or_default() += 1;
        }
        for rel in data.relationships.values() {
            *stats
                .relationships_by_type
                .entry(rel.relation_type.to_string())
                .or_default() += 1;
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::GraphPattern;

    fn taxonomy() -> Arc<Taxonomy> {
        Arc::new(Taxonomy::with_defaults())
    }

    async fn add_person(graph: &EntityGraph, label: &str) -> String {
        graph
            .add_entity(Entity::new(TypeTag::new("person"), label))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_and_get_entity() {
        let graph = EntityGraph::new(taxonomy());
        let id = add_person(&graph, "Heinz").await;
        let entity = graph.get_entity(&id).await.unwrap().unwrap();
        assert_eq!(entity.label, "Heinz");
    }

    #[tokio::test]
    async fn test_unknown_type_rejected() {
        let graph = EntityGraph::new(taxonomy());
        let err = graph
            .add_entity(Entity::new(TypeTag::new("spaceship"), "Voyager"))
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_dangling_relationship_rejected() {
        let graph = EntityGraph::new(taxonomy());
        let a = add_person(&graph, "Heinz").await;
        let rel = Relationship::new(&a, TypeTag::new("related_to"), "missing");
        let err = graph.add_relationship(rel).await.unwrap_err();
        assert!(matches!(err, WeftError::Constraint(_)));
    }

    #[tokio::test]
    async fn test_commit_relationship_reinforces_equivalent_edge() {
        let graph = EntityGraph::new(taxonomy());
        let a = add_person(&graph, "Heinz").await;
        let b = add_person(&graph, "Perry").await;

        let first = graph
            .commit_relationship(Relationship::new(&a, TypeTag::new("related_to"), &b))
            .await
            .unwrap();
        assert!(matches!(first, CommitOutcome::Inserted(_)));

        let second = graph
            .commit_relationship(Relationship::new(&a, TypeTag::new("related_to"), &b))
            .await
            .unwrap();
        assert!(matches!(second, CommitOutcome::Reinforced(_)));
        assert_eq!(second.graph_id(), first.graph_id());

        let rel = graph
            .get_relationship(first.graph_id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rel.appearance_count, 2);
    }

    #[tokio::test]
    async fn test_merge_repoints_edges() {
        let graph = EntityGraph::new(taxonomy());
        let keep = add_person(&graph, "Heinz").await;
        let dup = add_person(&graph, "Heinz D.").await;
        let other = add_person(&graph, "Perry").await;

        graph
            .add_relationship(Relationship::new(&dup, TypeTag::new("related_to"), &other))
            .await
            .unwrap();

        graph
            .merge_entities(&keep, &dup, MergePolicy::default())
            .await
            .unwrap();

        assert!(graph.get_entity(&dup).await.unwrap().is_none());
        let survivor = graph.get_entity(&keep).await.unwrap().unwrap();
        assert!(survivor.aliases.contains(&"Heinz D.".to_string()));
        assert_eq!(survivor.appearance_count, 2);

        // The edge now points at the survivor; no edge references the
        // absorbed id.
        let (_, rels) = graph.contents().await;
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].source_id, keep);
        assert_eq!(rels[0].target_id, other);
    }

    #[tokio::test]
    async fn test_merge_drops_self_loops() {
        let graph = EntityGraph::new(taxonomy());
        let keep = add_person(&graph, "Heinz").await;
        let dup = add_person(&graph, "Dr. Heinz").await;
        graph
            .add_relationship(Relationship::new(&keep, TypeTag::new("related_to"), &dup))
            .await
            .unwrap();

        graph
            .merge_entities(&keep, &dup, MergePolicy::default())
            .await
            .unwrap();
        let (_, rels) = graph.contents().await;
        assert!(rels.is_empty());
    }

    #[tokio::test]
    async fn test_merge_attribute_policy() {
        let graph = EntityGraph::new(taxonomy());
        let keep_entity = Entity::new(TypeTag::new("person"), "Heinz")
            .with_attribute("role", serde_json::json!("doctor"));
        let keep = graph.add_entity(keep_entity).await.unwrap();

        // The absorbed entity is created strictly later, so NewestWins
        // favors it.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let absorb_entity = Entity::new(TypeTag::new("person"), "Heinz D.")
            .with_attribute("role", serde_json::json!("inventor"))
            .with_attribute("city", serde_json::json!("Danville"));
        let absorb = graph.add_entity(absorb_entity).await.unwrap();

        graph
            .merge_entities(&keep, &absorb, MergePolicy::NewestWins)
            .await
            .unwrap();
        let survivor = graph.get_entity(&keep).await.unwrap().unwrap();
        assert_eq!(survivor.attributes["role"], serde_json::json!("inventor"));
        assert_eq!(survivor.attributes["city"], serde_json::json!("Danville"));
    }

    #[tokio::test]
    async fn test_query_by_type_and_text() {
        let graph = EntityGraph::new(taxonomy());
        add_person(&graph, "Heinz").await;
        add_person(&graph, "Perry").await;
        graph
            .add_entity(Entity::new(TypeTag::new("project"), "Inator"))
            .await
            .unwrap();

        let people = graph
            .query(&GraphPattern::by_entity_type(TypeTag::new("person")))
            .await
            .unwrap();
        assert_eq!(people.len(), 2);

        let heinz = graph.query(&GraphPattern::by_text("heinz")).await.unwrap();
        assert_eq!(heinz.len(), 1);
    }

    #[tokio::test]
    async fn test_query_traversal_depth() {
        let graph = EntityGraph::new(taxonomy());
        let a = add_person(&graph, "A").await;
        let b = add_person(&graph, "B").await;
        let c = add_person(&graph, "C").await;
        graph
            .add_relationship(Relationship::new(&a, TypeTag::new("related_to"), &b))
            .await
            .unwrap();
        graph
            .add_relationship(Relationship::new(&b, TypeTag::new("related_to"), &c))
            .await
            .unwrap();

        let depth1 = graph.query(&GraphPattern::from_seed(&a, 1)).await.unwrap();
        let entity_count = depth1
            .iter()
            .filter(|i| matches!(i, GraphItem::Entity(_)))
            .count();
        assert_eq!(entity_count, 2);

        let depth2 = graph.query(&GraphPattern::from_seed(&a, 2)).await.unwrap();
        let entity_count = depth2
            .iter()
            .filter(|i| matches!(i, GraphItem::Entity(_)))
            .count();
        assert_eq!(entity_count, 3);
    }

    #[tokio::test]
    async fn test_query_unknown_seed_is_not_found() {
        let graph = EntityGraph::new(taxonomy());
        let err = graph
            .query(&GraphPattern::from_seed("missing", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, WeftError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_persistence_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let tax = taxonomy();
        {
            let graph = EntityGraph::with_persistence(tax.clone(), dir.path())
                .await
                .unwrap();
            let a = add_person(&graph, "Heinz").await;
            let b = add_person(&graph, "Perry").await;
            graph
                .add_relationship(Relationship::new(&a, TypeTag::new("related_to"), &b))
                .await
                .unwrap();
        }

        let reloaded = EntityGraph::with_persistence(tax, dir.path()).await.unwrap();
        let stats = reloaded.stats().await;
        assert_eq!(stats.entity_count, 2);
        assert_eq!(stats.relationship_count, 1);
    }
}
