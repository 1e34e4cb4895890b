//! Snapshot capture and storage.
//!
//! Captures read the graph through one consistent read, render a
//! [`GraphView`] at the requested detail level, and store it immutably.
//! With persistence enabled each snapshot is written once to its own file
//! and never rewritten. Retention is external policy; `prune` is provided
//! as the maintenance hook but nothing calls it automatically.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::{Result, WeftError};
use crate::graph::{Entity, EntityGraph, Relationship};
use crate::snapshot::types::{
    DetailLevel, EntityView, GraphView, RelationshipView, Snapshot, SnapshotFilter,
    SnapshotMetadata, SNAPSHOT_SCHEMA_VERSION,
};
use crate::taxonomy::Taxonomy;

/// Entities included in a summary-level capture.
const SUMMARY_TOP_ENTITIES: usize = 20;

/// Neighborhood depth around focus matches in a focused capture.
const FOCUS_DEPTH: usize = 2;

/// Store of immutable graph snapshots.
pub struct SnapshotStore {
    snapshots: RwLock<HashMap<String, Snapshot>>,
    persistence_dir: Option<PathBuf>,
}

impl SnapshotStore {
    /// Create an in-memory store.
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            persistence_dir: None,
        }
    }

    /// Create a store persisting each snapshot to `<dir>/snapshots/<id>.json`,
    /// loading existing snapshots.
    pub async fn with_persistence(data_dir: &Path) -> Result<Self> {
        let dir = data_dir.join("snapshots");
        std::fs::create_dir_all(&dir)?;

        let mut snapshots = HashMap::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str::<Snapshot>(&content) {
                Ok(snapshot) => {
                    snapshots.insert(snapshot.id.clone(), snapshot);
                }
                Err(e) => {
                    tracing::warn!("Skipping unreadable snapshot {}: {}", path.display(), e);
                }
            }
        }
        tracing::info!("Loaded {} snapshots from {}", snapshots.len(), dir.display());

        Ok(Self {
            snapshots: RwLock::new(snapshots),
            persistence_dir: Some(dir),
        })
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Capture the current graph state at the given detail level, optionally
    /// narrowed to a focus area (focus matches plus their neighborhood).
    pub async fn capture(
        &self,
        graph: &EntityGraph,
        taxonomy: &Taxonomy,
        detail_level: DetailLevel,
        focus_area: Option<&str>,
    ) -> Result<Snapshot> {
        let (entities, relationships) = graph.contents().await;

        // Narrow to the focus neighborhood when a focus area is given.
        let (entities, relationships) = match focus_area {
            Some(focus) => {
                let seeds: Vec<String> = entities
                    .iter()
                    .filter(|e| e.matches_text(focus) || e.entity_type.as_str() == focus)
                    .map(|e| e.id.clone())
                    .collect();
                let reachable = graph.distances_from(&seeds, FOCUS_DEPTH).await;
                let kept: Vec<Entity> = entities
                    .into_iter()
                    .filter(|e| reachable.contains_key(&e.id))
                    .collect();
                let kept_ids: HashSet<&str> = kept.iter().map(|e| e.id.as_str()).collect();
                let rels: Vec<Relationship> = relationships
                    .into_iter()
                    .filter(|r| {
                        kept_ids.contains(r.source_id.as_str())
                            && kept_ids.contains(r.target_id.as_str())
                    })
                    .collect();
                (kept, rels)
            }
            None => (entities, relationships),
        };

        let view = Self::render_view(
            entities,
            relationships,
            taxonomy,
            detail_level,
            focus_area,
        )
        .await;

        let content = serde_json::to_string_pretty(&view)?;
        let snapshot = Snapshot {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: view.captured_at,
            detail_level,
            focus_area: focus_area.map(String::from),
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            content_hash: Snapshot::compute_hash(&content),
            entity_count: view.entities.len(),
            relationship_count: view.relationships.len(),
            content,
        };

        self.persist(&snapshot).await?;
        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(snapshot.id.clone(), snapshot.clone());
        drop(snapshots);

        tracing::info!(
            "Captured snapshot {} ({}, {} entities, {} relationships)",
            snapshot.id,
            snapshot.detail_level,
            snapshot.entity_count,
            snapshot.relationship_count
        );
        Ok(snapshot)
    }

    /// Render the view for a capture. Entities are ordered by appearance
    /// count, then label, then id, so the serialized form is deterministic
    /// for a given graph state.
    async fn render_view(
        mut entities: Vec<Entity>,
        mut relationships: Vec<Relationship>,
        taxonomy: &Taxonomy,
        detail_level: DetailLevel,
        focus_area: Option<&str>,
    ) -> GraphView {
        entities.sort_by(|a, b| {
            b.appearance_count
                .cmp(&a.appearance_count)
                .then_with(|| a.label.cmp(&b.label))
                .then_with(|| a.id.cmp(&b.id))
        });
        relationships.sort_by(|a, b| a.id.cmp(&b.id));

        if detail_level == DetailLevel::Summary {
            entities.truncate(SUMMARY_TOP_ENTITIES);
            let kept: HashSet<&str> = entities.iter().map(|e| e.id.as_str()).collect();
            relationships
                .retain(|r| kept.contains(r.source_id.as_str()) && kept.contains(r.target_id.as_str()));
        }

        let detailed = detail_level == DetailLevel::Detailed;
        let entity_views: Vec<EntityView> = entities
            .iter()
            .map(|e| EntityView {
                id: e.id.clone(),
                entity_type: e.entity_type.clone(),
                label: e.label.clone(),
                appearance_count: e.appearance_count,
                aliases: if detailed && !e.aliases.is_empty() {
                    Some(e.aliases.clone())
                } else {
                    None
                },
                attributes: if detailed && !e.attributes.is_empty() {
                    Some(e.attributes.clone().into_iter().collect::<BTreeMap<_, _>>())
                } else {
                    None
                },
                source_documents: if detailed && !e.source_refs.is_empty() {
                    let mut docs: Vec<String> =
                        e.source_refs.iter().map(|r| r.document_id.clone()).collect();
                    docs.sort();
                    Some(docs)
                } else {
                    None
                },
                updated_at: e.updated_at,
            })
            .collect();

        let relationship_views: Vec<RelationshipView> = if detail_level == DetailLevel::Summary {
            Vec::new()
        } else {
            relationships
                .iter()
                .map(|r| RelationshipView {
                    id: r.id.clone(),
                    source_id: r.source_id.clone(),
                    target_id: r.target_id.clone(),
                    relation_type: r.relation_type.clone(),
                    appearance_count: r.appearance_count,
                    attributes: if detailed && !r.attributes.is_empty() {
                        Some(r.attributes.clone().into_iter().collect::<BTreeMap<_, _>>())
                    } else {
                        None
                    },
                })
                .collect()
        };

        GraphView {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            captured_at: Utc::now(),
            detail_level,
            focus_area: focus_area.map(String::from),
            entity_types: taxonomy.entity_types().await,
            relation_types: taxonomy.relation_types().await,
            entities: entity_views,
            relationships: relationship_views,
        }
    }

    async fn persist(&self, snapshot: &Snapshot) -> Result<()> {
        let Some(ref dir) = self.persistence_dir else {
            return Ok(());
        };
        let path = dir.join(format!("{}.json", snapshot.id));
        let content = serde_json::to_string_pretty(snapshot)?;
        tokio::fs::write(&path, content).await?;
        Ok(())
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// List snapshot metadata matching a filter, newest first.
    pub async fn list(&self, filter: &SnapshotFilter) -> Vec<SnapshotMetadata> {
        let snapshots = self.snapshots.read().await;
        let mut matching: Vec<&Snapshot> = snapshots
            .values()
            .filter(|s| filter.matches(s))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if filter.limit > 0 {
            matching.truncate(filter.limit);
        }
        matching.into_iter().map(SnapshotMetadata::from).collect()
    }

    /// Load a snapshot by id.
    pub async fn load(&self, id: &str) -> Result<Snapshot> {
        let snapshots = self.snapshots.read().await;
        snapshots
            .get(id)
            .cloned()
            .ok_or_else(|| WeftError::not_found("snapshot", id))
    }

    /// Number of stored snapshots.
    pub async fn len(&self) -> usize {
        self.snapshots.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.snapshots.read().await.is_empty()
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Remove snapshots captured before the cutoff. Returns how many were
    /// removed. Retention policy is the caller's concern.
    pub async fn prune(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut snapshots = self.snapshots.write().await;
        let stale: Vec<String> = snapshots
            .values()
            .filter(|s| s.created_at < before)
            .map(|s| s.id.clone())
            .collect();

        for id in &stale {
            snapshots.remove(id);
            if let Some(ref dir) = self.persistence_dir {
                let path = dir.join(format!("{id}.json"));
                if path.exists() {
                    tokio::fs::remove_file(&path).await?;
                }
            }
        }
        if !stale.is_empty() {
            tracing::info!("Pruned {} snapshots", stale.len());
        }
        Ok(stale.len())
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
