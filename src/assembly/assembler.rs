//! Greedy, deterministic context assembly under a token budget.
//!
//! The assembler clones the graph contents once (a consistent moment-in-time
//! view), builds a fragment pool from focus-area entity neighborhoods and
//! recent snapshot excerpts, ranks it with the relevance policy, applies the
//! detail-level cutoff, and fills the budget greedily in descending score
//! order. There is no hidden randomness: ties break on fragment id, and
//! recency is measured against the newest content in the pool rather than
//! the wall clock, so identical state and arguments produce identical output.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use chrono::Utc;

use crate::assembly::relevance::{RelevanceInput, RelevancePolicy};
use crate::assembly::types::{AssemblyStats, Context, ContextFragment, FragmentKind};
use crate::budget::TokenBudgeter;
use crate::error::{Result, WeftError};
use crate::graph::{Entity, EntityGraph, Relationship};
use crate::snapshot::{DetailLevel, SnapshotFilter, SnapshotStore};

/// Snapshot excerpts considered per assembly.
const SNAPSHOT_POOL: usize = 2;

/// Entity labels listed in a snapshot excerpt.
const EXCERPT_TOP_ENTITIES: usize = 5;

/// Relevance cutoff per detail level. Summary keeps only top-ranked
/// fragments; detailed relaxes the cutoff entirely but still honors the
/// budget.
fn relevance_cutoff(level: DetailLevel) -> f64 {
    match level {
        DetailLevel::Summary => 0.5,
        DetailLevel::Standard => 0.25,
        DetailLevel::Detailed => 0.0,
    }
}

/// Focus-neighborhood traversal depth per detail level.
fn neighborhood_depth(level: DetailLevel) -> usize {
    match level {
        DetailLevel::Summary => 1,
        DetailLevel::Standard => 2,
        DetailLevel::Detailed => 3,
    }
}

/// Assembles bounded, relevance-ranked context slices.
pub struct ContextAssembler {
    graph: Arc<EntityGraph>,
    snapshots: Arc<SnapshotStore>,
    budgeter: TokenBudgeter,
    policy: Arc<dyn RelevancePolicy>,
}

impl ContextAssembler {
    pub fn new(
        graph: Arc<EntityGraph>,
        snapshots: Arc<SnapshotStore>,
        budgeter: TokenBudgeter,
        policy: Arc<dyn RelevancePolicy>,
    ) -> Self {
        Self {
            graph,
            snapshots,
            budgeter,
            policy,
        }
    }

    /// Assemble a context slice. The estimated cost of the result never
    /// exceeds `token_budget` (up to the budgeter's documented estimation
    /// error). Fails with `BudgetExceeded` only when the single top-ranked
    /// fragment alone exceeds the total budget.
    pub async fn assemble(
        &self,
        detail_level: DetailLevel,
        focus_area: Option<&str>,
        token_budget: usize,
    ) -> Result<Context> {
        let (entities, relationships) = self.graph.contents().await;

        // Degree map and adjacency for traversal and card rendering.
        let mut degree: HashMap<&str, usize> = HashMap::new();
        let mut adjacency: HashMap<&str, Vec<&Relationship>> = HashMap::new();
        for rel in &relationships {
            *degree.entry(rel.source_id.as_str()).or_default() += 1;
            *degree.entry(rel.target_id.as_str()).or_default() += 1;
            adjacency.entry(rel.source_id.as_str()).or_default().push(rel);
            adjacency.entry(rel.target_id.as_str()).or_default().push(rel);
        }
        let max_degree = degree.values().copied().max().unwrap_or(0);
        let labels: HashMap<&str, &str> = entities
            .iter()
            .map(|e| (e.id.as_str(), e.label.as_str()))
            .collect();

        // Focus distances over the same consistent view.
        let focus_distances = focus_area.map(|focus| {
            let seeds: Vec<&str> = entities
                .iter()
                .filter(|e| e.matches_text(focus) || e.entity_type.as_str() == focus)
                .map(|e| e.id.as_str())
                .collect();
            Self::bfs_distances(&seeds, &adjacency)
        });

        // Entity pool: the focus neighborhood, or everything without focus.
        let depth = neighborhood_depth(detail_level);
        let pool: Vec<&Entity> = match &focus_distances {
            Some(distances) => entities
                .iter()
                .filter(|e| distances.get(e.id.as_str()).is_some_and(|d| *d <= depth))
                .collect(),
            None => entities.iter().collect(),
        };

        // Reference time: newest content in scope keeps scoring deterministic.
        let snapshot_pool = self
            .snapshots
            .list(&SnapshotFilter {
                limit: SNAPSHOT_POOL,
                ..Default::default()
            })
            .await;
        let reference_time = pool
            .iter()
            .map(|e| e.updated_at)
            .chain(snapshot_pool.iter().map(|s| s.created_at))
            .max()
            .unwrap_or_else(Utc::now);

        let mut fragments: Vec<ContextFragment> = Vec::new();

        for entity in &pool {
            let text = Self::render_entity_card(entity, &adjacency, &labels);
            let input = RelevanceInput {
                last_updated: entity.updated_at,
                reference_time,
                has_focus: focus_area.is_some(),
                focus_distance: focus_distances
                    .as_ref()
                    .and_then(|d| d.get(entity.id.as_str()).copied()),
                degree: degree.get(entity.id.as_str()).copied().unwrap_or(0),
                max_degree,
            };
            fragments.push(ContextFragment {
                id: format!("entity:{}", entity.id),
                kind: FragmentKind::EntityCard,
                title: entity.label.clone(),
                estimated_tokens: self.budgeter.estimate(&text),
                score: self.policy.score(&input),
                text,
            });
        }

        for meta in &snapshot_pool {
            let Ok(snapshot) = self.snapshots.load(&meta.id).await else {
                continue;
            };
            let text = Self::render_snapshot_excerpt(&snapshot)?;
            let input = RelevanceInput {
                last_updated: meta.created_at,
                reference_time,
                has_focus: focus_area.is_some(),
                focus_distance: match (focus_area, meta.focus_area.as_deref()) {
                    (Some(focus), Some(snapshot_focus)) if focus == snapshot_focus => Some(0),
                    (Some(_), _) => None,
                    (None, _) => None,
                },
                degree: 0,
                max_degree,
            };
            fragments.push(ContextFragment {
                id: format!("snapshot:{}", meta.id),
                kind: FragmentKind::SnapshotExcerpt,
                title: format!("Snapshot {}", meta.created_at.format("%Y-%m-%d %H:%M")),
                estimated_tokens: self.budgeter.estimate(&text),
                score: self.policy.score(&input),
                text,
            });
        }

        let pool_size = fragments.len();

        // Rank: descending score, ties broken by fragment id.
        fragments.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        // Detail-level relevance cutoff.
        let cutoff = relevance_cutoff(detail_level);
        let before_cutoff = fragments.len();
        fragments.retain(|f| f.score >= cutoff);
        let dropped_below_cutoff = before_cutoff - fragments.len();

        // A single fragment that cannot fit the whole budget is an error the
        // caller can act on; anything else is normal truncation.
        if let Some(first) = fragments.first() {
            if first.estimated_tokens > token_budget {
                return Err(WeftError::BudgetExceeded {
                    fragment_tokens: first.estimated_tokens,
                    budget: token_budget,
                });
            }
        }

        // Greedy fill in rank order until the next fragment would not fit.
        let mut selected: Vec<ContextFragment> = Vec::new();
        let mut remaining = token_budget;
        let mut truncated_by_budget = false;
        for fragment in fragments {
            if fragment.estimated_tokens <= remaining {
                remaining -= fragment.estimated_tokens;
                selected.push(fragment);
            } else {
                truncated_by_budget = true;
                break;
            }
        }

        let estimated_tokens = selected.iter().map(|f| f.estimated_tokens).sum();
        let stats = AssemblyStats {
            pool_size,
            selected: selected.len(),
            dropped_below_cutoff,
            truncated_by_budget,
        };
        tracing::debug!(
            "Assembled {} fragments (~{} of {} tokens, pool {})",
            stats.selected,
            estimated_tokens,
            token_budget,
            pool_size
        );

        Ok(Context {
            detail_level,
            focus_area: focus_area.map(String::from),
            token_budget,
            fragments: selected,
            estimated_tokens,
            assembled_at: Utc::now(),
            stats,
        })
    }

    /// BFS distances from a seed set over the cloned adjacency.
    fn bfs_distances<'a>(
        seeds: &[&'a str],
        adjacency: &HashMap<&'a str, Vec<&'a Relationship>>,
    ) -> HashMap<&'a str, usize> {
        let mut distances: HashMap<&str, usize> = HashMap::new();
        let mut queue: VecDeque<(&str, usize)> = VecDeque::new();
        for seed in seeds {
            if !distances.contains_key(seed) {
                distances.insert(seed, 0);
                queue.push_back((seed, 0));
            }
        }
        while let Some((id, d)) = queue.pop_front() {
            for rel in adjacency.get(id).into_iter().flatten() {
                let other = if rel.source_id == id {
                    rel.target_id.as_str()
                } else {
                    rel.source_id.as_str()
                };
                if !distances.contains_key(other) {
                    distances.insert(other, d + 1);
                    queue.push_back((other, d + 1));
                }
            }
        }
        distances
    }

    /// Render an entity card: label, type, aliases, sorted attributes, and
    /// one-hop relations.
    fn render_entity_card(
        entity: &Entity,
        adjacency: &HashMap<&str, Vec<&Relationship>>,
        labels: &HashMap<&str, &str>,
    ) -> String {
        let mut out = format!("## {} ({})\n", entity.label, entity.entity_type);
        if !entity.aliases.is_empty() {
            out.push_str(&format!("Also known as: {}\n", entity.aliases.join(", ")));
        }

        let mut attrs: Vec<(&String, &serde_json::Value)> = entity.attributes.iter().collect();
        attrs.sort_by_key(|(k, _)| k.as_str());
        for (key, value) in attrs {
            out.push_str(&format!("- {}: {}\n", key, value));
        }

        let mut relation_lines: Vec<String> = adjacency
            .get(entity.id.as_str())
            .into_iter()
            .flatten()
            .map(|rel| {
                if rel.source_id == entity.id {
                    let target = labels.get(rel.target_id.as_str()).copied().unwrap_or("?");
                    format!("- {} -> {}", rel.relation_type, target)
                } else {
                    let source = labels.get(rel.source_id.as_str()).copied().unwrap_or("?");
                    format!("- {} <- {}", rel.relation_type, source)
                }
            })
            .collect();
        relation_lines.sort();
        relation_lines.dedup();
        if !relation_lines.is_empty() {
            out.push_str("Relations:\n");
            for line in relation_lines {
                out.push_str(&line);
                out.push('\n');
            }
        }

        out.push_str(&format!(
            "Seen {} times across {} documents.\n",
            entity.appearance_count,
            entity.source_refs.len()
        ));
        out
    }

    /// Render a snapshot excerpt from its stored view.
    fn render_snapshot_excerpt(snapshot: &crate::snapshot::Snapshot) -> Result<String> {
        let view = snapshot.view()?;
        let top: Vec<&str> = view
            .entities
            .iter()
            .take(EXCERPT_TOP_ENTITIES)
            .map(|e| e.label.as_str())
            .collect();

        let mut out = format!(
            "## Snapshot {} ({})\n",
            snapshot.created_at.format("%Y-%m-%d %H:%M:%S"),
            snapshot.detail_level
        );
        if let Some(ref focus) = snapshot.focus_area {
            out.push_str(&format!("Focus: {}\n", focus));
        }
        out.push_str(&format!(
            "{} entities, {} relationships at capture.\n",
            snapshot.entity_count, snapshot.relationship_count
        ));
        if !top.is_empty() {
            out.push_str(&format!("Top entities: {}.\n", top.join(", ")));
        }
        Ok(out)
    }
}
