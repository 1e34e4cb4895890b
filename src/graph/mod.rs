//! The confirmed knowledge graph: typed entities, directed relationships,
//! merging, and pattern queries.

mod store;
mod types;

pub use store::{CommitOutcome, EntityGraph, GRAPH_SCHEMA_VERSION};
pub use types::{
    DocumentRef, Entity, GraphItem, GraphPattern, GraphStats, MergePolicy, Relationship, TypeTag,
};
