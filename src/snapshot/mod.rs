//! Immutable, schema-versioned captures of graph state at multiple detail
//! levels.

mod store;
mod types;

pub use store::SnapshotStore;
pub use types::{
    DetailLevel, EntityView, GraphView, RelationshipView, Snapshot, SnapshotFilter,
    SnapshotMetadata, SNAPSHOT_SCHEMA_VERSION,
};
