//! Snapshot immutability and persistence.

use std::sync::Arc;

use weft::{
    Config, DetailLevel, DocumentRef, ExtractedEntity, ExtractedItem, GraphCoordinator,
    Snapshot, SnapshotFilter, StubExtractor, TypeTag, SNAPSHOT_SCHEMA_VERSION,
};

fn person(label: &str) -> ExtractedItem {
    ExtractedItem::Entity(ExtractedEntity::new(TypeTag::new("person"), label, 0.95))
}

async fn coordinator_with(docs: Vec<(&str, Vec<ExtractedItem>)>) -> GraphCoordinator {
    let mut stub = StubExtractor::new();
    for (doc, items) in docs {
        stub = stub.with_response(doc, items);
    }
    GraphCoordinator::builder(Config::default())
        .with_extractor(Arc::new(stub))
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn snapshots_are_immutable_under_graph_mutation() {
    crate::init_logging();
    let coordinator = coordinator_with(vec![
        ("doc-a", vec![person("Heinz")]),
        ("doc-b", vec![person("Perry"), person("Candace")]),
    ])
    .await;

    coordinator
        .ingest_document("first", DocumentRef::new("doc-a"))
        .await
        .unwrap();
    let snapshot = coordinator
        .capture_snapshot(DetailLevel::Detailed, None)
        .await
        .unwrap();
    let original_content = snapshot.content.clone();
    let original_hash = snapshot.content_hash.clone();

    // Mutate the graph after the capture.
    coordinator
        .ingest_document("second", DocumentRef::new("doc-b"))
        .await
        .unwrap();
    assert_eq!(coordinator.graph().stats().await.entity_count, 3);

    // Repeated loads return byte-identical content.
    for _ in 0..3 {
        let loaded = coordinator.snapshots().load(&snapshot.id).await.unwrap();
        assert_eq!(loaded.content, original_content);
        assert_eq!(loaded.content_hash, original_hash);
        assert_eq!(loaded.content_hash, Snapshot::compute_hash(&loaded.content));
    }

    // The old capture still shows one entity; a new capture shows three.
    let old_view = coordinator
        .snapshots()
        .load(&snapshot.id)
        .await
        .unwrap()
        .view()
        .unwrap();
    assert_eq!(old_view.entities.len(), 1);

    let fresh = coordinator
        .capture_snapshot(DetailLevel::Detailed, None)
        .await
        .unwrap();
    assert_eq!(fresh.entity_count, 3);
    assert_ne!(fresh.id, snapshot.id, "updating means capturing a new one");
}

#[tokio::test]
async fn snapshots_carry_a_schema_version() {
    let coordinator = coordinator_with(vec![("doc-a", vec![person("Heinz")])]).await;
    coordinator
        .ingest_document("text", DocumentRef::new("doc-a"))
        .await
        .unwrap();

    let snapshot = coordinator
        .capture_snapshot(DetailLevel::Standard, None)
        .await
        .unwrap();
    assert_eq!(snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION);

    let view = snapshot.view().unwrap();
    assert_eq!(view.schema_version, SNAPSHOT_SCHEMA_VERSION);
    // The capture records the taxonomy as it stood, so old snapshots stay
    // interpretable as the taxonomy grows.
    assert!(view
        .entity_types
        .iter()
        .any(|t| t.as_str() == "person"));
}

#[tokio::test]
async fn list_filters_by_level_and_focus() {
    let coordinator = coordinator_with(vec![("doc-a", vec![person("Heinz")])]).await;
    coordinator
        .ingest_document("text", DocumentRef::new("doc-a"))
        .await
        .unwrap();

    coordinator
        .capture_snapshot(DetailLevel::Summary, None)
        .await
        .unwrap();
    coordinator
        .capture_snapshot(DetailLevel::Standard, Some("Heinz"))
        .await
        .unwrap();
    coordinator
        .capture_snapshot(DetailLevel::Detailed, Some("Heinz"))
        .await
        .unwrap();

    let all = coordinator.snapshots().list(&SnapshotFilter::default()).await;
    assert_eq!(all.len(), 3);

    let standard = coordinator
        .snapshots()
        .list(&SnapshotFilter {
            detail_level: Some(DetailLevel::Standard),
            ..Default::default()
        })
        .await;
    assert_eq!(standard.len(), 1);

    let focused = coordinator
        .snapshots()
        .list(&SnapshotFilter {
            focus_area: Some("Heinz".to_string()),
            ..Default::default()
        })
        .await;
    assert_eq!(focused.len(), 2);
}

#[tokio::test]
async fn persisted_snapshots_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = dir.path().to_string_lossy().to_string();
    config.storage.persist_snapshots = true;

    let (snapshot_id, original_hash) = {
        let stub = StubExtractor::new().with_response("doc-a", vec![person("Heinz")]);
        let coordinator = GraphCoordinator::builder(config.clone())
            .with_extractor(Arc::new(stub))
            .build()
            .await
            .unwrap();
        coordinator
            .ingest_document("text", DocumentRef::new("doc-a"))
            .await
            .unwrap();
        let snapshot = coordinator
            .capture_snapshot(DetailLevel::Detailed, None)
            .await
            .unwrap();
        (snapshot.id, snapshot.content_hash)
    };

    // A new coordinator over the same data dir sees the capture unchanged.
    let coordinator = GraphCoordinator::builder(config).build().await.unwrap();
    let reloaded = coordinator.snapshots().load(&snapshot_id).await.unwrap();
    assert_eq!(reloaded.content_hash, original_hash);
    assert_eq!(
        reloaded.content_hash,
        Snapshot::compute_hash(&reloaded.content)
    );
}

#[tokio::test]
async fn prune_is_explicit_maintenance_not_policy() {
    let coordinator = coordinator_with(vec![("doc-a", vec![person("Heinz")])]).await;
    coordinator
        .ingest_document("text", DocumentRef::new("doc-a"))
        .await
        .unwrap();
    coordinator
        .capture_snapshot(DetailLevel::Standard, None)
        .await
        .unwrap();

    // Nothing prunes automatically.
    assert_eq!(coordinator.snapshots().len().await, 1);

    let removed = coordinator
        .snapshots()
        .prune(chrono::Utc::now() + chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert!(coordinator.snapshots().is_empty().await);
}
