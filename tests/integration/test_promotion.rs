//! End-to-end promotion pipeline tests.

use std::sync::Arc;

use weft::{
    CandidateFilter, Config, DocumentRef, ExtractedEntity, ExtractedItem, ExtractedRelationship,
    GraphCoordinator, GraphItem, GraphPattern, MergePolicy, StubExtractor, TypeTag, WeftError,
};

/// Coordinator with a stub extractor returning one "Heinz" person hit (at
/// the given confidence) for each of the listed documents.
async fn heinz_coordinator(confidence: f32, documents: &[&str]) -> GraphCoordinator {
    let mut stub = StubExtractor::new();
    for doc in documents {
        stub = stub.with_response(
            *doc,
            vec![ExtractedItem::Entity(ExtractedEntity::new(
                TypeTag::new("person"),
                "Heinz",
                confidence,
            ))],
        );
    }
    GraphCoordinator::builder(Config::default())
        .with_extractor(Arc::new(stub))
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn heinz_is_promoted_on_the_third_document() {
    crate::init_logging();
    let coordinator = heinz_coordinator(0.5, &["doc-a", "doc-b", "doc-c"]).await;

    let first = coordinator
        .ingest_document("Heinz was here", DocumentRef::new("doc-a"))
        .await
        .unwrap();
    assert_eq!(first.pending, 1);
    assert_eq!(first.promoted, 0);

    let second = coordinator
        .ingest_document("Heinz again", DocumentRef::new("doc-b"))
        .await
        .unwrap();
    assert_eq!(second.pending, 1);
    // Two appearances is below the default threshold of three.
    assert_eq!(coordinator.graph().stats().await.entity_count, 0);

    let third = coordinator
        .ingest_document("Heinz once more", DocumentRef::new("doc-c"))
        .await
        .unwrap();
    assert_eq!(third.promoted, 1);

    // Exactly one "Heinz" person in the graph, with all three sources.
    let people = coordinator
        .graph()
        .query(&GraphPattern::by_entity_type(TypeTag::new("person")))
        .await
        .unwrap();
    assert_eq!(people.len(), 1);
    let GraphItem::Entity(heinz) = &people[0] else {
        panic!("expected an entity result");
    };
    assert_eq!(heinz.label, "Heinz");
    assert_eq!(heinz.appearance_count, 3);
    let mut docs: Vec<&str> = heinz
        .source_refs
        .iter()
        .map(|r| r.document_id.as_str())
        .collect();
    docs.sort();
    assert_eq!(docs, vec!["doc-a", "doc-b", "doc-c"]);
}

#[tokio::test]
async fn same_document_twice_reinforces_once_per_submission() {
    let coordinator = heinz_coordinator(0.5, &["doc-a"]).await;

    coordinator
        .ingest_document("Heinz", DocumentRef::new("doc-a"))
        .await
        .unwrap();
    coordinator
        .ingest_document("Heinz", DocumentRef::new("doc-a"))
        .await
        .unwrap();

    let pending = coordinator.candidates().list(&CandidateFilter::pending()).await;
    assert_eq!(pending.len(), 1, "never two candidates for the same payload");
    assert_eq!(pending[0].appearance_count, 2);
    assert_eq!(pending[0].source_refs.len(), 1);
}

#[tokio::test]
async fn concurrent_ingest_yields_one_candidate() {
    let coordinator = heinz_coordinator(0.5, &["doc-a", "doc-b"]).await;

    let reports = coordinator
        .ingest_documents(vec![
            ("Heinz".to_string(), DocumentRef::new("doc-a")),
            ("Heinz".to_string(), DocumentRef::new("doc-b")),
        ])
        .await;
    for report in reports {
        report.unwrap();
    }

    let all = coordinator.candidates().list(&CandidateFilter::default()).await;
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].appearance_count, 2);
}

#[tokio::test]
async fn confident_hit_promotes_immediately_and_later_hits_reinforce() {
    let coordinator = heinz_coordinator(0.95, &["doc-a", "doc-b"]).await;

    let first = coordinator
        .ingest_document("Heinz", DocumentRef::new("doc-a"))
        .await
        .unwrap();
    assert_eq!(first.promoted, 1);

    let second = coordinator
        .ingest_document("Heinz", DocumentRef::new("doc-b"))
        .await
        .unwrap();
    assert_eq!(second.reinforced, 1);

    let stats = coordinator.graph().stats().await;
    assert_eq!(stats.entity_count, 1, "no duplicate entity from the second hit");
}

#[tokio::test]
async fn relationship_promotion_cascades_its_endpoints() {
    let mut stub = StubExtractor::new();
    for doc in ["doc-a", "doc-b", "doc-c"] {
        stub = stub.with_response(
            doc,
            vec![ExtractedItem::Relationship(ExtractedRelationship::new(
                TypeTag::new("depends_on"),
                "Alpha",
                "Beta",
                0.5,
            ))],
        );
    }
    let coordinator = GraphCoordinator::builder(Config::default())
        .with_extractor(Arc::new(stub))
        .build()
        .await
        .unwrap();

    for doc in ["doc-a", "doc-b", "doc-c"] {
        coordinator
            .ingest_document("Alpha depends on Beta", DocumentRef::new(doc))
            .await
            .unwrap();
    }

    // The relationship crossed the threshold on the third hit, promoting
    // both endpoint candidates with it. No dangling edges.
    let stats = coordinator.graph().stats().await;
    assert_eq!(stats.entity_count, 2);
    assert_eq!(stats.relationship_count, 1);

    let (_, rels) = coordinator.graph().contents().await;
    for rel in rels {
        assert!(coordinator
            .graph()
            .get_entity(&rel.source_id)
            .await
            .unwrap()
            .is_some());
        assert!(coordinator
            .graph()
            .get_entity(&rel.target_id)
            .await
            .unwrap()
            .is_some());
    }
}

#[tokio::test]
async fn merge_leaves_no_dangling_edges() {
    let coordinator = GraphCoordinator::builder(Config::default())
        .build()
        .await
        .unwrap();
    let graph = coordinator.graph();

    let a = graph
        .add_entity(weft::Entity::new(TypeTag::new("person"), "Heinz"))
        .await
        .unwrap();
    let b = graph
        .add_entity(weft::Entity::new(TypeTag::new("person"), "Dr. Heinz"))
        .await
        .unwrap();
    let c = graph
        .add_entity(weft::Entity::new(TypeTag::new("project"), "Inator"))
        .await
        .unwrap();
    graph
        .add_relationship(weft::Relationship::new(&b, TypeTag::new("created_by"), &c))
        .await
        .unwrap();
    graph
        .add_relationship(weft::Relationship::new(&a, TypeTag::new("related_to"), &b))
        .await
        .unwrap();

    graph
        .merge_entities(&a, &b, MergePolicy::default())
        .await
        .unwrap();

    let (entities, rels) = graph.contents().await;
    let ids: Vec<&str> = entities.iter().map(|e| e.id.as_str()).collect();
    for rel in &rels {
        assert!(ids.contains(&rel.source_id.as_str()), "dangling source");
        assert!(ids.contains(&rel.target_id.as_str()), "dangling target");
    }
    // The self-loop from the a<->b edge is gone; the created_by edge
    // survived, re-pointed at the survivor.
    assert_eq!(rels.len(), 1);
    assert_eq!(rels[0].source_id, a);
}

#[tokio::test]
async fn extraction_failure_keeps_the_document_reference() {
    let stub = StubExtractor::new().with_failure("doc-bad", "model timeout");
    let coordinator = GraphCoordinator::builder(Config::default())
        .with_extractor(Arc::new(stub))
        .build()
        .await
        .unwrap();

    let err = coordinator
        .ingest_document("whatever", DocumentRef::new("doc-bad"))
        .await
        .unwrap_err();
    let WeftError::UpstreamExtraction { source_ref, .. } = err else {
        panic!("expected UpstreamExtraction, got {err:?}");
    };
    assert_eq!(source_ref, "doc-bad", "document must stay retryable");
}

#[tokio::test]
async fn audit_trail_attributes_every_submission() {
    let coordinator = heinz_coordinator(0.5, &["doc-a", "doc-b", "doc-c"]).await;
    for doc in ["doc-a", "doc-b", "doc-c"] {
        coordinator
            .ingest_document("Heinz", DocumentRef::new(doc))
            .await
            .unwrap();
    }

    for doc in ["doc-a", "doc-b", "doc-c"] {
        let events = coordinator.candidates().audit_for_source(doc).await;
        assert_eq!(events.len(), 1, "one audit event per source document");
    }

    // The candidate record survives promotion with its full history.
    let all = coordinator.candidates().list(&CandidateFilter::default()).await;
    assert_eq!(all.len(), 1);
    let history = coordinator.candidates().audit_for(&all[0].id).await;
    assert!(history.len() >= 4, "submit + 2 reinforcements + promotion");
}

#[tokio::test]
async fn stale_candidates_are_retired_with_a_record() {
    let coordinator = heinz_coordinator(0.5, &["doc-a"]).await;
    coordinator
        .ingest_document("Heinz", DocumentRef::new("doc-a"))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    let retired = coordinator
        .candidates()
        .retire_stale(chrono::Duration::milliseconds(10))
        .await;
    assert_eq!(retired.len(), 1);

    let candidate = coordinator.candidates().get(&retired[0]).await.unwrap();
    assert!(matches!(
        candidate.status,
        weft::CandidateStatus::Retired {
            reason: weft::RetireReason::Stale
        }
    ));
}

#[tokio::test]
async fn promotion_registers_new_taxonomy_types() {
    let stub = StubExtractor::new().with_response(
        "doc-a",
        vec![ExtractedItem::Entity(ExtractedEntity::new(
            TypeTag::new("inator"),
            "Shrink-inator",
            0.95,
        ))],
    );
    let coordinator = GraphCoordinator::builder(Config::default())
        .with_extractor(Arc::new(stub))
        .build()
        .await
        .unwrap();

    assert!(!coordinator
        .taxonomy()
        .is_entity_type(&TypeTag::new("inator"))
        .await);
    coordinator
        .ingest_document("a new inator", DocumentRef::new("doc-a"))
        .await
        .unwrap();
    assert!(coordinator
        .taxonomy()
        .is_entity_type(&TypeTag::new("inator"))
        .await);
}
