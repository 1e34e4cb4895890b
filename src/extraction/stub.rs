//! Deterministic stub extractor for tests and offline runs.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{Result, WeftError};
use crate::extraction::{ExtractedItem, Extractor};
use crate::graph::DocumentRef;

/// Scripted, deterministic extractor. Responses are keyed by document id
/// and fixed at construction, so repeated calls (including out-of-order or
/// retried ones) always return the same payloads.
#[derive(Default)]
pub struct StubExtractor {
    responses: HashMap<String, Vec<ExtractedItem>>,
    failures: HashMap<String, String>,
}

impl StubExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the response for a document id.
    pub fn with_response(
        mut self,
        document_id: impl Into<String>,
        items: Vec<ExtractedItem>,
    ) -> Self {
        self.responses.insert(document_id.into(), items);
        self
    }

    /// Script a failure for a document id.
    pub fn with_failure(
        mut self,
        document_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.failures.insert(document_id.into(), message.into());
        self
    }
}

#[async_trait]
impl Extractor for StubExtractor {
    async fn extract(&self, _text: &str, source_ref: &DocumentRef) -> Result<Vec<ExtractedItem>> {
        if let Some(message) = self.failures.get(&source_ref.document_id) {
            return Err(WeftError::UpstreamExtraction {
                source_ref: source_ref.document_id.clone(),
                message: message.clone(),
            });
        }
        Ok(self
            .responses
            .get(&source_ref.document_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::ExtractedEntity;
    use crate::graph::TypeTag;

    #[tokio::test]
    async fn test_scripted_response_is_stable() {
        let stub = StubExtractor::new().with_response(
            "doc-a",
            vec![ExtractedItem::Entity(ExtractedEntity::new(
                TypeTag::new("person"),
                "Heinz",
                0.9,
            ))],
        );

        let doc = DocumentRef::new("doc-a");
        let first = stub.extract("ignored", &doc).await.unwrap();
        let second = stub.extract("ignored", &doc).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_failure_keeps_source_ref() {
        let stub = StubExtractor::new().with_failure("doc-b", "model timeout");
        let err = stub
            .extract("ignored", &DocumentRef::new("doc-b"))
            .await
            .unwrap_err();
        let WeftError::UpstreamExtraction { source_ref, .. } = err else {
            panic!("expected UpstreamExtraction, got {err:?}");
        };
        assert_eq!(source_ref, "doc-b");
    }

    #[tokio::test]
    async fn test_unscripted_document_yields_nothing() {
        let stub = StubExtractor::new();
        let items = stub
            .extract("ignored", &DocumentRef::new("doc-z"))
            .await
            .unwrap();
        assert!(items.is_empty());
    }
}
