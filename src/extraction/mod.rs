//! The extraction adapter boundary.
//!
//! Extraction itself is an opaque external capability (an LLM, an NER
//! service): given document text, it returns candidate entity and
//! relationship payloads. The core only depends on the [`Extractor`] trait,
//! so everything downstream is testable with the deterministic
//! [`StubExtractor`]. Calls are assumed to be slow, retryable, and
//! cancellable; results may arrive out of order, and a failure always
//! carries the source document reference so the document can be retried.

mod stub;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::graph::{DocumentRef, TypeTag};

pub use stub::StubExtractor;

/// A candidate entity payload produced by extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEntity {
    /// Proposed type tag.
    pub entity_type: TypeTag,
    /// Label as it appeared in the text.
    pub label: String,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Extractor confidence (0.0-1.0).
    pub confidence: f32,
}

impl ExtractedEntity {
    pub fn new(entity_type: TypeTag, label: impl Into<String>, confidence: f32) -> Self {
        Self {
            entity_type,
            label: label.into(),
            attributes: HashMap::new(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// A candidate relationship payload produced by extraction. Endpoints are
/// labels; resolution to ids happens at submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedRelationship {
    /// Proposed relationship type tag.
    pub relation_type: TypeTag,
    /// Label of the source endpoint.
    pub source_label: String,
    /// Label of the target endpoint.
    pub target_label: String,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
    /// Extractor confidence (0.0-1.0).
    pub confidence: f32,
}

impl ExtractedRelationship {
    pub fn new(
        relation_type: TypeTag,
        source_label: impl Into<String>,
        target_label: impl Into<String>,
        confidence: f32,
    ) -> Self {
        Self {
            relation_type,
            source_label: source_label.into(),
            target_label: target_label.into(),
            attributes: HashMap::new(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A single item returned by extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractedItem {
    Entity(ExtractedEntity),
    Relationship(ExtractedRelationship),
}

/// The external extraction capability.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extract candidate payloads from document text. Implementations map
    /// their failures to [`crate::WeftError::UpstreamExtraction`] with the
    /// source reference intact.
    async fn extract(&self, text: &str, source_ref: &DocumentRef) -> Result<Vec<ExtractedItem>>;
}
