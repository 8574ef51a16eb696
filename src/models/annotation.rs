use std::fmt;

use serde::{Deserialize, Serialize};

use super::{AnchorId, Confidence};

/// Identifier of an annotation within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnnotationId(pub usize);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e_{}", self.0)
    }
}

/// A labelled span on one layer, bounded by two shared anchors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: AnnotationId,
    pub layer_id: String,
    pub label: String,
    pub start: AnchorId,
    pub end: AnchorId,
    /// Unset until the parent has been resolved (and for top-level layers)
    pub parent: Option<AnnotationId>,
    /// 1-based rank among same-layer siblings of the same parent
    pub ordinal: usize,
    pub confidence: Confidence,
    /// Identifier this annotation had in the source document, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl Annotation {
    /// Whether the annotation is bounded by the given anchors
    pub fn spans(&self, start: AnchorId, end: AnchorId) -> bool {
        self.start == start && self.end == end
    }

    pub fn is_instant(&self) -> bool {
        self.start == self.end
    }
}

/// Everything needed to create an annotation; ids and ordinals are assigned by the graph
#[derive(Debug, Clone)]
pub struct NewAnnotation {
    pub layer_id: String,
    pub label: String,
    pub start: AnchorId,
    pub end: AnchorId,
    pub parent: Option<AnnotationId>,
    pub confidence: Confidence,
    pub source_id: Option<String>,
}

impl NewAnnotation {
    pub fn new(layer_id: &str, label: impl Into<String>, start: AnchorId, end: AnchorId) -> Self {
        Self {
            layer_id: layer_id.to_string(),
            label: label.into(),
            start,
            end,
            parent: None,
            confidence: Confidence::Manual,
            source_id: None,
        }
    }

    pub fn parent(mut self, parent: Option<AnnotationId>) -> Self {
        self.parent = parent;
        self
    }

    pub fn confidence(mut self, confidence: Confidence) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn source_id(mut self, source_id: Option<String>) -> Self {
        self.source_id = source_id;
        self
    }
}
