use serde::Serialize;
use thiserror::Error;

/// Result type for graph reconciliation operations that can fail outright
pub type Result<T> = std::result::Result<T, ReconciliationError>;

/// Problems found while reconciling a source document into an annotation graph
///
/// Only `InvalidDocument` aborts a conversion. Everything else is collected as a
/// warning alongside a best-effort graph; callers decide whether to accept it.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReconciliationError {
    /// The source has no recognizable top-level structure
    #[error("Invalid document: {reason}")]
    InvalidDocument { reason: String },

    /// A forward reference whose referent never appears in the source
    #[error("Unresolved reference: {id} refers to {referent}, which does not exist")]
    UnresolvedReference { id: String, referent: String },

    /// More than one candidate parent and nothing to choose between them
    #[error("Ambiguous parent for {annotation} on layer {layer}: {candidates} candidates")]
    AmbiguousParent {
        annotation: String,
        layer: String,
        candidates: usize,
    },

    /// No annotation on the parent layer covers the child
    #[error("No parent for {annotation} on layer {layer}")]
    NoParent { annotation: String, layer: String },

    /// A convention transformer found markup it could not expand
    #[error("{transformer}: {message} ({annotation})")]
    Tokenization {
        transformer: String,
        annotation: String,
        message: String,
    },

    /// A dictionary pronunciation could not be aligned with a word's phones
    #[error("Cannot align pronunciation {pronunciation} with phones {phones} for {word}")]
    PhoneAlignmentMismatch {
        word: String,
        pronunciation: String,
        phones: String,
    },
}

impl ReconciliationError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidDocument {
            reason: reason.into(),
        }
    }

    pub(crate) fn tokenization(
        transformer: &str,
        annotation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Tokenization {
            transformer: transformer.to_string(),
            annotation: annotation.into(),
            message: message.into(),
        }
    }

    /// Whether this error prevents a graph from being produced at all
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidDocument { .. })
    }
}
