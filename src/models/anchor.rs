use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an anchor within one graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnchorId(pub usize);

impl fmt::Display for AnchorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n_{}", self.0)
    }
}

/// How much an offset (or an annotation) can be trusted
///
/// Ordered so that `Manual > Automatic > Default > None`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    /// Nothing is known
    #[default]
    None,
    /// Filled in by interpolation or some other default rule
    Default,
    /// Produced by an automatic process (aligner, tagger)
    Automatic,
    /// Set by a human transcriber
    Manual,
}

/// A point on the transcript's position axis, shared by every annotation that
/// starts or ends there
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub id: AnchorId,
    /// Offset in seconds (or characters); `None` until it can be inferred
    pub offset: Option<f64>,
    pub confidence: Confidence,
}

impl Anchor {
    pub fn new(id: AnchorId, offset: Option<f64>, confidence: Confidence) -> Self {
        Self {
            id,
            offset,
            confidence,
        }
    }

    /// Rank used when two anchors are unified: higher confidence wins, then a known offset
    pub(crate) fn strength(&self) -> (Confidence, bool) {
        (self.confidence, self.offset.is_some())
    }
}

/// Key used to index anchors by exact offset
pub(crate) fn offset_key(offset: f64) -> u64 {
    // -0.0 and 0.0 are the same position
    if offset == 0.0 {
        0.0f64.to_bits()
    } else {
        offset.to_bits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering() {
        assert!(Confidence::Manual > Confidence::Automatic);
        assert!(Confidence::Automatic > Confidence::Default);
        assert!(Confidence::Default > Confidence::None);
        assert_eq!(Confidence::default(), Confidence::None);
    }

    #[test]
    fn test_offset_key_treats_signed_zero_alike() {
        assert_eq!(offset_key(0.0), offset_key(-0.0));
        assert_ne!(offset_key(1.0), offset_key(1.0000001));
    }

    #[test]
    fn test_strength_prefers_known_offset() {
        let known = Anchor::new(AnchorId(1), Some(1.0), Confidence::Default);
        let unknown = Anchor::new(AnchorId(2), None, Confidence::Default);
        assert!(known.strength() > unknown.strength());
    }
}
