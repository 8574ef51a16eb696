use std::collections::HashMap;

use super::AnnotationId;

/// Source-format hints attached to annotations while a document is being assembled
///
/// Kept beside the graph rather than on the annotations so nothing leaks into the
/// finished transcript. The assembler owns one of these per document and clears it
/// when the graph is finalized.
#[derive(Debug, Clone, Default)]
pub struct AssemblyHints {
    tiers: HashMap<AnnotationId, String>,
    participants: HashMap<AnnotationId, String>,
}

/// Borrowed view of the hints for one annotation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParentHint<'a> {
    pub tier: Option<&'a str>,
    pub participant: Option<&'a str>,
}

impl AssemblyHints {
    pub fn set_tier(&mut self, id: AnnotationId, tier: impl Into<String>) {
        self.tiers.insert(id, tier.into());
    }

    pub fn set_participant(&mut self, id: AnnotationId, participant: impl Into<String>) {
        self.participants.insert(id, participant.into());
    }

    pub fn tier(&self, id: AnnotationId) -> Option<&str> {
        self.tiers.get(&id).map(String::as_str)
    }

    pub fn participant(&self, id: AnnotationId) -> Option<&str> {
        self.participants.get(&id).map(String::as_str)
    }

    pub fn hint(&self, id: AnnotationId) -> ParentHint<'_> {
        ParentHint {
            tier: self.tier(id),
            participant: self.participant(id),
        }
    }

    /// Give `to` the same hints as `from`
    pub fn copy(&mut self, from: AnnotationId, to: AnnotationId) {
        if let Some(tier) = self.tiers.get(&from).cloned() {
            self.tiers.insert(to, tier);
        }
        if let Some(participant) = self.participants.get(&from).cloned() {
            self.participants.insert(to, participant);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty() && self.participants.is_empty()
    }

    pub fn clear(&mut self) {
        self.tiers.clear();
        self.participants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_and_clear() {
        let mut hints = AssemblyHints::default();
        hints.set_tier(AnnotationId(1), "A-words");
        hints.set_participant(AnnotationId(1), "A");
        hints.copy(AnnotationId(1), AnnotationId(2));

        assert_eq!(
            hints.hint(AnnotationId(2)),
            ParentHint {
                tier: Some("A-words"),
                participant: Some("A")
            }
        );
        hints.clear();
        assert!(hints.is_empty());
        assert_eq!(hints.hint(AnnotationId(2)), ParentHint::default());
    }
}
