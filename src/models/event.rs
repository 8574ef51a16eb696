use serde::{Deserialize, Serialize};

use super::Schema;

/// Binding of one source tier to a target layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierMapping {
    /// Tier name in the source document
    pub tier: String,
    /// Target layer id; `None` means the tier is deliberately ignored
    #[serde(default)]
    pub layer: Option<String>,
    /// Participant the whole tier belongs to, when the format says so
    #[serde(default)]
    pub participant: Option<String>,
}

impl TierMapping {
    pub fn new(tier: &str, layer: &str) -> Self {
        Self {
            tier: tier.to_string(),
            layer: Some(layer.to_string()),
            participant: None,
        }
    }

    pub fn ignored(tier: &str) -> Self {
        Self {
            tier: tier.to_string(),
            layer: None,
            participant: None,
        }
    }

    pub fn with_participant(mut self, participant: &str) -> Self {
        self.participant = Some(participant.to_string());
        self
    }
}

/// One annotation as a format adapter saw it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceEvent {
    /// Identifier in the source, needed for anything that refers to this event
    #[serde(default)]
    pub id: Option<String>,
    pub tier: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub start: Option<f64>,
    #[serde(default)]
    pub end: Option<f64>,
    /// Named time slots; events sharing a slot share an anchor even when it has no offset
    #[serde(default)]
    pub start_slot: Option<String>,
    #[serde(default)]
    pub end_slot: Option<String>,
    /// Id of the annotation this one is a sub-part of; it may appear later in the document
    #[serde(default)]
    pub reference: Option<String>,
    /// Free-text hint for choosing between candidate parents (usually a tier name)
    #[serde(default)]
    pub parent_hint: Option<String>,
    #[serde(default)]
    pub participant: Option<String>,
}

impl SourceEvent {
    pub fn timed(tier: &str, label: &str, start: f64, end: f64) -> Self {
        Self {
            tier: tier.to_string(),
            label: label.to_string(),
            start: Some(start),
            end: Some(end),
            ..Default::default()
        }
    }

    pub fn referring(tier: &str, label: &str, reference: &str) -> Self {
        Self {
            tier: tier.to_string(),
            label: label.to_string(),
            reference: Some(reference.to_string()),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_participant(mut self, participant: &str) -> Self {
        self.participant = Some(participant.to_string());
        self
    }
}

/// What a format adapter hands to the assembler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    #[serde(default)]
    pub id: Option<String>,
    /// Target hierarchy; the speech schema when absent
    #[serde(default)]
    pub schema: Option<Schema>,
    pub tiers: Vec<TierMapping>,
    pub events: Vec<SourceEvent>,
}
