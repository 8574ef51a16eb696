use serde::{Deserialize, Serialize};

/// How annotations on a layer relate to the time axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// A tag on its parent; anchors are inherited
    #[default]
    None,
    /// Zero-width instant
    Point,
    /// Start and end
    Interval,
}

/// Definition of one slot in the transcript hierarchy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: String,
    /// `None` only for the root layer
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub alignment: Alignment,
    /// Children of one parent tile the parent's interval
    #[serde(default)]
    pub saturated: bool,
    /// More than one annotation of this layer may share a parent
    #[serde(default = "default_peers")]
    pub peers: bool,
    #[serde(default)]
    pub description: String,
}

fn default_peers() -> bool {
    true
}

impl Layer {
    pub fn new(id: &str, parent_id: &str, alignment: Alignment) -> Self {
        Self {
            id: id.to_string(),
            parent_id: Some(parent_id.to_string()),
            alignment,
            saturated: false,
            peers: true,
            description: String::new(),
        }
    }

    pub fn saturated(mut self) -> Self {
        self.saturated = true;
        self
    }

    pub fn single(mut self) -> Self {
        self.peers = false;
        self
    }

    pub fn described(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn is_aligned(&self) -> bool {
        self.alignment != Alignment::None
    }
}

/// Layer tree plus the ids of the layers that play well-known roles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    /// Root first; every other layer's parent appears before it
    pub layers: Vec<Layer>,
    pub root_layer: String,
    pub participant_layer: String,
    pub turn_layer: String,
    pub utterance_layer: String,
    pub word_layer: String,
}

impl Default for Schema {
    fn default() -> Self {
        Self::speech()
    }
}

impl Schema {
    /// The canonical speech hierarchy:
    /// transcript → participant → turn → utterance → word → word tags,
    /// plus free-standing comment/noise layers and a phrase language layer
    pub fn speech() -> Self {
        let root = Layer {
            id: "transcript".to_string(),
            parent_id: None,
            alignment: Alignment::None,
            saturated: false,
            peers: false,
            description: "The whole transcript".to_string(),
        };

        let layers = vec![
            root,
            Layer::new("participant", "transcript", Alignment::None).described("Speakers"),
            Layer::new("turn", "participant", Alignment::Interval).described("Speaker turns"),
            Layer::new("utterance", "turn", Alignment::Interval)
                .saturated()
                .described("Lines within a turn"),
            Layer::new("word", "utterance", Alignment::Interval)
                .saturated()
                .described("Orthographic tokens"),
            Layer::new("pronounce", "word", Alignment::None)
                .single()
                .described("Manual pronunciation tags"),
            Layer::new("lexical", "word", Alignment::None)
                .single()
                .described("Lexical (dictionary) form tags"),
            Layer::new("phone", "word", Alignment::Interval).described("Segmented phones"),
            Layer::new("syllable", "word", Alignment::Interval).described("Recovered syllables"),
            Layer::new("comment", "transcript", Alignment::Interval)
                .described("Transcriber comments"),
            Layer::new("noise", "transcript", Alignment::Interval).described("Non-speech noises"),
            Layer::new("language", "utterance", Alignment::Interval)
                .described("Code-switched phrase language"),
        ];

        Self {
            layers,
            root_layer: "transcript".to_string(),
            participant_layer: "participant".to_string(),
            turn_layer: "turn".to_string(),
            utterance_layer: "utterance".to_string(),
            word_layer: "word".to_string(),
        }
    }

    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.layer(id).is_some()
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.layer(id).and_then(|l| l.parent_id.as_deref())
    }

    /// Layers whose parent is the given layer
    pub fn child_layers(&self, id: &str) -> impl Iterator<Item = &Layer> {
        let id = id.to_string();
        self.layers
            .iter()
            .filter(move |l| l.parent_id.as_deref() == Some(id.as_str()))
    }

    /// True when annotations on this layer hang directly off the transcript
    pub fn is_top_level(&self, id: &str) -> bool {
        self.parent_of(id) == Some(self.root_layer.as_str())
    }

    /// Distance from the root layer (root = 0); unknown layers have no depth
    pub fn depth(&self, id: &str) -> Option<usize> {
        let mut depth = 0;
        let mut current = self.layer(id)?;
        while let Some(parent) = current.parent_id.as_deref() {
            current = self.layer(parent)?;
            depth += 1;
            if depth > self.layers.len() {
                // cycle in a hand-written schema
                return None;
            }
        }
        Some(depth)
    }

    /// Check the schema forms a rooted tree containing its well-known layers
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self.layer(&self.root_layer) {
            Some(root) if root.parent_id.is_none() => {}
            Some(_) => return Err(format!("Root layer {} has a parent", self.root_layer)),
            None => return Err(format!("Root layer {} is not defined", self.root_layer)),
        }
        for role in [
            &self.participant_layer,
            &self.turn_layer,
            &self.utterance_layer,
            &self.word_layer,
        ] {
            if !self.contains(role) {
                return Err(format!("Layer {} is not defined", role));
            }
        }
        for layer in &self.layers {
            if layer.id != self.root_layer && self.depth(&layer.id).is_none() {
                return Err(format!("Layer {} is not connected to the root", layer.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speech_schema_hierarchy() {
        let schema = Schema::speech();
        assert!(schema.validate().is_ok());
        assert_eq!(schema.parent_of("word"), Some("utterance"));
        assert_eq!(schema.depth("transcript"), Some(0));
        assert_eq!(schema.depth("word"), Some(4));
        assert!(schema.is_top_level("participant"));
        assert!(schema.is_top_level("comment"));
        assert!(!schema.is_top_level("turn"));

        let word = schema.layer("word").unwrap();
        assert!(word.saturated);
        assert!(word.is_aligned());
        assert!(!schema.layer("pronounce").unwrap().peers);
    }

    #[test]
    fn test_child_layers() {
        let schema = Schema::speech();
        let tags: Vec<&str> = schema.child_layers("word").map(|l| l.id.as_str()).collect();
        assert_eq!(tags, vec!["pronounce", "lexical", "phone", "syllable"]);
    }

    #[test]
    fn test_validate_rejects_disconnected_layer() {
        let mut schema = Schema::speech();
        schema
            .layers
            .push(Layer::new("orphan", "missing", Alignment::Interval));
        assert!(schema.validate().is_err());
    }

    #[test]
    fn test_layer_deserializes_with_defaults() {
        let layer: Layer = serde_json::from_str(
            r#"{"id": "gesture", "parent_id": "turn", "alignment": "interval"}"#,
        )
        .unwrap();
        assert!(layer.peers);
        assert!(!layer.saturated);
        assert_eq!(layer.alignment, Alignment::Interval);
    }
}
