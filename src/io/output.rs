use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::error::ReconciliationError;
use crate::models::{Anchor, Annotation, AnnotationId, Graph, Schema};
use crate::stages::{AssemblyStats, Conversion};

/// Machine-readable graph output
#[derive(Debug, Clone, Serialize)]
pub struct GraphDocument {
    pub id: String,
    pub schema: Schema,
    /// Anchors in id order
    pub anchors: Vec<Anchor>,
    /// Annotations in id order
    pub annotations: Vec<Annotation>,
    /// Non-fatal problems found while building the graph
    pub warnings: Vec<ReconciliationError>,
    pub metadata: GraphMetadata,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphMetadata {
    /// RFC 3339 time the document was written
    pub converted_at: String,
    pub anchor_count: usize,
    pub annotation_count: usize,
    pub warning_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<AssemblyStats>,
}

impl GraphDocument {
    pub fn from_graph(graph: &Graph, warnings: &[ReconciliationError]) -> Self {
        let anchors: Vec<Anchor> = graph.anchors().cloned().collect();
        let annotations: Vec<Annotation> = graph.annotations().cloned().collect();
        Self {
            id: graph.id.clone(),
            schema: graph.schema().clone(),
            metadata: GraphMetadata {
                converted_at: Utc::now().to_rfc3339(),
                anchor_count: anchors.len(),
                annotation_count: annotations.len(),
                warning_count: warnings.len(),
                stats: None,
            },
            anchors,
            annotations,
            warnings: warnings.to_vec(),
        }
    }

    pub fn from_conversion(conversion: &Conversion) -> Self {
        let mut document = Self::from_graph(&conversion.graph, &conversion.warnings);
        document.metadata.stats = Some(conversion.stats.clone());
        document
    }

    /// Write to a JSON file
    pub fn write_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        serde_json::to_writer_pretty(file, self).context("Failed to write JSON")?;
        Ok(())
    }
}

/// Human-readable transcript: one block per turn, in time order
pub struct HumanTranscript<'a> {
    graph: &'a Graph,
}

impl<'a> HumanTranscript<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self { graph }
    }

    fn words(&self, turn: AnnotationId) -> Vec<&str> {
        let schema = self.graph.schema();
        self.graph
            .children(turn, &schema.utterance_layer)
            .into_iter()
            .flat_map(|utterance| self.graph.children(utterance, &schema.word_layer))
            .filter_map(|word| self.graph.label(word))
            .collect()
    }

    /// Format the transcript as human-readable text
    pub fn format(&self) -> String {
        let mut output = String::new();

        for turn in self.graph.on_layer_by_offset(&self.graph.schema().turn_layer) {
            let start_time = self
                .graph
                .start_offset(turn)
                .map_or_else(|| "--:--.---".to_string(), format_timestamp);
            let speaker = self.graph.label(turn).unwrap_or_default();
            output.push_str(&format!("[{}] {}:\n", start_time, speaker));

            let text = self.words(turn).join(" ");
            output.push_str(&wrap_text(&text, 80));
            output.push_str("\n\n");
        }

        output
    }

    /// Write to a text file
    pub fn write_file(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create file: {:?}", path))?;
        write!(file, "{}", self.format())?;
        Ok(())
    }
}

/// Format seconds as MM:SS.mmm
fn format_timestamp(seconds: f64) -> String {
    let ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let millis = ms % 1000;
    let total_seconds = ms / 1000;
    format!("{:02}:{:02}.{:03}", total_seconds / 60, total_seconds % 60, millis)
}

/// Wrap text at approximately the given width
fn wrap_text(text: &str, width: usize) -> String {
    let mut result = String::new();
    let mut line_len = 0;

    for word in text.split_whitespace() {
        let len = word.chars().count();
        if line_len > 0 && line_len + len + 1 > width {
            result.push('\n');
            line_len = 0;
        }
        if line_len > 0 {
            result.push(' ');
            line_len += 1;
        }
        result.push_str(word);
        line_len += len;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SourceEvent, TierMapping};
    use crate::stages::{assemble_events, AssemblyConfig};

    fn conversation() -> Conversion {
        let tiers = vec![
            TierMapping::new("A", "utterance").with_participant("Ann"),
            TierMapping::new("B", "utterance").with_participant("Bob"),
        ];
        let events = vec![
            SourceEvent::timed("A", "good morning everyone", 0.0, 2.0),
            SourceEvent::timed("B", "morning", 65.0, 65.5),
        ];
        assemble_events("meeting", Schema::speech(), &tiers, &events, &AssemblyConfig::default()).unwrap()
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00.000");
        assert_eq!(format_timestamp(1.5), "00:01.500");
        assert_eq!(format_timestamp(65.0), "01:05.000");
        assert_eq!(format_timestamp(3661.5), "61:01.500");
    }

    #[test]
    fn test_wrap_text() {
        let text = "This is a test of the text wrapping function that should wrap at 20 chars";
        let wrapped = wrap_text(text, 20);
        assert!(wrapped.lines().count() > 1);
        for line in wrapped.lines() {
            assert!(line.len() <= 20);
        }
    }

    #[test]
    fn test_human_transcript() {
        let conversion = conversation();
        let text = HumanTranscript::new(&conversion.graph).format();
        assert_eq!(
            text,
            "[00:00.000] Ann:\ngood morning everyone\n\n[01:05.000] Bob:\nmorning\n\n"
        );
    }

    #[test]
    fn test_graph_document_json() {
        let conversion = conversation();
        let document = GraphDocument::from_conversion(&conversion);
        assert_eq!(document.metadata.annotation_count, conversion.graph.annotation_count());
        assert!(chrono::DateTime::parse_from_rfc3339(&document.metadata.converted_at).is_ok());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meeting.json");
        document.write_json(&path).unwrap();
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["id"], "meeting");
        assert_eq!(written["schema"]["word_layer"], "word");
        assert_eq!(written["metadata"]["stats"]["participants"], 2);
        let words = written["annotations"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|a| a["layer_id"] == "word")
            .count();
        assert_eq!(words, 4);
    }

    #[test]
    fn test_write_human_file() {
        let conversion = conversation();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("meeting.txt");
        HumanTranscript::new(&conversion.graph).write_file(&path).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("Bob:"));
    }
}
