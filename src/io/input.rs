use std::path::Path;

use anyhow::{Context, Result};

use crate::models::SourceDocument;

/// Parse a source document JSON file
pub fn parse_document_file(path: &Path) -> Result<SourceDocument> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    parse_document_json(&content).with_context(|| format!("Failed to parse {:?}", path))
}

/// Parse a source document from a JSON string
pub fn parse_document_json(json: &str) -> Result<SourceDocument> {
    let document: SourceDocument =
        serde_json::from_str(json).context("Failed to parse source document JSON")?;
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const INTERVIEW: &str = r#"{
        "id": "interview-1",
        "tiers": [
            {"tier": "A", "layer": "utterance", "participant": "Ann"},
            {"tier": "B", "layer": "utterance", "participant": "Bob"},
            {"tier": "notes"}
        ],
        "events": [
            {"id": "u1", "tier": "A", "label": "hello there", "start": 0.0, "end": 1.5},
            {"id": "u2", "tier": "B", "label": "hi", "start": 1.5, "end": 2.0},
            {"tier": "notes", "label": "door slams", "start": 0.5, "end": 0.6},
            {"tier": "A", "label": "there", "reference": "u1"}
        ]
    }"#;

    #[test]
    fn test_parse_document_json() {
        let document = parse_document_json(INTERVIEW).unwrap();

        assert_eq!(document.id.as_deref(), Some("interview-1"));
        assert!(document.schema.is_none());
        assert_eq!(document.tiers.len(), 3);
        assert_eq!(document.tiers[0].participant.as_deref(), Some("Ann"));
        // a tier without a layer is ignored
        assert!(document.tiers[2].layer.is_none());

        assert_eq!(document.events.len(), 4);
        assert_eq!(document.events[1].start, Some(1.5));
        assert_eq!(document.events[3].reference.as_deref(), Some("u1"));
        assert!(document.events[3].start.is_none());
    }

    #[test]
    fn test_custom_schema() {
        let json = r#"{
            "schema": {
                "layers": [
                    {"id": "doc", "peers": false},
                    {"id": "speaker", "parent_id": "doc"},
                    {"id": "turn", "parent_id": "speaker", "alignment": "interval"},
                    {"id": "line", "parent_id": "turn", "alignment": "interval", "saturated": true},
                    {"id": "token", "parent_id": "line", "alignment": "interval", "saturated": true}
                ],
                "root_layer": "doc",
                "participant_layer": "speaker",
                "turn_layer": "turn",
                "utterance_layer": "line",
                "word_layer": "token"
            },
            "tiers": [],
            "events": []
        }"#;
        let document = parse_document_json(json).unwrap();
        let schema = document.schema.unwrap();
        assert_eq!(schema.word_layer, "token");
        assert!(schema.layer("line").unwrap().saturated);
        assert!(schema.layer("speaker").unwrap().peers);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn test_parse_document_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(INTERVIEW.as_bytes()).unwrap();
        let document = parse_document_file(file.path()).unwrap();
        assert_eq!(document.events.len(), 4);
    }

    #[test]
    fn test_bad_input_is_an_error() {
        assert!(parse_document_json("{\"tiers\": []}").is_err());
        assert!(parse_document_json("not json").is_err());
        let missing = parse_document_file(Path::new("/nonexistent/document.json"));
        assert!(format!("{:#}", missing.unwrap_err()).contains("Failed to read file"));
    }
}
