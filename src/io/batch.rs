use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task;
use tracing::{info, warn};

use super::input::parse_document_file;
use super::output::{GraphDocument, HumanTranscript};
use crate::stages::{assemble, AssemblyConfig};

/// Configuration for converting many documents at once
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Documents converted at the same time
    pub workers: usize,
    pub assembly: AssemblyConfig,
    /// Where graph documents are written, as `<input stem>.json`; nothing is written if unset
    pub output_dir: Option<PathBuf>,
    /// Also write `<input stem>.txt` transcripts
    pub human_readable: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            assembly: AssemblyConfig::default(),
            output_dir: None,
            human_readable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DocumentStatus {
    Converted { annotations: usize, warnings: usize },
    Failed { error: String },
    /// Not started because the batch was cancelled
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentOutcome {
    pub path: PathBuf,
    #[serde(flatten)]
    pub status: DocumentStatus,
}

/// Convert one document and write its outputs
pub fn convert_document(path: &Path, config: &BatchConfig) -> Result<DocumentStatus> {
    let document = parse_document_file(path)?;
    let conversion = assemble(&document, &config.assembly)
        .with_context(|| format!("Failed to assemble {:?}", path))?;

    if let Some(dir) = &config.output_dir {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| conversion.graph.id.clone());
        GraphDocument::from_conversion(&conversion).write_json(&dir.join(format!("{}.json", stem)))?;
        if config.human_readable {
            HumanTranscript::new(&conversion.graph).write_file(&dir.join(format!("{}.txt", stem)))?;
        }
    }

    Ok(DocumentStatus::Converted {
        annotations: conversion.graph.annotation_count(),
        warnings: conversion.warnings.len(),
    })
}

/// Convert documents in parallel, one graph per document
///
/// `progress` counts documents finished, successfully or not. Once `cancel` is set
/// no further document is started; those already running complete. Outcomes are in
/// the order of `paths`.
pub async fn convert_batch(
    paths: Vec<PathBuf>,
    config: &BatchConfig,
    progress: Arc<AtomicUsize>,
    cancel: Arc<AtomicBool>,
) -> Result<Vec<DocumentOutcome>> {
    info!("Converting {} documents with {} workers", paths.len(), config.workers);
    let limit = Arc::new(Semaphore::new(config.workers.max(1)));
    let config = Arc::new(config.clone());

    let mut handles = Vec::with_capacity(paths.len());
    for path in paths {
        let permit = limit.clone().acquire_owned().await.context("Worker pool closed")?;
        let config = config.clone();
        let progress = progress.clone();
        let cancel = cancel.clone();
        handles.push(task::spawn_blocking(move || {
            let _permit = permit;
            if cancel.load(Ordering::Relaxed) {
                return DocumentOutcome {
                    path,
                    status: DocumentStatus::Cancelled,
                };
            }
            let status = convert_document(&path, &config).unwrap_or_else(|e| {
                warn!("{:?}: {:#}", path, e);
                DocumentStatus::Failed {
                    error: format!("{:#}", e),
                }
            });
            progress.fetch_add(1, Ordering::Relaxed);
            DocumentOutcome { path, status }
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        outcomes.push(handle.await.context("Conversion worker panicked")?);
    }

    let converted = outcomes
        .iter()
        .filter(|o| matches!(o.status, DocumentStatus::Converted { .. }))
        .count();
    info!(
        "Batch complete: {} converted, {} failed or cancelled",
        converted,
        outcomes.len() - converted
    );
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"{
        "tiers": [{"tier": "A", "layer": "utterance", "participant": "Ann"}],
        "events": [{"tier": "A", "label": "hello there", "start": 0.0, "end": 1.0}]
    }"#;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_batch_converts_each_document() {
        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        let paths = vec![
            write(input.path(), "one.json", DOCUMENT),
            write(input.path(), "broken.json", "{"),
            write(input.path(), "two.json", DOCUMENT),
        ];
        let config = BatchConfig {
            workers: 2,
            output_dir: Some(output.path().to_path_buf()),
            human_readable: true,
            ..BatchConfig::default()
        };
        let progress = Arc::new(AtomicUsize::new(0));

        let outcomes = convert_batch(paths, &config, progress.clone(), Arc::new(AtomicBool::new(false)))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0].status, DocumentStatus::Converted { .. }));
        assert!(matches!(outcomes[1].status, DocumentStatus::Failed { .. }));
        assert!(outcomes[2].path.ends_with("two.json"));
        assert_eq!(progress.load(Ordering::Relaxed), 3);
        assert!(output.path().join("one.json").exists());
        assert!(output.path().join("two.txt").exists());
        assert!(!output.path().join("broken.json").exists());
    }

    #[tokio::test]
    async fn test_cancelled_batch_starts_nothing() {
        let input = tempfile::tempdir().unwrap();
        let paths = vec![write(input.path(), "one.json", DOCUMENT)];
        let progress = Arc::new(AtomicUsize::new(0));

        let outcomes = convert_batch(
            paths,
            &BatchConfig::default(),
            progress.clone(),
            Arc::new(AtomicBool::new(true)),
        )
        .await
        .unwrap();

        assert_eq!(outcomes[0].status, DocumentStatus::Cancelled);
        assert_eq!(progress.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_invalid_structure_fails_document() {
        let input = tempfile::tempdir().unwrap();
        let path = write(
            input.path(),
            "notes.json",
            r#"{"tiers": [{"tier": "n", "layer": "comment"}], "events": [{"tier": "n", "label": "x", "start": 0.0, "end": 1.0}]}"#,
        );
        let error = convert_document(&path, &BatchConfig::default()).unwrap_err();
        assert!(format!("{:#}", error).contains("Invalid document"));
    }
}
