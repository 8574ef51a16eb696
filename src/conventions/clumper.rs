use std::collections::HashSet;

use regex::Regex;
use tracing::{debug, warn};

use super::{adopt_children, layers_present, parent_groups, whole_label, TransformOutcome, Transformer};
use crate::error::ReconciliationError;
use crate::models::{AnchorId, AnnotationId, Graph};

/// Folds tokens that contain no orthographic characters (stray punctuation left by
/// markup or tokenization) into the neighbouring word
///
/// A punctuation token joins the word before it when the two share an anchor,
/// unless it is a forward-clumping token such as an opening bracket, in which case
/// it is prepended to the word after it. Tokens separated by a gap stay as they are.
#[derive(Debug, Clone)]
pub struct OrthographyClumper {
    pub word_layer: String,
    /// Characters that don't count as orthography
    pub non_orthographic: String,
    /// Whole-token pattern for punctuation that belongs to the following word
    pub clump_forward: Option<String>,
    /// Words are never joined across the boundary of an annotation on this layer
    pub partition_layer: Option<String>,
}

impl OrthographyClumper {
    pub fn new(word_layer: &str) -> Self {
        Self {
            word_layer: word_layer.to_string(),
            non_orthographic: r"[[:punct:]&&[^_]]".to_string(),
            clump_forward: Some(r"[({\[<]".to_string()),
            partition_layer: None,
        }
    }
}

struct Patterns {
    non_orthographic: Regex,
    clump_forward: Option<Regex>,
}

impl OrthographyClumper {
    fn patterns(&self) -> Result<Patterns, regex::Error> {
        Ok(Patterns {
            non_orthographic: Regex::new(&self.non_orthographic)?,
            clump_forward: self.clump_forward.as_deref().map(whole_label).transpose()?,
        })
    }

    /// Whether a partition annotation ends where this anchor is
    fn partitioned(&self, graph: &Graph, anchor: AnchorId) -> bool {
        self.partition_layer.as_deref().is_some_and(|layer| {
            graph
                .ending_at(anchor)
                .into_iter()
                .any(|id| graph.annotation(id).is_some_and(|a| a.layer_id == layer))
        })
    }

    fn joined(&self, graph: &Graph, before: AnnotationId, after: AnnotationId) -> bool {
        match (graph.annotation(before), graph.annotation(after)) {
            (Some(b), Some(a)) => b.end == a.start && !self.partitioned(graph, a.start),
            _ => false,
        }
    }
}

/// Append `token` to `word`: labels joined with a space, `word` stretched to the
/// token's end and the token's children handed over
fn append(graph: &mut Graph, word: AnnotationId, token: AnnotationId) {
    let (Some(w), Some(t)) = (graph.annotation(word), graph.annotation(token)) else {
        return;
    };
    let label = format!("{} {}", w.label, t.label);
    let (old_end, new_end) = (w.end, t.end);
    graph.set_label(word, label);
    graph.move_ending_annotations(old_end, new_end);
    graph.move_starting_annotations(old_end, new_end);
    adopt_children(graph, token, word);
}

/// Prepend `token` to `word`, moving the word's start back to the token's start
fn prepend(graph: &mut Graph, token: AnnotationId, word: AnnotationId) {
    let (Some(t), Some(w)) = (graph.annotation(token), graph.annotation(word)) else {
        return;
    };
    let label = format!("{} {}", t.label, w.label);
    let (old_start, new_start) = (w.start, t.start);
    graph.set_label(word, label);
    graph.move_ending_annotations(old_start, new_start);
    graph.move_starting_annotations(old_start, new_start);
    adopt_children(graph, token, word);
}

impl Transformer for OrthographyClumper {
    fn name(&self) -> &str {
        "clump"
    }

    fn transform(&self, graph: Graph) -> TransformOutcome {
        let mut graph = graph;
        if !layers_present(&graph, self.name(), &[&self.word_layer]) {
            return TransformOutcome::unchanged(graph);
        }
        let patterns = match self.patterns() {
            Ok(patterns) => patterns,
            Err(e) => {
                let error = ReconciliationError::tokenization(
                    self.name(),
                    &self.word_layer,
                    format!("invalid pattern: {}", e),
                );
                warn!("{}", error);
                return TransformOutcome {
                    graph,
                    changes: 0,
                    warnings: vec![error],
                };
            }
        };

        let mut changes = 0;
        for parent in parent_groups(&graph, &self.word_layer) {
            let tokens: Vec<AnnotationId> = graph
                .siblings(parent, &self.word_layer)
                .into_iter()
                .filter(|&id| !graph.is_marked(id))
                .collect();
            let mut absorbed: HashSet<AnnotationId> = HashSet::new();
            let mut last: Option<AnnotationId> = None;
            let mut pending: Option<AnnotationId> = None;

            for &token in &tokens {
                let label = graph.label(token).unwrap_or_default();
                let orthographic = !patterns.non_orthographic.replace_all(label, "").is_empty();
                if orthographic {
                    if let Some(first) = pending.take() {
                        if self.joined(&graph, first, token) {
                            prepend(&mut graph, first, token);
                            absorbed.insert(first);
                        }
                    }
                    last = Some(token);
                    continue;
                }

                let forward = patterns
                    .clump_forward
                    .as_ref()
                    .is_some_and(|p| p.is_match(label));
                match (last, pending) {
                    (Some(word), None) if !forward && self.joined(&graph, word, token) => {
                        append(&mut graph, word, token);
                        absorbed.insert(token);
                    }
                    (_, None) => pending = Some(token),
                    (_, Some(first)) => {
                        if self.joined(&graph, first, token) {
                            append(&mut graph, first, token);
                            absorbed.insert(token);
                        } else {
                            // the earlier run can't reach the next word, so it stays
                            last = Some(first);
                            pending = Some(token);
                        }
                    }
                }
            }

            // punctuation at the very end goes onto the last word
            if let (Some(word), Some(first)) = (last, pending) {
                if self.joined(&graph, word, first) {
                    append(&mut graph, word, first);
                    absorbed.insert(first);
                }
            }

            if absorbed.is_empty() {
                continue;
            }
            for &token in &absorbed {
                graph.mark_for_deletion(token);
            }
            let survivors: Vec<AnnotationId> = tokens
                .into_iter()
                .filter(|id| !absorbed.contains(id))
                .collect();
            graph.reorder(&survivors);
            debug!("Clumped {} tokens", absorbed.len());
            changes += absorbed.len();
        }

        TransformOutcome {
            graph,
            changes,
            warnings: Vec::new(),
        }
    }
}
