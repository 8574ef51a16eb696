use regex::Regex;
use tracing::{debug, warn};

use super::{derived_parent, expand, layers_present, parent_groups, whole_label, TransformOutcome, Transformer};
use crate::error::ReconciliationError;
use crate::models::{AnchorId, AnnotationId, Graph, NewAnnotation};

/// Turns markup opened on one annotation and closed on a later one into a single
/// annotation on the destination layer covering the whole run
///
/// Templates refer to the capture groups of the pattern they rewrite with `${n}`.
/// A `None` source template deletes that end of the span; a `None` destination
/// template leaves that end out of the new label.
#[derive(Debug, Clone)]
pub struct SpanningTransformer {
    pub name: String,
    pub source_layer: String,
    pub start_pattern: String,
    pub end_pattern: String,
    /// Delete the annotations between the first and last of a span
    pub delete_in_source: bool,
    pub source_start_template: Option<String>,
    pub source_end_template: Option<String>,
    pub destination_layer: String,
    /// Joins the parts of a multi-annotation destination label
    pub delimiter: String,
    pub destination_start_template: Option<String>,
    pub destination_end_template: Option<String>,
    /// Put the new annotation over the source annotation preceding the span instead
    pub annotate_previous: bool,
    /// After deleting span annotations, stretch the preceding annotation over the gap
    pub close_gaps: bool,
}

impl SpanningTransformer {
    /// A transformer that removes the whole span from the source layer and keeps only
    /// its content, e.g. `{comment over words}`
    pub fn consuming(
        name: &str,
        source_layer: &str,
        start_pattern: &str,
        end_pattern: &str,
        destination_layer: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            source_layer: source_layer.to_string(),
            start_pattern: start_pattern.to_string(),
            end_pattern: end_pattern.to_string(),
            delete_in_source: true,
            source_start_template: None,
            source_end_template: None,
            destination_layer: destination_layer.to_string(),
            delimiter: " ".to_string(),
            destination_start_template: Some("${1}".to_string()),
            destination_end_template: Some("${1}".to_string()),
            annotate_previous: false,
            close_gaps: false,
        }
    }

    fn warning(&self, graph: &Graph, id: AnnotationId, message: impl Into<String>) -> ReconciliationError {
        let error = ReconciliationError::tokenization(&self.name, graph.describe(id), message);
        warn!("{}", error);
        error
    }

    /// Label of the new annotation; empty if the span yields nothing
    fn destination_label(
        &self,
        graph: &Graph,
        span: &[AnnotationId],
        start: &Regex,
        end: &Regex,
    ) -> String {
        let label_of = |id: AnnotationId| graph.label(id).unwrap_or_default();
        let first = label_of(span[0]);
        let opening = self
            .destination_start_template
            .as_deref()
            .map(|t| rewrite(start, first, t))
            .unwrap_or_default();

        if span.len() == 1 {
            return match self.destination_end_template.as_deref() {
                Some(template) => rewrite(end, &opening, template),
                None => opening,
            };
        }

        let mut parts = vec![opening];
        if self.delete_in_source {
            parts.extend(span[1..span.len() - 1].iter().map(|&id| label_of(id).to_string()));
        }
        if let Some(template) = self.destination_end_template.as_deref() {
            parts.push(rewrite(end, label_of(span[span.len() - 1]), template));
        }
        parts.retain(|p| !p.is_empty());
        parts.join(&self.delimiter)
    }

    /// Rewrite or delete the source annotations of a finished span; returns the
    /// end anchor of the last one deleted
    fn rewrite_sources(
        &self,
        graph: &mut Graph,
        span: &[AnnotationId],
        start: &Regex,
        end: &Regex,
    ) -> Option<AnchorId> {
        let mut end_of_gap = None;
        let first = span[0];
        let last = span[span.len() - 1];

        let opening = self
            .source_start_template
            .as_deref()
            .map(|t| rewrite(start, graph.label(first).unwrap_or_default(), t));
        let closing = if span.len() == 1 {
            // the end pattern applies to what the start rewrite left behind
            opening.as_deref().and_then(|residual| {
                self.source_end_template
                    .as_deref()
                    .map(|t| rewrite(end, residual, t))
            })
        } else {
            self.source_end_template
                .as_deref()
                .map(|t| rewrite(end, graph.label(last).unwrap_or_default(), t))
        };

        let mut settle = |graph: &mut Graph, id: AnnotationId, label: Option<String>| match label {
            Some(label) if !label.is_empty() => {
                if graph.label(id) != Some(label.as_str()) {
                    graph.set_label(id, label);
                }
            }
            _ => {
                end_of_gap = graph.annotation(id).map(|a| a.end);
                graph.mark_for_deletion(id);
            }
        };

        if span.len() == 1 {
            settle(graph, first, closing);
        } else {
            settle(graph, first, opening);
            if self.delete_in_source {
                for &id in &span[1..span.len() - 1] {
                    settle(graph, id, None);
                }
            }
            settle(graph, last, closing);
        }
        end_of_gap
    }
}

impl Transformer for SpanningTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, graph: Graph) -> TransformOutcome {
        let mut graph = graph;
        if !layers_present(&graph, &self.name, &[&self.source_layer, &self.destination_layer]) {
            return TransformOutcome::unchanged(graph);
        }
        let mut warnings = Vec::new();
        if self.source_layer == self.destination_layer {
            let error = ReconciliationError::tokenization(
                &self.name,
                &self.source_layer,
                "source and destination layer are the same",
            );
            warn!("{}", error);
            warnings.push(error);
            return TransformOutcome {
                graph,
                changes: 0,
                warnings,
            };
        }
        let (start, end) = match (whole_label(&self.start_pattern), whole_label(&self.end_pattern)) {
            (Ok(start), Ok(end)) => (start, end),
            (Err(e), _) | (_, Err(e)) => {
                let error = ReconciliationError::tokenization(
                    &self.name,
                    &self.source_layer,
                    format!("invalid pattern: {}", e),
                );
                warn!("{}", error);
                warnings.push(error);
                return TransformOutcome {
                    graph,
                    changes: 0,
                    warnings,
                };
            }
        };
        let single = graph
            .schema()
            .layer(&self.destination_layer)
            .is_some_and(|l| !l.peers);

        let mut changes = 0;
        for parent in parent_groups(&graph, &self.source_layer) {
            let sources: Vec<AnnotationId> = graph
                .siblings(parent, &self.source_layer)
                .into_iter()
                .filter(|&id| !graph.is_marked(id))
                .collect();

            let mut span: Vec<AnnotationId> = Vec::new();
            let mut previous: Option<AnnotationId> = None;
            for source in sources {
                let label = graph.label(source).unwrap_or_default();
                if span.is_empty() {
                    if start.is_match(label) {
                        span.push(source);
                    } else {
                        previous = Some(source);
                        continue;
                    }
                } else {
                    span.push(source);
                }
                if !end.is_match(label) {
                    continue;
                }

                let run = std::mem::take(&mut span);
                let text = self.destination_label(&graph, &run, &start, &end);
                if text.is_empty() {
                    warnings.push(self.warning(&graph, run[0], "span has no content"));
                    continue;
                }
                let (over_first, over_last) = match previous {
                    Some(p) if self.annotate_previous => (p, p),
                    _ => (run[0], run[run.len() - 1]),
                };
                let new_parent = derived_parent(&graph, over_first, &self.destination_layer);
                if single
                    && new_parent.is_some_and(|p| !graph.children(p, &self.destination_layer).is_empty())
                {
                    warnings.push(self.warning(
                        &graph,
                        over_first,
                        format!("already has a {} annotation", self.destination_layer),
                    ));
                    continue;
                }
                let (Some(first), Some(last)) = (graph.annotation(over_first), graph.annotation(over_last))
                else {
                    continue;
                };
                let (span_start, span_end, confidence) = (first.start, last.end, first.confidence);
                let created = graph.create_annotation(
                    NewAnnotation::new(&self.destination_layer, text, span_start, span_end)
                        .parent(new_parent)
                        .confidence(confidence),
                );
                debug!("{}: created {}", self.name, graph.describe(created));
                changes += 1;

                let end_of_gap = self.rewrite_sources(&mut graph, &run, &start, &end);
                if self.close_gaps && self.delete_in_source {
                    if let (Some(gap_end), Some(p)) = (end_of_gap, previous) {
                        if let Some(old_end) = graph.annotation(p).map(|a| a.end) {
                            graph.move_ending_annotations(old_end, gap_end);
                        }
                    }
                }
            }

            if let Some(&open) = span.first() {
                warnings.push(self.warning(&graph, open, "span is never closed"));
            }
            graph.renumber(parent, &self.source_layer);
        }

        TransformOutcome {
            graph,
            changes,
            warnings,
        }
    }
}

/// Rewrite a whole-label match with a template; labels that don't match pass through
fn rewrite(pattern: &Regex, label: &str, template: &str) -> String {
    match pattern.captures(label) {
        Some(captures) => expand(&captures, template),
        None => label.to_string(),
    }
}
