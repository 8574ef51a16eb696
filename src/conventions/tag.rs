use tracing::warn;

use super::{derived_parent, expand, layers_present, whole_label, TransformOutcome, Transformer};
use crate::error::ReconciliationError;
use crate::models::{Graph, NewAnnotation};

/// Splits markup inside a single label into a tag on another layer
///
/// `pattern` must match the whole label. The source label is rewritten with
/// `source_template` (or the source is deleted when it is `None`), and a new
/// annotation on `destination_layer` labelled with `destination_template` is created
/// over the same anchors. Templates refer to capture groups as `${1}`, `${2}`, ...
#[derive(Debug, Clone)]
pub struct TagTransformer {
    pub name: String,
    pub source_layer: String,
    pub pattern: String,
    pub source_template: Option<String>,
    pub destination_layer: String,
    pub destination_template: String,
}

impl Transformer for TagTransformer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, graph: Graph) -> TransformOutcome {
        let mut graph = graph;
        if !layers_present(&graph, &self.name, &[&self.source_layer, &self.destination_layer]) {
            return TransformOutcome::unchanged(graph);
        }
        let regex = match whole_label(&self.pattern) {
            Ok(regex) => regex,
            Err(e) => {
                let error = ReconciliationError::tokenization(
                    &self.name,
                    &self.pattern,
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
        let single = graph
            .schema()
            .layer(&self.destination_layer)
            .is_some_and(|l| !l.peers);

        let mut changes = 0;
        let mut warnings = Vec::new();
        for id in graph.on_layer_by_offset(&self.source_layer) {
            if graph.is_marked(id) {
                continue;
            }
            let Some(source) = graph.annotation(id).cloned() else {
                continue;
            };
            let Some(captures) = regex.captures(&source.label) else {
                continue;
            };

            let tag = expand(&captures, &self.destination_template);
            let kept = self
                .source_template
                .as_deref()
                .map(|template| expand(&captures, template));
            let problem = if tag.is_empty() {
                Some("markup is empty")
            } else if kept.as_deref() == Some("") {
                Some("nothing left of the label")
            } else {
                None
            };
            if let Some(message) = problem {
                let error = ReconciliationError::tokenization(&self.name, graph.describe(id), message);
                warn!("{}", error);
                warnings.push(error);
                continue;
            }

            let parent = derived_parent(&graph, id, &self.destination_layer);
            if single
                && parent.is_some_and(|p| !graph.children(p, &self.destination_layer).is_empty())
            {
                let error = ReconciliationError::tokenization(
                    &self.name,
                    graph.describe(id),
                    format!("already has a {} tag", self.destination_layer),
                );
                warn!("{}", error);
                warnings.push(error);
                continue;
            }

            graph.create_annotation(
                NewAnnotation::new(&self.destination_layer, tag, source.start, source.end)
                    .parent(parent)
                    .confidence(source.confidence),
            );
            match kept {
                Some(label) => graph.set_label(id, label),
                None => graph.mark_for_deletion(id),
            }
            changes += 1;
        }

        TransformOutcome {
            graph,
            changes,
            warnings,
        }
    }
}
