use super::{layers_present, parent_groups, TransformOutcome, Transformer};
use crate::models::{AnnotationId, Graph};

/// Re-sequences the ordinals of a layer whose annotations were created out of word
/// order, e.g. language tags added first for phrases and then for single words
///
/// Each annotation sorts by the word it is linked to (the sibling word sharing its
/// start anchor). An unlinked annotation sorts with the first word starting at or
/// after it.
#[derive(Debug, Clone)]
pub struct OrdinalReorder {
    pub name: String,
    pub layer: String,
    pub word_layer: String,
}

impl OrdinalReorder {
    pub fn new(layer: &str, word_layer: &str) -> Self {
        Self {
            name: format!("reorder {}", layer),
            layer: layer.to_string(),
            word_layer: word_layer.to_string(),
        }
    }

    fn word_position(&self, graph: &Graph, parent: Option<AnnotationId>, id: AnnotationId) -> usize {
        let Some(annotation) = graph.annotation(id) else {
            return usize::MAX;
        };
        let words = graph.siblings(parent, &self.word_layer);
        if let Some(linked) = words
            .iter()
            .filter_map(|&w| graph.annotation(w))
            .find(|w| w.start == annotation.start)
        {
            return linked.ordinal;
        }
        let Some(start) = graph.offset(annotation.start) else {
            return usize::MAX;
        };
        words
            .iter()
            .filter_map(|&w| graph.annotation(w))
            .find(|w| graph.offset(w.start).is_some_and(|s| s >= start))
            .map_or(usize::MAX, |w| w.ordinal)
    }
}

impl Transformer for OrdinalReorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, graph: Graph) -> TransformOutcome {
        let mut graph = graph;
        if !layers_present(&graph, &self.name, &[&self.layer, &self.word_layer]) {
            return TransformOutcome::unchanged(graph);
        }

        let mut changes = 0;
        for parent in parent_groups(&graph, &self.layer) {
            let current = graph.siblings(parent, &self.layer);
            if current.len() < 2 {
                continue;
            }
            let mut keyed: Vec<(usize, f64, AnnotationId)> = current
                .iter()
                .map(|&id| {
                    (
                        self.word_position(&graph, parent, id),
                        graph.start_offset(id).unwrap_or(f64::INFINITY),
                        id,
                    )
                })
                .collect();
            keyed.sort_by(|a, b| {
                a.0.cmp(&b.0)
                    .then_with(|| a.1.total_cmp(&b.1))
                    .then_with(|| a.2.cmp(&b.2))
            });
            let ordered: Vec<AnnotationId> = keyed.into_iter().map(|(_, _, id)| id).collect();
            let moved = ordered
                .iter()
                .enumerate()
                .filter(|&(i, &id)| graph.annotation(id).map(|a| a.ordinal) != Some(i + 1))
                .count();
            if moved > 0 {
                graph.reorder(&ordered);
                changes += moved;
            }
        }

        TransformOutcome {
            graph,
            changes,
            warnings: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::{labels, utterance};
    use super::*;
    use crate::models::NewAnnotation;

    #[test]
    fn test_language_tags_follow_word_order() {
        let (mut graph, utterance_id, words) = utterance(&["le", "chat", "is", "bien"]);
        let span = |g: &Graph, w: AnnotationId| {
            let a = g.annotation(w).unwrap();
            (a.start, a.end)
        };
        // the single-word tag was added before the phrase tag
        let (s, e) = span(&graph, words[3]);
        graph.create_annotation(NewAnnotation::new("language", "fr", s, e).parent(Some(utterance_id)));
        let (s, _) = span(&graph, words[0]);
        let (_, e) = span(&graph, words[1]);
        graph.create_annotation(NewAnnotation::new("language", "fr-phrase", s, e).parent(Some(utterance_id)));
        assert_eq!(labels(&graph, utterance_id, "language"), vec!["fr", "fr-phrase"]);

        let outcome = OrdinalReorder::new("language", "word").transform(graph);
        assert_eq!(outcome.changes, 2);
        assert_eq!(
            labels(&outcome.graph, utterance_id, "language"),
            vec!["fr-phrase", "fr"]
        );
    }

    #[test]
    fn test_ordered_layer_is_untouched() {
        let (mut graph, utterance_id, words) = utterance(&["a", "b"]);
        for &w in &words {
            let (s, e) = {
                let a = graph.annotation(w).unwrap();
                (a.start, a.end)
            };
            graph.create_annotation(NewAnnotation::new("language", "en", s, e).parent(Some(utterance_id)));
        }
        let outcome = OrdinalReorder::new("language", "word").transform(graph);
        assert_eq!(outcome.changes, 0);
    }
}
