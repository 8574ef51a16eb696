use tracing::debug;

use super::{adopt_children, layers_present, parent_groups, TransformOutcome, Transformer};
use crate::models::{AnnotationId, Graph};

/// Joins consecutive siblings with the same label that meet end to start
#[derive(Debug, Clone)]
pub struct Coalescer {
    pub name: String,
    pub layer: String,
}

impl Coalescer {
    pub fn new(layer: &str) -> Self {
        Self {
            name: format!("coalesce {}", layer),
            layer: layer.to_string(),
        }
    }
}

fn contiguous(graph: &Graph, before: AnnotationId, after: AnnotationId) -> bool {
    let (Some(b), Some(a)) = (graph.annotation(before), graph.annotation(after)) else {
        return false;
    };
    if b.end == a.start {
        return true;
    }
    match (graph.offset(b.end), graph.offset(a.start)) {
        (Some(end), Some(start)) => end == start,
        _ => false,
    }
}

impl Transformer for Coalescer {
    fn name(&self) -> &str {
        &self.name
    }

    fn transform(&self, graph: Graph) -> TransformOutcome {
        let mut graph = graph;
        if !layers_present(&graph, &self.name, &[&self.layer]) {
            return TransformOutcome::unchanged(graph);
        }

        let mut changes = 0;
        for parent in parent_groups(&graph, &self.layer) {
            let mut kept: Option<AnnotationId> = None;
            let mut joined = 0;
            for id in graph.siblings(parent, &self.layer) {
                let Some(into) = kept else {
                    kept = Some(id);
                    continue;
                };
                if graph.label(into) != graph.label(id) || !contiguous(&graph, into, id) {
                    kept = Some(id);
                    continue;
                }
                if let Some(end) = graph.annotation(id).map(|a| a.end) {
                    graph.set_end(into, end);
                }
                adopt_children(&mut graph, id, into);
                graph.mark_for_deletion(id);
                debug!("{}: joined {} onto {}", self.name, id, into);
                joined += 1;
            }
            if joined > 0 {
                graph.renumber(parent, &self.layer);
                changes += joined;
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

    fn tag_words(graph: &mut Graph, parent: AnnotationId, words: &[AnnotationId], tags: &[&str]) {
        for (&w, tag) in words.iter().zip(tags) {
            let (s, e) = {
                let a = graph.annotation(w).unwrap();
                (a.start, a.end)
            };
            graph.create_annotation(NewAnnotation::new("language", *tag, s, e).parent(Some(parent)));
        }
    }

    #[test]
    fn test_adjacent_equal_tags_become_one() {
        let (mut graph, utterance_id, words) = utterance(&["je", "suis", "here", "now"]);
        tag_words(&mut graph, utterance_id, &words, &["fr", "fr", "en", "en"]);

        let mut outcome = Coalescer::new("language").transform(graph);
        outcome.graph.commit();
        let g = outcome.graph;

        assert_eq!(outcome.changes, 2);
        assert_eq!(labels(&g, utterance_id, "language"), vec!["fr", "en"]);
        let spans: Vec<(f64, f64)> = g
            .children(utterance_id, "language")
            .into_iter()
            .map(|l| (g.start_offset(l).unwrap(), g.end_offset(l).unwrap()))
            .collect();
        assert_eq!(spans, vec![(0.0, 2.0), (2.0, 4.0)]);
    }

    #[test]
    fn test_gap_prevents_joining() {
        let (mut graph, utterance_id, words) = utterance(&["je", "well", "suis"]);
        tag_words(&mut graph, utterance_id, &[words[0], words[2]], &["fr", "fr"]);

        let outcome = Coalescer::new("language").transform(graph);
        assert_eq!(outcome.changes, 0);
        assert_eq!(labels(&outcome.graph, utterance_id, "language"), vec!["fr", "fr"]);
    }
}
