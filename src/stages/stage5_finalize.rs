use tracing::{debug, info};

use crate::models::{AnnotationId, AssemblyHints, Graph};

/// Result of finalizing a graph
#[derive(Debug, Default)]
pub struct FinalizeResult {
    /// Parent boundaries re-pointed or merged onto their first/last child
    pub boundaries_aligned: usize,
    /// Turns and utterances relabelled with their participant's name
    pub labels_normalized: usize,
    pub annotations_removed: usize,
    pub anchors_removed: usize,
}

/// Make every saturated layer's parents share their first and last child's anchors
///
/// Runs from the deepest layer up, so a change to an utterance is seen when its
/// turn is processed. Boundaries that already coincide in time (or where one side
/// has no offset) are merged; otherwise the parent takes the child's anchor.
pub fn apply_saturation(graph: &mut Graph) -> usize {
    let schema = graph.schema();
    let mut layers: Vec<(usize, String, String)> = schema
        .layers
        .iter()
        .filter(|l| l.saturated && l.is_aligned())
        .filter_map(|l| Some((schema.depth(&l.id)?, l.id.clone(), l.parent_id.clone()?)))
        .collect();
    layers.sort_by(|a, b| b.0.cmp(&a.0));

    let mut aligned = 0;
    for (_, layer_id, parent_layer) in layers {
        for parent in graph.on_layer(&parent_layer) {
            if graph.is_marked(parent) {
                continue;
            }
            let children: Vec<AnnotationId> = graph
                .children(parent, &layer_id)
                .into_iter()
                .filter(|&c| !graph.is_marked(c))
                .collect();
            let (Some(&first), Some(&last)) = (children.first(), children.last()) else {
                continue;
            };
            aligned += align_start(graph, parent, first) as usize;
            aligned += align_end(graph, parent, last) as usize;
        }
    }
    aligned
}

fn align_start(graph: &mut Graph, parent: AnnotationId, first: AnnotationId) -> bool {
    let (Some(p), Some(c)) = (graph.annotation(parent), graph.annotation(first)) else {
        return false;
    };
    let (parent_start, child_start) = (p.start, c.start);
    if parent_start == child_start {
        return false;
    }
    if mergeable(graph.offset(parent_start), graph.offset(child_start)) {
        graph.merge_anchors(parent_start, child_start);
    } else {
        debug!("{} now starts with its first child {}", parent, first);
        graph.set_start(parent, child_start);
    }
    true
}

fn align_end(graph: &mut Graph, parent: AnnotationId, last: AnnotationId) -> bool {
    let (Some(p), Some(c)) = (graph.annotation(parent), graph.annotation(last)) else {
        return false;
    };
    let (parent_end, child_end) = (p.end, c.end);
    if parent_end == child_end {
        return false;
    }
    if mergeable(graph.offset(parent_end), graph.offset(child_end)) {
        graph.merge_anchors(parent_end, child_end);
    } else {
        debug!("{} now ends with its last child {}", parent, last);
        graph.set_end(parent, child_end);
    }
    true
}

fn mergeable(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Label each turn and utterance with its participant's name
pub fn normalize_speaker_labels(graph: &mut Graph) -> usize {
    let schema = graph.schema();
    let participant_layer = schema.participant_layer.clone();
    let targets: Vec<AnnotationId> = [&schema.turn_layer, &schema.utterance_layer]
        .into_iter()
        .flat_map(|layer| graph.on_layer(layer))
        .collect();

    let mut changed = 0;
    for id in targets {
        let Some(name) = graph
            .ancestor_on_layer(id, &participant_layer)
            .and_then(|p| graph.label(p))
            .map(str::to_string)
        else {
            continue;
        };
        if graph.label(id) != Some(name.as_str()) {
            graph.set_label(id, name);
            changed += 1;
        }
    }
    changed
}

/// Stretch participants over the whole transcript
fn span_participants(graph: &mut Graph) {
    let Some((first, last)) = graph.bounds() else {
        return;
    };
    let participant_layer = graph.schema().participant_layer.clone();
    for participant in graph.on_layer(&participant_layer) {
        graph.set_start(participant, first);
        graph.set_end(participant, last);
    }
}

/// Final stage: saturation, speaker labels, participant extents, then drop the
/// assembly hints and commit
pub fn finalize(graph: &mut Graph, hints: &mut AssemblyHints) -> FinalizeResult {
    info!("Stage 5: Finalizing graph {}", graph.id);

    let boundaries_aligned = apply_saturation(graph);
    let labels_normalized = normalize_speaker_labels(graph);
    span_participants(graph);
    hints.clear();
    let summary = graph.commit();

    let result = FinalizeResult {
        boundaries_aligned,
        labels_normalized,
        annotations_removed: summary.annotations_removed,
        anchors_removed: summary.anchors_removed,
    };
    info!(
        "Stage 5: {} boundaries aligned, {} labels normalized, {} anchors removed",
        result.boundaries_aligned, result.labels_normalized, result.anchors_removed
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, NewAnnotation, Schema};

    #[test]
    fn test_saturated_parents_share_child_anchors() {
        let mut g = Graph::new("t", Schema::speech());
        let s = g.get_or_create_anchor_at(0.0, Confidence::Manual);
        let e = g.get_or_create_anchor_at(3.0, Confidence::Manual);
        let ws = g.get_or_create_anchor_at(0.2, Confidence::Manual);
        let wm = g.get_or_create_anchor_at(1.0, Confidence::Manual);
        let we = g.get_or_create_anchor_at(2.5, Confidence::Manual);
        let turn = g.create_annotation(NewAnnotation::new("turn", "A", s, e));
        let utterance =
            g.create_annotation(NewAnnotation::new("utterance", "A", s, e).parent(Some(turn)));
        let w1 =
            g.create_annotation(NewAnnotation::new("word", "a", ws, wm).parent(Some(utterance)));
        let w2 =
            g.create_annotation(NewAnnotation::new("word", "b", wm, we).parent(Some(utterance)));

        let aligned = apply_saturation(&mut g);
        assert!(aligned >= 2);

        let u = g.annotation(utterance).unwrap();
        assert_eq!(u.start, g.annotation(w1).unwrap().start);
        assert_eq!(u.end, g.annotation(w2).unwrap().end);
        let t = g.annotation(turn).unwrap();
        assert_eq!(t.start, u.start);
        assert_eq!(t.end, u.end);
        assert!(g.validate().is_empty(), "{:?}", g.validate());
    }

    #[test]
    fn test_unknown_boundary_is_merged() {
        let mut g = Graph::new("t", Schema::speech());
        let s = g.create_anchor(None, Confidence::None);
        let ws = g.get_or_create_anchor_at(0.4, Confidence::Manual);
        let e = g.get_or_create_anchor_at(1.0, Confidence::Manual);
        let utterance = g.create_annotation(NewAnnotation::new("utterance", "A", s, e));
        g.create_annotation(NewAnnotation::new("word", "a", ws, e).parent(Some(utterance)));

        apply_saturation(&mut g);
        assert!(g.anchor(s).is_none());
        assert_eq!(g.start_offset(utterance), Some(0.4));
    }

    #[test]
    fn test_finalize_clears_hints_and_labels_speakers() {
        let mut g = Graph::new("t", Schema::speech());
        let s = g.get_or_create_anchor_at(0.0, Confidence::Manual);
        let e = g.get_or_create_anchor_at(1.0, Confidence::Manual);
        let participant = g.create_annotation(NewAnnotation::new("participant", "Kim", s, s));
        let turn = g.create_annotation(
            NewAnnotation::new("turn", "spk1", s, e).parent(Some(participant)),
        );
        let utterance = g.create_annotation(
            NewAnnotation::new("utterance", "hello there", s, e).parent(Some(turn)),
        );
        let mut hints = AssemblyHints::default();
        hints.set_tier(utterance, "Kim");

        let result = finalize(&mut g, &mut hints);
        assert!(hints.is_empty());
        assert_eq!(result.labels_normalized, 2);
        assert_eq!(g.label(utterance), Some("Kim"));
        let p = g.annotation(participant).unwrap();
        assert_eq!((p.start, p.end), (s, e));
    }
}
