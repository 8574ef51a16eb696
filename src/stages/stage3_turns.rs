use tracing::{debug, info};

use crate::models::{AnnotationId, Graph};

/// Configuration for turn merging
#[derive(Debug, Clone)]
pub struct TurnMergeConfig {
    /// Longest silence (in offset units) between two turns of the same speaker
    /// that still counts as one turn
    pub pause_tolerance: f64,
}

impl Default for TurnMergeConfig {
    fn default() -> Self {
        Self {
            pause_tolerance: 0.0,
        }
    }
}

/// Result of turn merging
#[derive(Debug, Default)]
pub struct TurnMergeResult {
    /// Participants whose turns were examined
    pub participants: usize,
    /// Turns absorbed into a preceding turn (marked for deletion)
    pub turns_merged: usize,
}

/// Merge one participant's adjacent turns
///
/// Turns are ordered by start offset and scanned forwards. Each turn is compared with
/// the head of the current merged group, whose end has already been extended to the
/// latest end in the group, so a turn nested inside an earlier one cannot hide the
/// turns after it. A turn is merged into the head when they touch or overlap, or when
/// the gap between them is within the pause tolerance and no other participant's turn
/// overlaps the gap. Merged turns are only marked; the caller commits.
pub fn merge_turns(graph: &mut Graph, participant: AnnotationId, config: &TurnMergeConfig) -> usize {
    let turn_layer = graph.schema().turn_layer.clone();
    let mut turns: Vec<AnnotationId> = graph
        .children(participant, &turn_layer)
        .into_iter()
        .filter(|&t| !graph.is_marked(t))
        .collect();
    turns.sort_by(|&a, &b| graph.compare_by_offset(a, b));
    let Some((&first, rest)) = turns.split_first() else {
        return 0;
    };

    let mut merged = 0;
    let mut head = first;
    for &following in rest {
        if should_merge(graph, participant, head, following, config) {
            merge_into(graph, head, following);
            merged += 1;
        } else {
            head = following;
        }
    }
    merged
}

fn should_merge(
    graph: &Graph,
    participant: AnnotationId,
    preceding: AnnotationId,
    following: AnnotationId,
    config: &TurnMergeConfig,
) -> bool {
    let (Some(p), Some(f)) = (graph.annotation(preceding), graph.annotation(following)) else {
        return false;
    };
    if p.end == f.start {
        return true;
    }
    let (Some(preceding_end), Some(following_start)) = (graph.offset(p.end), graph.offset(f.start))
    else {
        return false;
    };
    if preceding_end >= following_start {
        return true;
    }

    let pause = following_start - preceding_end;
    config.pause_tolerance > 0.0
        && pause <= config.pause_tolerance
        && !gap_overlapped(graph, participant, preceding_end, following_start)
}

/// Whether some other participant's turn overlaps the open interval (from, to)
fn gap_overlapped(graph: &Graph, participant: AnnotationId, from: f64, to: f64) -> bool {
    let schema = graph.schema();
    graph.on_layer(&schema.turn_layer).into_iter().any(|turn| {
        if graph.is_marked(turn) {
            return false;
        }
        let Some(annotation) = graph.annotation(turn) else {
            return false;
        };
        if annotation.parent == Some(participant) {
            return false;
        }
        match (graph.offset(annotation.start), graph.offset(annotation.end)) {
            (Some(start), Some(end)) => start < to && end > from,
            _ => false,
        }
    })
}

/// Move every child of `following` under `preceding` (ordinals continuing), extend
/// `preceding` to cover `following`, and mark `following` for deletion
fn merge_into(graph: &mut Graph, preceding: AnnotationId, following: AnnotationId) {
    for child in graph.all_children(following) {
        graph.set_parent(child, Some(preceding));
    }

    let (Some(p), Some(f)) = (graph.annotation(preceding), graph.annotation(following)) else {
        return;
    };
    let (preceding_end, following_end) = (p.end, f.end);
    let extend = match (graph.offset(preceding_end), graph.offset(following_end)) {
        (Some(pe), Some(fe)) => pe < fe,
        _ => true,
    };
    if extend {
        graph.set_end(preceding, following_end);
    }
    graph.mark_for_deletion(following);
    debug!("Merged turn {} into {}", following, preceding);
}

/// Execute turn merging for every participant
pub fn merge_all_turns(graph: &mut Graph, config: &TurnMergeConfig) -> TurnMergeResult {
    let participant_layer = graph.schema().participant_layer.clone();
    let participants = graph.on_layer(&participant_layer);

    let mut result = TurnMergeResult {
        participants: participants.len(),
        ..Default::default()
    };
    for participant in participants {
        result.turns_merged += merge_turns(graph, participant, config);
    }

    info!(
        "Turn merging: {} turns merged across {} participants",
        result.turns_merged, result.participants
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, NewAnnotation, Schema};

    fn participant(graph: &mut Graph, name: &str) -> AnnotationId {
        let s = graph.get_or_create_anchor_at(0.0, Confidence::Manual);
        let e = graph.get_or_create_anchor_at(100.0, Confidence::Manual);
        graph.create_annotation(NewAnnotation::new("participant", name, s, e))
    }

    fn turn(graph: &mut Graph, speaker: AnnotationId, start: f64, end: f64) -> AnnotationId {
        let s = graph.get_or_create_anchor_at(start, Confidence::Manual);
        let e = graph.get_or_create_anchor_at(end, Confidence::Manual);
        let label = graph.label(speaker).unwrap_or_default().to_string();
        let turn = graph.create_annotation(NewAnnotation::new("turn", label, s, e).parent(Some(speaker)));
        graph.create_annotation(NewAnnotation::new("utterance", "", s, e).parent(Some(turn)));
        turn
    }

    fn spans(graph: &Graph, speaker: AnnotationId) -> Vec<(f64, f64)> {
        graph
            .children(speaker, "turn")
            .into_iter()
            .map(|t| (graph.start_offset(t).unwrap(), graph.end_offset(t).unwrap()))
            .collect()
    }

    #[test]
    fn test_contiguous_and_overlapping_turns_collapse() {
        let mut g = Graph::new("t", Schema::speech());
        let a = participant(&mut g, "A");
        let first = turn(&mut g, a, 0.0, 2.0);
        turn(&mut g, a, 2.0, 3.5);
        turn(&mut g, a, 3.4, 5.0);

        let merged = merge_turns(&mut g, a, &TurnMergeConfig::default());
        g.commit();

        assert_eq!(merged, 2);
        assert_eq!(spans(&g, a), vec![(0.0, 5.0)]);
        let ordinals: Vec<usize> = g
            .children(first, "utterance")
            .into_iter()
            .map(|u| g.annotation(u).unwrap().ordinal)
            .collect();
        assert_eq!(ordinals, vec![1, 2, 3]);
    }

    #[test]
    fn test_merging_twice_changes_nothing() {
        let mut g = Graph::new("t", Schema::speech());
        let a = participant(&mut g, "A");
        turn(&mut g, a, 0.0, 2.0);
        turn(&mut g, a, 2.0, 3.5);
        turn(&mut g, a, 6.0, 7.0);

        merge_all_turns(&mut g, &TurnMergeConfig::default());
        g.commit();
        let once = spans(&g, a);
        let result = merge_all_turns(&mut g, &TurnMergeConfig::default());
        g.commit();

        assert_eq!(result.turns_merged, 0);
        assert_eq!(spans(&g, a), once);
        assert_eq!(once, vec![(0.0, 3.5), (6.0, 7.0)]);
    }

    #[test]
    fn test_pause_tolerance_respects_other_speakers() {
        let mut g = Graph::new("t", Schema::speech());
        let a = participant(&mut g, "A");
        let b = participant(&mut g, "B");
        turn(&mut g, a, 0.0, 1.0);
        turn(&mut g, a, 1.5, 2.0);
        turn(&mut g, a, 3.0, 4.0);
        turn(&mut g, a, 4.5, 5.0);
        // B speaks in the gap between A's second and third turns
        turn(&mut g, b, 2.2, 2.8);

        let config = TurnMergeConfig {
            pause_tolerance: 1.0,
        };
        merge_all_turns(&mut g, &config);
        g.commit();

        assert_eq!(spans(&g, a), vec![(0.0, 2.0), (3.0, 5.0)]);
        assert_eq!(spans(&g, b), vec![(2.2, 2.8)]);
    }

    #[test]
    fn test_gap_beyond_tolerance_is_kept() {
        let mut g = Graph::new("t", Schema::speech());
        let a = participant(&mut g, "A");
        turn(&mut g, a, 0.0, 1.0);
        turn(&mut g, a, 1.5, 2.0);

        let merged = merge_turns(&mut g, a, &TurnMergeConfig::default());
        assert_eq!(merged, 0);
    }

    #[test]
    fn test_contained_turn_does_not_shorten_preceding() {
        let mut g = Graph::new("t", Schema::speech());
        let a = participant(&mut g, "A");
        turn(&mut g, a, 0.0, 10.0);
        turn(&mut g, a, 2.0, 3.0);

        merge_turns(&mut g, a, &TurnMergeConfig::default());
        g.commit();
        assert_eq!(spans(&g, a), vec![(0.0, 10.0)]);
    }

    #[test]
    fn test_nested_turn_does_not_hide_later_overlap() {
        let mut g = Graph::new("t", Schema::speech());
        let a = participant(&mut g, "A");
        let long = turn(&mut g, a, 0.0, 10.0);
        turn(&mut g, a, 2.0, 3.0);
        turn(&mut g, a, 4.0, 5.0);

        let first = merge_turns(&mut g, a, &TurnMergeConfig::default());
        g.commit();
        assert_eq!(first, 2);
        assert_eq!(spans(&g, a), vec![(0.0, 10.0)]);
        assert_eq!(g.children(long, "utterance").len(), 3);

        let second = merge_turns(&mut g, a, &TurnMergeConfig::default());
        g.commit();
        assert_eq!(second, 0);
        assert_eq!(spans(&g, a), vec![(0.0, 10.0)]);
    }

    #[test]
    fn test_merged_turns_leave_no_dangling_parents() {
        let mut g = Graph::new("t", Schema::speech());
        let a = participant(&mut g, "A");
        let mut turns = Vec::new();
        for (start, end) in [(0.0, 2.0), (2.0, 4.0), (3.5, 6.0)] {
            let t = turn(&mut g, a, start, end);
            let utterance = g.children(t, "utterance")[0];
            let (s, e) = {
                let u = g.annotation(utterance).unwrap();
                (u.start, u.end)
            };
            g.create_annotation(NewAnnotation::new("word", "w", s, e).parent(Some(utterance)));
            turns.push(t);
        }

        merge_all_turns(&mut g, &TurnMergeConfig::default());
        g.commit();

        assert_eq!(g.children(a, "turn"), vec![turns[0]]);
        assert_eq!(g.layer_count("utterance"), 3);
        assert_eq!(g.layer_count("word"), 3);
        for annotation in g.annotations() {
            if let Some(parent) = annotation.parent {
                assert!(g.annotation(parent).is_some(), "{} has a dangling parent", annotation.id);
            }
        }
        for word in g.on_layer("word") {
            assert_eq!(g.ancestor_on_layer(word, "turn"), Some(turns[0]));
        }
    }
}
