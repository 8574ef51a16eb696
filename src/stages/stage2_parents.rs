use tracing::{debug, info, warn};

use crate::error::ReconciliationError;
use crate::models::{AnnotationId, AssemblyHints, Graph, ParentHint};

/// Configuration for parent inference
#[derive(Debug, Clone)]
pub struct ParentResolverConfig {
    /// Fall back to midpoint containment when nothing contains the whole child
    pub midpoint_fallback: bool,
}

impl Default for ParentResolverConfig {
    fn default() -> Self {
        Self {
            midpoint_fallback: true,
        }
    }
}

/// Outcome of looking for one annotation's parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentResolution {
    Resolved(AnnotationId),
    /// Several candidates and the hint could not choose between them
    Ambiguous(Vec<AnnotationId>),
    NoCandidates,
}

/// Result of a parent resolution pass
#[derive(Debug, Default)]
pub struct ParentPass {
    /// Annotations that were given a parent
    pub resolved: usize,
    /// `AmbiguousParent` / `NoParent` for the ones left parentless
    pub warnings: Vec<ReconciliationError>,
}

/// Infer the parent of `child` on `parent_layer`
///
/// 1. Candidates whose interval contains the child's start and end
/// 2. If there are none, candidates containing the child's midpoint
/// 3. Several candidates are narrowed down with the hint: the candidate whose
///    label (or speaker) is the longest substring of the tier hint, or equals the
///    participant hint, wins; equal lengths go to the lowest id
pub fn resolve_parent(
    graph: &Graph,
    child: AnnotationId,
    parent_layer: &str,
    hint: ParentHint<'_>,
    config: &ParentResolverConfig,
) -> ParentResolution {
    let candidates: Vec<AnnotationId> = graph
        .on_layer(parent_layer)
        .into_iter()
        .filter(|&c| c != child && !graph.is_marked(c))
        .collect();

    let containing: Vec<AnnotationId> = candidates
        .iter()
        .copied()
        .filter(|&c| includes(graph, c, child))
        .collect();
    if !containing.is_empty() || !config.midpoint_fallback {
        return choose(graph, containing, hint);
    }

    let midpoint: Vec<AnnotationId> = candidates
        .into_iter()
        .filter(|&c| includes_midpoint(graph, c, child))
        .collect();
    if !midpoint.is_empty() {
        debug!(
            "{}: falling back to midpoint containment ({} candidates)",
            graph.describe(child),
            midpoint.len()
        );
    }
    choose(graph, midpoint, hint)
}

fn choose(graph: &Graph, candidates: Vec<AnnotationId>, hint: ParentHint<'_>) -> ParentResolution {
    match candidates.len() {
        0 => ParentResolution::NoCandidates,
        1 => ParentResolution::Resolved(candidates[0]),
        _ => match tie_break(graph, &candidates, hint) {
            Some(parent) => ParentResolution::Resolved(parent),
            None => ParentResolution::Ambiguous(candidates),
        },
    }
}

/// Longest hint match wins; `candidates` are in ascending id order so the first
/// of equal-length matches is the lowest id
fn tie_break(graph: &Graph, candidates: &[AnnotationId], hint: ParentHint<'_>) -> Option<AnnotationId> {
    let mut best: Option<(usize, AnnotationId)> = None;
    for &candidate in candidates {
        let score = match_keys(graph, candidate)
            .into_iter()
            .filter(|key| !key.is_empty())
            .filter(|key| {
                hint.tier.is_some_and(|tier| tier.contains(key.as_str()))
                    || hint.participant == Some(key.as_str())
            })
            .map(|key| key.chars().count())
            .max();
        if let Some(score) = score {
            if best.is_none_or(|(s, _)| score > s) {
                best = Some((score, candidate));
            }
        }
    }
    best.map(|(_, id)| id)
}

/// Strings a candidate can be recognized by: its own label and its speaker's
fn match_keys(graph: &Graph, candidate: AnnotationId) -> Vec<String> {
    let schema = graph.schema();
    let mut keys = Vec::with_capacity(2);
    if let Some(label) = graph.label(candidate) {
        keys.push(label.to_string());
    }
    let speaker = graph
        .ancestor_on_layer(candidate, &schema.turn_layer)
        .or_else(|| graph.ancestor_on_layer(candidate, &schema.participant_layer))
        .and_then(|id| graph.label(id));
    if let Some(speaker) = speaker {
        keys.push(speaker.to_string());
    }
    keys
}

/// Whether `candidate` covers `child`: the child starts within [start, end) and ends
/// within [start, end], or shares the relevant anchor
pub fn includes(graph: &Graph, candidate: AnnotationId, child: AnnotationId) -> bool {
    let (Some(c), Some(a)) = (graph.annotation(candidate), graph.annotation(child)) else {
        return false;
    };
    let (cs, ce) = (graph.offset(c.start), graph.offset(c.end));
    let (s, e) = (graph.offset(a.start), graph.offset(a.end));

    let start_inside = a.start == c.start
        || matches!((cs, ce, s), (Some(cs), Some(ce), Some(s)) if cs <= s && s < ce);
    let end_inside = a.end == c.end
        || matches!((cs, ce, e), (Some(cs), Some(ce), Some(e)) if cs <= e && e <= ce);
    start_inside && end_inside
}

/// Whether the child's midpoint falls strictly inside `candidate`, or the two
/// share both anchors
pub fn includes_midpoint(graph: &Graph, candidate: AnnotationId, child: AnnotationId) -> bool {
    let (Some(c), Some(a)) = (graph.annotation(candidate), graph.annotation(child)) else {
        return false;
    };
    if c.start == a.start && c.end == a.end {
        return true;
    }
    match (
        graph.offset(c.start),
        graph.offset(c.end),
        graph.offset(a.start),
        graph.offset(a.end),
    ) {
        (Some(cs), Some(ce), Some(s), Some(e)) => {
            let midpoint = (s + e) / 2.0;
            cs < midpoint && midpoint < ce
        }
        _ => false,
    }
}

/// Give every parentless annotation on `layer_id` a parent, where one can be found
pub fn resolve_layer_parents(
    graph: &mut Graph,
    layer_id: &str,
    hints: &AssemblyHints,
    config: &ParentResolverConfig,
) -> ParentPass {
    let mut pass = ParentPass::default();
    let schema = graph.schema();
    if schema.is_top_level(layer_id) {
        return pass;
    }
    let Some(parent_layer) = schema.parent_of(layer_id).map(str::to_string) else {
        return pass;
    };

    let orphans: Vec<AnnotationId> = graph
        .on_layer_by_offset(layer_id)
        .into_iter()
        .filter(|&id| {
            !graph.is_marked(id) && graph.annotation(id).is_some_and(|a| a.parent.is_none())
        })
        .collect();

    for child in orphans {
        match resolve_parent(graph, child, &parent_layer, hints.hint(child), config) {
            ParentResolution::Resolved(parent) => {
                graph.set_parent(child, Some(parent));
                pass.resolved += 1;
            }
            ParentResolution::Ambiguous(candidates) => {
                let error = ReconciliationError::AmbiguousParent {
                    annotation: graph.describe(child),
                    layer: parent_layer.clone(),
                    candidates: candidates.len(),
                };
                warn!("{}", error);
                pass.warnings.push(error);
            }
            ParentResolution::NoCandidates => {
                let error = ReconciliationError::NoParent {
                    annotation: graph.describe(child),
                    layer: parent_layer.clone(),
                };
                warn!("{}", error);
                pass.warnings.push(error);
            }
        }
    }
    pass
}

/// Resolve parents layer by layer from the top of the hierarchy down, so each
/// layer's candidates already have their own parents
pub fn resolve_all_parents(
    graph: &mut Graph,
    hints: &AssemblyHints,
    config: &ParentResolverConfig,
) -> ParentPass {
    let schema = graph.schema();
    let mut layers: Vec<(usize, String)> = schema
        .layers
        .iter()
        .filter(|l| l.parent_id.is_some() && !schema.is_top_level(&l.id))
        .filter_map(|l| schema.depth(&l.id).map(|d| (d, l.id.clone())))
        .collect();
    layers.sort();

    let mut total = ParentPass::default();
    for (_, layer_id) in layers {
        let pass = resolve_layer_parents(graph, &layer_id, hints, config);
        total.resolved += pass.resolved;
        total.warnings.extend(pass.warnings);
    }
    info!(
        "Parent resolution: {} resolved, {} unresolved",
        total.resolved,
        total.warnings.len()
    );
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Confidence, NewAnnotation, Schema};

    fn span(graph: &mut Graph, layer: &str, label: &str, start: f64, end: f64) -> AnnotationId {
        let s = graph.get_or_create_anchor_at(start, Confidence::Manual);
        let e = graph.get_or_create_anchor_at(end, Confidence::Manual);
        graph.create_annotation(NewAnnotation::new(layer, label, s, e))
    }

    #[test]
    fn test_single_containing_candidate() {
        let mut g = Graph::new("t", Schema::speech());
        let first = span(&mut g, "utterance", "A", 0.0, 2.0);
        span(&mut g, "utterance", "A", 2.0, 4.0);
        let word = span(&mut g, "word", "hi", 0.5, 1.0);

        let result = resolve_parent(
            &g,
            word,
            "utterance",
            ParentHint::default(),
            &ParentResolverConfig::default(),
        );
        assert_eq!(result, ParentResolution::Resolved(first));
    }

    #[test]
    fn test_midpoint_fallback_for_misaligned_boundary() {
        let mut g = Graph::new("t", Schema::speech());
        span(&mut g, "utterance", "A", 0.0, 2.0);
        let second = span(&mut g, "utterance", "A", 2.0, 4.0);
        // starts slightly before the second utterance
        let word = span(&mut g, "word", "late", 1.95, 3.0);

        let config = ParentResolverConfig::default();
        assert_eq!(
            resolve_parent(&g, word, "utterance", ParentHint::default(), &config),
            ParentResolution::Resolved(second)
        );

        let strict = ParentResolverConfig {
            midpoint_fallback: false,
        };
        assert_eq!(
            resolve_parent(&g, word, "utterance", ParentHint::default(), &strict),
            ParentResolution::NoCandidates
        );
    }

    #[test]
    fn test_hint_breaks_tie_between_overlapping_speakers() {
        let mut g = Graph::new("t", Schema::speech());
        span(&mut g, "turn", "Ann", 0.0, 5.0);
        let anna = span(&mut g, "turn", "Annabel", 0.0, 5.0);
        let word = span(&mut g, "utterance", "hello", 1.0, 2.0);

        let hint = ParentHint {
            tier: Some("Annabel-utterances"),
            participant: None,
        };
        // both labels are substrings of the hint; the longer one wins
        assert_eq!(
            resolve_parent(&g, word, "turn", hint, &ParentResolverConfig::default()),
            ParentResolution::Resolved(anna)
        );
    }

    #[test]
    fn test_equal_length_matches_go_to_lowest_id() {
        let mut g = Graph::new("t", Schema::speech());
        let first = span(&mut g, "turn", "A", 0.0, 5.0);
        span(&mut g, "turn", "A", 0.0, 5.0);
        let child = span(&mut g, "utterance", "x", 1.0, 2.0);

        let hint = ParentHint {
            tier: None,
            participant: Some("A"),
        };
        assert_eq!(
            resolve_parent(&g, child, "turn", hint, &ParentResolverConfig::default()),
            ParentResolution::Resolved(first)
        );
    }

    #[test]
    fn test_ambiguous_without_matching_hint() {
        let mut g = Graph::new("t", Schema::speech());
        let a = span(&mut g, "turn", "A", 0.0, 5.0);
        let b = span(&mut g, "turn", "B", 0.0, 5.0);
        let child = span(&mut g, "utterance", "x", 1.0, 2.0);

        assert_eq!(
            resolve_parent(
                &g,
                child,
                "turn",
                ParentHint::default(),
                &ParentResolverConfig::default()
            ),
            ParentResolution::Ambiguous(vec![a, b])
        );
    }

    #[test]
    fn test_resolve_layer_parents_collects_warnings() {
        let mut g = Graph::new("t", Schema::speech());
        let utterance = span(&mut g, "utterance", "A", 0.0, 2.0);
        let inside = span(&mut g, "word", "in", 0.0, 1.0);
        let outside = span(&mut g, "word", "out", 7.0, 8.0);

        let pass = resolve_layer_parents(
            &mut g,
            "word",
            &AssemblyHints::default(),
            &ParentResolverConfig::default(),
        );
        assert_eq!(pass.resolved, 1);
        assert_eq!(g.annotation(inside).unwrap().parent, Some(utterance));
        assert!(g.annotation(outside).unwrap().parent.is_none());
        assert!(matches!(
            pass.warnings.as_slice(),
            [ReconciliationError::NoParent { .. }]
        ));
    }

    #[test]
    fn test_shared_anchors_count_as_containment_without_offsets() {
        let mut g = Graph::new("t", Schema::speech());
        let s = g.create_anchor(None, Confidence::None);
        let e = g.create_anchor(None, Confidence::None);
        let utterance = g.create_annotation(NewAnnotation::new("utterance", "u", s, e));
        let word = g.create_annotation(NewAnnotation::new("word", "w", s, e));
        assert!(includes(&g, utterance, word));
        assert!(includes_midpoint(&g, utterance, word));
    }
}
