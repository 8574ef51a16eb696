use tracing::{debug, info, warn};

use crate::error::ReconciliationError;
use crate::models::{AssemblyHints, Confidence, Graph, NewAnnotation};

/// An annotation that is defined only as a sub-part of another, possibly later, one
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReference {
    /// Its own source id, if it has one (other references may point at it)
    pub id: Option<String>,
    /// Source id of the annotation it belongs to
    pub referent: String,
    pub layer_id: String,
    pub label: String,
    pub tier: String,
    pub participant: Option<String>,
    pub confidence: Confidence,
}

impl PendingReference {
    fn name(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("{}:{}", self.tier, self.label))
    }
}

/// Result of draining the reference worklist
#[derive(Debug, Default)]
pub struct ReferenceResolution {
    /// References materialized into the graph
    pub resolved: usize,
    /// Sweeps over the worklist, including the final one that resolved nothing
    pub passes: usize,
    /// One `UnresolvedReference` per entry whose referent never appeared
    pub unresolved: Vec<ReconciliationError>,
}

/// Materialize forward references by repeated sweeps over a worklist
///
/// Each sweep resolves every entry whose referent is already in the graph. An entry
/// is only removed once its referent is confirmed present, so a chain of N references
/// settles in at most N sweeps and whatever is left after a sweep that resolved
/// nothing refers to an annotation that does not exist.
pub fn resolve_references(
    graph: &mut Graph,
    pending: Vec<PendingReference>,
    hints: &mut AssemblyHints,
) -> ReferenceResolution {
    let mut result = ReferenceResolution::default();
    let mut worklist = pending;

    if !worklist.is_empty() {
        info!(
            "Stage 1: Resolving {} forward references",
            worklist.len()
        );
    }

    while !worklist.is_empty() {
        result.passes += 1;
        let before = worklist.len();
        let mut waiting = Vec::with_capacity(before);

        for reference in worklist {
            let Some(referent) = graph.by_source_id(&reference.referent) else {
                waiting.push(reference);
                continue;
            };
            let Some(target) = graph.annotation(referent).cloned() else {
                waiting.push(reference);
                continue;
            };

            let schema = graph.schema();
            let parent = if schema.parent_of(&reference.layer_id) == Some(target.layer_id.as_str())
            {
                Some(referent)
            } else if reference.layer_id == target.layer_id {
                target.parent
            } else {
                // left for the parent resolver
                None
            };

            let id = graph.create_annotation(
                NewAnnotation::new(&reference.layer_id, reference.label.clone(), target.start, target.end)
                    .parent(parent)
                    .confidence(reference.confidence)
                    .source_id(reference.id.clone()),
            );
            hints.copy(referent, id);
            hints.set_tier(id, reference.tier.clone());
            if let Some(participant) = &reference.participant {
                hints.set_participant(id, participant.clone());
            }
            debug!(
                "Pass {}: {} materialized under {}",
                result.passes,
                reference.name(),
                reference.referent
            );
            result.resolved += 1;
        }

        let stalled = waiting.len() == before;
        worklist = waiting;
        if stalled {
            break;
        }
    }

    for reference in worklist {
        let error = ReconciliationError::UnresolvedReference {
            id: reference.name(),
            referent: reference.referent.clone(),
        };
        warn!("{}", error);
        result.unresolved.push(error);
    }

    result
}
