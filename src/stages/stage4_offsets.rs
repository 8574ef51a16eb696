use tracing::{debug, info};

use crate::models::{Alignment, AnchorId, AnnotationId, Confidence, Graph};

/// Configuration for default offset generation
#[derive(Debug, Clone)]
pub struct OffsetConfig {
    /// Anchors at or above this confidence are trusted; anything below (or without an
    /// offset) is re-estimated from its trusted neighbours
    pub threshold: Confidence,
}

impl Default for OffsetConfig {
    fn default() -> Self {
        Self {
            threshold: Confidence::Automatic,
        }
    }
}

/// Result of offset interpolation
#[derive(Debug, Default)]
pub struct OffsetResult {
    pub anchors_set: usize,
    /// Anchors still without an offset (no trusted neighbour on one side)
    pub anchors_unknown: usize,
}

/// Fill in untrusted anchor offsets by linear interpolation
///
/// For every interval layer, each parent's children (in ordinal order) form a chain
/// of anchors. Runs of untrusted anchors between two trusted ones are spread evenly
/// across the gap and given `Default` confidence. Layers are visited from the top of
/// the hierarchy down so children see their parents' boundaries first.
pub fn interpolate_offsets(graph: &mut Graph, config: &OffsetConfig) -> OffsetResult {
    let schema = graph.schema();
    let mut layers: Vec<(usize, String, String)> = schema
        .layers
        .iter()
        .filter(|l| l.alignment == Alignment::Interval)
        .filter_map(|l| {
            let depth = schema.depth(&l.id)?;
            Some((depth, l.id.clone(), l.parent_id.clone()?))
        })
        .collect();
    layers.sort();

    let mut result = OffsetResult::default();
    for (_, layer_id, parent_layer) in layers {
        let parents: Vec<Option<AnnotationId>> = if schema_is_root(graph, &parent_layer) {
            vec![None]
        } else {
            graph.on_layer(&parent_layer).into_iter().map(Some).collect()
        };
        for parent in parents {
            let chain = anchor_chain(graph, parent, &layer_id);
            result.anchors_set += fill_chain(graph, &chain, config);
        }
    }

    result.anchors_unknown = graph.anchors().filter(|a| a.offset.is_none()).count();
    info!(
        "Offsets: {} anchors interpolated, {} still unknown",
        result.anchors_set, result.anchors_unknown
    );
    result
}

fn schema_is_root(graph: &Graph, layer_id: &str) -> bool {
    graph.schema().root_layer == layer_id
}

/// Distinct anchors visited walking the children of one parent in order
fn anchor_chain(
    graph: &Graph,
    parent: Option<AnnotationId>,
    layer_id: &str,
) -> Vec<AnchorId> {
    let mut chain: Vec<AnchorId> = Vec::new();
    for id in graph.siblings(parent, layer_id) {
        let Some(annotation) = graph.annotation(id) else {
            continue;
        };
        for anchor in [annotation.start, annotation.end] {
            if chain.last() != Some(&anchor) {
                chain.push(anchor);
            }
        }
    }
    chain
}

fn fill_chain(graph: &mut Graph, chain: &[AnchorId], config: &OffsetConfig) -> usize {
    let trusted = |graph: &Graph, id: AnchorId| -> Option<f64> {
        graph
            .anchor(id)
            .filter(|a| a.confidence >= config.threshold)
            .and_then(|a| a.offset)
    };

    let mut set = 0;
    let mut previous: Option<(usize, f64)> = None;
    for (index, &anchor) in chain.iter().enumerate() {
        let Some(offset) = trusted(graph, anchor) else {
            continue;
        };
        if let Some((from, from_offset)) = previous {
            let gap = index - from;
            if gap > 1 && offset > from_offset {
                let step = (offset - from_offset) / gap as f64;
                for (k, &between) in chain[from + 1..index].iter().enumerate() {
                    let value = from_offset + step * (k + 1) as f64;
                    let kept = graph.set_anchor_offset(between, value, Confidence::Default);
                    if kept != between {
                        debug!("Anchor {} coincided with {} at {}", between, kept, value);
                    }
                    set += 1;
                }
            }
        }
        previous = Some((index, offset));
    }
    set
}
