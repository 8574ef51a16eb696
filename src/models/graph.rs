use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use super::{
    offset_key, Anchor, AnchorId, Annotation, AnnotationId, Confidence, NewAnnotation, Schema,
};

/// Annotation graph for one transcript
///
/// The graph owns every anchor and annotation. Parent/child and anchor sharing are
/// relations held in id-keyed side tables, so merging anchors or deleting annotations
/// never needs pointer patching. All mutation goes through methods that keep those
/// tables in step.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Identifier of the transcript this graph represents
    pub id: String,
    schema: Schema,
    anchors: BTreeMap<AnchorId, Anchor>,
    annotations: BTreeMap<AnnotationId, Annotation>,
    next_anchor: usize,
    next_annotation: usize,
    /// Exact offset → the one anchor at that offset
    by_offset: HashMap<u64, AnchorId>,
    /// Parent (or `None` for parentless annotations) → children on every layer
    children: HashMap<Option<AnnotationId>, Vec<AnnotationId>>,
    by_layer: HashMap<String, BTreeSet<AnnotationId>>,
    starting: HashMap<AnchorId, BTreeSet<AnnotationId>>,
    ending: HashMap<AnchorId, BTreeSet<AnnotationId>>,
    by_source_id: HashMap<String, AnnotationId>,
    /// Marked for deletion, removed on the next commit
    doomed: BTreeSet<AnnotationId>,
}

/// What a commit physically removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    pub annotations_removed: usize,
    pub anchors_removed: usize,
}

impl Graph {
    pub fn new(id: impl Into<String>, schema: Schema) -> Self {
        Self {
            id: id.into(),
            schema,
            anchors: BTreeMap::new(),
            annotations: BTreeMap::new(),
            next_anchor: 0,
            next_annotation: 0,
            by_offset: HashMap::new(),
            children: HashMap::new(),
            by_layer: HashMap::new(),
            starting: HashMap::new(),
            ending: HashMap::new(),
            by_source_id: HashMap::new(),
            doomed: BTreeSet::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // ---------------------------------------------------------------- anchors

    pub fn anchor(&self, id: AnchorId) -> Option<&Anchor> {
        self.anchors.get(&id)
    }

    pub fn anchors(&self) -> impl Iterator<Item = &Anchor> {
        self.anchors.values()
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    pub fn offset(&self, id: AnchorId) -> Option<f64> {
        self.anchors.get(&id).and_then(|a| a.offset)
    }

    /// The anchor at exactly this offset, if any
    pub fn anchor_at(&self, offset: f64) -> Option<AnchorId> {
        self.by_offset.get(&offset_key(offset)).copied()
    }

    /// Return the anchor at exactly `offset`, creating it if there is none
    ///
    /// An existing anchor with lower confidence is promoted rather than duplicated,
    /// so there is never more than one anchor per offset.
    pub fn get_or_create_anchor_at(&mut self, offset: f64, confidence: Confidence) -> AnchorId {
        if let Some(&id) = self.by_offset.get(&offset_key(offset)) {
            if let Some(anchor) = self.anchors.get_mut(&id) {
                if anchor.confidence < confidence {
                    debug!("Promoting {} at {} to {:?}", id, offset, confidence);
                    anchor.confidence = confidence;
                }
                return id;
            }
        }
        self.insert_anchor(Some(offset), confidence)
    }

    /// Anchor at `offset` if known, otherwise a fresh anchor whose offset is to be inferred
    pub fn create_anchor(&mut self, offset: Option<f64>, confidence: Confidence) -> AnchorId {
        match offset {
            Some(offset) => self.get_or_create_anchor_at(offset, confidence),
            None => self.insert_anchor(None, Confidence::None),
        }
    }

    fn insert_anchor(&mut self, offset: Option<f64>, confidence: Confidence) -> AnchorId {
        let id = AnchorId(self.next_anchor);
        self.next_anchor += 1;
        self.anchors
            .insert(id, Anchor::new(id, offset, confidence));
        if let Some(offset) = offset {
            self.by_offset.insert(offset_key(offset), id);
        }
        id
    }

    /// Give an anchor an offset; if another anchor is already there the two are merged
    ///
    /// Returns the anchor that now stands at `offset`.
    pub fn set_anchor_offset(
        &mut self,
        id: AnchorId,
        offset: f64,
        confidence: Confidence,
    ) -> AnchorId {
        let Some(anchor) = self.anchors.get_mut(&id) else {
            return id;
        };
        let previous = anchor.offset.replace(offset);
        anchor.confidence = confidence;
        if let Some(previous) = previous {
            let key = offset_key(previous);
            if self.by_offset.get(&key) == Some(&id) {
                self.by_offset.remove(&key);
            }
        }

        match self.by_offset.get(&offset_key(offset)).copied() {
            Some(other) if other != id => self.merge_anchors(other, id),
            _ => {
                self.by_offset.insert(offset_key(offset), id);
                id
            }
        }
    }

    /// Unify two anchors; every reference to the weaker one is redirected to the stronger
    ///
    /// Strength is confidence first, then having a known offset. Because ancestors share
    /// anchors by id, promoting the surviving anchor promotes every boundary that uses it.
    pub fn merge_anchors(&mut self, a: AnchorId, b: AnchorId) -> AnchorId {
        if a == b {
            return a;
        }
        let (Some(first), Some(second)) = (self.anchors.get(&a), self.anchors.get(&b)) else {
            return if self.anchors.contains_key(&a) { a } else { b };
        };
        let (winner, loser) = if second.strength() > first.strength() {
            (b, a)
        } else {
            (a, b)
        };

        let Some(lost) = self.anchors.remove(&loser) else {
            return winner;
        };
        if let Some(offset) = lost.offset {
            let key = offset_key(offset);
            if self.by_offset.get(&key) == Some(&loser) {
                self.by_offset.remove(&key);
            }
        }
        if let Some(kept) = self.anchors.get_mut(&winner) {
            if kept.offset.is_none() {
                kept.offset = lost.offset;
            }
            kept.confidence = kept.confidence.max(lost.confidence);
            if let Some(offset) = kept.offset {
                self.by_offset.insert(offset_key(offset), winner);
            }
        }

        for id in self.starting.remove(&loser).unwrap_or_default() {
            if let Some(annotation) = self.annotations.get_mut(&id) {
                annotation.start = winner;
            }
            self.starting.entry(winner).or_default().insert(id);
        }
        for id in self.ending.remove(&loser).unwrap_or_default() {
            if let Some(annotation) = self.annotations.get_mut(&id) {
                annotation.end = winner;
            }
            self.ending.entry(winner).or_default().insert(id);
        }

        debug!("Merged anchor {} into {}", loser, winner);
        winner
    }

    /// Earliest and latest anchors with known offsets
    pub fn bounds(&self) -> Option<(AnchorId, AnchorId)> {
        let known = self
            .anchors
            .values()
            .filter_map(|a| a.offset.map(|o| (o, a.id)));
        let mut first: Option<(f64, AnchorId)> = None;
        let mut last: Option<(f64, AnchorId)> = None;
        for (offset, id) in known {
            if first.is_none_or(|(o, _)| offset < o) {
                first = Some((offset, id));
            }
            if last.is_none_or(|(o, _)| offset > o) {
                last = Some((offset, id));
            }
        }
        Some((first?.1, last?.1))
    }

    // ------------------------------------------------------------ annotations

    pub fn create_annotation(&mut self, new: NewAnnotation) -> AnnotationId {
        let id = AnnotationId(self.next_annotation);
        self.next_annotation += 1;
        let ordinal = self.next_ordinal(new.parent, &new.layer_id);

        if let Some(source_id) = &new.source_id {
            self.by_source_id.insert(source_id.clone(), id);
        }
        self.children.entry(new.parent).or_default().push(id);
        self.by_layer
            .entry(new.layer_id.clone())
            .or_default()
            .insert(id);
        self.starting.entry(new.start).or_default().insert(id);
        self.ending.entry(new.end).or_default().insert(id);

        self.annotations.insert(
            id,
            Annotation {
                id,
                layer_id: new.layer_id,
                label: new.label,
                start: new.start,
                end: new.end,
                parent: new.parent,
                ordinal,
                confidence: new.confidence,
                source_id: new.source_id,
            },
        );
        id
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&Annotation> {
        self.annotations.get(&id)
    }

    pub fn annotations(&self) -> impl Iterator<Item = &Annotation> {
        self.annotations.values()
    }

    pub fn annotation_count(&self) -> usize {
        self.annotations.len()
    }

    pub fn label(&self, id: AnnotationId) -> Option<&str> {
        self.annotations.get(&id).map(|a| a.label.as_str())
    }

    pub fn by_source_id(&self, source_id: &str) -> Option<AnnotationId> {
        self.by_source_id.get(source_id).copied()
    }

    /// Human-readable reference for warnings: the source id when there is one
    pub fn describe(&self, id: AnnotationId) -> String {
        match self.annotations.get(&id) {
            Some(Annotation {
                source_id: Some(source_id),
                ..
            }) => source_id.clone(),
            Some(annotation) => format!("{} \"{}\"", id, annotation.label),
            None => id.to_string(),
        }
    }

    pub fn start_offset(&self, id: AnnotationId) -> Option<f64> {
        self.annotations.get(&id).and_then(|a| self.offset(a.start))
    }

    pub fn end_offset(&self, id: AnnotationId) -> Option<f64> {
        self.annotations.get(&id).and_then(|a| self.offset(a.end))
    }

    pub fn set_label(&mut self, id: AnnotationId, label: impl Into<String>) {
        if let Some(annotation) = self.annotations.get_mut(&id) {
            annotation.label = label.into();
        }
    }

    pub fn set_confidence(&mut self, id: AnnotationId, confidence: Confidence) {
        if let Some(annotation) = self.annotations.get_mut(&id) {
            annotation.confidence = confidence;
        }
    }

    pub fn set_start(&mut self, id: AnnotationId, anchor: AnchorId) {
        let Some(annotation) = self.annotations.get_mut(&id) else {
            return;
        };
        let previous = std::mem::replace(&mut annotation.start, anchor);
        if let Some(set) = self.starting.get_mut(&previous) {
            set.remove(&id);
        }
        self.starting.entry(anchor).or_default().insert(id);
    }

    pub fn set_end(&mut self, id: AnnotationId, anchor: AnchorId) {
        let Some(annotation) = self.annotations.get_mut(&id) else {
            return;
        };
        let previous = std::mem::replace(&mut annotation.end, anchor);
        if let Some(set) = self.ending.get_mut(&previous) {
            set.remove(&id);
        }
        self.ending.entry(anchor).or_default().insert(id);
    }

    /// Reparent an annotation; it becomes the last of its layer under the new parent
    pub fn set_parent(&mut self, id: AnnotationId, parent: Option<AnnotationId>) {
        let Some(annotation) = self.annotations.get(&id) else {
            return;
        };
        if annotation.parent == parent {
            return;
        }
        let previous = annotation.parent;
        let layer_id = annotation.layer_id.clone();
        if let Some(siblings) = self.children.get_mut(&previous) {
            siblings.retain(|&s| s != id);
        }
        let ordinal = self.next_ordinal(parent, &layer_id);
        self.children.entry(parent).or_default().push(id);
        if let Some(annotation) = self.annotations.get_mut(&id) {
            annotation.parent = parent;
            annotation.ordinal = ordinal;
        }
    }

    pub fn set_ordinal(&mut self, id: AnnotationId, ordinal: usize) {
        if let Some(annotation) = self.annotations.get_mut(&id) {
            annotation.ordinal = ordinal;
        }
    }

    fn next_ordinal(&self, parent: Option<AnnotationId>, layer_id: &str) -> usize {
        self.children
            .get(&parent)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.annotations.get(id))
                    .filter(|a| a.layer_id == layer_id)
                    .map(|a| a.ordinal)
                    .max()
                    .unwrap_or(0)
            })
            .unwrap_or(0)
            + 1
    }

    // --------------------------------------------------------------- queries

    /// Children of `parent` on `layer_id`, in ordinal order
    pub fn children(&self, parent: AnnotationId, layer_id: &str) -> Vec<AnnotationId> {
        self.siblings(Some(parent), layer_id)
    }

    /// Annotations on `layer_id` sharing the given parent (or lack of one), in ordinal order
    pub fn siblings(&self, parent: Option<AnnotationId>, layer_id: &str) -> Vec<AnnotationId> {
        let mut ids: Vec<&Annotation> = self
            .children
            .get(&parent)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.annotations.get(id))
                    .filter(|a| a.layer_id == layer_id)
                    .collect()
            })
            .unwrap_or_default();
        ids.sort_by_key(|a| (a.ordinal, a.id));
        ids.into_iter().map(|a| a.id).collect()
    }

    /// Children of `parent` on every layer
    pub fn all_children(&self, parent: AnnotationId) -> Vec<AnnotationId> {
        let mut ids: Vec<&Annotation> = self
            .children
            .get(&Some(parent))
            .map(|ids| ids.iter().filter_map(|id| self.annotations.get(id)).collect())
            .unwrap_or_default();
        ids.sort_by(|a, b| a.layer_id.cmp(&b.layer_id).then(a.ordinal.cmp(&b.ordinal)));
        ids.into_iter().map(|a| a.id).collect()
    }

    /// Annotations on a layer in creation order
    pub fn on_layer(&self, layer_id: &str) -> Vec<AnnotationId> {
        self.by_layer
            .get(layer_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Annotations on a layer ordered by start offset; unknown offsets sort last
    pub fn on_layer_by_offset(&self, layer_id: &str) -> Vec<AnnotationId> {
        let mut ids = self.on_layer(layer_id);
        ids.sort_by(|&a, &b| self.compare_by_offset(a, b));
        ids
    }

    pub(crate) fn compare_by_offset(&self, a: AnnotationId, b: AnnotationId) -> Ordering {
        let key = |id| {
            (
                self.start_offset(id).unwrap_or(f64::INFINITY),
                self.end_offset(id).unwrap_or(f64::INFINITY),
            )
        };
        let (a_start, a_end) = key(a);
        let (b_start, b_end) = key(b);
        a_start
            .total_cmp(&b_start)
            .then(a_end.total_cmp(&b_end))
            .then(a.cmp(&b))
    }

    pub fn layer_count(&self, layer_id: &str) -> usize {
        self.by_layer.get(layer_id).map_or(0, |ids| ids.len())
    }

    pub fn starting_at(&self, anchor: AnchorId) -> Vec<AnnotationId> {
        self.starting
            .get(&anchor)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn ending_at(&self, anchor: AnchorId) -> Vec<AnnotationId> {
        self.ending
            .get(&anchor)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Everything that ended at `from` now ends at `to`
    pub fn move_ending_annotations(&mut self, from: AnchorId, to: AnchorId) {
        if from == to {
            return;
        }
        for id in self.ending_at(from) {
            self.set_end(id, to);
        }
    }

    /// Everything that started at `from` now starts at `to`
    pub fn move_starting_annotations(&mut self, from: AnchorId, to: AnchorId) {
        if from == to {
            return;
        }
        for id in self.starting_at(from) {
            self.set_start(id, to);
        }
    }

    /// The annotation itself or its nearest ancestor on `layer_id`
    pub fn ancestor_on_layer(&self, id: AnnotationId, layer_id: &str) -> Option<AnnotationId> {
        let mut current = self.annotations.get(&id);
        let mut steps = 0;
        while let Some(annotation) = current {
            if annotation.layer_id == layer_id {
                return Some(annotation.id);
            }
            steps += 1;
            if steps > self.schema.layers.len() {
                return None;
            }
            current = annotation.parent.and_then(|p| self.annotations.get(&p));
        }
        None
    }

    // ------------------------------------------------------------- deletions

    pub fn mark_for_deletion(&mut self, id: AnnotationId) {
        if self.annotations.contains_key(&id) {
            self.doomed.insert(id);
        }
    }

    pub fn is_marked(&self, id: AnnotationId) -> bool {
        self.doomed.contains(&id)
    }

    pub fn has_pending_deletions(&self) -> bool {
        !self.doomed.is_empty()
    }

    /// Physically remove marked annotations (with any children still attached),
    /// close ordinal gaps among the survivors and drop anchors nothing references
    pub fn commit(&mut self) -> CommitSummary {
        if self.doomed.is_empty() {
            return CommitSummary {
                annotations_removed: 0,
                anchors_removed: self.collect_anchors(),
            };
        }

        let mut queue: Vec<AnnotationId> = self.doomed.iter().copied().collect();
        while let Some(id) = queue.pop() {
            if let Some(children) = self.children.get(&Some(id)) {
                for &child in children {
                    if self.doomed.insert(child) {
                        queue.push(child);
                    }
                }
            }
        }

        let doomed = std::mem::take(&mut self.doomed);
        let mut touched: BTreeSet<(Option<AnnotationId>, String)> = BTreeSet::new();
        for id in &doomed {
            let Some(annotation) = self.annotations.remove(id) else {
                continue;
            };
            if let Some(siblings) = self.children.get_mut(&annotation.parent) {
                siblings.retain(|s| s != id);
            }
            self.children.remove(&Some(*id));
            if let Some(ids) = self.by_layer.get_mut(&annotation.layer_id) {
                ids.remove(id);
            }
            if let Some(ids) = self.starting.get_mut(&annotation.start) {
                ids.remove(id);
            }
            if let Some(ids) = self.ending.get_mut(&annotation.end) {
                ids.remove(id);
            }
            if let Some(source_id) = &annotation.source_id {
                if self.by_source_id.get(source_id) == Some(id) {
                    self.by_source_id.remove(source_id);
                }
            }
            if annotation.parent.is_none_or(|p| !doomed.contains(&p)) {
                touched.insert((annotation.parent, annotation.layer_id));
            }
        }

        for (parent, layer_id) in touched {
            self.renumber(parent, &layer_id);
        }

        let summary = CommitSummary {
            annotations_removed: doomed.len(),
            anchors_removed: self.collect_anchors(),
        };
        debug!(
            "Committed graph {}: {} annotations and {} anchors removed",
            self.id, summary.annotations_removed, summary.anchors_removed
        );
        summary
    }

    fn collect_anchors(&mut self) -> usize {
        let unused: Vec<AnchorId> = self
            .anchors
            .keys()
            .filter(|id| {
                self.starting.get(id).is_none_or(|s| s.is_empty())
                    && self.ending.get(id).is_none_or(|s| s.is_empty())
            })
            .copied()
            .collect();
        for id in &unused {
            if let Some(anchor) = self.anchors.remove(id) {
                if let Some(offset) = anchor.offset {
                    let key = offset_key(offset);
                    if self.by_offset.get(&key) == Some(id) {
                        self.by_offset.remove(&key);
                    }
                }
            }
            self.starting.remove(id);
            self.ending.remove(id);
        }
        unused.len()
    }

    /// Reassign ordinals 1..n, keeping the current relative order and skipping
    /// annotations marked for deletion
    pub fn renumber(&mut self, parent: Option<AnnotationId>, layer_id: &str) {
        let ordered: Vec<AnnotationId> = self
            .siblings(parent, layer_id)
            .into_iter()
            .filter(|id| !self.doomed.contains(id))
            .collect();
        self.reorder(&ordered);
    }

    /// Assign ordinals 1..n in the given order
    pub fn reorder(&mut self, ordered: &[AnnotationId]) {
        for (index, id) in ordered.iter().enumerate() {
            self.set_ordinal(*id, index + 1);
        }
    }

    // ------------------------------------------------------------ validation

    /// Every structural invariant this graph currently violates
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        for annotation in self.annotations.values() {
            let Some(layer) = self.schema.layer(&annotation.layer_id) else {
                problems.push(format!(
                    "{} is on unknown layer {}",
                    annotation.id, annotation.layer_id
                ));
                continue;
            };
            for anchor in [annotation.start, annotation.end] {
                if !self.anchors.contains_key(&anchor) {
                    problems.push(format!("{} references missing {}", annotation.id, anchor));
                }
            }
            if let Some(parent) = annotation.parent {
                match self.annotations.get(&parent) {
                    None => problems.push(format!(
                        "{} has dangling parent {}",
                        annotation.id, parent
                    )),
                    Some(p) if Some(p.layer_id.as_str()) != layer.parent_id.as_deref() => {
                        problems.push(format!(
                            "{} on {} has parent {} on {}",
                            annotation.id, annotation.layer_id, parent, p.layer_id
                        ))
                    }
                    Some(_) => {}
                }
            }
            if layer.is_aligned() {
                if let (Some(start), Some(end)) = (
                    self.offset(annotation.start),
                    self.offset(annotation.end),
                ) {
                    if start > end {
                        problems.push(format!(
                            "{} starts at {} after it ends at {}",
                            annotation.id, start, end
                        ));
                    }
                }
            }
        }

        for layer in &self.schema.layers {
            let Some(parent_layer) = layer.parent_id.as_deref() else {
                continue;
            };
            if !layer.saturated && layer.peers {
                continue;
            }
            for parent in self.on_layer(parent_layer) {
                let children = self.children(parent, &layer.id);
                if !layer.peers && children.len() > 1 {
                    problems.push(format!(
                        "{} has {} children on single layer {}",
                        parent,
                        children.len(),
                        layer.id
                    ));
                }
                if !layer.saturated {
                    continue;
                }
                let (Some(first), Some(last)) = (
                    children.first().and_then(|id| self.annotations.get(id)),
                    children.last().and_then(|id| self.annotations.get(id)),
                ) else {
                    continue;
                };
                let Some(p) = self.annotations.get(&parent) else {
                    continue;
                };
                if p.start != first.start || p.end != last.end {
                    problems.push(format!(
                        "{} is not tiled by its {} children",
                        parent, layer.id
                    ));
                }
            }
        }

        problems
    }
}
