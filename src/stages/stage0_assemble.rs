use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::stage1_references::{resolve_references, PendingReference};
use super::stage2_parents::{resolve_all_parents, resolve_layer_parents, ParentPass, ParentResolverConfig};
use super::stage3_turns::{merge_all_turns, TurnMergeConfig};
use super::stage4_offsets::{interpolate_offsets, OffsetConfig};
use super::stage5_finalize::finalize;
use crate::conventions::{run_conventions, ConventionLayers, ConventionPipeline};
use crate::error::{ReconciliationError, Result};
use crate::models::{
    AnchorId, AnnotationId, AssemblyHints, Confidence, Graph, NewAnnotation, Schema, SourceDocument,
    SourceEvent, TierMapping,
};

/// Configuration for turning a source document into a graph
#[derive(Debug, Clone)]
pub struct AssemblyConfig {
    pub turn_merge: TurnMergeConfig,
    pub parents: ParentResolverConfig,
    pub offsets: OffsetConfig,
    /// Split utterance labels into words when no tier is mapped to the word layer
    pub tokenize_when_words_unmapped: bool,
    /// Longer labels are cut to this many characters
    pub max_label_length: usize,
    /// Conventions to expand once the skeleton exists; `None` skips them
    pub conventions: Option<ConventionPipeline>,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            turn_merge: TurnMergeConfig::default(),
            parents: ParentResolverConfig::default(),
            offsets: OffsetConfig::default(),
            tokenize_when_words_unmapped: true,
            max_label_length: 255,
            conventions: Some(ConventionPipeline::standard(&ConventionLayers::default())),
        }
    }
}

/// Counts gathered while assembling one document
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssemblyStats {
    pub events: usize,
    pub events_ignored: usize,
    pub references_resolved: usize,
    pub reference_passes: usize,
    pub participants: usize,
    pub turns_created: usize,
    pub utterances_created: usize,
    pub turns_merged: usize,
    pub words_tokenized: usize,
    pub convention_changes: usize,
    pub parents_resolved: usize,
    pub offsets_interpolated: usize,
    pub labels_truncated: usize,
}

/// A best-effort graph with everything that went wrong on the way
#[derive(Debug)]
pub struct Conversion {
    pub graph: Graph,
    pub warnings: Vec<ReconciliationError>,
    pub stats: AssemblyStats,
}

/// Which of the speech skeleton layers the source supplies directly
#[derive(Debug, Clone, Copy)]
struct Coverage {
    turns: bool,
    utterances: bool,
    words: bool,
}

/// Assemble a source document, using its own schema and id when it has them
pub fn assemble(document: &SourceDocument, config: &AssemblyConfig) -> Result<Conversion> {
    let id = document
        .id
        .clone()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let schema = document.schema.clone().unwrap_or_default();
    assemble_events(&id, schema, &document.tiers, &document.events, config)
}

/// Build a consistent graph from tier mappings and source events
///
/// Only a document with no usable structure fails; every other problem is
/// returned as a warning next to the graph.
pub fn assemble_events(
    id: &str,
    schema: Schema,
    tiers: &[TierMapping],
    events: &[SourceEvent],
    config: &AssemblyConfig,
) -> Result<Conversion> {
    info!("Stage 0: Assembling {} from {} events", id, events.len());
    schema.validate().map_err(ReconciliationError::invalid)?;
    let (mappings, coverage) = check_mappings(&schema, tiers, events)?;

    let mut assembly = Assembly::new(Graph::new(id, schema), config);
    assembly.materialize(events, &mappings);
    assembly.resolve_references();
    assembly.complete_skeleton(coverage);
    assembly.attach_turns();
    assembly.resolve_layer(ReconcileLayer::Utterance);
    assembly.merge_turns();
    if !coverage.words && config.tokenize_when_words_unmapped {
        assembly.tokenize();
    }
    assembly.resolve_layer(ReconcileLayer::Word);

    if let Some(pipeline) = &config.conventions {
        let report = run_conventions(pipeline, assembly.graph);
        assembly.graph = report.graph;
        assembly.stats.convention_changes = report.changes;
        assembly.warnings.extend(report.warnings);
    }

    let pass = resolve_all_parents(&mut assembly.graph, &assembly.hints, &config.parents);
    assembly.record(pass);
    assembly.stats.offsets_interpolated =
        interpolate_offsets(&mut assembly.graph, &config.offsets).anchors_set;
    finalize(&mut assembly.graph, &mut assembly.hints);
    assembly.truncate_labels();

    let Assembly {
        graph,
        warnings,
        stats,
        ..
    } = assembly;
    info!(
        "Stage 0: {} assembled with {} annotations, {} anchors, {} warnings",
        graph.id,
        graph.annotation_count(),
        graph.anchor_count(),
        warnings.len()
    );
    Ok(Conversion {
        graph,
        warnings,
        stats,
    })
}

/// Index tier mappings by tier name, rejecting documents that can't be assembled
fn check_mappings<'t>(
    schema: &Schema,
    tiers: &'t [TierMapping],
    events: &[SourceEvent],
) -> Result<(HashMap<&'t str, &'t TierMapping>, Coverage)> {
    let mut mappings: HashMap<&str, &TierMapping> = HashMap::new();
    for mapping in tiers {
        if let Some(layer) = &mapping.layer {
            if !schema.contains(layer) {
                return Err(ReconciliationError::invalid(format!(
                    "Tier {} is mapped to unknown layer {}",
                    mapping.tier, layer
                )));
            }
            if *layer == schema.root_layer {
                return Err(ReconciliationError::invalid(format!(
                    "Tier {} is mapped to the root layer",
                    mapping.tier
                )));
            }
        }
        match mappings.get(mapping.tier.as_str()) {
            Some(existing) if existing.layer != mapping.layer => {
                return Err(ReconciliationError::invalid(format!(
                    "Tier {} is mapped to more than one layer",
                    mapping.tier
                )));
            }
            _ => {
                mappings.insert(&mapping.tier, mapping);
            }
        }
    }

    let mut ids = HashSet::new();
    for event in events {
        if !mappings.contains_key(event.tier.as_str()) {
            return Err(ReconciliationError::invalid(format!(
                "Event on unmapped tier {}",
                event.tier
            )));
        }
        if let Some(id) = &event.id {
            if !ids.insert(id.as_str()) {
                return Err(ReconciliationError::invalid(format!("Duplicate event id {}", id)));
            }
        }
    }

    let mapped = |layer: &str| {
        mappings
            .values()
            .any(|m| m.layer.as_deref() == Some(layer))
    };
    let coverage = Coverage {
        turns: mapped(&schema.turn_layer),
        utterances: mapped(&schema.utterance_layer),
        words: mapped(&schema.word_layer),
    };
    if !coverage.turns && !coverage.utterances && !coverage.words {
        return Err(ReconciliationError::invalid(
            "No tier is mapped to the turn, utterance or word layer",
        ));
    }
    Ok((mappings, coverage))
}

#[derive(Debug, Clone, Copy)]
enum ReconcileLayer {
    Utterance,
    Word,
}

/// Working state for one document; the hints and slot table die with it
struct Assembly<'c> {
    graph: Graph,
    hints: AssemblyHints,
    config: &'c AssemblyConfig,
    participants: HashMap<String, AnnotationId>,
    slots: HashMap<String, AnchorId>,
    pending: Vec<PendingReference>,
    warnings: Vec<ReconciliationError>,
    stats: AssemblyStats,
}

impl<'c> Assembly<'c> {
    fn new(graph: Graph, config: &'c AssemblyConfig) -> Self {
        Self {
            graph,
            hints: AssemblyHints::default(),
            config,
            participants: HashMap::new(),
            slots: HashMap::new(),
            pending: Vec::new(),
            warnings: Vec::new(),
            stats: AssemblyStats::default(),
        }
    }

    fn layer_ids(&self) -> (String, String, String, String) {
        let schema = self.graph.schema();
        (
            schema.participant_layer.clone(),
            schema.turn_layer.clone(),
            schema.utterance_layer.clone(),
            schema.word_layer.clone(),
        )
    }

    /// The participant with this name, created on first use
    fn participant(&mut self, name: &str) -> AnnotationId {
        if let Some(&id) = self.participants.get(name) {
            return id;
        }
        let (participant_layer, ..) = self.layer_ids();
        // participants are stretched over the whole transcript when finalizing
        let anchor = self.graph.create_anchor(None, Confidence::None);
        let id = self
            .graph
            .create_annotation(NewAnnotation::new(&participant_layer, name, anchor, anchor));
        self.participants.insert(name.to_string(), id);
        self.stats.participants += 1;
        debug!("Participant {} is {}", name, id);
        id
    }

    /// Anchor for one event boundary; boundaries naming the same slot share an anchor
    fn anchor(&mut self, offset: Option<f64>, slot: Option<&str>) -> AnchorId {
        let existing = slot.and_then(|s| self.slots.get(s).copied());
        let id = match (existing, offset) {
            (Some(id), Some(offset)) if self.graph.offset(id).is_none() => {
                let kept = self.graph.set_anchor_offset(id, offset, Confidence::Manual);
                if kept != id {
                    for anchor in self.slots.values_mut() {
                        if self.graph.anchor(*anchor).is_none() {
                            *anchor = kept;
                        }
                    }
                }
                kept
            }
            (Some(id), _) => id,
            (None, offset) => self.graph.create_anchor(offset, Confidence::Manual),
        };
        if let Some(slot) = slot {
            self.slots.insert(slot.to_string(), id);
        }
        id
    }

    /// Stage 0a: one annotation per timed event; references are queued
    fn materialize(&mut self, events: &[SourceEvent], mappings: &HashMap<&str, &TierMapping>) {
        let (participant_layer, turn_layer, ..) = self.layer_ids();
        for event in events {
            self.stats.events += 1;
            let Some(mapping) = mappings.get(event.tier.as_str()) else {
                continue;
            };
            let Some(layer_id) = mapping.layer.as_deref() else {
                self.stats.events_ignored += 1;
                continue;
            };
            let speaker = event
                .participant
                .as_deref()
                .or(mapping.participant.as_deref())
                .unwrap_or(&event.tier)
                .to_string();
            let tier_hint = event.parent_hint.clone().unwrap_or_else(|| event.tier.clone());

            if layer_id == participant_layer {
                self.participant(&event.label);
                continue;
            }
            if let Some(referent) = &event.reference {
                self.pending.push(PendingReference {
                    id: event.id.clone(),
                    referent: referent.clone(),
                    layer_id: layer_id.to_string(),
                    label: event.label.clone(),
                    tier: tier_hint,
                    participant: Some(speaker),
                    confidence: Confidence::Manual,
                });
                continue;
            }

            let mut start = self.anchor(event.start, event.start_slot.as_deref());
            let mut end = self.anchor(event.end, event.end_slot.as_deref());
            if let (Some(s), Some(e)) = (self.graph.offset(start), self.graph.offset(end)) {
                if s > e {
                    warn!(
                        "Event {:?} on {} ends at {} before it starts at {}; swapping",
                        event.label, event.tier, e, s
                    );
                    std::mem::swap(&mut start, &mut end);
                }
            }
            let parent = (layer_id == turn_layer).then(|| self.participant(&speaker));
            let id = self.graph.create_annotation(
                NewAnnotation::new(layer_id, event.label.clone(), start, end)
                    .parent(parent)
                    .source_id(event.id.clone()),
            );
            self.hints.set_tier(id, tier_hint);
            self.hints.set_participant(id, speaker);
        }
    }

    fn resolve_references(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        let resolution = resolve_references(&mut self.graph, pending, &mut self.hints);
        self.stats.references_resolved = resolution.resolved;
        self.stats.reference_passes = resolution.passes;
        self.warnings.extend(resolution.unresolved);
    }

    fn speaker(&self, id: AnnotationId) -> String {
        self.hints
            .participant(id)
            .or_else(|| self.hints.tier(id))
            .or_else(|| self.graph.label(id))
            .unwrap_or_default()
            .to_string()
    }

    /// Stage 0b: fill in whichever of turns and utterances the source doesn't have
    fn complete_skeleton(&mut self, coverage: Coverage) {
        let (_, turn_layer, utterance_layer, word_layer) = self.layer_ids();
        match (coverage.turns, coverage.utterances) {
            (true, true) => {}
            (true, false) => {
                for turn in self.graph.on_layer(&turn_layer) {
                    let Some(t) = self.graph.annotation(turn) else {
                        continue;
                    };
                    let new = NewAnnotation::new(&utterance_layer, t.label.clone(), t.start, t.end)
                        .parent(Some(turn));
                    let utterance = self.graph.create_annotation(new);
                    self.hints.copy(turn, utterance);
                    self.stats.utterances_created += 1;
                }
            }
            (false, true) => {
                for utterance in self.graph.on_layer(&utterance_layer) {
                    let speaker = self.speaker(utterance);
                    let participant = self.participant(&speaker);
                    let Some(u) = self.graph.annotation(utterance) else {
                        continue;
                    };
                    let new = NewAnnotation::new(&turn_layer, speaker, u.start, u.end)
                        .parent(Some(participant));
                    let turn = self.graph.create_annotation(new);
                    self.graph.set_parent(utterance, Some(turn));
                    self.hints.copy(utterance, turn);
                    self.stats.turns_created += 1;
                }
            }
            (false, false) => {
                let mut speakers: Vec<String> = Vec::new();
                for word in self.graph.on_layer_by_offset(&word_layer) {
                    let speaker = self.speaker(word);
                    if !speakers.contains(&speaker) {
                        speakers.push(speaker);
                    }
                }
                let (first, last) = match self.graph.bounds() {
                    Some(bounds) => bounds,
                    None => (
                        self.graph.create_anchor(None, Confidence::None),
                        self.graph.create_anchor(None, Confidence::None),
                    ),
                };
                for speaker in speakers {
                    let participant = self.participant(&speaker);
                    let turn = self.graph.create_annotation(
                        NewAnnotation::new(&turn_layer, speaker.clone(), first, last)
                            .parent(Some(participant)),
                    );
                    let utterance = self.graph.create_annotation(
                        NewAnnotation::new(&utterance_layer, speaker.clone(), first, last)
                            .parent(Some(turn)),
                    );
                    for id in [turn, utterance] {
                        self.hints.set_participant(id, speaker.clone());
                    }
                    self.stats.turns_created += 1;
                    self.stats.utterances_created += 1;
                }
            }
        }
    }

    /// Stage 0c: every turn belongs to the participant it was spoken by
    fn attach_turns(&mut self) {
        let (_, turn_layer, ..) = self.layer_ids();
        for turn in self.graph.on_layer(&turn_layer) {
            if self.graph.annotation(turn).is_some_and(|t| t.parent.is_some()) {
                continue;
            }
            let speaker = self.speaker(turn);
            let participant = self.participant(&speaker);
            self.graph.set_parent(turn, Some(participant));
        }
    }

    fn resolve_layer(&mut self, layer: ReconcileLayer) {
        let (_, _, utterance_layer, word_layer) = self.layer_ids();
        let layer_id = match layer {
            ReconcileLayer::Utterance => utterance_layer,
            ReconcileLayer::Word => word_layer,
        };
        let pass = resolve_layer_parents(&mut self.graph, &layer_id, &self.hints, &self.config.parents);
        self.record(pass);
    }

    fn record(&mut self, pass: ParentPass) {
        self.stats.parents_resolved += pass.resolved;
        self.warnings.extend(pass.warnings);
    }

    fn merge_turns(&mut self) {
        let result = merge_all_turns(&mut self.graph, &self.config.turn_merge);
        self.stats.turns_merged = result.turns_merged;
        self.graph.commit();
    }

    /// Stage 0d: whitespace-separated words chained from the utterance's start to its
    /// end; the anchors between them get offsets later
    fn tokenize(&mut self) {
        let (_, _, utterance_layer, word_layer) = self.layer_ids();
        for utterance in self.graph.on_layer_by_offset(&utterance_layer) {
            let Some(u) = self.graph.annotation(utterance) else {
                continue;
            };
            let tokens: Vec<String> = u.label.split_whitespace().map(str::to_string).collect();
            let (start, end) = (u.start, u.end);
            let mut from = start;
            for (index, token) in tokens.iter().enumerate() {
                let to = if index + 1 == tokens.len() {
                    end
                } else {
                    self.graph.create_anchor(None, Confidence::None)
                };
                let word = self.graph.create_annotation(
                    NewAnnotation::new(&word_layer, token.clone(), from, to).parent(Some(utterance)),
                );
                self.hints.copy(utterance, word);
                from = to;
            }
            self.stats.words_tokenized += tokens.len();
        }
        info!("Tokenization: {} words", self.stats.words_tokenized);
    }

    fn truncate_labels(&mut self) {
        let max = self.config.max_label_length;
        let long: Vec<AnnotationId> = self
            .graph
            .annotations()
            .filter(|a| a.label.chars().count() > max)
            .map(|a| a.id)
            .collect();
        for id in long {
            let error = ReconciliationError::tokenization(
                "label length",
                self.graph.describe(id),
                format!("label truncated to {} characters", max),
            );
            warn!("{}", error);
            self.warnings.push(error);
            let label: String = self.graph.label(id).unwrap_or_default().chars().take(max).collect();
            self.graph.set_label(id, label);
            self.stats.labels_truncated += 1;
        }
    }
}
