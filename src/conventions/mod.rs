pub mod clumper;
pub mod coalescer;
pub mod reorder;
pub mod spanning;
pub mod tag;

pub use clumper::*;
pub use coalescer::*;
pub use reorder::*;
pub use spanning::*;
pub use tag::*;

use regex::{Captures, Regex};
use tracing::{debug, info};

use crate::error::ReconciliationError;
use crate::models::{AnnotationId, Graph, Schema};

/// Graph produced by one transformer, with what it did
#[derive(Debug)]
pub struct TransformOutcome {
    pub graph: Graph,
    /// Annotations created, relabelled or removed
    pub changes: usize,
    pub warnings: Vec<ReconciliationError>,
}

impl TransformOutcome {
    pub fn unchanged(graph: Graph) -> Self {
        Self {
            graph,
            changes: 0,
            warnings: Vec::new(),
        }
    }
}

/// One convention: takes a committed graph and returns the expanded one
pub trait Transformer {
    fn name(&self) -> &str;

    fn transform(&self, graph: Graph) -> TransformOutcome;
}

/// A step in a convention pipeline
#[derive(Debug, Clone)]
pub enum ConventionStep {
    Tag(TagTransformer),
    Spanning(SpanningTransformer),
    Clump(OrthographyClumper),
    Reorder(OrdinalReorder),
    Coalesce(Coalescer),
}

impl ConventionStep {
    pub fn transformer(&self) -> &dyn Transformer {
        match self {
            Self::Tag(t) => t,
            Self::Spanning(t) => t,
            Self::Clump(t) => t,
            Self::Reorder(t) => t,
            Self::Coalesce(t) => t,
        }
    }
}

/// Layer ids the standard conventions read from and write to
#[derive(Debug, Clone)]
pub struct ConventionLayers {
    pub word: String,
    pub comment: String,
    pub noise: String,
    pub pronounce: String,
    pub lexical: String,
    pub language: String,
}

impl Default for ConventionLayers {
    fn default() -> Self {
        Self {
            word: "word".to_string(),
            comment: "comment".to_string(),
            noise: "noise".to_string(),
            pronounce: "pronounce".to_string(),
            lexical: "lexical".to_string(),
            language: "language".to_string(),
        }
    }
}

impl ConventionLayers {
    pub fn for_schema(schema: &Schema) -> Self {
        Self {
            word: schema.word_layer.clone(),
            ..Default::default()
        }
    }
}

/// Ordered list of transformers; order is significant
#[derive(Debug, Clone, Default)]
pub struct ConventionPipeline {
    pub steps: Vec<ConventionStep>,
}

impl ConventionPipeline {
    /// The standard transcription conventions, outermost first:
    /// 1. `{comment spanning words}`
    /// 2. `[noise spanning words]`
    /// 3. `word[pronounce]`
    /// 4. `word(lexical)`
    /// 5. `word[pronounce]` again, for `word[pronounce](lexical)`
    /// 6. punctuation-only tokens clumped onto neighbouring words
    pub fn standard(layers: &ConventionLayers) -> Self {
        let mut steps = vec![comment_step(layers)];
        steps.extend(word_markup_steps(layers));
        Self { steps }
    }

    /// The standard conventions with code-switching markup: after comments,
    /// `[CS:lang]phrase ...[CS:lang]` spans and `word[CS:lang]` tags are expanded onto
    /// the language layer, which is finally re-ordered and coalesced
    pub fn with_phrase_language(layers: &ConventionLayers) -> Self {
        let mut steps = vec![
            comment_step(layers),
            ConventionStep::Spanning(SpanningTransformer {
                name: "phrase language".to_string(),
                source_layer: layers.word.clone(),
                start_pattern: r"\[CS:([^\]]+)\](.*)".to_string(),
                end_pattern: r"(.+)\[CS:([^\]]+)\]([[:punct:]]*)".to_string(),
                delete_in_source: false,
                source_start_template: Some("${2}".to_string()),
                source_end_template: Some("${1}${3}".to_string()),
                destination_layer: layers.language.clone(),
                delimiter: " ".to_string(),
                destination_start_template: Some("${1}".to_string()),
                destination_end_template: None,
                annotate_previous: false,
                close_gaps: false,
            }),
            ConventionStep::Tag(TagTransformer {
                name: "word language".to_string(),
                source_layer: layers.word.clone(),
                pattern: r"(.+)\[CS:([^\]]+)\]([[:punct:]]*)".to_string(),
                source_template: Some("${1}${3}".to_string()),
                destination_layer: layers.language.clone(),
                destination_template: "${2}".to_string(),
            }),
        ];
        steps.extend(word_markup_steps(layers));
        steps.push(ConventionStep::Reorder(OrdinalReorder::new(
            &layers.language,
            &layers.word,
        )));
        steps.push(ConventionStep::Coalesce(Coalescer::new(&layers.language)));
        Self { steps }
    }

    pub fn names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.transformer().name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn comment_step(layers: &ConventionLayers) -> ConventionStep {
    ConventionStep::Spanning(SpanningTransformer::consuming(
        "comment",
        &layers.word,
        r"\{(.*)",
        r"(.*)\}",
        &layers.comment,
    ))
}

fn word_markup_steps(layers: &ConventionLayers) -> Vec<ConventionStep> {
    let pronounce = TagTransformer {
        name: "pronounce".to_string(),
        source_layer: layers.word.clone(),
        pattern: r"(.*)\[(.*)\]".to_string(),
        source_template: Some("${1}".to_string()),
        destination_layer: layers.pronounce.clone(),
        destination_template: "${2}".to_string(),
    };
    vec![
        ConventionStep::Spanning(SpanningTransformer::consuming(
            "noise",
            &layers.word,
            r"\[(.*)",
            r"(.*)\]",
            &layers.noise,
        )),
        ConventionStep::Tag(pronounce.clone()),
        ConventionStep::Tag(TagTransformer {
            name: "lexical".to_string(),
            source_layer: layers.word.clone(),
            pattern: r"(.*)\((.*)\)".to_string(),
            source_template: Some("${1}".to_string()),
            destination_layer: layers.lexical.clone(),
            destination_template: "${2}".to_string(),
        }),
        ConventionStep::Tag(pronounce),
        ConventionStep::Clump(OrthographyClumper::new(&layers.word)),
    ]
}

/// Result of running a whole pipeline
#[derive(Debug)]
pub struct ConventionReport {
    pub graph: Graph,
    pub steps_run: usize,
    pub changes: usize,
    pub warnings: Vec<ReconciliationError>,
}

/// Run each transformer in order, committing after each one so the next sees
/// neither the markup already consumed nor annotations pending deletion
pub fn run_conventions(pipeline: &ConventionPipeline, graph: Graph) -> ConventionReport {
    info!(
        "Conventions: running {} transformers on {}",
        pipeline.steps.len(),
        graph.id
    );

    let mut report = ConventionReport {
        graph,
        steps_run: 0,
        changes: 0,
        warnings: Vec::new(),
    };
    for step in &pipeline.steps {
        let transformer = step.transformer();
        let mut outcome = transformer.transform(report.graph);
        outcome.graph.commit();
        debug!(
            "Convention {}: {} changes, {} warnings",
            transformer.name(),
            outcome.changes,
            outcome.warnings.len()
        );
        report.graph = outcome.graph;
        report.steps_run += 1;
        report.changes += outcome.changes;
        report.warnings.extend(outcome.warnings);
    }
    report
}

/// Compile a pattern that must match a whole label
pub(crate) fn whole_label(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{})$", pattern))
}

pub(crate) fn expand(captures: &Captures<'_>, template: &str) -> String {
    let mut out = String::new();
    captures.expand(template, &mut out);
    out
}

/// Whether both layers a transformer needs exist; otherwise it is skipped
pub(crate) fn layers_present(graph: &Graph, name: &str, layers: &[&str]) -> bool {
    match layers.iter().find(|l| !graph.schema().contains(l)) {
        Some(missing) => {
            debug!("{}: layer {} not in schema, skipping", name, missing);
            false
        }
        None => true,
    }
}

/// Parent groups of a layer: each annotation on the parent layer, or the single
/// parentless group for top-level layers
pub(crate) fn parent_groups(graph: &Graph, layer_id: &str) -> Vec<Option<AnnotationId>> {
    let schema = graph.schema();
    if schema.is_top_level(layer_id) {
        return vec![None];
    }
    match schema.parent_of(layer_id) {
        Some(parent_layer) => graph
            .on_layer_by_offset(parent_layer)
            .into_iter()
            .filter(|&p| !graph.is_marked(p))
            .map(Some)
            .collect(),
        None => Vec::new(),
    }
}

/// Where a new annotation derived from `source` belongs on `destination_layer`:
/// under the source itself if the destination is its child layer, at the top if the
/// destination is top-level, otherwise alongside the source under its parent
pub(crate) fn derived_parent(
    graph: &Graph,
    source: AnnotationId,
    destination_layer: &str,
) -> Option<AnnotationId> {
    let schema = graph.schema();
    let source_layer = graph.annotation(source).map(|a| a.layer_id.as_str());
    if schema.parent_of(destination_layer) == source_layer {
        Some(source)
    } else if schema.is_top_level(destination_layer) {
        None
    } else {
        graph.annotation(source).and_then(|a| a.parent)
    }
}

/// Move every child of `from` under `to`
pub(crate) fn adopt_children(graph: &mut Graph, from: AnnotationId, to: AnnotationId) {
    for child in graph.all_children(from) {
        graph.set_parent(child, Some(to));
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::models::{AnnotationId, Confidence, Graph, NewAnnotation, Schema};

    /// A graph with one utterance holding the given words, one second each
    pub fn utterance(words: &[&str]) -> (Graph, AnnotationId, Vec<AnnotationId>) {
        let mut g = Graph::new("fixture", Schema::speech());
        let s = g.get_or_create_anchor_at(0.0, Confidence::Manual);
        let e = g.get_or_create_anchor_at(words.len() as f64, Confidence::Manual);
        let participant = g.create_annotation(NewAnnotation::new("participant", "A", s, e));
        let turn = g.create_annotation(NewAnnotation::new("turn", "A", s, e).parent(Some(participant)));
        let utterance =
            g.create_annotation(NewAnnotation::new("utterance", "A", s, e).parent(Some(turn)));
        let mut ids = Vec::new();
        for (i, word) in words.iter().enumerate() {
            let ws = g.get_or_create_anchor_at(i as f64, Confidence::Manual);
            let we = g.get_or_create_anchor_at((i + 1) as f64, Confidence::Manual);
            ids.push(g.create_annotation(
                NewAnnotation::new("word", *word, ws, we).parent(Some(utterance)),
            ));
        }
        (g, utterance, ids)
    }

    pub fn labels(graph: &Graph, parent: AnnotationId, layer: &str) -> Vec<String> {
        graph
            .children(parent, layer)
            .into_iter()
            .filter_map(|id| graph.label(id).map(str::to_string))
            .collect()
    }

    pub fn layer_labels(graph: &Graph, layer: &str) -> Vec<String> {
        graph
            .on_layer_by_offset(layer)
            .into_iter()
            .filter_map(|id| graph.label(id).map(str::to_string))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::{labels, layer_labels, utterance};
    use super::*;

    #[test]
    fn test_standard_pipeline_order() {
        let pipeline = ConventionPipeline::standard(&ConventionLayers::default());
        assert_eq!(
            pipeline.names(),
            vec!["comment", "noise", "pronounce", "lexical", "pronounce", "clump"]
        );
    }

    #[test]
    fn test_phrase_language_pipeline_order() {
        let pipeline = ConventionPipeline::with_phrase_language(&ConventionLayers::default());
        assert_eq!(
            pipeline.names(),
            vec![
                "comment",
                "phrase language",
                "word language",
                "noise",
                "pronounce",
                "lexical",
                "pronounce",
                "clump",
                "reorder language",
                "coalesce language"
            ]
        );
    }

    #[test]
    fn test_hidden_pronounce_tag_is_found_on_second_pass() {
        let (graph, utterance_id, words) = utterance(&["so", "tomato[t@mA:t@U](tomato)"]);
        let pipeline = ConventionPipeline::standard(&ConventionLayers::default());
        let report = run_conventions(&pipeline, graph);
        let g = report.graph;

        assert_eq!(labels(&g, utterance_id, "word"), vec!["so", "tomato"]);
        assert_eq!(labels(&g, words[1], "lexical"), vec!["tomato"]);
        assert_eq!(labels(&g, words[1], "pronounce"), vec!["t@mA:t@U"]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_full_pipeline_on_mixed_markup() {
        let (graph, utterance_id, _) = utterance(&[
            "well", "{laughs", "a", "lot}", "I", "[door", "slam]", "said", "hi", ".",
        ]);
        let pipeline = ConventionPipeline::standard(&ConventionLayers::default());
        let report = run_conventions(&pipeline, graph);
        let g = report.graph;

        assert_eq!(
            labels(&g, utterance_id, "word"),
            vec!["well", "I", "said", "hi ."]
        );
        assert_eq!(layer_labels(&g, "comment"), vec!["laughs a lot"]);
        assert_eq!(layer_labels(&g, "noise"), vec!["door slam"]);
        assert!(report.changes >= 3);
    }
}
