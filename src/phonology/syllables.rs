use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::comparator::{DiscComparator, MarkerSet};
use super::edit_path::{string_path, MinimumEditPath};
use super::lexicon::Dictionary;
use crate::error::{ReconciliationError, Result};
use crate::models::{AnnotationId, Confidence, Graph, NewAnnotation};

/// Picks the dictionary pronunciation that best fits phones already segmented
///
/// Prefers a stress-marked candidate whose phones are exactly `phones`, then any
/// exact candidate, then simply the first one. Returns `None` only when there are
/// no candidates.
pub fn best_pronunciation<'a>(candidates: &'a [String], phones: &[&str], markers: &MarkerSet) -> Option<&'a str> {
    let concatenated = phones.concat();
    let exact = |pron: &&String| markers.strip(pron) == concatenated;
    candidates
        .iter()
        .filter(exact)
        .find(|pron| markers.has_stress(pron))
        .or_else(|| candidates.iter().find(exact))
        .or_else(|| candidates.first())
        .map(String::as_str)
}

/// A syllable recovered from a pronunciation, as a run of phone indices
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyllableSpan {
    pub first_phone: usize,
    pub last_phone: usize,
    /// The pronunciation's symbols for this syllable, stress marks included
    pub label: String,
}

/// Splits DISC phones into the syllables of a DISC pronunciation
pub fn recover_syllables(phones: &[&str], pronunciation: &str) -> Result<Vec<SyllableSpan>> {
    recover_word_syllables(&phones.concat(), phones, pronunciation, &MarkerSet::disc())
}

/// Aligns `pronunciation` with the phone labels and partitions the phones at each
/// syllable boundary of the pronunciation
///
/// Each phone label must be a single symbol. The pronunciation may still differ from
/// the phones; the alignment absorbs insertions and substitutions. A syllable left
/// with no phone of its own is a mismatch.
pub fn recover_word_syllables(
    word: &str,
    phones: &[&str],
    pronunciation: &str,
    markers: &MarkerSet,
) -> Result<Vec<SyllableSpan>> {
    let concatenated = phones.concat();
    let mismatch = || ReconciliationError::PhoneAlignmentMismatch {
        word: word.to_string(),
        pronunciation: pronunciation.to_string(),
        phones: phones.join(" "),
    };
    if phones.is_empty()
        || concatenated.chars().count() != phones.len()
        || markers.strip(pronunciation).is_empty()
    {
        return Err(mismatch());
    }

    let editor = MinimumEditPath::new(DiscComparator::new(markers.clone()));
    let path = string_path(&editor, pronunciation, &concatenated);

    let mut spans = Vec::new();
    let mut cursor: Option<usize> = None;
    let mut first: Option<usize> = Some(0);
    let mut last = 0;
    let mut label = String::new();
    for step in &path {
        if step.to.is_some() {
            let next = match cursor {
                None => 0,
                Some(p) if p + 1 < phones.len() => p + 1,
                Some(p) => p,
            };
            cursor = Some(next);
            last = next;
            first.get_or_insert(next);
        }
        match step.from {
            Some(c) if c == markers.boundary => {
                // a leading boundary closes nothing
                if label.is_empty() {
                    continue;
                }
                // every syllable needs at least one phone of its own
                let first_phone = first.take().ok_or_else(mismatch)?;
                spans.push(SyllableSpan {
                    first_phone,
                    last_phone: last,
                    label: std::mem::take(&mut label),
                });
            }
            Some(c) => label.push(c),
            None => {}
        }
    }
    match first {
        Some(first_phone) => spans.push(SyllableSpan {
            first_phone,
            last_phone: last,
            label,
        }),
        // a trailing boundary leaves nothing to close
        None if label.is_empty() => {}
        None => return Err(mismatch()),
    }
    Ok(spans)
}

/// Layers and markers for syllable tagging
#[derive(Debug, Clone)]
pub struct TaggerConfig {
    pub word_layer: String,
    pub phone_layer: String,
    pub syllable_layer: String,
    pub markers: MarkerSet,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            word_layer: "word".to_string(),
            phone_layer: "phone".to_string(),
            syllable_layer: "syllable".to_string(),
            markers: MarkerSet::disc(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct TaggerReport {
    pub words_tagged: usize,
    pub syllables_created: usize,
    /// Words with phones but no dictionary entry
    pub not_found: usize,
    pub warnings: Vec<ReconciliationError>,
    pub cancelled: bool,
}

/// Creates syllable annotations over the phones of each word, following the
/// syllabification of the word's dictionary pronunciation
pub struct SyllableTagger<'a> {
    config: TaggerConfig,
    dictionary: &'a dyn Dictionary,
}

impl<'a> SyllableTagger<'a> {
    pub fn new(config: TaggerConfig, dictionary: &'a dyn Dictionary) -> Self {
        Self { config, dictionary }
    }

    /// Tags every word that has phones and no syllables yet
    ///
    /// `cancel` is checked between words; words already tagged stay tagged.
    pub fn tag(&self, graph: &mut Graph, cancel: &AtomicBool) -> TaggerReport {
        info!("Syllabifying {} on {}", graph.id, self.config.phone_layer);
        let mut report = TaggerReport::default();

        for word in graph.on_layer_by_offset(&self.config.word_layer) {
            if cancel.load(Ordering::Relaxed) {
                info!("Syllabification cancelled");
                report.cancelled = true;
                break;
            }
            if !graph.children(word, &self.config.syllable_layer).is_empty() {
                debug!("Skipping {}: already syllabified", graph.describe(word));
                continue;
            }
            let phones = graph.children(word, &self.config.phone_layer);
            if phones.is_empty() {
                continue;
            }
            match self.tag_word(graph, word, &phones) {
                Ok(Some(created)) => {
                    report.words_tagged += 1;
                    report.syllables_created += created;
                }
                Ok(None) => report.not_found += 1,
                Err(e) => {
                    warn!("{}", e);
                    report.warnings.push(e);
                }
            }
        }

        info!(
            "Syllables: {} words tagged, {} syllables, {} not in dictionary, {} warnings",
            report.words_tagged,
            report.syllables_created,
            report.not_found,
            report.warnings.len()
        );
        report
    }

    fn tag_word(
        &self,
        graph: &mut Graph,
        word: AnnotationId,
        phones: &[AnnotationId],
    ) -> Result<Option<usize>> {
        let label = graph.label(word).unwrap_or_default().to_string();
        let candidates = match self.dictionary.lookup(&label) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Lookup failed for {}: {:#}", label, e);
                return Ok(None);
            }
        };
        let phone_labels: Vec<&str> = phones
            .iter()
            .map(|&p| graph.label(p).unwrap_or_default())
            .collect();
        let Some(pronunciation) = best_pronunciation(&candidates, &phone_labels, &self.config.markers)
        else {
            return Ok(None);
        };
        debug!("{} -> {}", graph.describe(word), pronunciation);
        let spans = recover_word_syllables(&label, &phone_labels, pronunciation, &self.config.markers)?;

        let bounds: Vec<_> = phones
            .iter()
            .filter_map(|&p| graph.annotation(p).map(|a| (a.start, a.end)))
            .collect();
        let mut created = 0;
        for span in spans {
            let (Some(&(start, _)), Some(&(_, end))) = (bounds.get(span.first_phone), bounds.get(span.last_phone))
            else {
                continue;
            };
            graph.create_annotation(
                NewAnnotation::new(&self.config.syllable_layer, span.label, start, end)
                    .parent(Some(word))
                    .confidence(Confidence::Automatic),
            );
            created += 1;
        }
        Ok(Some(created))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Schema;
    use crate::phonology::lexicon::FlatLexicon;

    fn prons(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_stressed_exact_match_wins() {
        let markers = MarkerSet::disc();
        let candidates = prons(&["w-3:d", "w-'3:d"]);
        assert_eq!(best_pronunciation(&candidates, &["w", "3", "d"], &markers), Some("w-'3:d"));
    }

    #[test]
    fn test_unstressed_exact_match_before_first_candidate() {
        let markers = MarkerSet::disc();
        let candidates = prons(&["w'0d", "w-3:d"]);
        assert_eq!(best_pronunciation(&candidates, &["w", "3", "d"], &markers), Some("w-3:d"));
        let candidates = prons(&["w'0d", "w'Qd"]);
        assert_eq!(best_pronunciation(&candidates, &["w", "3", "d"], &markers), Some("w'0d"));
        assert_eq!(best_pronunciation(&[], &["w"], &markers), None);
    }

    #[test]
    fn test_syllables_of_word() {
        let spans = recover_syllables(&["w", "3", "d"], "w-3:d").unwrap();
        assert_eq!(
            spans,
            vec![
                SyllableSpan {
                    first_phone: 0,
                    last_phone: 0,
                    label: "w".to_string()
                },
                SyllableSpan {
                    first_phone: 1,
                    last_phone: 2,
                    label: "3:d".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_stress_marks_stay_in_label() {
        let spans = recover_syllables(&["b", "@", "n", "{", "n", "@"], "b@-n'{-n@").unwrap();
        let summary: Vec<(usize, usize, &str)> = spans
            .iter()
            .map(|s| (s.first_phone, s.last_phone, s.label.as_str()))
            .collect();
        assert_eq!(summary, vec![(0, 1, "b@"), (2, 3, "n'{"), (4, 5, "n@")]);
    }

    #[test]
    fn test_substituted_and_extra_phones_still_align() {
        // phones # for { and an extra vowel before the final consonant
        let spans = recover_syllables(&["b", "@", "n", "#", "n", "@"], "b@-n'{-n@").unwrap();
        assert_eq!(spans.len(), 3);
        assert_eq!((spans[1].first_phone, spans[1].last_phone), (2, 3));

        let spans = recover_syllables(&["k", "{", "t", "I", "z"], "k'{ts").unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!((spans[0].first_phone, spans[0].last_phone), (0, 4));
    }

    #[test]
    fn test_leading_boundary_is_ignored() {
        let spans = recover_syllables(&["k", "{", "t"], "-'k{-t").unwrap();
        let summary: Vec<(usize, usize, &str)> = spans
            .iter()
            .map(|s| (s.first_phone, s.last_phone, s.label.as_str()))
            .collect();
        assert_eq!(summary, vec![(0, 1, "'k{"), (2, 2, "t")]);
    }

    #[test]
    fn test_multi_symbol_phones_are_a_mismatch() {
        let error = recover_syllables(&["w", "3:", "d"], "w-3:d").unwrap_err();
        assert!(matches!(error, ReconciliationError::PhoneAlignmentMismatch { .. }));
        assert!(recover_syllables(&[], "w3d").is_err());
        assert!(recover_syllables(&["w"], "-'").is_err());
    }

    #[test]
    fn test_syllable_without_phones_is_a_mismatch() {
        let error = recover_syllables(&["w", "d"], "w-3-d").unwrap_err();
        assert!(matches!(error, ReconciliationError::PhoneAlignmentMismatch { .. }));
        assert!(recover_syllables(&["w", "d"], "wd-3").is_err());
    }

    #[test]
    fn test_trailing_boundary_closes_nothing() {
        let spans = recover_syllables(&["w", "3", "d"], "w-3:d-").unwrap();
        assert_eq!(spans.len(), 2);
        assert_eq!((spans[1].first_phone, spans[1].last_phone), (1, 2));
    }

    fn word_with_phones(graph: &mut Graph, label: &str, phones: &[&str], at: f64) -> AnnotationId {
        let mut anchors = Vec::new();
        for i in 0..=phones.len() {
            anchors.push(graph.get_or_create_anchor_at(at + i as f64 * 0.1, Confidence::Automatic));
        }
        let word = graph.create_annotation(NewAnnotation::new(
            "word",
            label,
            anchors[0],
            anchors[phones.len()],
        ));
        for (i, phone) in phones.iter().enumerate() {
            graph.create_annotation(
                NewAnnotation::new("phone", *phone, anchors[i], anchors[i + 1]).parent(Some(word)),
            );
        }
        word
    }

    #[test]
    fn test_tagger_creates_syllables_under_words() {
        let mut lexicon = FlatLexicon::new(None);
        lexicon.add("word", "w-'3:d").unwrap();
        lexicon.add("banana", "b@-n'{-n@").unwrap();

        let mut graph = Graph::new("t", Schema::speech());
        let word = word_with_phones(&mut graph, "word", &["w", "3", "d"], 0.0);
        let banana = word_with_phones(&mut graph, "Banana", &["b", "@", "n", "{", "n", "@"], 1.0);
        let unknown = word_with_phones(&mut graph, "zyx", &["z"], 2.0);

        let tagger = SyllableTagger::new(TaggerConfig::default(), &lexicon);
        let report = tagger.tag(&mut graph, &AtomicBool::new(false));

        assert_eq!(report.words_tagged, 2);
        assert_eq!(report.syllables_created, 5);
        assert_eq!(report.not_found, 1);
        let labels = |w| -> Vec<String> {
            graph
                .children(w, "syllable")
                .into_iter()
                .map(|s| graph.label(s).unwrap().to_string())
                .collect()
        };
        assert_eq!(labels(word), vec!["w", "'3:d"]);
        assert_eq!(labels(banana), vec!["b@", "n'{", "n@"]);
        assert!(labels(unknown).is_empty());

        let second = graph.children(word, "syllable")[1];
        assert_eq!(graph.start_offset(second), Some(0.1));
        assert_eq!(graph.annotation(second).unwrap().confidence, Confidence::Automatic);

        // already syllabified words are left alone
        let again = tagger.tag(&mut graph, &AtomicBool::new(false));
        assert_eq!(again.words_tagged, 0);
    }

    #[test]
    fn test_tagger_stops_when_cancelled() {
        let lexicon = FlatLexicon::new(None);
        let mut graph = Graph::new("t", Schema::speech());
        word_with_phones(&mut graph, "word", &["w", "3", "d"], 0.0);
        let report = SyllableTagger::new(TaggerConfig::default(), &lexicon).tag(&mut graph, &AtomicBool::new(true));
        assert!(report.cancelled);
        assert_eq!(report.words_tagged, 0);
    }
}
