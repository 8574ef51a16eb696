use super::edit_path::{EditComparator, EditOperation, EditStep};

/// Symbols in a pronunciation that mark syllable structure rather than phones
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerSet {
    pub stress: String,
    pub boundary: char,
    /// Other non-phone symbols, e.g. length
    pub other: String,
}

impl MarkerSet {
    /// Markers of DISC-encoded pronunciations
    pub fn disc() -> Self {
        Self {
            stress: "'\",".to_string(),
            boundary: '-',
            other: ":".to_string(),
        }
    }

    pub fn is_stress(&self, c: char) -> bool {
        self.stress.contains(c)
    }

    pub fn is_marker(&self, c: char) -> bool {
        c == self.boundary || self.is_stress(c) || self.other.contains(c)
    }

    /// The phones of a pronunciation, without markers
    pub fn strip(&self, pronunciation: &str) -> String {
        pronunciation.chars().filter(|&c| !self.is_marker(c)).collect()
    }

    pub fn has_stress(&self, pronunciation: &str) -> bool {
        pronunciation.chars().any(|c| self.is_stress(c))
    }
}

impl Default for MarkerSet {
    fn default() -> Self {
        Self::disc()
    }
}

const VOWELS: &str = "cCEFHiIPqQuUV0123456789~#{$@WBXy";
const DIPHTHONGS: &str = "012456789WBX";
const MONOPHTHONGS: &str = "cCEFHiIPqQuUV3y";
const LIQUIDS: &str = "lLrRwx";
const NASALS: &str = "mnN";
const AFFRICATES: &str = "J_+=";
const FRICATIVES: &str = "CDfhsSTvxzZ";
const PLOSIVES: &str = "bdgkpt?";
const NARROW_CLASSES: [&str; 7] = [
    DIPHTHONGS,
    MONOPHTHONGS,
    LIQUIDS,
    NASALS,
    AFFRICATES,
    FRICATIVES,
    PLOSIVES,
];

/// Pairs of DISC symbols that are realisations of the same phoneme: flapped t/d,
/// vocalised ng, syllabic m, n and l
const ALLOPHONES: [(char, &str); 6] = [
    ('t', "L"),
    ('d', "L"),
    ('N', "C"),
    ('m', "F"),
    ('n', "H"),
    ('l', "P"),
];

const UNRELATED: u32 = 20;
const ALLOPHONE: u32 = 2;
const SAME_CLASS: u32 = 4;
const BOTH_VOWELS: u32 = 8;
const INDEL: u32 = 10;

fn allophones(a: char, b: char) -> bool {
    let pair = |x: char, y: char| {
        ALLOPHONES
            .iter()
            .any(|&(phoneme, realisations)| phoneme == x && realisations.contains(y))
    };
    pair(a, b) || pair(b, a)
}

/// Compares DISC symbols by phonetic similarity
///
/// Allophones are cheap to swap, then symbols of the same narrow class, then
/// any two vowels; anything else costs as much as deleting one and inserting the
/// other. Markers can be dropped from the source side for free, so they never
/// pull the alignment of phones around.
#[derive(Debug, Clone, Default)]
pub struct DiscComparator {
    pub markers: MarkerSet,
}

impl DiscComparator {
    pub fn new(markers: MarkerSet) -> Self {
        Self { markers }
    }

    fn change_cost(&self, from: char, to: char) -> u32 {
        if allophones(from, to) {
            ALLOPHONE
        } else if NARROW_CLASSES
            .iter()
            .any(|class| class.contains(from) && class.contains(to))
        {
            SAME_CLASS
        } else if VOWELS.contains(from) && VOWELS.contains(to) {
            BOTH_VOWELS
        } else {
            UNRELATED
        }
    }
}

impl EditComparator<char> for DiscComparator {
    fn compare(&self, from: &char, to: &char) -> EditStep<char> {
        if from == to {
            // identical vowels still cost a little, so consonants anchor the path
            let cost = if VOWELS.contains(*from) { 1 } else { 0 };
            EditStep::new(Some(*from), Some(*to), EditOperation::None, cost)
        } else {
            EditStep::new(
                Some(*from),
                Some(*to),
                EditOperation::Change,
                self.change_cost(*from, *to),
            )
        }
    }

    fn insert(&self, to: &char) -> EditStep<char> {
        EditStep::new(None, Some(*to), EditOperation::Insert, INDEL)
    }

    fn delete(&self, from: &char) -> EditStep<char> {
        let cost = if self.markers.is_marker(*from) { 0 } else { INDEL };
        EditStep::new(Some(*from), None, EditOperation::Delete, cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cost(a: char, b: char) -> u32 {
        DiscComparator::default().compare(&a, &b).step_distance
    }

    #[test]
    fn test_phone_similarity_costs() {
        assert_eq!(cost('t', 't'), 0);
        assert_eq!(cost('I', 'I'), 1);
        assert_eq!(cost('t', 'L'), 2);
        assert_eq!(cost('P', 'l'), 2);
        assert_eq!(cost('p', 'k'), 4);
        assert_eq!(cost('i', '1'), 8);
        assert_eq!(cost('p', 'a'), 20);
        assert_eq!(cost('s', 'i'), 20);
    }

    #[test]
    fn test_markers_are_free_to_drop() {
        let comparator = DiscComparator::default();
        assert_eq!(comparator.delete(&'-').step_distance, 0);
        assert_eq!(comparator.delete(&'\'').step_distance, 0);
        assert_eq!(comparator.delete(&'k').step_distance, 10);
        assert_eq!(comparator.insert(&'-').step_distance, 10);
    }

    #[test]
    fn test_marker_set_strips_and_detects_stress() {
        let markers = MarkerSet::disc();
        assert_eq!(markers.strip("w-'3:d"), "w3d");
        assert!(markers.has_stress("w-'3:d"));
        assert!(!markers.has_stress("w-3:d"));
    }
}
