use std::collections::HashMap;

/// Symbols marking morphological structure in lexicon pronunciations, ignored on lookup
const MORPHOLOGY: &[char] = &['>', '<', '{', '}', '$', '=', '#'];

/// Maps a lexicon's own phone alphabet onto single-character DISC symbols and back
///
/// Pronunciations in the original alphabet are whitespace-delimited tokens wrapped in
/// `{ }`, e.g. `{ k * a . t }`. Tokens without a mapping pass through unchanged in
/// both directions.
#[derive(Debug, Clone)]
pub struct PhonemeTable {
    forward: HashMap<String, String>,
    reverse: HashMap<char, String>,
    /// Syllable boundary in the original alphabet
    boundary: String,
}

impl PhonemeTable {
    /// Builds a table from (original, DISC) pairs
    ///
    /// Several original phones may share a DISC symbol; decoding uses the first pair
    /// listed for it.
    pub fn new<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut forward = HashMap::new();
        let mut reverse = HashMap::new();
        for (original, disc) in pairs {
            forward.insert(original.to_string(), disc.to_string());
            let mut symbols = disc.chars();
            if let (Some(symbol), None) = (symbols.next(), symbols.next()) {
                reverse.entry(symbol).or_insert_with(|| original.to_string());
            }
        }
        let boundary = reverse.get(&'-').cloned().unwrap_or_else(|| ".".to_string());
        Self {
            forward,
            reverse,
            boundary,
        }
    }

    /// The Unisyn accent-independent keysymbols, as used by the Unisyn lexicon
    pub fn unisyn() -> Self {
        Self::new(UNISYN)
    }

    pub fn len(&self) -> usize {
        self.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }

    /// Re-encodes an original-alphabet pronunciation as DISC
    pub fn encode(&self, original: &str) -> String {
        let cleaned: String = original.chars().filter(|c| !MORPHOLOGY.contains(c)).collect();
        cleaned
            .split_whitespace()
            .map(|phone| self.forward.get(phone).map_or(phone, String::as_str))
            .collect()
    }

    /// Converts a DISC pronunciation back into the original alphabet
    pub fn decode(&self, disc: &str) -> String {
        let phones: Vec<String> = disc
            .chars()
            .map(|c| self.reverse.get(&c).cloned().unwrap_or_else(|| c.to_string()))
            .collect();
        if phones.is_empty() {
            return "{ }".to_string();
        }
        format!("{{ {} }}", phones.join(" "))
    }

    /// Number of syllables of an original-alphabet pronunciation
    pub fn syllable_count(&self, original: &str) -> usize {
        original
            .split_whitespace()
            .filter(|&phone| phone == self.boundary)
            .count()
            + 1
    }
}

const UNISYN: [(&str, &str); 71] = [
    // stress and syllabification
    ("*", "'"),
    ("~", "\""),
    ("-", ","),
    (".", "-"),
    // vowels
    ("e", "E"),
    ("a", "{"),
    ("ou", "5"),
    ("o", "Q"),
    ("ah", "#"),
    ("oo", "$"),
    ("ii", "i"),
    ("i", "I"),
    ("@", "@"),
    ("uh", "V"),
    ("u", "U"),
    ("uu", "u"),
    ("ei", "1"),
    ("ai", "2"),
    ("oi", "4"),
    ("ow", "6"),
    ("i@", "7"),
    ("@@r", "3"),
    ("eir", "8"),
    ("ur", "9"),
    // accent-specific
    ("ar", "Q"),
    ("aa", "Q"),
    ("oa", "{"),
    ("ao", "#"),
    // merged vowels
    ("our", "$"),
    ("eh", "{"),
    ("oul", "5"),
    ("ouw", "5"),
    ("oou", "Q"),
    ("au", "Q"),
    ("or", "$"),
    ("iy", "i"),
    ("ie", "i"),
    ("ii;", "i"),
    ("@r", "@"),
    ("iu", "u"),
    ("uu;", "u"),
    ("uw", "u"),
    ("uul", "u"),
    ("ee", "1"),
    ("ae", "2"),
    ("aer", "2"),
    ("aai", "2"),
    ("oir", "2"),
    ("owr", "6"),
    ("oow", "6"),
    ("ir", "i"),
    ("ir;", "i"),
    ("iir", "7"),
    ("er", "E"),
    ("ur;", "9"),
    ("iur", "9"),
    // consonants
    ("y", "j"),
    ("ch", "J"),
    ("jh", "_"),
    ("sh", "S"),
    ("zh", "Z"),
    ("th", "T"),
    ("dh", "D"),
    ("t^", "L"),
    ("m!", "F"),
    ("n!", "H"),
    ("ng", "N"),
    ("l!", "P"),
    // merged consonants
    ("ll", "l"),
    ("lw", "l"),
    ("hw", "w"),
];
