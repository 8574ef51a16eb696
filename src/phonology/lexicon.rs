use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{bail, Context, Result};
use tracing::{debug, info, warn};

use super::encoding::PhonemeTable;

/// A keyed store of pronunciations
pub trait Dictionary {
    /// All entries for a word, in the order they were added
    fn lookup(&self, key: &str) -> Result<Vec<String>>;

    fn add(&mut self, key: &str, entry: &str) -> Result<()>;

    /// Returns whether the entry was there to remove
    fn remove(&mut self, key: &str, entry: &str) -> Result<bool>;
}

/// Layout of a delimited lexicon file
#[derive(Debug, Clone)]
pub struct LexiconFormat {
    /// Field delimiter. `" - "` means split only on the first space.
    pub delimiter: String,
    /// Quote character wrapped around field values, if any
    pub quote: Option<char>,
    /// Lines starting with this are ignored
    pub comment: Option<char>,
    /// The first line holds field names
    pub skip_header: bool,
    pub word_field: usize,
    pub pronunciation_field: usize,
    pub case_sensitive: bool,
}

impl Default for LexiconFormat {
    fn default() -> Self {
        Self {
            delimiter: "\t".to_string(),
            quote: None,
            comment: Some('#'),
            skip_header: false,
            word_field: 0,
            pronunciation_field: 1,
            case_sensitive: false,
        }
    }
}

impl LexiconFormat {
    /// CMU-style `WORD  W ER1 D` lines: word, then the rest of the line
    pub fn first_space() -> Self {
        Self {
            delimiter: " - ".to_string(),
            comment: Some(';'),
            ..Self::default()
        }
    }

    fn fields<'a>(&self, line: &'a str) -> Vec<&'a str> {
        if self.delimiter == " - " {
            line.splitn(2, ' ').collect()
        } else {
            line.split(self.delimiter.as_str()).collect()
        }
    }

    fn field(&self, fields: &[&str], index: usize) -> String {
        let value = fields.get(index).copied().unwrap_or("").trim();
        let value = match self.quote {
            Some(q) => value
                .strip_prefix(q)
                .and_then(|v| v.strip_suffix(q))
                .unwrap_or(value),
            None => value,
        };
        strip_variant_index(value).trim().to_string()
    }
}

/// `word(2)` is the second variant of `word`
fn strip_variant_index(value: &str) -> &str {
    if let Some(open) = value.rfind('(') {
        if open > 0
            && value.ends_with(')')
            && value[open + 1..value.len() - 1]
                .chars()
                .all(|c| c.is_ascii_digit())
            && value.len() > open + 2
        {
            return &value[..open];
        }
    }
    value
}

/// One pronunciation as stored
#[derive(Debug, Clone, PartialEq)]
pub struct LexiconEntry {
    /// In the lexicon's own alphabet
    pub pronunciation: String,
    pub syllables: usize,
}

/// An in-memory lexicon loaded from a delimited flat file
///
/// When a phoneme table is given, pronunciations are kept in the file's alphabet and
/// looked up as DISC; entries added in DISC are converted back before being stored.
#[derive(Debug, Clone, Default)]
pub struct FlatLexicon {
    entries: HashMap<String, Vec<LexiconEntry>>,
    table: Option<PhonemeTable>,
    case_sensitive: bool,
}

impl FlatLexicon {
    pub fn new(table: Option<PhonemeTable>) -> Self {
        Self {
            entries: HashMap::new(),
            table,
            case_sensitive: false,
        }
    }

    pub fn load(reader: impl BufRead, format: &LexiconFormat, table: Option<PhonemeTable>) -> Result<Self> {
        let mut lexicon = Self::new(table);
        lexicon.case_sensitive = format.case_sensitive;
        let mut loaded = 0;

        for (number, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("Failed to read lexicon line {}", number + 1))?;
            if number == 0 && format.skip_header {
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }
            if format.comment.is_some_and(|c| line.trim_start().starts_with(c)) {
                continue;
            }
            let fields = format.fields(&line);
            let word = format.field(&fields, format.word_field);
            let pronunciation = format.field(&fields, format.pronunciation_field);
            if word.is_empty() || pronunciation.is_empty() {
                warn!("Skipping lexicon line {}: {:?}", number + 1, line);
                continue;
            }
            lexicon.insert(&word, pronunciation);
            loaded += 1;
        }

        info!("Loaded {} lexicon entries for {} words", loaded, lexicon.len());
        Ok(lexicon)
    }

    pub fn load_file(path: &Path, format: &LexiconFormat, table: Option<PhonemeTable>) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open lexicon: {:?}", path))?;
        Self::load(BufReader::new(file), format, table)
            .with_context(|| format!("Failed to load lexicon: {:?}", path))
    }

    /// Number of distinct words
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self, key: &str) -> &[LexiconEntry] {
        self.entries
            .get(&self.key(key))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn key(&self, key: &str) -> String {
        if self.case_sensitive {
            key.to_string()
        } else {
            key.to_lowercase()
        }
    }

    fn syllables(&self, pronunciation: &str) -> usize {
        match &self.table {
            Some(table) => table.syllable_count(pronunciation),
            None => pronunciation.matches('.').count() + 1,
        }
    }

    fn insert(&mut self, key: &str, pronunciation: String) {
        let syllables = self.syllables(&pronunciation);
        let key = self.key(key);
        let entries = self.entries.entry(key).or_default();
        if !entries.iter().any(|e| e.pronunciation == pronunciation) {
            entries.push(LexiconEntry {
                pronunciation,
                syllables,
            });
        }
    }

    fn external(&self, pronunciation: &str) -> String {
        match &self.table {
            Some(table) => table.encode(pronunciation),
            None => pronunciation.to_string(),
        }
    }

    /// Guesses a DISC pronunciation for an inflected form of a known word
    ///
    /// Handles possessive/plural `'s` and `s`, and the `'ve` and `'d` contractions.
    /// Returns `None` when the base form isn't in the lexicon either.
    pub fn suggest(&self, key: &str) -> Result<Option<String>> {
        if !self.lookup(key)?.is_empty() {
            bail!("Suggestion for existing word: {}", key);
        }
        let base = |suffix: &str| -> Result<Option<String>> {
            match key.strip_suffix(suffix) {
                Some(stem) if !stem.is_empty() => Ok(self.lookup(stem)?.into_iter().next()),
                _ => Ok(None),
            }
        };

        let suggestion = if key.ends_with("'s") {
            base("'s")?.map(|b| plural(&b))
        } else if key.ends_with("'ve") {
            base("'ve")?.map(|b| format!("{}-@v", b))
        } else if key.ends_with("'d") {
            base("'d")?.map(|b| format!("{}-@d", b))
        } else if key.ends_with('s') {
            base("s")?.map(|b| plural(&b))
        } else {
            None
        };
        debug!("Suggested {:?} for {}", suggestion, key);
        Ok(suggestion)
    }
}

/// Adds a plural/possessive ending whose voicing follows the final phone
fn plural(base: &str) -> String {
    match base.chars().last() {
        Some(c) if "sSzZJ_".contains(c) => format!("{}-Iz", base),
        Some(c) if "kfhptT".contains(c) => format!("{}s", base),
        _ => format!("{}z", base),
    }
}

impl Dictionary for FlatLexicon {
    fn lookup(&self, key: &str) -> Result<Vec<String>> {
        Ok(self
            .entries(key)
            .iter()
            .map(|e| self.external(&e.pronunciation))
            .collect())
    }

    fn add(&mut self, key: &str, entry: &str) -> Result<()> {
        if key.trim().is_empty() || entry.trim().is_empty() {
            bail!("Cannot add an empty entry for {:?}", key);
        }
        let pronunciation = match &self.table {
            Some(table) => table.decode(entry),
            None => entry.to_string(),
        };
        self.insert(key, pronunciation);
        Ok(())
    }

    fn remove(&mut self, key: &str, entry: &str) -> Result<bool> {
        let normalized = self.key(key);
        let external: Vec<String> = self
            .entries(key)
            .iter()
            .map(|e| self.external(&e.pronunciation))
            .collect();
        let Some(entries) = self.entries.get_mut(&normalized) else {
            return Ok(false);
        };
        let before = entries.len();
        let mut index = 0;
        entries.retain(|_| {
            let keep = external[index] != entry;
            index += 1;
            keep
        });
        let removed = entries.len() < before;
        if entries.is_empty() {
            self.entries.remove(&normalized);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const UNISYN_SAMPLE: &str = "\
# word;pronunciation
cat\t{ k * a t }
cats\t{ k * a t s }
word\t{ * w @@r d }
banana\t{ b @ . n * a . n @ }
box\t{ b * o k s }
";

    fn unisyn_lexicon() -> FlatLexicon {
        FlatLexicon::load(
            UNISYN_SAMPLE.as_bytes(),
            &LexiconFormat::default(),
            Some(PhonemeTable::unisyn()),
        )
        .unwrap()
    }

    #[test]
    fn test_lookup_returns_disc() {
        let lexicon = unisyn_lexicon();
        assert_eq!(lexicon.len(), 5);
        assert_eq!(lexicon.lookup("Cat").unwrap(), vec!["k'{t"]);
        assert_eq!(lexicon.lookup("banana").unwrap(), vec!["b@-n'{-n@"]);
        assert_eq!(lexicon.entries("banana")[0].syllables, 3);
        assert!(lexicon.lookup("dog").unwrap().is_empty());
    }

    #[test]
    fn test_add_disc_entry_is_stored_in_lexicon_alphabet() {
        let mut lexicon = unisyn_lexicon();
        lexicon.add("kitten", "k'I-t@n").unwrap();
        assert_eq!(lexicon.entries("kitten")[0].pronunciation, "{ k * i . t @ n }");
        assert_eq!(lexicon.entries("kitten")[0].syllables, 2);
        assert_eq!(lexicon.lookup("kitten").unwrap(), vec!["k'I-t@n"]);

        assert!(lexicon.remove("kitten", "k'I-t@n").unwrap());
        assert!(!lexicon.remove("kitten", "k'I-t@n").unwrap());
        assert!(lexicon.lookup("kitten").unwrap().is_empty());
    }

    #[test]
    fn test_suggest_inflections() {
        let lexicon = unisyn_lexicon();
        assert_eq!(lexicon.suggest("word's").unwrap(), Some("'w3dz".to_string()));
        assert_eq!(lexicon.suggest("box's").unwrap(), Some("b'Qks-Iz".to_string()));
        assert_eq!(lexicon.suggest("cat's").unwrap(), Some("k'{ts".to_string()));
        assert_eq!(lexicon.suggest("word've").unwrap(), Some("'w3d-@v".to_string()));
        assert_eq!(lexicon.suggest("banana'd").unwrap(), Some("b@-n'{-n@-@d".to_string()));
        assert_eq!(lexicon.suggest("bananas").unwrap(), Some("b@-n'{-n@z".to_string()));
        assert_eq!(lexicon.suggest("dogs").unwrap(), None);
        assert!(lexicon.suggest("cats").is_err());
    }

    #[test]
    fn test_first_space_format_with_variants() {
        let text = ";;; comment\nWORD  w'3d\nWORD(2)  w3d\nA  '1\n";
        let lexicon = FlatLexicon::load(text.as_bytes(), &LexiconFormat::first_space(), None).unwrap();
        assert_eq!(lexicon.lookup("word").unwrap(), vec!["w'3d", "w3d"]);
        assert_eq!(lexicon.lookup("a").unwrap(), vec!["'1"]);
    }

    #[test]
    fn test_quoted_csv_with_header() {
        let text = "word,pron,freq\n\"hello\",\"h@-l'5\",10\n";
        let format = LexiconFormat {
            delimiter: ",".to_string(),
            quote: Some('"'),
            skip_header: true,
            ..LexiconFormat::default()
        };
        let lexicon = FlatLexicon::load(text.as_bytes(), &format, None).unwrap();
        assert_eq!(lexicon.lookup("hello").unwrap(), vec!["h@-l'5"]);
        assert_eq!(lexicon.entries("hello")[0].syllables, 1);
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(UNISYN_SAMPLE.as_bytes()).unwrap();
        let lexicon =
            FlatLexicon::load_file(file.path(), &LexiconFormat::default(), Some(PhonemeTable::unisyn()))
                .unwrap();
        assert_eq!(lexicon.lookup("word").unwrap(), vec!["'w3d"]);

        let missing = FlatLexicon::load_file(Path::new("/nonexistent/lexicon.txt"), &LexiconFormat::default(), None);
        assert!(missing.is_err());
    }
}
