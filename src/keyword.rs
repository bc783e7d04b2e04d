//! Keyword normalization and matching.
//!
//! Free text (chat messages and advertiser keyword lists alike) is reduced to a
//! [`WordSet`]: whitespace-split, NFKC-normalized, lowercased, trimmed of leading/trailing
//! non-letters and stemmed with the Snowball English (Porter2) stemmer.
//! Duplicates collapse and the set is kept sorted, so serialization and
//! iteration order are deterministic.
//!
//! ```
//! use adbot::keyword::WordSet;
//!
//! let target = WordSet::parse("Looking for RUNNING shoes!");
//! let spend = WordSet::parse("runner runs running");
//! let matched = target.intersect(&spend);
//! assert_eq!(matched.iter().collect::<Vec<_>>(), vec!["run"]);
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

fn stemmer() -> &'static Stemmer {
    static STEMMER: OnceLock<Stemmer> = OnceLock::new();
    STEMMER.get_or_init(|| Stemmer::create(Algorithm::English))
}

/// Normalize a single raw token. Returns `None` when nothing alphabetic is
/// left after trimming.
pub fn normalize_word(raw: &str) -> Option<String> {
    let lowered = raw.nfkc().collect::<String>().to_lowercase();
    let trimmed = lowered.trim_matches(|c: char| !c.is_alphabetic());
    if trimmed.is_empty() {
        return None;
    }
    Some(stemmer().stem(trimmed).into_owned())
}

/// Sorted set of stemmed terms.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordSet(BTreeSet<String>);

impl WordSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize and stem free text.
    pub fn parse(text: &str) -> Self {
        text.split_whitespace().filter_map(normalize_word).collect()
    }

    /// Terms of `self` that also occur in `other`.
    pub fn intersect(&self, other: &WordSet) -> WordSet {
        WordSet(self.0.intersection(&other.0).cloned().collect())
    }

    pub fn contains(&self, term: &str) -> bool {
        self.0.contains(term)
    }

    pub fn insert(&mut self, term: impl Into<String>) -> bool {
        self.0.insert(term.into())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for WordSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        WordSet(iter.into_iter().collect())
    }
}

impl fmt::Display for WordSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for term in &self.0 {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(term)?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(set: &WordSet) -> Vec<&str> {
        set.iter().collect()
    }

    #[test]
    fn parse_lowercases_strips_and_stems() {
        let set = WordSet::parse("  \"Cats\" and DOGS... running!  ");
        assert_eq!(terms(&set), vec!["and", "cat", "dog", "run"]);
    }

    #[test]
    fn parse_collapses_duplicates() {
        let set = WordSet::parse("shoe shoes Shoes SHOE");
        assert_eq!(set.len(), 1);
        assert!(set.contains("shoe"));
    }

    #[test]
    fn compatibility_forms_fold_together() {
        let fullwidth = WordSet::parse("ＳＨＯＥＳ");
        assert_eq!(fullwidth, WordSet::parse("shoes"));
    }

    #[test]
    fn parse_drops_non_alphabetic_tokens() {
        let set = WordSet::parse("!!! 1234 -- ok");
        assert_eq!(terms(&set), vec!["ok"]);
    }

    #[test]
    fn interior_punctuation_is_kept() {
        let set = WordSet::parse("(e-mail)");
        assert_eq!(set.len(), 1);
        assert!(set.iter().next().unwrap().contains('-'));
    }

    #[test]
    fn empty_text_is_empty_set() {
        assert!(WordSet::parse("").is_empty());
        assert!(WordSet::parse("   \t\n").is_empty());
    }

    #[test]
    fn intersect_is_subset_of_both() {
        let a = WordSet::parse("red green blue");
        let b = WordSet::parse("blue yellow red");
        let both = a.intersect(&b);
        assert_eq!(terms(&both), vec!["blue", "red"]);
        assert!(a.intersect(&WordSet::parse("purple")).is_empty());
    }

    #[test]
    fn serializes_as_sorted_array() {
        let set = WordSet::parse("zebra apple mango");
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["appl","mango","zebra"]"#);
        let back: WordSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn display_joins_with_spaces() {
        assert_eq!(WordSet::parse("b a").to_string(), "a b");
    }
}
