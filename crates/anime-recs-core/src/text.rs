//! Title normalization.
//!
//! Turns a raw title into the normalized string the embedder hashes:
//!
//! 1. Lowercase.
//! 2. Split on whitespace.
//! 3. Drop English stop words.
//! 4. Lemmatize each remaining token to its noun base form.
//! 5. Rejoin with single spaces.
//!
//! An empty or all-stop-word title normalizes to the empty string.
//!
//! # Example
//!
//! ```rust
//! use anime_recs_core::text::TextNormalizer;
//!
//! let normalizer = TextNormalizer::english();
//! assert_eq!(normalizer.normalize("The Seven Deadly Sins"), "seven deadly sin");
//! ```

use std::collections::{HashMap, HashSet};

/// NLTK English stop-word list.
const ENGLISH_STOP_WORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

/// Irregular noun plurals that suffix rules would get wrong.
const IRREGULAR_NOUNS: &[(&str, &str)] = &[
    ("children", "child"),
    ("men", "man"),
    ("women", "woman"),
    ("mice", "mouse"),
    ("geese", "goose"),
    ("teeth", "tooth"),
    ("feet", "foot"),
    ("knives", "knife"),
    ("wives", "wife"),
    ("lives", "life"),
    ("wolves", "wolf"),
    ("thieves", "thief"),
    ("leaves", "leaf"),
    ("halves", "half"),
    ("heroes", "hero"),
    ("potatoes", "potato"),
    ("criteria", "criterion"),
    ("phenomena", "phenomenon"),
    ("oxen", "ox"),
];

/// Suffix rewrites tried in order; the first matching suffix wins.
const NOUN_SUFFIX_RULES: &[(&str, &str)] = &[
    ("ies", "y"),
    ("ches", "ch"),
    ("shes", "sh"),
    ("xes", "x"),
    ("zes", "z"),
    ("sses", "ss"),
    ("men", "man"),
    ("s", ""),
];

/// Endings that look plural but are usually singular.
const SINGULAR_ENDINGS: &[&str] = &["ss", "us", "is"];

/// Lowercases, filters stop words, and lemmatizes title text.
#[derive(Debug, Clone)]
pub struct TextNormalizer {
    stop_words: HashSet<String>,
    irregular: HashMap<&'static str, &'static str>,
}

impl TextNormalizer {
    /// A normalizer with a custom stop-word list.
    pub fn new<I, S>(stop_words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            stop_words: stop_words
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
            irregular: IRREGULAR_NOUNS.iter().copied().collect(),
        }
    }

    /// A normalizer using the built-in English stop words.
    pub fn english() -> Self {
        Self::new(ENGLISH_STOP_WORDS)
    }

    pub fn is_stop_word(&self, token: &str) -> bool {
        self.stop_words.contains(token)
    }

    /// Normalize one title.
    pub fn normalize(&self, title: &str) -> String {
        title
            .to_lowercase()
            .split_whitespace()
            .filter(|tok| !self.is_stop_word(tok))
            .map(|tok| self.lemmatize(tok))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Normalize every title of a corpus, preserving order.
    pub fn normalize_corpus<'a, I>(&self, titles: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        titles.into_iter().map(|t| self.normalize(t)).collect()
    }

    /// Reduce a lowercase token to its noun base form.
    pub fn lemmatize(&self, token: &str) -> String {
        if let Some(base) = self.irregular.get(token) {
            return (*base).to_string();
        }
        if token.chars().count() <= 3
            || !token.chars().all(|c| c.is_alphabetic())
            || SINGULAR_ENDINGS.iter().any(|end| token.ends_with(end))
        {
            return token.to_string();
        }
        for (suffix, replacement) in NOUN_SUFFIX_RULES {
            if let Some(stem) = token.strip_suffix(suffix) {
                if stem.len() >= 2 {
                    return format!("{stem}{replacement}");
                }
            }
        }
        token.to_string()
    }
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::english()
    }
}
