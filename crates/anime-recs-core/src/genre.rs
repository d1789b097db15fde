//! Multi-label genre encoder.
//!
//! Learns a sorted vocabulary of genre labels from the training catalog and
//! encodes any genre set as a 0/1 indicator vector in vocabulary order.
//! Labels outside the vocabulary are ignored, and a missing genre set
//! encodes to all zeros.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenreEncoder {
    classes: Vec<String>,
}

impl GenreEncoder {
    /// Learn the vocabulary from every observed genre set.
    pub fn fit<'a, I>(genre_sets: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a [String]>>,
    {
        let classes: BTreeSet<String> = genre_sets
            .into_iter()
            .flatten()
            .flatten()
            .map(|g| g.trim())
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            classes: classes.into_iter().collect(),
        }
    }

    /// Rebuild an encoder from a persisted vocabulary.
    pub fn from_classes(mut classes: Vec<String>) -> Self {
        classes.sort();
        classes.dedup();
        Self { classes }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Indicator width (vocabulary size).
    pub fn width(&self) -> usize {
        self.classes.len()
    }

    /// Encode one genre set.
    pub fn transform(&self, genres: Option<&[String]>) -> Vec<f32> {
        let mut out = vec![0.0f32; self.classes.len()];
        let Some(genres) = genres else {
            return out;
        };
        let mut unknown = 0usize;
        for g in genres {
            match self.classes.binary_search_by(|c| c.as_str().cmp(g.trim())) {
                Ok(pos) => out[pos] = 1.0,
                Err(_) => unknown += 1,
            }
        }
        if unknown > 0 {
            tracing::debug!(unknown, "ignored genres outside the fitted vocabulary");
        }
        out
    }

    /// Decode an indicator vector back to the set of labels it marks.
    pub fn inverse_transform(&self, indicators: &[f32]) -> BTreeSet<String> {
        self.classes
            .iter()
            .zip(indicators)
            .filter(|(_, bit)| **bit > 0.5)
            .map(|(c, _)| c.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    fn fitted() -> GenreEncoder {
        let a = labels(&["Drama", "Action"]);
        let b = labels(&["Comedy", "Action"]);
        GenreEncoder::fit([Some(a.as_slice()), None, Some(b.as_slice())])
    }

    #[test]
    fn test_vocabulary_sorted_unique() {
        let enc = fitted();
        assert_eq!(enc.classes(), &["Action", "Comedy", "Drama"]);
        assert_eq!(enc.width(), 3);
    }

    #[test]
    fn test_transform_indicators() {
        let enc = fitted();
        let q = labels(&["Drama", "Action"]);
        assert_eq!(enc.transform(Some(q.as_slice())), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_roundtrip_recovers_known_sets() {
        let enc = fitted();
        let sets: [&[&str]; 4] = [&[], &["Comedy"], &["Action", "Drama"], &["Action", "Comedy", "Drama"]];
        for set in sets {
            let input = labels(set);
            let decoded = enc.inverse_transform(&enc.transform(Some(input.as_slice())));
            let expected: BTreeSet<String> = input.into_iter().collect();
            assert_eq!(decoded, expected);
        }
    }

    #[test]
    fn test_unknown_genre_ignored() {
        let enc = fitted();
        let q = labels(&["Mecha", "Comedy"]);
        assert_eq!(enc.transform(Some(q.as_slice())), vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_missing_genres_all_zero() {
        let enc = fitted();
        assert_eq!(enc.transform(None), vec![0.0; 3]);
    }

    #[test]
    fn test_from_classes_matches_fit() {
        let enc = GenreEncoder::from_classes(labels(&["Drama", "Action", "Comedy", "Action"]));
        assert_eq!(enc, fitted());
    }
}
