//! Core data models shared by fitting and serving.
//!
//! These types represent the catalog rows the recommender is trained on,
//! the sparse query a user submits, and the ranked recommendations that come
//! back. Every optional field is an explicit `Option`: an absent value is
//! never encoded as `0` or `"0"`.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// One anime title in the training catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    pub english_title: Option<String>,
    /// User-preferred (usually romaji) title, used for embedding when the
    /// English title is missing.
    pub fallback_title: Option<String>,
    pub genres: Option<Vec<String>>,
    pub episodes: Option<u32>,
    pub rating: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

impl CatalogEntry {
    /// An entry with only an id; every other field absent.
    pub fn bare(id: u64) -> Self {
        Self {
            id,
            english_title: None,
            fallback_title: None,
            genres: None,
            episodes: None,
            rating: None,
            kind: None,
        }
    }

    /// The title text fed to the embedder: English title, else the
    /// fallback title, else the empty string.
    pub fn embedding_title(&self) -> &str {
        self.english_title
            .as_deref()
            .or(self.fallback_title.as_deref())
            .unwrap_or("")
    }

    /// The English title when it is present and not blank.
    pub fn display_title(&self) -> Option<&str> {
        self.english_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// An ordered, immutable snapshot of catalog rows.
///
/// Row offset `i` is also row `i` of the fitted index matrix, so results
/// from the index are resolved back to entries by position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, row: usize) -> Option<&CatalogEntry> {
        self.entries.get(row)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CatalogEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> Vec<CatalogEntry> {
        self.entries
    }
}

impl FromIterator<CatalogEntry> for Catalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A sparse recommendation request.
///
/// Matches the inbound query contract: every field is optional and keys
/// are camelCase (`englishTitle`, `genres`, `episodes`, `rating`, `type`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueryRecord {
    pub english_title: Option<String>,
    #[serde(alias = "genre")]
    pub genres: Option<Vec<String>>,
    /// Any whole, non-negative JSON number: `24` and `24.0` both parse.
    #[serde(deserialize_with = "whole_episodes")]
    pub episodes: Option<u32>,
    pub rating: Option<f64>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

fn whole_episodes<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(n) if n.is_finite() && n >= 0.0 && n.fract() == 0.0 && n <= u32::MAX as f64 => {
            Ok(Some(n as u32))
        }
        Some(n) => Err(D::Error::custom(format!(
            "episodes must be a whole, non-negative number, got {}",
            n
        ))),
    }
}

impl QueryRecord {
    /// The title when present and not blank.
    pub fn title(&self) -> Option<&str> {
        self.english_title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// The genre list when present and non-empty.
    pub fn genre_list(&self) -> Option<&[String]> {
        self.genres.as_deref().filter(|g| !g.is_empty())
    }
}

/// A single ranked recommendation.
#[derive(Debug, Clone, PartialEq)]
pub struct Recommendation {
    /// 1-based position in the result list.
    pub rank: usize,
    pub id: u64,
    pub english_title: String,
    pub kind: Option<String>,
    pub rating: Option<f64>,
    pub episodes: Option<u32>,
    pub genres: Option<Vec<String>>,
    pub image_url: String,
    /// Cosine distance between the query and this entry.
    pub distance: f32,
}

/// A value in the outbound contract, or the placeholder shown in its place.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Shown<T> {
    Value(T),
    Missing(&'static str),
}

impl<T> From<Option<T>> for Shown<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Shown::Value(v),
            None => Shown::Missing("N/A"),
        }
    }
}

impl<T: std::fmt::Display> std::fmt::Display for Shown<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Shown::Value(v) => write!(f, "{}", v),
            Shown::Missing(s) => f.write_str(s),
        }
    }
}

/// Outbound result contract for one recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationView {
    pub id: u64,
    pub english_title: String,
    #[serde(rename = "type")]
    pub kind: Shown<String>,
    pub rating: Shown<f64>,
    pub episodes: Shown<u32>,
    pub genres: Shown<Vec<String>>,
    pub image_url: String,
}

impl Recommendation {
    /// Project into the outbound contract, substituting `"Unknown"` for a
    /// missing type, `"N/A"` for missing numbers, and `"[]"` for missing
    /// genres.
    pub fn view(&self) -> RecommendationView {
        RecommendationView {
            id: self.id,
            english_title: self.english_title.clone(),
            kind: match &self.kind {
                Some(k) => Shown::Value(k.clone()),
                None => Shown::Missing("Unknown"),
            },
            rating: self.rating.into(),
            episodes: self.episodes.into(),
            genres: match &self.genres {
                Some(g) => Shown::Value(g.clone()),
                None => Shown::Missing("[]"),
            },
            image_url: self.image_url.clone(),
        }
    }
}
