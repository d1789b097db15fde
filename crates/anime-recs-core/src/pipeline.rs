//! Fitting and serving.
//!
//! [`FittedArtifacts::fit`] runs the transformation and training stages
//! over a catalog: it fits the title embedder, genre encoder, and tabular
//! preprocessor, assembles the training matrix, and fits the cosine index.
//!
//! [`Recommender::recommend`] serves one query against those artifacts:
//!
//! 1. Embed the title, or use a zero vector when it is absent.
//! 2. Encode genres with the fitted vocabulary (zeros when absent).
//! 3. Run rating, episodes, and type through the fitted preprocessor;
//!    absent fields take the fit-time imputation statistic.
//! 4. Assemble `[embedding | genre | tabular]` and check its width against
//!    the index before searching.
//! 5. Over-fetch `candidate_k` neighbors.
//! 6. Walk them nearest first, skipping rows without an English title and
//!    titles already taken, until `final_limit` are collected.
//! 7. Resolve an image for each, falling back to a placeholder.
//!
//! Fitted state is never mutated while serving, so a `Recommender` can be
//! shared across threads behind an `Arc`.

use std::collections::HashSet;

use crate::embedding::{EmbedderConfig, TitleEmbedder};
use crate::error::{RecommendError, Result};
use crate::features::{assemble, FeatureLayout, FeatureMatrix};
use crate::genre::GenreEncoder;
use crate::image::{resolve_or_placeholder, ImageResolver, DEFAULT_PLACEHOLDER};
use crate::index::{CosineIndex, Neighbor, DEFAULT_K};
use crate::models::{Catalog, CatalogEntry, QueryRecord, Recommendation};
use crate::tabular::{TabularInput, TabularPreprocessor};

/// Parameters for the fitting stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitConfig {
    pub embedder: EmbedderConfig,
    /// Neighbor count the index answers with by default.
    pub default_k: usize,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            embedder: EmbedderConfig::default(),
            default_k: DEFAULT_K,
        }
    }
}

/// Retrieval tuning for serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalParams {
    /// Neighbors fetched from the index before filtering.
    pub candidate_k: usize,
    /// Maximum recommendations returned.
    pub final_limit: usize,
    /// Placeholder image pattern containing `{title}`.
    pub placeholder: String,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            candidate_k: 20,
            final_limit: 10,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

/// Every fitted component needed to encode rows and search the index.
#[derive(Debug, Clone)]
pub struct FittedArtifacts {
    embedder: TitleEmbedder,
    genres: GenreEncoder,
    tabular: TabularPreprocessor,
    index: CosineIndex,
}

impl FittedArtifacts {
    /// Fit all components on a training catalog.
    pub fn fit(catalog: &Catalog, config: &FitConfig) -> Result<Self> {
        if catalog.is_empty() {
            return Err(RecommendError::EmptyCatalog);
        }

        let embedder = TitleEmbedder::fit(
            catalog.iter().map(CatalogEntry::embedding_title),
            config.embedder,
        );
        let genres = GenreEncoder::fit(catalog.iter().map(|e| e.genres.as_deref()));
        let tabular = TabularPreprocessor::fit(catalog.iter().map(TabularInput::from))?;

        let layout = FeatureLayout {
            embedding: embedder.dims(),
            genre: genres.width(),
            tabular: tabular.width(),
        };
        let rows = catalog.iter().map(|entry| {
            let title = entry.embedding_title();
            assemble(
                &embedder.embed(title),
                &genres.transform(entry.genres.as_deref()),
                &tabular.transform(TabularInput::from(entry)),
            )
        });
        let matrix = FeatureMatrix::from_rows(layout.width(), rows)?;
        let index = CosineIndex::fit(matrix, config.default_k)?;

        tracing::info!(
            rows = catalog.len(),
            embedding = layout.embedding,
            genre = layout.genre,
            tabular = layout.tabular,
            "fitted recommender artifacts"
        );

        Ok(Self {
            embedder,
            genres,
            tabular,
            index,
        })
    }

    /// Reassemble artifacts loaded from storage, verifying they agree.
    pub fn from_parts(
        embedder: TitleEmbedder,
        genres: GenreEncoder,
        tabular: TabularPreprocessor,
        index: CosineIndex,
    ) -> Result<Self> {
        embedder.validate()?;
        let artifacts = Self {
            embedder,
            genres,
            tabular,
            index,
        };
        artifacts.layout().expect_width(artifacts.index.dims())?;
        Ok(artifacts)
    }

    pub fn layout(&self) -> FeatureLayout {
        FeatureLayout {
            embedding: self.embedder.dims(),
            genre: self.genres.width(),
            tabular: self.tabular.width(),
        }
    }

    pub fn embedder(&self) -> &TitleEmbedder {
        &self.embedder
    }

    pub fn genres(&self) -> &GenreEncoder {
        &self.genres
    }

    pub fn tabular(&self) -> &TabularPreprocessor {
        &self.tabular
    }

    pub fn index(&self) -> &CosineIndex {
        &self.index
    }

    /// Feature row for a catalog entry, encoded the way training rows are.
    pub fn encode_entry(&self, entry: &CatalogEntry) -> Vec<f32> {
        assemble(
            &self.embedder.embed(entry.embedding_title()),
            &self.genres.transform(entry.genres.as_deref()),
            &self.tabular.transform(TabularInput::from(entry)),
        )
    }

    /// Encode every entry of another catalog (e.g. a held-out split).
    pub fn transform_catalog(&self, catalog: &Catalog) -> Result<FeatureMatrix> {
        FeatureMatrix::from_rows(
            self.layout().width(),
            catalog.iter().map(|e| self.encode_entry(e)),
        )
    }

    /// Feature row for a sparse query.
    pub fn encode_query(&self, query: &QueryRecord) -> Result<Vec<f32>> {
        if let Some(r) = query.rating {
            if !r.is_finite() {
                return Err(RecommendError::InvalidQuery(format!("rating {} is not finite", r)));
            }
        }

        let embedding = match query.title() {
            Some(title) => self.embedder.embed(title),
            None => vec![0.0; self.embedder.dims()],
        };
        let genre = self.genres.transform(query.genre_list());
        let tabular = self.tabular.transform(TabularInput::from(query));

        let row = assemble(&embedding, &genre, &tabular);
        let expected = self.index.dims();
        if row.len() != expected {
            return Err(RecommendError::FeatureShapeMismatch {
                expected,
                actual: row.len(),
            });
        }
        Ok(row)
    }
}

/// Serves recommendations from fitted artifacts and their training catalog.
#[derive(Debug, Clone)]
pub struct Recommender {
    artifacts: FittedArtifacts,
    catalog: Catalog,
    params: RetrievalParams,
}

impl Recommender {
    /// Pair artifacts with the catalog whose rows the index was fitted on.
    pub fn new(artifacts: FittedArtifacts, catalog: Catalog, params: RetrievalParams) -> Result<Self> {
        if catalog.is_empty() {
            return Err(RecommendError::EmptyCatalog);
        }
        if catalog.len() != artifacts.index.len() {
            return Err(RecommendError::missing_artifact(
                "catalog",
                format!(
                    "catalog has {} rows but the index was fitted on {}",
                    catalog.len(),
                    artifacts.index.len()
                ),
            ));
        }
        Ok(Self {
            artifacts,
            catalog,
            params,
        })
    }

    pub fn artifacts(&self) -> &FittedArtifacts {
        &self.artifacts
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    /// Raw nearest neighbors for a query, before filtering.
    pub fn neighbors(&self, query: &QueryRecord, k: usize) -> Result<Vec<Neighbor>> {
        let vector = self.artifacts.encode_query(query)?;
        self.artifacts.index.query(&vector, k)
    }

    /// Ranked, filtered, de-duplicated recommendations for a query.
    pub fn recommend(
        &self,
        query: &QueryRecord,
        images: &dyn ImageResolver,
    ) -> Result<Vec<Recommendation>> {
        let candidates = self.neighbors(query, self.params.candidate_k)?;

        let mut seen: HashSet<String> = HashSet::new();
        let mut picked: Vec<(&CatalogEntry, &str, f32)> = Vec::new();
        for hit in &candidates {
            if picked.len() >= self.params.final_limit {
                break;
            }
            let Some(entry) = self.catalog.get(hit.row) else {
                continue;
            };
            let Some(title) = entry.display_title() else {
                continue;
            };
            if !seen.insert(title.to_lowercase()) {
                continue;
            }
            picked.push((entry, title, hit.distance));
        }

        tracing::info!(
            candidates = candidates.len(),
            returned = picked.len(),
            "served recommendations"
        );

        Ok(picked
            .into_iter()
            .enumerate()
            .map(|(i, (entry, title, distance))| Recommendation {
                rank: i + 1,
                id: entry.id,
                english_title: title.to_string(),
                kind: entry.kind.clone(),
                rating: entry.rating,
                episodes: entry.episodes,
                genres: entry.genres.clone(),
                image_url: resolve_or_placeholder(images, &self.params.placeholder, title),
                distance,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::NoImages;

    fn entry(id: u64, title: Option<&str>, genres: &[&str], episodes: u32, rating: f64, kind: &str) -> CatalogEntry {
        CatalogEntry {
            id,
            english_title: title.map(str::to_string),
            fallback_title: None,
            genres: Some(genres.iter().map(|g| g.to_string()).collect()),
            episodes: Some(episodes),
            rating: Some(rating),
            kind: Some(kind.to_string()),
        }
    }

    fn small_fit() -> FitConfig {
        FitConfig {
            embedder: EmbedderConfig {
                vocab_size: 64,
                dims: 16,
                seed: 3,
            },
            default_k: 10,
        }
    }

    fn catalog() -> Catalog {
        Catalog::new(vec![
            entry(1, Some("Naruto"), &["Action", "Adventure"], 220, 79.0, "TV"),
            entry(2, Some("Bleach"), &["Action", "Supernatural"], 366, 75.0, "TV"),
            entry(3, Some("Your Name"), &["Romance", "Drama"], 1, 90.0, "MOVIE"),
            entry(4, Some("naruto"), &["Action"], 220, 79.0, "TV"),
            entry(5, None, &["Action"], 12, 70.0, "TV"),
        ])
    }

    #[test]
    fn test_fit_layout() {
        let artifacts = FittedArtifacts::fit(&catalog(), &small_fit()).unwrap();
        let layout = artifacts.layout();
        assert_eq!(layout.embedding, 16);
        assert_eq!(layout.genre, 5);
        assert_eq!(layout.tabular, 2 + 2);
        assert_eq!(artifacts.index().dims(), layout.width());
        assert_eq!(artifacts.index().len(), 5);
    }

    #[test]
    fn test_fit_empty_catalog() {
        let err = FittedArtifacts::fit(&Catalog::default(), &small_fit()).unwrap_err();
        assert!(matches!(err, RecommendError::EmptyCatalog));
    }

    #[test]
    fn test_query_without_title_has_zero_embedding() {
        let artifacts = FittedArtifacts::fit(&catalog(), &small_fit()).unwrap();
        let row = artifacts.encode_query(&QueryRecord::default()).unwrap();
        assert_eq!(row.len(), artifacts.layout().width());
        assert!(row[..16].iter().all(|v| *v == 0.0));
        assert!(row[16..21].iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_non_finite_rating_rejected() {
        let artifacts = FittedArtifacts::fit(&catalog(), &small_fit()).unwrap();
        let q = QueryRecord {
            rating: Some(f64::NAN),
            ..QueryRecord::default()
        };
        assert!(matches!(
            artifacts.encode_query(&q),
            Err(RecommendError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_duplicate_and_untitled_rows_filtered() {
        let cat = catalog();
        let artifacts = FittedArtifacts::fit(&cat, &small_fit()).unwrap();
        let rec = Recommender::new(artifacts, cat, RetrievalParams::default()).unwrap();
        let q = QueryRecord {
            english_title: Some("Naruto".to_string()),
            ..QueryRecord::default()
        };
        let out = rec.recommend(&q, &NoImages).unwrap();
        let ids: Vec<u64> = out.iter().map(|r| r.id).collect();
        assert!(!ids.contains(&5));
        assert!(!(ids.contains(&1) && ids.contains(&4)));
        assert_eq!(out.len(), 3);
        assert!(out.iter().enumerate().all(|(i, r)| r.rank == i + 1));
    }

    #[test]
    fn test_final_limit_respected() {
        let cat = catalog();
        let artifacts = FittedArtifacts::fit(&cat, &small_fit()).unwrap();
        let params = RetrievalParams {
            candidate_k: 20,
            final_limit: 2,
            ..RetrievalParams::default()
        };
        let rec = Recommender::new(artifacts, cat, params).unwrap();
        assert_eq!(rec.recommend(&QueryRecord::default(), &NoImages).unwrap().len(), 2);
    }

    #[test]
    fn test_recommender_rejects_mismatched_catalog() {
        let cat = catalog();
        let artifacts = FittedArtifacts::fit(&cat, &small_fit()).unwrap();
        let shorter = Catalog::new(cat.entries()[..2].to_vec());
        let err = Recommender::new(artifacts, shorter, RetrievalParams::default()).unwrap_err();
        assert!(matches!(err, RecommendError::MissingArtifact { .. }));
    }

    #[test]
    fn test_from_parts_detects_skew() {
        let artifacts = FittedArtifacts::fit(&catalog(), &small_fit()).unwrap();
        let other_genres = GenreEncoder::from_classes(vec!["Action".to_string()]);
        let err = FittedArtifacts::from_parts(
            artifacts.embedder().clone(),
            other_genres,
            artifacts.tabular().clone(),
            artifacts.index().clone(),
        )
        .unwrap_err();
        assert!(matches!(err, RecommendError::FeatureShapeMismatch { .. }));
    }
}
