//! One-shot recommendations from the command line.

use anyhow::Result;
use serde::Serialize;

use anime_recs_core::models::{QueryRecord, Recommendation, RecommendationView};
use anime_recs_core::pipeline::Recommender;

use crate::artifacts::ArtifactStore;
use crate::config::Config;
use crate::images::build_resolver;

/// Response body shared by `--json` output and `POST /recommend`.
#[derive(Debug, Serialize)]
pub struct RecommendResponse {
    pub results: Vec<RecommendationView>,
}

impl RecommendResponse {
    pub fn new(recommendations: &[Recommendation]) -> Self {
        Self {
            results: recommendations.iter().map(Recommendation::view).collect(),
        }
    }
}

/// Load the published artifacts into a ready recommender.
pub fn load_recommender(config: &Config) -> anime_recs_core::Result<Recommender> {
    let store = ArtifactStore::new(&config.data.artifacts_dir);
    let loaded = store.load()?;
    Recommender::new(loaded.artifacts, loaded.catalog, config.retrieval_params())
}

pub fn run_recommend(config: &Config, query: &QueryRecord, json: bool) -> Result<()> {
    let recommender = load_recommender(config)?;
    let images = build_resolver(&config.images)?;
    let results = recommender.recommend(query, images.as_ref())?;

    if json {
        println!("{}", serde_json::to_string_pretty(&RecommendResponse::new(&results))?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No recommendations.");
        return Ok(());
    }

    for r in &results {
        let view = r.view();
        println!(
            "{:>2}. {}  (id {}, distance {:.4})",
            r.rank, r.english_title, r.id, r.distance
        );
        println!(
            "    type: {}  rating: {}  episodes: {}",
            view.kind, view.rating, view.episodes
        );
        if let Some(genres) = &r.genres {
            println!("    genres: {}", genres.join(", "));
        }
        println!("    image: {}", r.image_url);
    }

    Ok(())
}
