//! Training: fit every component on the training split and publish the
//! artifacts.
//!
//! When a held-out `test.csv` is present every row is encoded with the
//! freshly fitted components and searched against the new index, so a
//! transform whose width depends on the data it sees fails before anything
//! is published.

use anyhow::{bail, Context, Result};

use anime_recs_core::models::Catalog;
use anime_recs_core::pipeline::FittedArtifacts;

use crate::artifacts::{ArtifactStore, Manifest};
use crate::config::Config;
use crate::ingest::{read_snapshot, RAW_FILE, TEST_FILE, TRAIN_FILE};

pub fn run_train(config: &Config, full: bool) -> Result<Manifest> {
    let file = if full { RAW_FILE } else { TRAIN_FILE };
    let path = config.data.dir.join(file);
    if !path.exists() {
        bail!(
            "{} not found. Run `anirec ingest <catalog.csv>` first.",
            path.display()
        );
    }

    let catalog = read_snapshot(&path, &config.catalog)?;
    tracing::info!(file = %path.display(), rows = catalog.len(), "fitting");

    let artifacts = FittedArtifacts::fit(&catalog, &config.fit_config())
        .with_context(|| format!("Failed to fit on {}", path.display()))?;

    if !full {
        check_held_out(config, &artifacts)?;
    }

    let store = ArtifactStore::new(&config.data.artifacts_dir);
    let manifest = store.save(&artifacts, &catalog)?;

    let layout = manifest.layout;
    println!("Trained on {} rows from {}", manifest.rows, path.display());
    println!(
        "  features: {} (embedding {} + genre {} + tabular {})",
        layout.width(),
        layout.embedding,
        layout.genre,
        layout.tabular
    );
    println!("  sequence length: {}", artifacts.embedder().seq_len());
    println!("  artifacts: {}", store.dir().display());

    Ok(manifest)
}

fn check_held_out(config: &Config, artifacts: &FittedArtifacts) -> Result<()> {
    let path = config.data.dir.join(TEST_FILE);
    if !path.exists() {
        return Ok(());
    }
    let test = read_snapshot(&path, &config.catalog)?;
    if test.is_empty() {
        return Ok(());
    }

    let report = held_out_report(artifacts, &test)
        .with_context(|| format!("Failed to encode held-out rows from {}", path.display()))?;
    tracing::info!(
        rows = report.rows,
        unseen_genres = report.unseen_genres,
        mean_nearest_distance = report.mean_nearest_distance,
        "held-out split encodes consistently"
    );
    Ok(())
}

/// What the held-out split looks like to the fitted index.
#[derive(Debug, Clone, PartialEq)]
pub struct HeldOutReport {
    pub rows: usize,
    /// Genre labels absent from the fitted vocabulary (encoded as zeros).
    pub unseen_genres: usize,
    pub mean_nearest_distance: f32,
}

/// Encode every held-out row and search the index with it. Fails when a
/// row's width disagrees with the index.
pub fn held_out_report(artifacts: &FittedArtifacts, test: &Catalog) -> Result<HeldOutReport> {
    let index = artifacts.index();
    let mut total = 0.0f32;
    for entry in test.iter() {
        let row = artifacts.encode_entry(entry);
        let nearest = index.query(&row, 1)?;
        total += nearest.first().map(|n| n.distance).unwrap_or(0.0);
    }

    let unseen_genres = test
        .iter()
        .filter_map(|e| e.genres.as_ref())
        .flatten()
        .filter(|g| !artifacts.genres().classes().contains(g))
        .count();

    Ok(HeldOutReport {
        rows: test.len(),
        unseen_genres,
        mean_nearest_distance: if test.is_empty() {
            0.0
        } else {
            total / test.len() as f32
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anime_recs_core::models::CatalogEntry;
    use anime_recs_core::pipeline::FitConfig;

    fn anime(id: u64, title: &str, genres: &[&str], episodes: u32) -> CatalogEntry {
        CatalogEntry {
            english_title: Some(title.to_string()),
            genres: Some(genres.iter().map(|g| g.to_string()).collect()),
            episodes: Some(episodes),
            rating: Some(80.0),
            kind: Some("TV".to_string()),
            ..CatalogEntry::bare(id)
        }
    }

    fn fitted() -> FittedArtifacts {
        let train = Catalog::new(vec![
            anime(1, "Naruto", &["Action", "Adventure"], 220),
            anime(2, "Clannad", &["Drama", "Romance"], 23),
            anime(3, "Trigun", &["Action", "Sci-Fi"], 26),
        ]);
        FittedArtifacts::fit(&train, &FitConfig::default()).unwrap()
    }

    #[test]
    fn test_held_out_report_counts_unseen_genres() {
        let artifacts = fitted();
        let test = Catalog::new(vec![
            anime(4, "Mushi-Shi", &["Mystery", "Drama"], 26),
            anime(5, "Hellsing", &["Horror", "Action"], 13),
        ]);
        let report = held_out_report(&artifacts, &test).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.unseen_genres, 2);
        assert!(report.mean_nearest_distance > 0.0);
    }

    #[test]
    fn test_held_out_copy_of_training_row_is_at_distance_zero() {
        let artifacts = fitted();
        let test = Catalog::new(vec![anime(9, "Naruto", &["Action", "Adventure"], 220)]);
        let report = held_out_report(&artifacts, &test).unwrap();
        assert_eq!(report.unseen_genres, 0);
        assert!(report.mean_nearest_distance.abs() < 1e-5);
    }
}
