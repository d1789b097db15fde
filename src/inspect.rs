//! Artifact overview.
//!
//! Prints what the published artifacts contain: when they were fitted, how
//! many rows the index holds, the width of each feature block, and the
//! learned vocabularies. Used by `anirec inspect` to confirm a training run
//! produced what the serving commands expect.

use anyhow::Result;

use crate::artifacts::{ArtifactStore, INDEX_DATA};
use crate::config::Config;

pub fn run_inspect(config: &Config) -> Result<()> {
    let store = ArtifactStore::new(&config.data.artifacts_dir);
    let loaded = store.load()?;
    let manifest = &loaded.manifest;
    let artifacts = &loaded.artifacts;
    let layout = manifest.layout;

    let index_size = std::fs::metadata(store.path(INDEX_DATA))
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Anime Recs — Artifacts");
    println!("======================");
    println!();
    println!("  Directory:   {}", store.dir().display());
    println!("  Format:      v{}", manifest.format_version);
    println!("  Fitted at:   {}", manifest.fitted_at.to_rfc3339());
    println!("  Rows:        {}", manifest.rows);
    println!("  Index size:  {}", format_bytes(index_size));
    println!(
        "  Checksum:    {} ({} components verified)",
        manifest
            .checksums
            .get(INDEX_DATA)
            .map(String::as_str)
            .unwrap_or("-"),
        manifest.checksums.len()
    );
    println!();
    println!("  Features:    {}", layout.width());
    println!("    embedding  {}", layout.embedding);
    println!("    genre      {}", layout.genre);
    println!("    tabular    {}", layout.tabular);
    println!();

    let embedder = artifacts.embedder();
    println!(
        "  Embedder:    vocab {}, dims {}, sequence length {}",
        embedder.vocab_size(),
        embedder.dims(),
        embedder.seq_len()
    );

    let classes = artifacts.genres().classes();
    if classes.is_empty() {
        println!("  Genres:      (none)");
    } else {
        println!("  Genres:      {}", classes.join(", "));
    }

    let tabular = artifacts.tabular();
    println!(
        "  Types:       {} (missing -> {})",
        tabular.kind.categories.join(", "),
        tabular.kind.fill
    );
    println!(
        "  Rating:      missing -> {:.2}, mean {:.2}, scale {:.2}",
        tabular.rating.fill, tabular.rating.mean, tabular.rating.scale
    );
    println!(
        "  Episodes:    missing -> {:.1}, mean {:.2}, scale {:.2}",
        tabular.episodes.fill, tabular.episodes.mean, tabular.episodes.scale
    );

    let untitled = loaded
        .catalog
        .iter()
        .filter(|e| e.display_title().is_none())
        .count();
    println!();
    println!(
        "  Catalog:     {} rows, {} without an English title (never recommended)",
        loaded.catalog.len(),
        untitled
    );

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
