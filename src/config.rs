//! TOML configuration.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all, see [`resolve_config`]) yields a working setup rooted at `./data`
//! and `./artifacts`.
//!
//! ```toml
//! [data]
//! dir = "./data"
//! artifacts_dir = "./artifacts"
//! test_ratio = 0.2
//! seed = 0
//!
//! [catalog]
//! english_title = "englishTitle"
//!
//! [embedding]
//! vocab_size = 500
//! dims = 100
//! seed = 42
//!
//! [retrieval]
//! candidate_k = 20
//! final_limit = 10
//!
//! [images]
//! timeout_ms = 2000
//!
//! [server]
//! bind = "127.0.0.1:8000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use anime_recs_core::embedding::{EmbedderConfig, DEFAULT_DIMS, DEFAULT_SEED, DEFAULT_VOCAB_SIZE};
use anime_recs_core::image::DEFAULT_PLACEHOLDER;
use anime_recs_core::index::DEFAULT_K;
use anime_recs_core::pipeline::{FitConfig, RetrievalParams};

/// Path tried when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "./config/anirec.toml";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub catalog: CatalogColumns,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub images: ImagesConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    /// Holds `raw.csv`, `train.csv` and `test.csv`.
    pub dir: PathBuf,
    pub artifacts_dir: PathBuf,
    /// Catalog CSV read by `anirec ingest` when no path is passed.
    pub source: Option<PathBuf>,
    pub test_ratio: f64,
    pub seed: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./data"),
            artifacts_dir: PathBuf::from("./artifacts"),
            source: None,
            test_ratio: 0.2,
            seed: 0,
        }
    }
}

/// Header names of the catalog CSV columns.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CatalogColumns {
    pub id: String,
    pub english_title: String,
    pub fallback_title: String,
    pub genre: String,
    pub episodes: String,
    pub rating: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for CatalogColumns {
    fn default() -> Self {
        Self {
            id: "id".to_string(),
            english_title: "englishTitle".to_string(),
            fallback_title: "title_userPreferred".to_string(),
            genre: "genre".to_string(),
            episodes: "episodes".to_string(),
            rating: "rating".to_string(),
            kind: "type".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub vocab_size: usize,
    pub dims: usize,
    pub seed: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            vocab_size: DEFAULT_VOCAB_SIZE,
            dims: DEFAULT_DIMS,
            seed: DEFAULT_SEED,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Neighbors fetched before filtering.
    pub candidate_k: usize,
    pub final_limit: usize,
    /// Neighbor count the fitted index answers with by default.
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            candidate_k: 20,
            final_limit: 10,
            default_k: DEFAULT_K,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ImagesConfig {
    /// JSON object mapping titles to image URLs.
    pub map: Option<PathBuf>,
    pub timeout_ms: u64,
    pub placeholder: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            map: None,
            timeout_ms: 2000,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

impl Config {
    pub fn fit_config(&self) -> FitConfig {
        FitConfig {
            embedder: EmbedderConfig {
                vocab_size: self.embedding.vocab_size,
                dims: self.embedding.dims,
                seed: self.embedding.seed,
            },
            default_k: self.retrieval.default_k,
        }
    }

    pub fn retrieval_params(&self) -> RetrievalParams {
        RetrievalParams {
            candidate_k: self.retrieval.candidate_k,
            final_limit: self.retrieval.final_limit,
            placeholder: self.images.placeholder.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..1.0).contains(&self.data.test_ratio) {
            bail!("data.test_ratio must be in [0.0, 1.0)");
        }

        if self.embedding.vocab_size < 2 {
            bail!("embedding.vocab_size must be >= 2 (bucket 0 is reserved for padding)");
        }
        if self.embedding.dims == 0 {
            bail!("embedding.dims must be > 0");
        }

        if self.retrieval.final_limit < 1 {
            bail!("retrieval.final_limit must be >= 1");
        }
        if self.retrieval.candidate_k < self.retrieval.final_limit {
            bail!(
                "retrieval.candidate_k ({}) must be >= retrieval.final_limit ({})",
                self.retrieval.candidate_k,
                self.retrieval.final_limit
            );
        }
        if self.retrieval.default_k < 1 {
            bail!("retrieval.default_k must be >= 1");
        }

        if !self.images.placeholder.contains("{title}") {
            tracing::warn!(
                placeholder = %self.images.placeholder,
                "images.placeholder has no {{title}} slot; every fallback image will be identical"
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load the explicitly requested config, or the default path when it
/// exists, or built-in defaults.
pub fn resolve_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_config(path);
    }
    let default_path = Path::new(DEFAULT_CONFIG_PATH);
    if default_path.exists() {
        return load_config(default_path);
    }
    tracing::debug!(path = DEFAULT_CONFIG_PATH, "no config file, using defaults");
    Ok(Config::default())
}
