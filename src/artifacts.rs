//! Fitted artifact store.
//!
//! A directory of well-known keys written by `anirec train` and read by
//! every serving command:
//!
//! | Key | Content |
//! |-----|---------|
//! | `embedder.json` | embedding table, vocabulary size, sequence length |
//! | `genre_encoder.json` | sorted genre vocabulary |
//! | `preprocessor.json` | imputation and scaling statistics, type categories |
//! | `index.json` | index shape and default neighbor count |
//! | `index.bin` | training matrix as little-endian `f32` |
//! | `catalog.csv` | training rows, in index order |
//! | `manifest.json` | format version, fit time, widths, SHA-256 of every other key |
//!
//! Each file is written to a temporary file in the same directory and then
//! renamed into place. The manifest goes last and lists the digest of every
//! component it was written with. A reader that races a retrain can see an
//! old manifest next to new components; the digests catch that and the load
//! fails instead of mixing two fits.
//!
//! Loading reports every problem as a [`RecommendError`]: absent,
//! undecodable or mismatched files are `MissingArtifact`, and components
//! that disagree on widths are `FeatureShapeMismatch`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anime_recs_core::embedding::TitleEmbedder;
use anime_recs_core::features::{FeatureLayout, FeatureMatrix};
use anime_recs_core::genre::GenreEncoder;
use anime_recs_core::index::{blob_to_vec, vec_to_blob, CosineIndex};
use anime_recs_core::models::Catalog;
use anime_recs_core::pipeline::FittedArtifacts;
use anime_recs_core::tabular::TabularPreprocessor;
use anime_recs_core::RecommendError;

use crate::config::CatalogColumns;
use crate::ingest::{encode_catalog, parse_snapshot};

pub const FORMAT_VERSION: u32 = 2;

pub const MANIFEST: &str = "manifest.json";
pub const EMBEDDER: &str = "embedder.json";
pub const GENRE_ENCODER: &str = "genre_encoder.json";
pub const PREPROCESSOR: &str = "preprocessor.json";
pub const INDEX_META: &str = "index.json";
pub const INDEX_DATA: &str = "index.bin";
pub const CATALOG: &str = "catalog.csv";

/// Every key the manifest carries a digest for, in write order.
pub const COMPONENTS: [&str; 6] = [
    EMBEDDER,
    GENRE_ENCODER,
    PREPROCESSOR,
    INDEX_META,
    INDEX_DATA,
    CATALOG,
];

/// Summary of one fit, written last.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub fitted_at: DateTime<Utc>,
    pub rows: usize,
    pub layout: FeatureLayout,
    /// Hex SHA-256 per component key.
    pub checksums: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct IndexMeta {
    rows: usize,
    cols: usize,
    default_k: usize,
}

/// Artifacts and the catalog their index rows resolve to.
#[derive(Debug)]
pub struct LoadedArtifacts {
    pub manifest: Manifest,
    pub artifacts: FittedArtifacts,
    pub catalog: Catalog,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }

    /// Publish fitted artifacts and their training catalog.
    pub fn save(&self, artifacts: &FittedArtifacts, catalog: &Catalog) -> Result<Manifest> {
        std::fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create artifact directory: {}", self.dir.display())
        })?;

        let index = artifacts.index();
        let blob = vec_to_blob(index.matrix().as_flat());
        let meta = IndexMeta {
            rows: index.len(),
            cols: index.dims(),
            default_k: index.default_k(),
        };

        let files = [
            (EMBEDDER, encode_json(EMBEDDER, artifacts.embedder())?),
            (GENRE_ENCODER, encode_json(GENRE_ENCODER, artifacts.genres())?),
            (PREPROCESSOR, encode_json(PREPROCESSOR, artifacts.tabular())?),
            (INDEX_META, encode_json(INDEX_META, &meta)?),
            (INDEX_DATA, blob),
            (CATALOG, encode_catalog(catalog, &CatalogColumns::default())?),
        ];

        let mut checksums = BTreeMap::new();
        for (key, bytes) in &files {
            write_atomic(&self.path(key), bytes)?;
            checksums.insert(key.to_string(), sha256_hex(bytes));
        }

        let manifest = Manifest {
            format_version: FORMAT_VERSION,
            fitted_at: Utc::now(),
            rows: index.len(),
            layout: artifacts.layout(),
            checksums,
        };
        write_atomic(&self.path(MANIFEST), &encode_json(MANIFEST, &manifest)?)?;

        tracing::info!(
            dir = %self.dir.display(),
            rows = manifest.rows,
            width = manifest.layout.width(),
            "published artifacts"
        );
        Ok(manifest)
    }

    pub fn load_manifest(&self) -> Result<Manifest, RecommendError> {
        let manifest: Manifest = decode_json(MANIFEST, &self.read_bytes(MANIFEST)?)?;
        if manifest.format_version != FORMAT_VERSION {
            return Err(RecommendError::missing_artifact(
                MANIFEST,
                format!(
                    "format version {} is not supported (expected {})",
                    manifest.format_version, FORMAT_VERSION
                ),
            ));
        }
        Ok(manifest)
    }

    /// Load and cross-check every artifact.
    pub fn load(&self) -> Result<LoadedArtifacts, RecommendError> {
        let manifest = self.load_manifest()?;

        let embedder: TitleEmbedder =
            decode_json(EMBEDDER, &self.read_verified(&manifest, EMBEDDER)?)?;
        let genres: GenreEncoder =
            decode_json(GENRE_ENCODER, &self.read_verified(&manifest, GENRE_ENCODER)?)?;
        let tabular: TabularPreprocessor =
            decode_json(PREPROCESSOR, &self.read_verified(&manifest, PREPROCESSOR)?)?;
        let meta: IndexMeta = decode_json(INDEX_META, &self.read_verified(&manifest, INDEX_META)?)?;

        let blob = self.read_verified(&manifest, INDEX_DATA)?;
        let matrix = FeatureMatrix::from_flat(meta.rows, meta.cols, blob_to_vec(&blob))?;
        let index = CosineIndex::fit(matrix, meta.default_k)?;

        let artifacts = FittedArtifacts::from_parts(embedder, genres, tabular, index)?;
        manifest.layout.expect_width(artifacts.layout().width())?;

        let catalog_bytes = self.read_verified(&manifest, CATALOG)?;
        let catalog = parse_snapshot(&catalog_bytes, &CatalogColumns::default())
            .map_err(|e| RecommendError::missing_artifact(CATALOG, e))?;

        tracing::debug!(dir = %self.dir.display(), rows = manifest.rows, "loaded artifacts");
        Ok(LoadedArtifacts {
            manifest,
            artifacts,
            catalog,
        })
    }

    fn read_bytes(&self, key: &str) -> Result<Vec<u8>, RecommendError> {
        std::fs::read(self.path(key)).map_err(|e| RecommendError::missing_artifact(key, e))
    }

    /// Read a component and check it against the digest in the manifest.
    fn read_verified(&self, manifest: &Manifest, key: &str) -> Result<Vec<u8>, RecommendError> {
        let expected = manifest
            .checksums
            .get(key)
            .ok_or_else(|| RecommendError::missing_artifact(key, "no checksum in manifest"))?;
        let bytes = self.read_bytes(key)?;
        let actual = sha256_hex(&bytes);
        if &actual != expected {
            return Err(RecommendError::missing_artifact(
                key,
                format!("checksum mismatch: manifest has {}, file has {}", expected, actual),
            ));
        }
        Ok(bytes)
    }
}

fn encode_json<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).with_context(|| format!("Failed to encode {}", key))
}

fn decode_json<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, RecommendError> {
    serde_json::from_slice(bytes).map_err(|e| RecommendError::missing_artifact(key, e))
}

/// Write `bytes` to a temporary sibling of `path`, then rename it over `path`.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create temp file in {}", dir.display()))?;
    tmp.write_all(bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("Failed to publish {}", path.display()))?;
    Ok(())
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
