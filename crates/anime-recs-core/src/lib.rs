//! # Anime Recs Core
//!
//! Feature engineering and nearest-neighbor retrieval for anime
//! recommendations: data models, title normalization and embedding,
//! genre and tabular encoders, the feature assembler, the cosine index,
//! and the recommendation pipeline that ties them together.
//!
//! This crate performs no filesystem or network I/O. Catalog loading,
//! artifact persistence, and image lookup are collaborators owned by the
//! `anime-recs` app crate; the core only consumes in-memory tables and
//! produces plain data structures.
//!
//! ```text
//! CatalogEntry ──▶ TextNormalizer ──▶ TitleEmbedder ─┐
//!              ──▶ GenreEncoder ─────────────────────┼──▶ FeatureAssembler ──▶ CosineIndex
//!              ──▶ TabularPreprocessor ──────────────┘
//! ```

pub mod embedding;
pub mod error;
pub mod features;
pub mod genre;
pub mod image;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod tabular;
pub mod text;

pub use error::{RecommendError, Result};
