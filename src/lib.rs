//! # Anime Recs
//!
//! Content-based anime recommendations. A catalog of titles is turned into
//! feature vectors (title embedding, genre indicators, scaled metadata) and
//! indexed for cosine nearest-neighbor search; a sparse query is encoded
//! the same way and answered with the closest distinct titles.
//!
//! The feature engineering and retrieval live in [`anime_recs_core`]; this
//! crate adds everything that touches disk or the network.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ catalog.csv  │──▶│   ingest    │──▶│ train / test │
//! └──────────────┘   └─────────────┘   └──────┬───────┘
//!                                             │ train
//!                                             ▼
//!                                      ┌──────────────┐
//!                                      │  artifacts/  │
//!                                      └──────┬───────┘
//!                      ┌──────────────────────┤
//!                      ▼                      ▼
//!                 ┌──────────┐          ┌──────────┐
//!                 │   CLI    │          │   HTTP   │
//!                 │ (anirec) │          │  (axum)  │
//!                 └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! anirec ingest ./anime.csv          # parse and split the catalog
//! anirec train                       # fit and publish artifacts
//! anirec recommend --title "Naruto" --genre Action
//! anirec serve                       # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`ingest`] | Catalog CSV parsing and train/test split |
//! | [`artifacts`] | Fitted artifact store |
//! | [`train`] | Fitting command |
//! | [`recommend`] | Recommendation command |
//! | [`inspect`] | Artifact overview |
//! | [`images`] | Image resolvers |
//! | [`server`] | JSON HTTP server |

pub mod artifacts;
pub mod config;
pub mod images;
pub mod ingest;
pub mod inspect;
pub mod recommend;
pub mod server;
pub mod train;

pub use anime_recs_core;
