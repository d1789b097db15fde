//! # Anime Recs CLI (`anirec`)
//!
//! ## Usage
//!
//! ```bash
//! anirec --config ./config/anirec.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `anirec ingest [csv]` | Parse the catalog and write the train/test split |
//! | `anirec train` | Fit features and the index, publish artifacts |
//! | `anirec recommend` | Recommend titles for a query |
//! | `anirec inspect` | Show what the published artifacts contain |
//! | `anirec serve` | Start the JSON HTTP server |
//!
//! Diagnostics are written to stderr; set `ANIREC_LOG` (e.g.
//! `ANIREC_LOG=debug`) to change verbosity.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use anime_recs::anime_recs_core::models::QueryRecord;
use anime_recs::{config, ingest, inspect, recommend, server, train};

/// Anime Recs CLI: content-based anime recommendations.
#[derive(Parser)]
#[command(
    name = "anirec",
    about = "Anime Recs — content-based anime recommendations",
    version,
    long_about = "Anime Recs embeds anime titles, encodes genres and catalog metadata, and \
    answers sparse queries with the nearest distinct titles by cosine distance, from the \
    command line or over HTTP."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When omitted, `./config/anirec.toml` is used if it exists, otherwise
    /// built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a catalog CSV and write raw, train, and test splits.
    Ingest {
        /// Catalog CSV. Defaults to `[data].source`.
        source: Option<PathBuf>,
    },

    /// Fit the title embedder, genre encoder, tabular preprocessor, and
    /// index, then publish the artifacts.
    Train {
        /// Fit on every ingested row instead of the training split.
        #[arg(long)]
        full: bool,
    },

    /// Recommend titles similar to a query. Every field is optional.
    Recommend {
        /// English title to embed.
        #[arg(long)]
        title: Option<String>,

        /// Genre; repeat for several.
        #[arg(long = "genre")]
        genres: Vec<String>,

        #[arg(long)]
        episodes: Option<u32>,

        #[arg(long)]
        rating: Option<f64>,

        /// Format, e.g. `TV` or `MOVIE`.
        #[arg(long = "type")]
        kind: Option<String>,

        /// Print the JSON result contract instead of a listing.
        #[arg(long)]
        json: bool,
    },

    /// Show the published artifacts.
    Inspect,

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("ANIREC_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::resolve_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest { source } => {
            ingest::run_ingest(&cfg, source.as_deref())?;
        }
        Commands::Train { full } => {
            train::run_train(&cfg, full)?;
        }
        Commands::Recommend {
            title,
            genres,
            episodes,
            rating,
            kind,
            json,
        } => {
            let query = QueryRecord {
                english_title: title,
                genres: if genres.is_empty() { None } else { Some(genres) },
                episodes,
                rating,
                kind,
            };
            recommend::run_recommend(&cfg, &query, json)?;
        }
        Commands::Inspect => {
            inspect::run_inspect(&cfg)?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
