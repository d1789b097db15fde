//! Catalog ingestion.
//!
//! Reads the raw catalog CSV, normalizes each row into a
//! [`CatalogEntry`], and writes a seeded train/test split under the data
//! directory:
//!
//! ```text
//! <data.dir>/raw.csv     every parsed row, in source order
//! <data.dir>/train.csv   rows used for fitting
//! <data.dir>/test.csv    held-out rows
//! ```
//!
//! Fields that are not valid UTF-8 are decoded as Latin-1 rather than
//! rejected. Rows whose id does not parse are skipped with a warning.
//!
//! Raw exports spell missing cells as `NaN`; [`read_catalog`] treats that
//! as absent. Files this crate wrote itself are read back with
//! [`read_snapshot`], where only an empty cell is absent.

use anyhow::{bail, Context, Result};
use csv::ByteRecord;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::borrow::Cow;
use std::path::{Path, PathBuf};

use anime_recs_core::models::{Catalog, CatalogEntry};

use crate::artifacts::write_atomic;
use crate::config::{CatalogColumns, Config};

pub const RAW_FILE: &str = "raw.csv";
pub const TRAIN_FILE: &str = "train.csv";
pub const TEST_FILE: &str = "test.csv";

/// Counts reported by [`run_ingest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub rows: usize,
    pub skipped: usize,
    pub train: usize,
    pub test: usize,
}

pub fn run_ingest(config: &Config, source: Option<&Path>) -> Result<IngestSummary> {
    let source: PathBuf = match source.or(config.data.source.as_deref()) {
        Some(p) => p.to_path_buf(),
        None => bail!("No catalog source given. Pass a CSV path or set data.source in the config."),
    };

    let (catalog, skipped) = read_catalog_counting(&source, &config.catalog, NanCells::Absent)?;
    if catalog.is_empty() {
        bail!("No usable rows in {}", source.display());
    }

    let (train, test) = split_catalog(&catalog, config.data.test_ratio, config.data.seed);

    std::fs::create_dir_all(&config.data.dir).with_context(|| {
        format!("Failed to create data directory: {}", config.data.dir.display())
    })?;
    write_catalog(&config.data.dir.join(RAW_FILE), &catalog, &config.catalog)?;
    write_catalog(&config.data.dir.join(TRAIN_FILE), &train, &config.catalog)?;
    write_catalog(&config.data.dir.join(TEST_FILE), &test, &config.catalog)?;

    let summary = IngestSummary {
        rows: catalog.len(),
        skipped,
        train: train.len(),
        test: test.len(),
    };
    tracing::info!(
        source = %source.display(),
        rows = summary.rows,
        skipped = summary.skipped,
        train = summary.train,
        test = summary.test,
        "ingested catalog"
    );

    println!("Ingested {} from {}", summary.rows, source.display());
    println!("  skipped: {}", summary.skipped);
    println!("  train:   {}", summary.train);
    println!("  test:    {}", summary.test);
    println!("  written to {}", config.data.dir.display());

    Ok(summary)
}

/// How a cell spelling `nan` is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NanCells {
    Absent,
    Text,
}

/// Read a raw catalog export with the given column names.
pub fn read_catalog(path: &Path, columns: &CatalogColumns) -> Result<Catalog> {
    read_catalog_counting(path, columns, NanCells::Absent).map(|(catalog, _)| catalog)
}

/// Read a catalog written by [`write_catalog`]. Cell text is kept as is.
pub fn read_snapshot(path: &Path, columns: &CatalogColumns) -> Result<Catalog> {
    read_catalog_counting(path, columns, NanCells::Text).map(|(catalog, _)| catalog)
}

/// Parse catalog CSV bytes produced by [`encode_catalog`].
pub fn parse_snapshot(bytes: &[u8], columns: &CatalogColumns) -> Result<Catalog> {
    let reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    parse_catalog(reader, Path::new("<snapshot>"), columns, NanCells::Text).map(|(c, _)| c)
}

fn read_catalog_counting(
    path: &Path,
    columns: &CatalogColumns,
    nan: NanCells,
) -> Result<(Catalog, usize)> {
    let reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open catalog CSV: {}", path.display()))?;
    parse_catalog(reader, path, columns, nan)
}

fn parse_catalog<R: std::io::Read>(
    mut reader: csv::Reader<R>,
    path: &Path,
    columns: &CatalogColumns,
    nan: NanCells,
) -> Result<(Catalog, usize)> {
    let headers = reader
        .byte_headers()
        .with_context(|| format!("Failed to read header row of {}", path.display()))?
        .clone();
    let layout = ColumnLayout::resolve(&headers, columns, nan)?;

    let mut entries = Vec::new();
    let mut skipped = 0usize;
    let mut line = 1usize;
    for record in reader.byte_records() {
        line += 1;
        let record = record.with_context(|| format!("Failed to read line {} of {}", line, path.display()))?;
        match layout.entry(&record) {
            Some(entry) => entries.push(entry),
            None => {
                skipped += 1;
                tracing::warn!(line, file = %path.display(), "skipping row without a valid id");
            }
        }
    }

    Ok((Catalog::new(entries), skipped))
}

/// Header offsets for each configured column. Only `id` is required.
struct ColumnLayout {
    id: usize,
    english_title: Option<usize>,
    fallback_title: Option<usize>,
    genre: Option<usize>,
    episodes: Option<usize>,
    rating: Option<usize>,
    kind: Option<usize>,
    nan: NanCells,
}

impl ColumnLayout {
    fn resolve(headers: &ByteRecord, columns: &CatalogColumns, nan: NanCells) -> Result<Self> {
        let names: Vec<String> = headers
            .iter()
            .map(|h| decode_field(h).trim_start_matches('\u{feff}').trim().to_string())
            .collect();
        let find = |name: &str| {
            let pos = names.iter().position(|h| h == name);
            if pos.is_none() {
                tracing::warn!(column = name, "catalog column not found, treating as absent");
            }
            pos
        };

        let id = match names.iter().position(|h| *h == columns.id) {
            Some(pos) => pos,
            None => bail!(
                "Catalog has no '{}' column. Available columns: {:?}",
                columns.id,
                names
            ),
        };

        Ok(Self {
            id,
            english_title: find(&columns.english_title),
            fallback_title: find(&columns.fallback_title),
            genre: find(&columns.genre),
            episodes: find(&columns.episodes),
            rating: find(&columns.rating),
            kind: find(&columns.kind),
            nan,
        })
    }

    fn entry(&self, record: &ByteRecord) -> Option<CatalogEntry> {
        let cell = |pos| field(record, pos, self.nan);
        let id = cell(Some(self.id)).and_then(|v| parse_whole(&v))?;
        Some(CatalogEntry {
            id,
            english_title: cell(self.english_title),
            fallback_title: cell(self.fallback_title),
            genres: cell(self.genre).and_then(|v| parse_genres(&v)),
            episodes: cell(self.episodes)
                .and_then(|v| parse_whole(&v))
                .and_then(|n| u32::try_from(n).ok()),
            rating: cell(self.rating)
                .and_then(|v| v.parse::<f64>().ok())
                .filter(|r| r.is_finite()),
            kind: cell(self.kind),
        })
    }
}

/// Trimmed, non-empty text of a cell.
fn field(record: &ByteRecord, pos: Option<usize>, nan: NanCells) -> Option<String> {
    let raw = record.get(pos?)?;
    let text = decode_field(raw);
    let text = text.trim();
    if text.is_empty() || (nan == NanCells::Absent && text.eq_ignore_ascii_case("nan")) {
        None
    } else {
        Some(text.to_string())
    }
}

/// UTF-8 when valid, otherwise Latin-1.
pub fn decode_field(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| b as char).collect()),
    }
}

/// Parse a non-negative integer, accepting float spellings like `"12.0"`.
fn parse_whole(value: &str) -> Option<u64> {
    if let Ok(n) = value.parse::<u64>() {
        return Some(n);
    }
    let f = value.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

/// Parse a genre cell: `['Action', 'Drama']`, `Action, Drama` or
/// `Action|Drama`. An empty list is absent.
pub fn parse_genres(cell: &str) -> Option<Vec<String>> {
    let cell = cell.trim();
    let inner = cell
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(cell);
    let genres: Vec<String> = inner
        .split([',', '|'])
        .map(|g| g.trim().trim_matches(|c| c == '\'' || c == '"').trim())
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect();
    if genres.is_empty() {
        None
    } else {
        Some(genres)
    }
}

/// Seeded shuffle split. Both halves keep source order; the training half
/// always keeps at least one row.
pub fn split_catalog(catalog: &Catalog, test_ratio: f64, seed: u64) -> (Catalog, Catalog) {
    let n = catalog.len();
    let n_test = ((n as f64 * test_ratio).ceil() as usize).min(n.saturating_sub(1));

    let mut order: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    order.shuffle(&mut rng);

    let mut is_test = vec![false; n];
    for &row in &order[..n_test] {
        is_test[row] = true;
    }

    let (test, train): (Vec<_>, Vec<_>) = catalog
        .iter()
        .cloned()
        .zip(is_test)
        .partition(|(_, t)| *t);
    (
        train.into_iter().map(|(e, _)| e).collect(),
        test.into_iter().map(|(e, _)| e).collect(),
    )
}

/// Write a catalog as CSV with the given column names.
pub fn write_catalog(path: &Path, catalog: &Catalog, columns: &CatalogColumns) -> Result<()> {
    let bytes = encode_catalog(catalog, columns)
        .with_context(|| format!("Failed to encode {}", path.display()))?;
    write_atomic(path, &bytes)
}

/// CSV bytes for a catalog. Genres are pipe-separated; absent fields are
/// empty cells.
pub fn encode_catalog(catalog: &Catalog, columns: &CatalogColumns) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record([
        &columns.id,
        &columns.english_title,
        &columns.fallback_title,
        &columns.genre,
        &columns.episodes,
        &columns.rating,
        &columns.kind,
    ])?;

    for entry in catalog.iter() {
        writer.write_record([
            entry.id.to_string(),
            entry.english_title.clone().unwrap_or_default(),
            entry.fallback_title.clone().unwrap_or_default(),
            entry.genres.as_ref().map(|g| g.join("|")).unwrap_or_default(),
            entry.episodes.map(|e| e.to_string()).unwrap_or_default(),
            entry.rating.map(|r| r.to_string()).unwrap_or_default(),
            entry.kind.clone().unwrap_or_default(),
        ])?;
    }

    writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV: {}", e.error()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_genres_formats() {
        let expected = Some(vec!["Action".to_string(), "Drama".to_string()]);
        assert_eq!(parse_genres("['Action', 'Drama']"), expected);
        assert_eq!(parse_genres("Action, Drama"), expected);
        assert_eq!(parse_genres("Action|Drama"), expected);
        assert_eq!(parse_genres("[\"Action\",\"Drama\"]"), expected);
        assert_eq!(parse_genres("[]"), None);
        assert_eq!(parse_genres("  "), None);
    }

    #[test]
    fn test_latin1_fallback() {
        assert_eq!(decode_field("Pokémon".as_bytes()), "Pokémon");
        assert_eq!(decode_field(&[b'P', b'o', b'k', 0xE9, b'm', b'o', b'n']), "Pokémon");
    }

    #[test]
    fn test_parse_whole() {
        assert_eq!(parse_whole("12"), Some(12));
        assert_eq!(parse_whole("12.0"), Some(12));
        assert_eq!(parse_whole("12.5"), None);
        assert_eq!(parse_whole("-1"), None);
        assert_eq!(parse_whole("abc"), None);
    }

    #[test]
    fn test_read_catalog_skips_bad_ids() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("anime.csv");
        fs::write(
            &path,
            "id,englishTitle,title_userPreferred,genre,episodes,rating,type\n\
             1,Naruto,Naruto,\"['Action', 'Adventure']\",220,79,TV\n\
             oops,Broken,,,,,\n\
             3,,Kimi no Na wa.,Romance,1.0,90,MOVIE\n\
             4,Bleach,,,nan,,\n",
        )
        .unwrap();

        let (catalog, skipped) =
            read_catalog_counting(&path, &CatalogColumns::default(), NanCells::Absent).unwrap();
        assert_eq!(skipped, 1);
        assert_eq!(catalog.len(), 3);

        let naruto = catalog.get(0).unwrap();
        assert_eq!(naruto.genres.as_ref().unwrap().len(), 2);
        assert_eq!(naruto.episodes, Some(220));

        let kimi = catalog.get(1).unwrap();
        assert_eq!(kimi.english_title, None);
        assert_eq!(kimi.embedding_title(), "Kimi no Na wa.");
        assert_eq!(kimi.episodes, Some(1));

        let bleach = catalog.get(2).unwrap();
        assert_eq!(bleach.episodes, None);
        assert_eq!(bleach.rating, None);
        assert_eq!(bleach.kind, None);
    }

    #[test]
    fn test_missing_id_column_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("anime.csv");
        fs::write(&path, "name,genre\nNaruto,Action\n").unwrap();
        assert!(read_catalog(&path, &CatalogColumns::default()).is_err());
    }

    #[test]
    fn test_custom_column_names() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("anime.csv");
        fs::write(&path, "anime_id,name,format\n7,Mushishi,TV\n").unwrap();
        let columns = CatalogColumns {
            id: "anime_id".to_string(),
            english_title: "name".to_string(),
            kind: "format".to_string(),
            ..CatalogColumns::default()
        };
        let catalog = read_catalog(&path, &columns).unwrap();
        assert_eq!(catalog.get(0).unwrap().english_title.as_deref(), Some("Mushishi"));
        assert_eq!(catalog.get(0).unwrap().kind.as_deref(), Some("TV"));
    }

    #[test]
    fn test_split_is_seeded_and_complete() {
        let catalog: Catalog = (0..10).map(CatalogEntry::bare).collect();
        let (train, test) = split_catalog(&catalog, 0.2, 0);
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);

        let (train2, test2) = split_catalog(&catalog, 0.2, 0);
        assert_eq!(train, train2);
        assert_eq!(test, test2);

        let mut ids: Vec<u64> = train.iter().chain(test.iter()).map(|e| e.id).collect();
        ids.sort();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
        assert!(train.entries().windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_split_keeps_a_training_row() {
        let catalog: Catalog = vec![CatalogEntry::bare(1)].into_iter().collect();
        let (train, test) = split_catalog(&catalog, 0.5, 0);
        assert_eq!(train.len(), 1);
        assert!(test.is_empty());
    }

    #[test]
    fn test_written_catalog_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("train.csv");
        let catalog = Catalog::new(vec![
            CatalogEntry {
                id: 5,
                english_title: Some("Cowboy Bebop".to_string()),
                fallback_title: None,
                genres: Some(vec!["Action".to_string(), "Sci-Fi".to_string()]),
                episodes: Some(26),
                rating: Some(86.5),
                kind: Some("TV".to_string()),
            },
            CatalogEntry::bare(6),
        ]);
        write_catalog(&path, &catalog, &CatalogColumns::default()).unwrap();
        assert_eq!(read_snapshot(&path, &CatalogColumns::default()).unwrap(), catalog);
    }

    #[test]
    fn test_nan_title_is_absent_only_in_raw_exports() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("catalog.csv");
        let catalog = Catalog::new(vec![CatalogEntry {
            english_title: Some("NaN".to_string()),
            kind: Some("nan".to_string()),
            ..CatalogEntry::bare(1)
        }]);
        write_catalog(&path, &catalog, &CatalogColumns::default()).unwrap();

        assert_eq!(read_snapshot(&path, &CatalogColumns::default()).unwrap(), catalog);
        let raw = read_catalog(&path, &CatalogColumns::default()).unwrap();
        assert_eq!(raw.get(0).unwrap().english_title, None);
        assert_eq!(raw.get(0).unwrap().kind, None);
    }
}
