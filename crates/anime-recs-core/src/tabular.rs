//! Column-wise tabular preprocessing for rating, episode count, and type.
//!
//! Each column has its own imputation + transform sub-pipeline:
//!
//! | Column | Imputation | Transform |
//! |--------|------------|-----------|
//! | rating | mean | standard scaling |
//! | episodes | median | standard scaling |
//! | type | most frequent | one-hot over fitted categories |
//!
//! Output columns are always `[rating, episodes, type one-hot...]`.
//!
//! Scaling statistics are computed on the imputed training column with the
//! population standard deviation; a zero deviation scales by 1. Unseen
//! categories encode to an all-zero one-hot block.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{RecommendError, Result};
use crate::models::{CatalogEntry, QueryRecord};

/// The tabular fields of one row, borrowed from a catalog entry or a query.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TabularInput<'a> {
    pub rating: Option<f64>,
    pub episodes: Option<f64>,
    pub kind: Option<&'a str>,
}

impl<'a> From<&'a CatalogEntry> for TabularInput<'a> {
    fn from(entry: &'a CatalogEntry) -> Self {
        Self {
            rating: entry.rating,
            episodes: entry.episodes.map(f64::from),
            kind: entry.kind.as_deref(),
        }
    }
}

impl<'a> From<&'a QueryRecord> for TabularInput<'a> {
    fn from(query: &'a QueryRecord) -> Self {
        Self {
            rating: query.rating,
            episodes: query.episodes.map(f64::from),
            kind: query.kind.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    Mean,
    Median,
}

/// Impute-then-standardize parameters for one numeric column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericColumn {
    pub strategy: ImputeStrategy,
    /// Value substituted for a missing entry.
    pub fill: f64,
    pub mean: f64,
    pub scale: f64,
}

impl NumericColumn {
    pub fn fit(strategy: ImputeStrategy, values: &[Option<f64>]) -> Self {
        let present: Vec<f64> = values.iter().flatten().copied().filter(|v| v.is_finite()).collect();
        let fill = match strategy {
            ImputeStrategy::Mean => mean(&present),
            ImputeStrategy::Median => median(&present),
        };

        let imputed: Vec<f64> = values
            .iter()
            .map(|v| v.filter(|x| x.is_finite()).unwrap_or(fill))
            .collect();
        let mu = mean(&imputed);
        let var = if imputed.is_empty() {
            0.0
        } else {
            imputed.iter().map(|x| (x - mu).powi(2)).sum::<f64>() / imputed.len() as f64
        };
        let std = var.sqrt();
        let scale = if std < f64::EPSILON { 1.0 } else { std };

        Self {
            strategy,
            fill,
            mean: mu,
            scale,
        }
    }

    pub fn transform(&self, value: Option<f64>) -> f64 {
        let v = value.filter(|x| x.is_finite()).unwrap_or(self.fill);
        (v - self.mean) / self.scale
    }
}

/// Most-frequent imputation plus one-hot encoding for one categorical column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalColumn {
    /// Category substituted for a missing entry.
    pub fill: String,
    /// Sorted categories observed at fit time.
    pub categories: Vec<String>,
}

impl CategoricalColumn {
    pub fn fit(column: &'static str, values: &[Option<&str>]) -> Result<Self> {
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for v in values.iter().flatten() {
            let v = v.trim();
            if !v.is_empty() {
                *counts.entry(v).or_default() += 1;
            }
        }
        // BTreeMap iterates in sorted order, so ties go to the smallest category.
        let fill = counts
            .iter()
            .fold(None::<(&str, usize)>, |best, (&cat, &n)| match best {
                Some((_, m)) if m >= n => best,
                _ => Some((cat, n)),
            })
            .map(|(cat, _)| cat.to_string())
            .ok_or(RecommendError::NoObservations { column })?;

        Ok(Self {
            fill,
            categories: counts.keys().map(|k| k.to_string()).collect(),
        })
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    pub fn transform(&self, value: Option<&str>) -> Vec<f64> {
        let v = value
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.fill);
        let mut out = vec![0.0; self.categories.len()];
        if let Ok(pos) = self.categories.binary_search_by(|c| c.as_str().cmp(v)) {
            out[pos] = 1.0;
        } else {
            tracing::debug!(category = v, "unseen category encoded as zeros");
        }
        out
    }
}

/// Fitted preprocessor for the three tabular columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularPreprocessor {
    pub rating: NumericColumn,
    pub episodes: NumericColumn,
    #[serde(rename = "type")]
    pub kind: CategoricalColumn,
}

impl TabularPreprocessor {
    pub fn fit<'a, I>(rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = TabularInput<'a>>,
    {
        let rows: Vec<TabularInput<'a>> = rows.into_iter().collect();
        if rows.is_empty() {
            return Err(RecommendError::EmptyCatalog);
        }
        let ratings: Vec<Option<f64>> = rows.iter().map(|r| r.rating).collect();
        let episodes: Vec<Option<f64>> = rows.iter().map(|r| r.episodes).collect();
        let kinds: Vec<Option<&str>> = rows.iter().map(|r| r.kind).collect();

        let fitted = Self {
            rating: NumericColumn::fit(ImputeStrategy::Mean, &ratings),
            episodes: NumericColumn::fit(ImputeStrategy::Median, &episodes),
            kind: CategoricalColumn::fit("type", &kinds)?,
        };
        tracing::debug!(
            rating_fill = fitted.rating.fill,
            episodes_fill = fitted.episodes.fill,
            type_fill = %fitted.kind.fill,
            categories = fitted.kind.width(),
            "fitted tabular preprocessor"
        );
        Ok(fitted)
    }

    /// Output width: two scaled numerics plus the one-hot block.
    pub fn width(&self) -> usize {
        2 + self.kind.width()
    }

    pub fn transform(&self, row: TabularInput<'_>) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.width());
        out.push(self.rating.transform(row.rating) as f32);
        out.push(self.episodes.transform(row.episodes) as f32);
        out.extend(self.kind.transform(row.kind).into_iter().map(|v| v as f32));
        out
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(rating: Option<f64>, episodes: Option<f64>, kind: Option<&str>) -> TabularInput<'_> {
        TabularInput {
            rating,
            episodes,
            kind,
        }
    }

    fn fitted() -> TabularPreprocessor {
        TabularPreprocessor::fit([
            row(Some(80.0), Some(12.0), Some("TV")),
            row(Some(60.0), Some(24.0), Some("TV")),
            row(None, None, Some("MOVIE")),
            row(Some(70.0), Some(1.0), None),
        ])
        .unwrap()
    }

    #[test]
    fn test_imputation_statistics() {
        let p = fitted();
        assert!((p.rating.fill - 70.0).abs() < 1e-9);
        assert!((p.episodes.fill - 12.0).abs() < 1e-9);
        assert_eq!(p.kind.fill, "TV");
        assert_eq!(p.kind.categories, vec!["MOVIE", "TV"]);
    }

    #[test]
    fn test_scaling_uses_imputed_column() {
        let p = fitted();
        // Imputed ratings: 80, 60, 70, 70 -> mean 70, population std sqrt(50).
        assert!((p.rating.mean - 70.0).abs() < 1e-9);
        assert!((p.rating.scale - 50f64.sqrt()).abs() < 1e-9);
        let z = p.rating.transform(Some(80.0));
        assert!((z - 10.0 / 50f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_output_layout() {
        let p = fitted();
        assert_eq!(p.width(), 4);
        let out = p.transform(row(Some(70.0), Some(12.0), Some("MOVIE")));
        assert_eq!(out.len(), 4);
        assert_eq!(&out[2..], &[1.0, 0.0]);
    }

    #[test]
    fn test_missing_values_equal_imputed_statistic() {
        let p = fitted();
        let missing = p.transform(row(None, None, None));
        let explicit = p.transform(row(
            Some(p.rating.fill),
            Some(p.episodes.fill),
            Some(p.kind.fill.as_str()),
        ));
        assert_eq!(missing, explicit);
    }

    #[test]
    fn test_unseen_category_all_zero() {
        let p = fitted();
        let out = p.transform(row(None, None, Some("ONA")));
        assert_eq!(&out[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_constant_column_scales_by_one() {
        let col = NumericColumn::fit(ImputeStrategy::Mean, &[Some(5.0), Some(5.0)]);
        assert_eq!(col.scale, 1.0);
        assert_eq!(col.transform(Some(5.0)), 0.0);
    }

    #[test]
    fn test_all_missing_numeric_column() {
        let col = NumericColumn::fit(ImputeStrategy::Median, &[None, None]);
        assert_eq!(col.fill, 0.0);
        assert_eq!(col.transform(None), 0.0);
    }

    #[test]
    fn test_mode_tie_breaks_to_smallest() {
        let col = CategoricalColumn::fit("type", &[Some("TV"), Some("OVA"), None]).unwrap();
        assert_eq!(col.fill, "OVA");
    }

    #[test]
    fn test_categorical_without_observations_fails() {
        let err = CategoricalColumn::fit("type", &[None, Some("  ")]).unwrap_err();
        assert!(matches!(err, RecommendError::NoObservations { column: "type" }));
    }

    #[test]
    fn test_empty_rows_fail() {
        let err = TabularPreprocessor::fit(std::iter::empty()).unwrap_err();
        assert!(matches!(err, RecommendError::EmptyCatalog));
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), 2.5);
    }
}
