//! Feature assembly.
//!
//! A feature row is the concatenation `[embedding | genre | tabular]` in
//! that fixed order. [`FeatureLayout`] records the width of each block so
//! training and inference can prove they agree before the index is queried.

use serde::{Deserialize, Serialize};

use crate::error::{RecommendError, Result};

/// Widths of the three feature blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureLayout {
    pub embedding: usize,
    pub genre: usize,
    pub tabular: usize,
}

impl FeatureLayout {
    pub fn width(&self) -> usize {
        self.embedding + self.genre + self.tabular
    }

    /// Fail with [`RecommendError::FeatureShapeMismatch`] unless `actual`
    /// equals this layout's total width.
    pub fn expect_width(&self, actual: usize) -> Result<()> {
        if actual != self.width() {
            return Err(RecommendError::FeatureShapeMismatch {
                expected: self.width(),
                actual,
            });
        }
        Ok(())
    }
}

/// Concatenate one row's blocks in `[embedding | genre | tabular]` order.
pub fn assemble(embedding: &[f32], genre: &[f32], tabular: &[f32]) -> Vec<f32> {
    let mut row = Vec::with_capacity(embedding.len() + genre.len() + tabular.len());
    row.extend_from_slice(embedding);
    row.extend_from_slice(genre);
    row.extend_from_slice(tabular);
    row
}

/// Dense row-major matrix of assembled feature rows.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl FeatureMatrix {
    /// Stack rows in order. Every row must have width `cols`.
    pub fn from_rows<I>(cols: usize, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<f32>>,
    {
        let mut data = Vec::new();
        let mut n = 0usize;
        for row in rows {
            if row.len() != cols {
                return Err(RecommendError::FeatureShapeMismatch {
                    expected: cols,
                    actual: row.len(),
                });
            }
            data.extend(row);
            n += 1;
        }
        Ok(Self {
            rows: n,
            cols,
            data,
        })
    }

    /// Wrap a flat row-major buffer.
    pub fn from_flat(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(RecommendError::FeatureShapeMismatch {
                expected: rows * cols,
                actual: data.len(),
            });
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn row(&self, i: usize) -> &[f32] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        (0..self.rows).map(move |i| self.row(i))
    }

    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }
}
