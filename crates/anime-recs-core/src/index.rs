//! Exact cosine nearest-neighbor index.
//!
//! Brute-force search over every training row. At catalog scale this is
//! fast enough and, unlike approximate structures, fully deterministic:
//! results are ordered by ascending cosine distance with ties broken by
//! row offset.
//!
//! Also provides the vector helpers used to persist the index matrix:
//! [`vec_to_blob`] / [`blob_to_vec`] encode `f32` values as little-endian
//! bytes.

use crate::error::{RecommendError, Result};
use crate::features::FeatureMatrix;

/// Default neighbor count when the caller does not ask for one.
pub const DEFAULT_K: usize = 10;

/// One search hit: a training row offset and its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub row: usize,
    pub distance: f32,
}

/// Fitted nearest-neighbor index over the training feature matrix.
#[derive(Debug, Clone)]
pub struct CosineIndex {
    matrix: FeatureMatrix,
    norms: Vec<f32>,
    default_k: usize,
}

impl CosineIndex {
    /// Fit over a training matrix. Fails on an empty matrix.
    pub fn fit(matrix: FeatureMatrix, default_k: usize) -> Result<Self> {
        if matrix.rows() == 0 {
            return Err(RecommendError::EmptyCatalog);
        }
        let norms = matrix.iter_rows().map(norm).collect();
        tracing::debug!(rows = matrix.rows(), dims = matrix.cols(), "fitted cosine index");
        Ok(Self {
            matrix,
            norms,
            default_k: default_k.max(1),
        })
    }

    pub fn len(&self) -> usize {
        self.matrix.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.rows() == 0
    }

    /// Width every query vector must have.
    pub fn dims(&self) -> usize {
        self.matrix.cols()
    }

    pub fn default_k(&self) -> usize {
        self.default_k
    }

    pub fn matrix(&self) -> &FeatureMatrix {
        &self.matrix
    }

    /// The `k` closest rows (capped to the index size), nearest first.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if vector.len() != self.dims() {
            return Err(RecommendError::FeatureShapeMismatch {
                expected: self.dims(),
                actual: vector.len(),
            });
        }
        let k = k.min(self.len());
        let q_norm = norm(vector);

        let mut hits: Vec<Neighbor> = self
            .matrix
            .iter_rows()
            .zip(&self.norms)
            .enumerate()
            .map(|(row, (values, &r_norm))| Neighbor {
                row,
                distance: distance_with_norms(vector, q_norm, values, r_norm),
            })
            .collect();
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.row.cmp(&b.row)));
        hits.truncate(k);
        Ok(hits)
    }

    /// Query with the index's default neighbor count.
    pub fn kneighbors(&self, vector: &[f32]) -> Result<Vec<Neighbor>> {
        self.query(vector, self.default_k)
    }
}

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

fn distance_with_norms(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    let denom = a_norm * b_norm;
    if denom < f32::EPSILON {
        return 1.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    (1.0 - dot / denom).max(0.0)
}

/// Encode a float vector as little-endian `f32` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes. Trailing bytes that do not form a
/// whole value are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
