//! Hashing title embedder.
//!
//! Maps a title to a fixed `D`-dimensional vector without training:
//!
//! 1. Normalize the title with [`TextNormalizer`].
//! 2. Tokenize on whitespace and punctuation.
//! 3. Hash each token into a bucket in `[1, V)`; bucket `0` is the padding
//!    sentinel.
//! 4. Pre-pad (or pre-truncate) the bucket sequence to the fitted length `L`.
//! 5. Look each bucket up in a frozen `V x D` table and mean-pool over the
//!    sequence. Padding positions take part in the mean.
//!
//! The table and `L` are fixed when the embedder is fitted and persisted
//! with it, so a title always embeds to the same vector no matter which
//! other titles share its batch. A title with no tokens embeds to the
//! padding row.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{RecommendError, Result};
use crate::text::TextNormalizer;

pub const DEFAULT_VOCAB_SIZE: usize = 500;
pub const DEFAULT_DIMS: usize = 100;
pub const DEFAULT_SEED: u64 = 42;

/// Bucket reserved for padding positions.
pub const PAD_INDEX: usize = 0;

/// Characters treated as token separators in addition to whitespace.
const TOKEN_FILTERS: &str = "!\"#$%&()*+,-./:;<=>?@[\\]^_`{|}~";

/// Embedder hyper-parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedderConfig {
    /// Hash vocabulary size `V` (bucket count including the padding bucket).
    pub vocab_size: usize,
    /// Embedding dimension `D`.
    pub dims: usize,
    /// Seed for the table initializer.
    pub seed: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            vocab_size: DEFAULT_VOCAB_SIZE,
            dims: DEFAULT_DIMS,
            seed: DEFAULT_SEED,
        }
    }
}

/// Split normalized text into tokens.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split(|c: char| c.is_whitespace() || TOKEN_FILTERS.contains(c))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Hash a token into a bucket in `[1, vocab_size)`.
///
/// Uses the first 8 bytes of the token's SHA-256 digest so buckets are
/// stable across processes and platforms. Collisions are expected.
pub fn hash_bucket(token: &str, vocab_size: usize) -> usize {
    let digest = Sha256::digest(token.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    let h = u64::from_le_bytes(head);
    (h % (vocab_size as u64 - 1)) as usize + 1
}

/// Fitted hashing embedder: frozen table plus fixed sequence length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TitleEmbedder {
    vocab_size: usize,
    dims: usize,
    seq_len: usize,
    seed: u64,
    /// Row-major `vocab_size x dims` table.
    weights: Vec<f32>,
    #[serde(skip)]
    normalizer: TextNormalizer,
}

impl TitleEmbedder {
    /// Fit on a training corpus of raw titles.
    ///
    /// Only the sequence length is learned from data (the longest
    /// normalized title, at least 1). The table is drawn from a standard
    /// normal distribution seeded by `config.seed`.
    pub fn fit<'a, I>(titles: I, config: EmbedderConfig) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let normalizer = TextNormalizer::english();
        let seq_len = titles
            .into_iter()
            .map(|t| tokenize(&normalizer.normalize(t)).len())
            .max()
            .unwrap_or(0)
            .max(1);

        let vocab_size = config.vocab_size.max(2);
        let mut rng = StdRng::seed_from_u64(config.seed);
        let weights = (0..vocab_size * config.dims)
            .map(|_| rng.sample::<f32, _>(StandardNormal))
            .collect();

        tracing::debug!(vocab_size, dims = config.dims, seq_len, "fitted title embedder");

        Self {
            vocab_size,
            dims: config.dims,
            seq_len,
            seed: config.seed,
            weights,
            normalizer,
        }
    }

    /// Check a deserialized embedder for internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.vocab_size < 2 || self.dims == 0 || self.seq_len == 0 {
            return Err(RecommendError::missing_artifact(
                "embedder",
                format!(
                    "invalid shape: vocab_size={} dims={} seq_len={}",
                    self.vocab_size, self.dims, self.seq_len
                ),
            ));
        }
        if self.weights.len() != self.vocab_size * self.dims {
            return Err(RecommendError::missing_artifact(
                "embedder",
                format!(
                    "table has {} weights, expected {}",
                    self.weights.len(),
                    self.vocab_size * self.dims
                ),
            ));
        }
        Ok(())
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Bucket sequence for a raw title, padded or truncated to `seq_len`.
    ///
    /// Padding is prepended; truncation drops leading tokens.
    pub fn encode_indices(&self, title: &str) -> Vec<usize> {
        let normalized = self.normalizer.normalize(title);
        let buckets: Vec<usize> = tokenize(&normalized)
            .into_iter()
            .map(|tok| hash_bucket(tok, self.vocab_size))
            .collect();

        if buckets.len() >= self.seq_len {
            return buckets[buckets.len() - self.seq_len..].to_vec();
        }
        let mut padded = vec![PAD_INDEX; self.seq_len - buckets.len()];
        padded.extend(buckets);
        padded
    }

    /// Embed one raw title.
    pub fn embed(&self, title: &str) -> Vec<f32> {
        let indices = self.encode_indices(title);
        let mut pooled = vec![0.0f32; self.dims];
        for &idx in &indices {
            let row = &self.weights[idx * self.dims..(idx + 1) * self.dims];
            for (acc, w) in pooled.iter_mut().zip(row) {
                *acc += w;
            }
        }
        let n = indices.len() as f32;
        for v in &mut pooled {
            *v /= n;
        }
        pooled
    }

    /// Embed a batch of raw titles, one vector per title in input order.
    pub fn embed_batch<'a, I>(&self, titles: I) -> Vec<Vec<f32>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        titles.into_iter().map(|t| self.embed(t)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> EmbedderConfig {
        EmbedderConfig {
            vocab_size: 50,
            dims: 8,
            seed: 7,
        }
    }

    #[test]
    fn test_tokenize_splits_punctuation() {
        assert_eq!(
            tokenize("steins;gate re:zero"),
            vec!["steins", "gate", "re", "zero"]
        );
        assert!(tokenize("").is_empty());
        assert!(tokenize(" :: ").is_empty());
    }

    #[test]
    fn test_hash_bucket_range_and_stability() {
        for tok in ["naruto", "bleach", "one", "piece", "x"] {
            let b = hash_bucket(tok, 500);
            assert!((1..500).contains(&b), "bucket {} out of range", b);
            assert_eq!(b, hash_bucket(tok, 500));
        }
    }

    #[test]
    fn test_seq_len_is_longest_title() {
        let e = TitleEmbedder::fit(["Naruto", "Fullmetal Alchemist Brotherhood"], small_config());
        assert_eq!(e.seq_len(), 3);
        let e = TitleEmbedder::fit(std::iter::empty(), small_config());
        assert_eq!(e.seq_len(), 1);
    }

    #[test]
    fn test_encode_pre_pads_and_pre_truncates() {
        let e = TitleEmbedder::fit(["The Gamma Beta Delta"], small_config());
        assert_eq!(e.seq_len(), 3);

        let short = e.encode_indices("Naruto");
        assert_eq!(short.len(), 3);
        assert_eq!(&short[..2], &[PAD_INDEX, PAD_INDEX]);
        assert_ne!(short[2], PAD_INDEX);

        let long = e.encode_indices("one two three four five");
        assert_eq!(long.len(), 3);
        let tail = e.encode_indices("three four five");
        assert_eq!(long, tail);
    }

    #[test]
    fn test_embedding_is_batch_independent() {
        let e = TitleEmbedder::fit(["Naruto", "Cowboy Bebop", "Fullmetal Alchemist"], small_config());
        let alone = e.embed("Naruto");
        let batch = e.embed_batch(["Naruto", "Some Much Longer Title Here"]);
        assert_eq!(alone, batch[0]);
    }

    #[test]
    fn test_empty_title_embeds_to_padding_row() {
        let e = TitleEmbedder::fit(["Naruto Shippuden"], small_config());
        let v = e.embed("");
        assert_eq!(v.len(), 8);
        assert!(v.iter().all(|x| x.is_finite()));
        assert_eq!(v, e.weights[..8].to_vec());
    }

    #[test]
    fn test_same_seed_same_table() {
        let a = TitleEmbedder::fit(["Naruto"], small_config());
        let b = TitleEmbedder::fit(["Bleach"], small_config());
        assert_eq!(a.weights, b.weights);
        assert_eq!(a.embed("Naruto"), b.embed("Naruto"));
    }

    #[test]
    fn test_validate_rejects_truncated_table() {
        let mut e = TitleEmbedder::fit(["Naruto"], small_config());
        assert!(e.validate().is_ok());
        e.weights.pop();
        assert!(matches!(
            e.validate(),
            Err(RecommendError::MissingArtifact { .. })
        ));
    }
}
