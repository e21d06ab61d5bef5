//! Reel strip: the ordered multiset of bucket indices

use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// Ordered sequence of bucket indices whose multiset equals the weights
///
/// Fresh strips list bucket `i` exactly `w_i` times in bucket order;
/// [`ReelStrip::shuffle`] permutes them with a seeded stream. Shuffling
/// never changes the multiset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReelStrip {
    indices: Vec<u16>,
}

impl ReelStrip {
    /// Bucket `i` repeated `weights[i]` times, in bucket order
    pub fn from_weights(weights: &[u64]) -> Self {
        let total: u64 = weights.iter().sum();
        let mut indices = Vec::with_capacity(total as usize);
        for (bucket, &w) in weights.iter().enumerate() {
            indices.extend(std::iter::repeat_n(bucket as u16, w as usize));
        }
        Self { indices }
    }

    /// Seeded Fisher–Yates permutation
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        self.indices.shuffle(&mut rng);
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Bucket index at strip position `pos`
    pub fn bucket_at(&self, pos: usize) -> u16 {
        self.indices[pos]
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.indices.iter().copied()
    }

    /// Recover the per-bucket weight multiset over `k` buckets
    pub fn counts(&self, k: usize) -> Vec<u64> {
        let mut counts = vec![0u64; k];
        for &i in &self.indices {
            counts[i as usize] += 1;
        }
        counts
    }

    /// Serialize as plain text, one index per line
    pub fn to_text(&self) -> String {
        let mut out = String::with_capacity(self.indices.len() * 3);
        for &i in &self.indices {
            out.push_str(&i.to_string());
            out.push('\n');
        }
        out
    }

    pub fn from_text(text: &str) -> Result<Self, FormatError> {
        let mut indices = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let idx: u16 = line
                .trim()
                .parse()
                .map_err(|e| FormatError::parse(lineno + 1, format!("bad bucket index: {e}")))?;
            indices.push(idx);
        }
        Ok(Self { indices })
    }

    pub fn load(path: &Path) -> Result<Self, FormatError> {
        Self::from_text(&fs::read_to_string(path)?)
    }
}
