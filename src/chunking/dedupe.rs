//! SimHash-based near-duplicate suppression over a bounded lookback window.
//!
//! Each chunk is summarized as a 64-bit fingerprint of its lowercase word
//! tokens: every token hashes to a 64-bit value that casts a signed vote per
//! bit position, and the output bit is set where the net vote is
//! non-negative. Near-duplicate text yields fingerprints within a small
//! Hamming distance, so one linear scan of the recent-fingerprint window
//! decides keep-or-drop in O(window) per chunk.

use std::collections::VecDeque;
use std::hash::Hasher;

use rustc_hash::FxHasher;

use crate::config::DedupeConfig;

/// Computes the 64-bit SimHash fingerprint of a text's token multiset.
pub fn simhash64(text: &str) -> u64 {
    let mut votes = [0i32; 64];
    for token in tokens(text) {
        let mut hasher = FxHasher::default();
        hasher.write(token.as_bytes());
        let hash = hasher.finish();
        for (bit, vote) in votes.iter_mut().enumerate() {
            if (hash >> bit) & 1 == 1 {
                *vote += 1;
            } else {
                *vote -= 1;
            }
        }
    }
    let mut out = 0u64;
    for (bit, vote) in votes.iter().enumerate() {
        if *vote >= 0 {
            out |= 1 << bit;
        }
    }
    out
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

/// Stateful filter that drops chunks whose fingerprint sits within the
/// Hamming threshold of any fingerprint in the recent window.
#[derive(Debug)]
pub struct NearDuplicateFilter {
    config: DedupeConfig,
    window: VecDeque<u64>,
}

impl NearDuplicateFilter {
    pub fn new(config: DedupeConfig) -> Self {
        Self {
            config,
            window: VecDeque::with_capacity(config.lookback),
        }
    }

    /// Returns `true` when the chunk is novel enough to keep. Kept chunks
    /// append their fingerprint to the window, evicting the oldest entry
    /// once the window is full.
    pub fn admit(&mut self, text: &str) -> bool {
        let fingerprint = simhash64(text);
        let duplicate = self
            .window
            .iter()
            .any(|seen| (fingerprint ^ seen).count_ones() <= self.config.hamming_threshold);
        if duplicate {
            return false;
        }
        if self.window.len() == self.config.lookback {
            self.window.pop_front();
        }
        self.window.push_back(fingerprint);
        true
    }

    /// Filters a chunk sequence in order, retaining filter state for
    /// subsequent calls.
    pub fn filter(&mut self, chunks: Vec<String>) -> Vec<String> {
        chunks.into_iter().filter(|c| self.admit(c)).collect()
    }
}
