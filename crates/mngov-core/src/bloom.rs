//! A tweaked [Bloom filter](https://en.wikipedia.org/wiki/Bloom_filter) over vote hashes.
//!
//! Peers attach one to a sync request so the responder can skip votes the
//! requester already holds.

use crate::hash::Hash256;
use serde::{Deserialize, Serialize};

/// Upper bound on filter size, in bytes.
pub const MAX_FILTER_BYTES: usize = 36_000;

/// Upper bound on the number of hash functions.
pub const MAX_HASH_FUNCS: u8 = 50;

/// A Bloom filter with a per-instance tweak.
///
/// `k` bit positions are derived from one blake3 digest using the
/// Kirsch-Mitzenmacher construction `h_i(x) = h1(x) + i * h2(x)`. The tweak is
/// mixed into the digest so two filters over the same items set different bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BloomFilter {
    bits: Vec<u64>,
    bit_count: u64,
    hashers: u8,
    tweak: u32,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at the given false positive rate.
    ///
    /// The rate is clamped into `(0, 1)` and the resulting size is capped at
    /// [`MAX_FILTER_BYTES`] and [`MAX_HASH_FUNCS`].
    #[must_use]
    pub fn with_rate(expected_items: usize, fp_rate: f64, tweak: u32) -> Self {
        let n = expected_items.max(1) as f64;
        let p = fp_rate.clamp(1e-9, 0.999_999);
        let ln2 = std::f64::consts::LN_2;

        let max_bits = (MAX_FILTER_BYTES * 8) as f64;
        let bits = (-n * p.ln() / (ln2 * ln2)).clamp(64.0, max_bits);
        let bit_count = (bits as u64).next_power_of_two().min(max_bits as u64);
        let hashers = ((bit_count as f64 / n) * ln2).round().clamp(1.0, f64::from(MAX_HASH_FUNCS)) as u8;

        Self {
            bits: vec![0; bit_count.div_ceil(64) as usize],
            bit_count,
            hashers,
            tweak,
        }
    }

    /// Number of hash functions.
    #[must_use]
    pub const fn hashers(&self) -> u8 {
        self.hashers
    }

    /// Number of bits in the filter.
    #[must_use]
    pub const fn bit_count(&self) -> u64 {
        self.bit_count
    }

    /// The tweak mixed into every digest.
    #[must_use]
    pub const fn tweak(&self) -> u32 {
        self.tweak
    }

    /// Returns true if the structure is internally consistent.
    ///
    /// Filters received from peers must pass this before being queried.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.bit_count > 0
            && self.hashers > 0
            && self.hashers <= MAX_HASH_FUNCS
            && self.bit_count <= (MAX_FILTER_BYTES * 8) as u64
            && self.bits.len() as u64 == self.bit_count.div_ceil(64)
    }

    fn indices(&self, item: &[u8]) -> impl Iterator<Item = u64> + use<> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.tweak.to_le_bytes());
        hasher.update(item);
        let digest = hasher.finalize();
        let bytes = digest.as_bytes();

        let mut h1 = [0u8; 8];
        h1.copy_from_slice(&bytes[0..8]);
        let mut h2 = [0u8; 8];
        h2.copy_from_slice(&bytes[8..16]);
        let h1 = u64::from_be_bytes(h1);
        let h2 = u64::from_be_bytes(h2) | 1;

        let bit_count = self.bit_count.max(1);
        (0..u64::from(self.hashers)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % bit_count)
    }

    /// Inserts raw bytes.
    pub fn insert(&mut self, item: &[u8]) {
        for index in self.indices(item) {
            if let Some(word) = self.bits.get_mut((index / 64) as usize) {
                *word |= 1 << (index % 64);
            }
        }
    }

    /// Returns true if the item is possibly present, false if definitely absent.
    #[must_use]
    pub fn contains(&self, item: &[u8]) -> bool {
        self.indices(item).all(|index| {
            self.bits
                .get((index / 64) as usize)
                .is_some_and(|word| word & (1 << (index % 64)) != 0)
        })
    }

    /// Inserts a hash.
    pub fn insert_hash(&mut self, hash: &Hash256) {
        self.insert(hash.as_bytes());
    }

    /// Checks a hash.
    #[must_use]
    pub fn contains_hash(&self, hash: &Hash256) -> bool {
        self.contains(hash.as_bytes())
    }
}
