//! Hasher surface (spec §4.6 / §4.8).
//!
//! The core asks for exactly one thing: a word-sized hash of a key under a
//! caller-supplied seed. `FoldHasher` is the default, built on the same
//! multiply-fold mixer the teacher benchmark used for its `u64` keys
//! (`u64_fold_hash_fast::fold_hash_fast`), generalized to arbitrary
//! `Hash` keys by first collapsing the key to a `u64` with
//! `std::hash::Hasher` the way `std::collections::HashMap`'s `BuildHasher`
//! does.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Mixes a 64-bit value with a seed. Lifted directly from the teacher's
/// `u64_fold_hash_fast` benchmark helper: one seed XOR, one 128-bit
/// multiply, fold the halves together with XOR.
#[inline(always)]
pub fn fold_hash_fast(mut key: u64, seed: u64) -> u64 {
    const FOLD: u64 = 0x2d35_8dcc_aa6c_78a5;
    key ^= seed;
    let r = (key as u128) * FOLD as u128;
    ((r >> 64) as u64) ^ (r as u64)
}

/// Supplies a word-sized hash for a key under a given seed.
///
/// Implementations are polymorphic over key type. The seed is drawn fresh
/// by the map at construction and on every `clear`, so repeatedly clearing
/// and refilling a map with attacker-chosen keys does not converge on a
/// fixed probe sequence.
pub trait BuildMapHash<K: ?Sized> {
    fn hash_key(&self, key: &K, seed: u64) -> u64;
}

/// Default hasher: `Hash` the key with `DefaultHasher`, then fold the
/// result with the seed.
///
/// This is not a cryptographic hash (the core does not promise one — see
/// spec §1 non-goals). Callers who need hash-flooding resistance beyond
/// per-map seeding, or who want the `ahash`/`fxhash` speed of a
/// non-cryptographic hasher tuned for their key type, should supply their
/// own `BuildMapHash` via `MapBuilder::with_hash`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FoldHashBuilder;

impl<K: Hash + ?Sized> BuildMapHash<K> for FoldHashBuilder {
    #[inline]
    fn hash_key(&self, key: &K, seed: u64) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        fold_hash_fast(hasher.finish(), seed)
    }
}

/// Wraps a plain closure as a `BuildMapHash`, for `MapBuilder::with_hash`.
impl<K: ?Sized, F> BuildMapHash<K> for F
where
    F: Fn(&K, u64) -> u64,
{
    #[inline]
    fn hash_key(&self, key: &K, seed: u64) -> u64 {
        (self)(key, seed)
    }
}

/// Splits a raw 64-bit hash into directory bits (H1, returned as-is — the
/// directory reads its own high bits off the top) and the 7-bit H2 tag
/// stored in full control bytes.
#[inline(always)]
pub fn h2(hash: u64) -> u8 {
    (hash & 0x7F) as u8
}

/// The portion of the hash used to pick a probe start within a bucket:
/// everything above the low 7 bits.
#[inline(always)]
pub fn h1(hash: u64) -> u64 {
    hash >> 7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn h1_h2_partition_the_hash() {
        let hash = 0xABCD_EF01_2345_6789u64;
        assert_eq!(h2(hash), (hash & 0x7F) as u8);
        assert_eq!(h1(hash), hash >> 7);
        assert!(h2(hash) < 0x80);
    }

    #[test]
    fn fold_hash_fast_depends_on_seed() {
        assert_ne!(fold_hash_fast(42, 1), fold_hash_fast(42, 2));
    }

    #[test]
    fn default_builder_is_deterministic_for_fixed_seed() {
        let b = FoldHashBuilder;
        assert_eq!(
            BuildMapHash::<str>::hash_key(&b, "hello", 7),
            BuildMapHash::<str>::hash_key(&b, "hello", 7)
        );
    }
}
