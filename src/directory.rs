//! Directory & Map (spec §3, §4.4 split orchestration, §4.5): the
//! extendible-hashing top level. Holds one inline bucket plus a directory
//! of non-owning handles for multi-bucket maps, routes every operation to
//! the correct bucket, and grows the directory when a split needs more
//! addressing bits than the directory currently has.
//!
//! Ownership follows the teacher's "one allocation per bucket, freed on
//! drop" discipline (`aligned_cuckoo_table`), extended per the directory
//! aliasing note in the spec's design notes: each bucket is a `Box`, so its
//! heap address is stable even as the `Vec`s holding the boxes (or the
//! directory of aliasing pointers into them) reallocate. `bucket0` is a
//! `Box` field kept outside the owning `buckets` vector; every other
//! bucket created by a split lives in `buckets`. The directory's
//! `NonNull<Bucket<..>>` entries may alias `bucket0` once a directory
//! exists — the inline fast path only governs *lookup*, not ownership.

use std::ptr::NonNull;

use crate::alloc::{Allocator, Global};
use crate::bucket::{round_up_pow2_minus_one, Bucket};
use crate::control::GROUP_SIZE;
use crate::error::MapError;
use crate::hasher::{BuildMapHash, FoldHashBuilder};

/// Default split threshold (spec §8 edge cases: request 1000/1024 both
/// realize capacity 1023 — the default `max_bucket_capacity`).
pub const DEFAULT_MAX_BUCKET_CAPACITY: usize = 1023;

pub struct Map<K, V, H = FoldHashBuilder, A: Allocator = Global> {
    bucket0: Box<Bucket<K, V, A>>,
    dir: Vec<NonNull<Bucket<K, V, A>>>,
    buckets: Vec<Box<Bucket<K, V, A>>>,
    global_depth: u32,
    global_shift: u32,
    used: usize,
    max_bucket_capacity: usize,
    hasher: H,
    seed: u64,
    alloc: A,
}

// SAFETY: every `NonNull<Bucket<..>>` in `dir` either aliases `bucket0` or
// a `Box` owned by `buckets`; both are part of `Map`'s own fields, so
// standard `Send`/`Sync` auto-trait propagation through those owners is
// sound (the directory itself carries no exclusive access, only shared
// addressing information already implied by owning the boxes).
unsafe impl<K: Send, V: Send, H: Send, A: Allocator + Send> Send for Map<K, V, H, A> {}
unsafe impl<K: Sync, V: Sync, H: Sync, A: Allocator + Sync> Sync for Map<K, V, H, A> {}

impl<K, V, H, A: Allocator> Map<K, V, H, A> {
    /// Crate-internal constructor used by `MapBuilder`; `initial_capacity`
    /// follows spec §4.5 "Initial sizing". Panics on allocation failure; see
    /// `try_new_internal` for the fallible counterpart behind `try_build`.
    pub(crate) fn new_internal(
        initial_capacity: usize,
        max_bucket_capacity: usize,
        hasher: H,
        alloc: A,
    ) -> Self
    where
        A: Clone,
    {
        Self::try_new_internal(initial_capacity, max_bucket_capacity, hasher, alloc)
            .unwrap_or_else(|e| panic!("allocation failed: {e}"))
    }

    /// Fallible counterpart of `new_internal`, behind `MapBuilder::try_build`
    /// (spec §7 **[ADDED]**: `TryReserveError`-shaped entry points).
    pub(crate) fn try_new_internal(
        initial_capacity: usize,
        max_bucket_capacity: usize,
        hasher: H,
        alloc: A,
    ) -> Result<Self, MapError>
    where
        A: Clone,
    {
        let max_bucket_capacity = crate::bucket::round_down_pow2_minus_one(max_bucket_capacity);
        let seed = fastrand::u64(..);

        let target = if initial_capacity == 0 {
            0
        } else {
            round_up_pow2_minus_one(div_ceil(initial_capacity * GROUP_SIZE, 7))
        };

        if target <= max_bucket_capacity {
            let bucket0 = Box::new(Bucket::with_capacity(target, alloc.clone())?);
            return Ok(Self {
                bucket0,
                dir: Vec::new(),
                buckets: Vec::new(),
                global_depth: 0,
                global_shift: 0,
                used: 0,
                max_bucket_capacity,
                hasher,
                seed,
                alloc,
            });
        }

        // Every directory slot must map 1:1 onto a distinct bucket of equal
        // local_depth == global_depth, so the bucket count is rounded up to
        // the directory size itself, not to the raw `target / max_bucket_capacity`
        // ratio (which need not be a power of two).
        let n_buckets_needed = div_ceil(target, max_bucket_capacity);
        let global_depth = ceil_log2(n_buckets_needed);
        let dir_len = 1usize << global_depth;

        let mut bucket0 = Box::new(Bucket::with_capacity(max_bucket_capacity, alloc.clone())?);
        bucket0.local_depth = global_depth;
        bucket0.index = 0;

        let mut dir = Vec::with_capacity(dir_len);
        let mut buckets = Vec::with_capacity(dir_len - 1);
        dir.push(NonNull::from(&mut *bucket0));
        for b in 1..dir_len {
            let mut bucket = Box::new(Bucket::with_capacity(max_bucket_capacity, alloc.clone())?);
            bucket.local_depth = global_depth;
            bucket.index = b;
            let ptr = NonNull::from(&mut *bucket);
            dir.push(ptr);
            buckets.push(bucket);
        }

        Ok(Self {
            bucket0,
            dir,
            buckets,
            global_depth,
            global_shift: 64 - global_depth,
            used: 0,
            max_bucket_capacity,
            hasher,
            seed,
            alloc,
        })
    }

    #[inline(always)]
    fn bucket_ptr(&self, hash: u64) -> NonNull<Bucket<K, V, A>> {
        if self.global_shift == 0 {
            NonNull::from(&*self.bucket0)
        } else {
            self.dir[(hash >> self.global_shift) as usize]
        }
    }

    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    pub fn max_bucket_capacity(&self) -> usize {
        self.max_bucket_capacity
    }

    /// Equivalent to dropping the map; provided because spec §6 lists
    /// `close` as an explicit external operation even though Rust's own
    /// `Drop` already frees every bucket allocation.
    pub fn close(self) {}

    /// Ordered, deduplicated list of every distinct bucket, used by both
    /// iteration and the `Debug` impl.
    pub(crate) fn ordered_bucket_ptrs(&self) -> Vec<NonNull<Bucket<K, V, A>>> {
        if self.global_shift == 0 {
            return vec![NonNull::from(&*self.bucket0)];
        }
        let len = self.dir.len();
        let mut result = Vec::new();
        let mut pos = 0;
        while pos < len {
            let ptr = self.dir[pos];
            let local_depth = unsafe { ptr.as_ref() }.local_depth;
            result.push(ptr);
            pos += 1usize << (self.global_depth - local_depth);
        }
        result
    }

    /// Snapshot iteration with a pseudo-random starting bucket (spec §4.5 /
    /// §5): the canonical ordered bucket list (always starting from a valid
    /// bucket-range boundary) is rotated to a random offset, so every bucket
    /// is still visited exactly once, but the first one returned varies run
    /// to run.
    pub fn iter(&self) -> crate::iter::Iter<'_, K, V, A> {
        let mut ptrs = self.ordered_bucket_ptrs();
        if ptrs.len() > 1 {
            let start = fastrand::usize(..ptrs.len());
            ptrs.rotate_left(start);
        }
        crate::iter::Iter::new(ptrs)
    }
}

impl<K, V, H, A: Allocator> IntoIterator for Map<K, V, H, A> {
    type Item = (K, V);
    type IntoIter = crate::iter::IntoIter<K, V>;

    fn into_iter(self) -> Self::IntoIter {
        let Map { bucket0, buckets, .. } = self;
        let mut items = (*bucket0).into_vec();
        for b in buckets {
            items.extend((*b).into_vec());
        }
        crate::iter::IntoIter::new(items)
    }
}

impl<K: Eq, V, H: BuildMapHash<K> + Clone, A: Allocator + Clone> Extend<(K, V)> for Map<K, V, H, A> {
    fn extend<T: IntoIterator<Item = (K, V)>>(&mut self, iter: T) {
        for (k, v) in iter {
            self.insert(k, v);
        }
    }
}

impl<K: Eq + std::hash::Hash, V> FromIterator<(K, V)> for Map<K, V, FoldHashBuilder, Global> {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut map = Map::new_internal(0, DEFAULT_MAX_BUCKET_CAPACITY, FoldHashBuilder, Global);
        map.extend(iter);
        map
    }
}

impl<K: std::fmt::Debug + Eq, V: std::fmt::Debug, H: BuildMapHash<K> + Clone, A: Allocator + Clone>
    std::fmt::Debug for Map<K, V, H, A>
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<K: Eq, V, H: BuildMapHash<K> + Clone, A: Allocator + Clone> Map<K, V, H, A> {
    #[inline]
    fn hash_of(&self, key: &K) -> u64 {
        self.hasher.hash_key(key, self.seed)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_of(key);
        let bucket = unsafe { self.bucket_ptr(hash).as_ref() };
        bucket.find(key, hash).map(|idx| &bucket.slot(idx).1)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hash_of(key);
        let mut ptr = self.bucket_ptr(hash);
        let bucket = unsafe { ptr.as_mut() };
        let idx = bucket.find(key, hash)?;
        Some(bucket.slot_value_mut(idx))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.get(key).is_some()
    }

    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.try_insert(key, value)
            .unwrap_or_else(|e| panic!("allocation failed: {e}"))
    }

    /// Fallible counterpart of `insert` (spec §7 **[ADDED]**): returns
    /// `Err` instead of panicking when the configured allocator refuses a
    /// request needed to make room for the new entry.
    pub fn try_insert(&mut self, key: K, value: V) -> Result<Option<V>, MapError> {
        let hash = self.hash_of(&key);
        {
            let mut ptr = self.bucket_ptr(hash);
            let bucket = unsafe { ptr.as_mut() };
            if let Some(idx) = bucket.find(&key, hash) {
                return Ok(Some(bucket.replace_at(idx, value)));
            }
        }
        self.ensure_growth_room(hash)?;
        let mut ptr = self.bucket_ptr(hash);
        unsafe { ptr.as_mut() }.unchecked_insert(key, value, hash);
        self.used += 1;
        Ok(None)
    }

    pub fn entry(&mut self, key: K) -> crate::entry::Entry<'_, K, V, H, A> {
        let hash = self.hash_of(&key);
        let mut ptr = self.bucket_ptr(hash);
        let bucket = unsafe { ptr.as_mut() };
        if let Some(idx) = bucket.find(&key, hash) {
            return crate::entry::Entry::Occupied(bucket.slot_value_mut(idx));
        }
        crate::entry::Entry::Vacant(crate::entry::VacantEntry { map: self, key })
    }

    /// Inserts a key already proven absent by `entry`, returning a
    /// reference to the freshly stored value.
    pub(crate) fn insert_vacant(&mut self, key: K, value: V) -> &mut V {
        let hash = self.hash_of(&key);
        self.ensure_growth_room(hash)
            .unwrap_or_else(|e| panic!("allocation failed: {e}"));
        let mut ptr = self.bucket_ptr(hash);
        let idx = unsafe { ptr.as_mut() }.unchecked_insert(key, value, hash);
        self.used += 1;
        unsafe { ptr.as_mut() }.slot_value_mut(idx)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let hash = self.hash_of(key);
        let mut ptr = self.bucket_ptr(hash);
        let bucket = unsafe { ptr.as_mut() };
        let (_, v) = bucket.remove_by(hash, |k| k == key)?;
        self.used -= 1;
        Some(v)
    }

    pub fn clear(&mut self) {
        self.bucket0.clear();
        for b in &mut self.buckets {
            b.clear();
        }
        self.used = 0;
        self.seed = fastrand::u64(..);
    }

    fn ensure_growth_room(&mut self, hash: u64) -> Result<(), MapError> {
        loop {
            let bucket = unsafe { self.bucket_ptr(hash).as_ref() };
            if !bucket.needs_growth() {
                return Ok(());
            }
            self.rehash_or_grow(hash)?;
        }
    }

    /// spec §4.4 "rehash_or_grow".
    fn rehash_or_grow(&mut self, hash: u64) -> Result<(), MapError> {
        let hasher = self.hasher.clone();
        let seed = self.seed;
        let hash_of = move |k: &K| hasher.hash_key(k, seed);

        let mut ptr = self.bucket_ptr(hash);
        let bucket = unsafe { ptr.as_mut() };
        let capacity = bucket.capacity();
        let tombstones = bucket.tombstones();

        if capacity > GROUP_SIZE && tombstones * 3 >= capacity {
            #[cfg(feature = "trace")]
            tracing::trace!(capacity, tombstones, "rehashing bucket in place");
            bucket.rehash_in_place(&hash_of);
            return Ok(());
        }

        let new_capacity = (2 * capacity + 1).max(GROUP_SIZE - 1);
        if new_capacity > self.max_bucket_capacity {
            self.split_bucket(ptr, &hash_of)
        } else {
            #[cfg(feature = "trace")]
            tracing::trace!(from = capacity, to = new_capacity, "resizing bucket in place");
            bucket.resize(new_capacity, &hash_of)
        }
    }

    /// spec §4.4 "Split", including the two degenerate fallbacks and
    /// directory growth for the normal case.
    fn split_bucket(
        &mut self,
        mut bucket_ptr: NonNull<Bucket<K, V, A>>,
        hash_of: &impl Fn(&K) -> u64,
    ) -> Result<(), MapError> {
        let local_depth_before = unsafe { bucket_ptr.as_ref() }.local_depth;
        #[cfg(feature = "trace")]
        tracing::trace!(local_depth_before, "splitting bucket");
        let sibling = unsafe { bucket_ptr.as_mut() }.split(local_depth_before, hash_of)?;

        let self_len = unsafe { bucket_ptr.as_ref() }.len();
        let sibling_len = sibling.len();

        if sibling_len == 0 {
            // Degenerate: nothing moved. Widen the split threshold and
            // fall back to a plain resize of the bucket we tried to split.
            drop(sibling);
            self.max_bucket_capacity = self.max_bucket_capacity.saturating_mul(2) + 1;
            let bucket = unsafe { bucket_ptr.as_mut() };
            let new_capacity = (2 * bucket.capacity() + 1).max(GROUP_SIZE - 1);
            return bucket.resize(new_capacity, hash_of);
        }

        if self_len == 0 || sibling.needs_growth() {
            // Everything moved, or the sibling is already overcrowded:
            // widen the threshold and let the sibling's *contents* replace
            // the original bucket in place (same Box, same address, so
            // any directory entries already aliasing it stay valid).
            self.max_bucket_capacity = self.max_bucket_capacity.saturating_mul(2) + 1;
            let index = unsafe { bucket_ptr.as_ref() }.index;
            let mut sibling = sibling;
            sibling.local_depth = local_depth_before;
            sibling.index = index;
            unsafe { *bucket_ptr.as_mut() = sibling };
            let bucket = unsafe { bucket_ptr.as_mut() };
            let new_capacity = (2 * bucket.capacity() + 1).max(GROUP_SIZE - 1);
            return bucket.resize(new_capacity, hash_of);
        }

        // Normal case.
        if local_depth_before >= self.global_depth {
            self.grow_directory(local_depth_before + 1);
        }
        unsafe { bucket_ptr.as_mut() }.local_depth = local_depth_before + 1;

        let mut sibling_box = Box::new(sibling);
        sibling_box.local_depth = local_depth_before + 1;
        let span = 1usize << (self.global_depth - (local_depth_before + 1));
        let self_index = unsafe { bucket_ptr.as_ref() }.index;
        sibling_box.index = self_index + span;
        let sibling_index = sibling_box.index;
        let sibling_ptr = NonNull::from(&mut *sibling_box);
        for slot in &mut self.dir[sibling_index..sibling_index + span] {
            *slot = sibling_ptr;
        }
        self.buckets.push(sibling_box);

        if unsafe { bucket_ptr.as_ref() }.needs_growth() {
            unsafe { bucket_ptr.as_mut() }.rehash_in_place(hash_of);
        }
        Ok(())
    }

    /// spec §4.5 "Directory growth".
    fn grow_directory(&mut self, new_depth: u32) {
        #[cfg(feature = "trace")]
        tracing::trace!(old_depth = self.global_depth, new_depth, "growing directory");
        let old_entries: Vec<NonNull<Bucket<K, V, A>>> = if self.global_depth == 0 {
            vec![NonNull::from(&*self.bucket0)]
        } else {
            self.dir.clone()
        };

        let mut new_dir = Vec::with_capacity(1usize << new_depth);
        let mut i = 0;
        while i < old_entries.len() {
            let ptr = old_entries[i];
            let mut j = i + 1;
            while j < old_entries.len() && old_entries[j] == ptr {
                j += 1;
            }
            let local_depth = unsafe { ptr.as_ref() }.local_depth;
            let span = 1usize << (new_depth - local_depth);
            let write_pos = new_dir.len();
            unsafe { (*ptr.as_ptr()).index = write_pos };
            for _ in 0..span {
                new_dir.push(ptr);
            }
            i = j;
        }

        self.dir = new_dir;
        self.global_depth = new_depth;
        self.global_shift = 64 - new_depth;
    }
}

fn div_ceil(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

fn ceil_log2(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        (usize::BITS - (n - 1).leading_zeros()).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alloc::Global;
    use crate::hasher::FoldHashBuilder;
    use std::collections::HashMap as StdHashMap;

    fn new_map() -> Map<u64, u64, FoldHashBuilder, Global> {
        Map::new_internal(0, DEFAULT_MAX_BUCKET_CAPACITY, FoldHashBuilder, Global)
    }

    #[test]
    fn basic_lifecycle_matches_reference_map() {
        let mut map = new_map();
        let mut model = StdHashMap::new();
        for k in 0u64..10 {
            assert_eq!(map.insert(k, k + 10), None);
            model.insert(k, k + 10);
        }
        assert_eq!(map.len(), 10);
        for k in 0u64..10 {
            assert_eq!(map.get(&k), Some(&(k + 10)));
        }
        for k in 0u64..10 {
            assert_eq!(map.insert(k, k + 20), Some(k + 10));
        }
        assert_eq!(map.len(), 10);
        for k in 0u64..10 {
            assert_eq!(map.remove(&k), Some(k + 20));
        }
        assert_eq!(map.len(), 0);
        for k in 0u64..10 {
            assert_eq!(map.get(&k), None);
        }
        let _ = model;
    }

    #[test]
    fn overwrite_keeps_len_constant() {
        let mut map = new_map();
        map.insert(1u64, 100u64);
        map.insert(1u64, 200u64);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&200));
    }

    #[test]
    fn clear_resets_len() {
        let mut map = new_map();
        for k in 0u64..50 {
            map.insert(k, k);
        }
        map.clear();
        assert_eq!(map.len(), 0);
        for k in 0u64..50 {
            assert_eq!(map.get(&k), None);
        }
    }

    #[test]
    fn large_insert_workload_triggers_splits_and_resizes() {
        let mut map: Map<u64, u64, FoldHashBuilder, Global> =
            Map::new_internal(0, 7, FoldHashBuilder, Global);
        let mut model = StdHashMap::new();
        for k in 0u64..20_000 {
            map.insert(k, k * 2);
            model.insert(k, k * 2);
        }
        assert_eq!(map.len(), model.len());
        for (&k, &v) in &model {
            assert_eq!(map.get(&k), Some(&v));
        }
        for k in (0u64..20_000).step_by(3) {
            assert_eq!(map.remove(&k), model.remove(&k));
        }
        assert_eq!(map.len(), model.len());
        for (&k, &v) in &model {
            assert_eq!(map.get(&k), Some(&v));
        }
    }

    #[test]
    fn try_insert_matches_insert_under_normal_conditions() {
        let mut map = new_map();
        assert_eq!(map.try_insert(1u64, 2u64).unwrap(), None);
        assert_eq!(map.try_insert(1u64, 3u64).unwrap(), Some(2));
        assert_eq!(map.get(&1), Some(&3));
    }

    #[test]
    fn initial_sizing_realizes_expected_capacities() {
        let cases = [(0usize, 0usize), (1, 7), (7, 7), (8, 15)];
        for (requested, expected) in cases {
            let map: Map<u64, u64, FoldHashBuilder, Global> =
                Map::new_internal(requested, DEFAULT_MAX_BUCKET_CAPACITY, FoldHashBuilder, Global);
            assert_eq!(map.bucket0.capacity(), expected, "requested={requested}");
        }
        for requested in [1000usize, 1024] {
            let map: Map<u64, u64, FoldHashBuilder, Global> =
                Map::new_internal(requested, DEFAULT_MAX_BUCKET_CAPACITY, FoldHashBuilder, Global);
            for ptr in map.ordered_bucket_ptrs() {
                assert_eq!(unsafe { ptr.as_ref() }.capacity(), DEFAULT_MAX_BUCKET_CAPACITY);
            }
        }
    }
}
