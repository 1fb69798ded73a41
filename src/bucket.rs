//! One Swiss table (spec §3, §4.3, §4.4): control array, slot array,
//! counters, local depth, and directory index. Find/insert/remove and the
//! rehash/resize/split machinery all live here — this is the ~55% of the
//! system the spec attributes to the bucket.
//!
//! Layout and raw-pointer ownership are grounded in the teacher's
//! `aligned_cuckoo_table`, which holds a single `NonNull<u8>` control
//! pointer and frees it through a `Dropper`-style guard on drop; here the
//! control array and slot array are two separate allocations (the spec
//! explicitly allows either a combined or a two-array layout) routed
//! through the pluggable `Allocator` instead of calling `std::alloc`
//! directly.

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::alloc::Allocator;
use crate::control::{Group, Tag, GROUP_SIZE};
use crate::error::MapError;
use crate::hasher::{h1, h2};
use crate::probe::ProbeSeq;

/// Growth-left initialization (spec §3): `floor(capacity*7/8)` once a
/// bucket spans at least one full group, else `capacity - 1` (and `0` for
/// the empty placeholder).
#[inline(always)]
pub(crate) fn growth_left_for(capacity: usize) -> usize {
    if capacity == 0 {
        0
    } else if capacity >= GROUP_SIZE {
        (capacity * 7) / 8
    } else {
        capacity - 1
    }
}

/// Smallest capacity of the form `2^k - 1` that is `>= v`, floored at
/// `GROUP_SIZE - 1` (a bucket below one group is never worth having).
#[inline(always)]
pub(crate) fn round_up_pow2_minus_one(v: usize) -> usize {
    v.next_power_of_two().saturating_sub(1).max(GROUP_SIZE - 1)
}

/// Largest capacity of the form `2^k - 1` that is `<= v`, floored at
/// `GROUP_SIZE - 1`.
pub(crate) fn round_down_pow2_minus_one(v: usize) -> usize {
    let v = v.max(GROUP_SIZE - 1);
    let bits = usize::BITS - (v + 1).leading_zeros() - 1;
    (1usize << bits) - 1
}

/// Outcome of a bucket-local insert attempt.
pub(crate) enum InsertResult<V> {
    /// The key was already present; its value was overwritten in place.
    Replaced(V),
    /// The key was absent and is now stored at this slot index.
    InsertedAt(usize),
    /// The key is absent but `growth_left == 0`: the caller must rehash,
    /// resize, or split this bucket (possibly re-routing through the
    /// directory) before retrying.
    GrowthNeeded,
}

pub(crate) struct Bucket<K, V, A: Allocator> {
    capacity: usize,
    ctrl: NonNull<Tag>,
    slots: NonNull<(K, V)>,
    used: usize,
    growth_left: usize,
    pub(crate) local_depth: u32,
    pub(crate) index: usize,
    alloc: A,
}

impl<K, V, A: Allocator> Bucket<K, V, A> {
    fn ctrl_layout(capacity: usize) -> Layout {
        Layout::array::<Tag>(capacity + GROUP_SIZE).expect("control array layout overflow")
    }

    fn slots_layout(capacity: usize) -> Layout {
        Layout::array::<(K, V)>(capacity).expect("slot array layout overflow")
    }

    /// The lazy empty placeholder: no allocation, always has `growth_left
    /// == 0` so the first insert immediately grows it.
    pub(crate) fn new_empty(alloc: A) -> Self {
        Self {
            capacity: 0,
            ctrl: NonNull::dangling(),
            slots: NonNull::dangling(),
            used: 0,
            growth_left: 0,
            local_depth: 0,
            index: 0,
            alloc,
        }
    }

    /// `capacity` must already be `0` or of the form `2^k - 1`.
    pub(crate) fn with_capacity(capacity: usize, alloc: A) -> Result<Self, MapError> {
        if capacity == 0 {
            return Ok(Self::new_empty(alloc));
        }
        let ctrl_layout = Self::ctrl_layout(capacity);
        let ctrl_raw = alloc.allocate(ctrl_layout)?;
        let ctrl: NonNull<Tag> = ctrl_raw.cast();
        unsafe {
            for i in 0..capacity + GROUP_SIZE {
                ctrl.as_ptr().add(i).write(Tag::EMPTY);
            }
            ctrl.as_ptr().add(capacity).write(Tag::SENTINEL);
        }
        let slots_layout = Self::slots_layout(capacity);
        let slots_raw = match alloc.allocate(slots_layout) {
            Ok(p) => p,
            Err(e) => {
                unsafe { alloc.deallocate(ctrl_raw, ctrl_layout) };
                return Err(e);
            }
        };
        Ok(Self {
            capacity,
            ctrl,
            slots: slots_raw.cast(),
            used: 0,
            growth_left: growth_left_for(capacity),
            local_depth: 0,
            index: 0,
            alloc,
        })
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline(always)]
    pub(crate) fn len(&self) -> usize {
        self.used
    }

    #[inline(always)]
    pub(crate) fn growth_left(&self) -> usize {
        self.growth_left
    }

    #[inline(always)]
    pub(crate) fn needs_growth(&self) -> bool {
        self.growth_left == 0
    }

    /// `count(DELETED)`, derived from the bucket invariant
    /// `growth_left == floor(capacity*7/8) - used - count(DELETED)`.
    pub(crate) fn tombstones(&self) -> usize {
        growth_left_for(self.capacity)
            .saturating_sub(self.used)
            .saturating_sub(self.growth_left)
    }

    #[inline(always)]
    fn ctrl_ptr(&self, idx: usize) -> *const Tag {
        unsafe { self.ctrl.as_ptr().add(idx) }
    }

    #[inline(always)]
    fn slot_ptr(&self, idx: usize) -> *const (K, V) {
        unsafe { self.slots.as_ptr().add(idx) }
    }

    #[inline(always)]
    fn slot_ptr_mut(&mut self, idx: usize) -> *mut (K, V) {
        unsafe { self.slots.as_ptr().add(idx) }
    }

    /// Writes a control byte and its mirror (spec §4.3 "setCtrl mirroring").
    ///
    /// A wrapping group load reads array index `capacity + 1 + j` and
    /// treats it as slot `(capacity + 1 + j) & capacity == j` (`capacity`
    /// is always `2^k - 1`, so masking by it is exactly mod `2^k`). So the
    /// mirror of slot `i` must land at the index whose low bits equal `i`,
    /// which is a mask (`& self.capacity`), not `% self.capacity` (the
    /// latter is mod `2^k - 1` and drifts onto the sentinel/adjacent slots).
    /// `self.capacity + 1` can be smaller than the mirror region
    /// (`GROUP_SIZE - 1` bytes) for sub-group-sized buckets, in which case
    /// one slot owns more than one mirror copy; the loop below fills every
    /// copy instead of just the first.
    fn set_ctrl(&mut self, i: usize, tag: Tag) {
        debug_assert!(i < self.capacity);
        unsafe { *self.ctrl.as_ptr().add(i) = tag };
        if i < GROUP_SIZE - 1 {
            let mirror_end = self.capacity + GROUP_SIZE - 1;
            let mut mirror = (i.wrapping_sub(GROUP_SIZE - 1) & self.capacity) + (GROUP_SIZE - 1);
            while mirror <= mirror_end {
                unsafe { *self.ctrl.as_ptr().add(mirror) = tag };
                mirror += self.capacity + 1;
            }
        }
    }

    fn resync_mirror(&mut self) {
        let n = (GROUP_SIZE - 1).min(self.capacity);
        for i in 0..n {
            let tag = unsafe { *self.ctrl_ptr(i) };
            self.set_ctrl(i, tag);
        }
    }

    fn full_slot_indices(&self) -> Vec<usize> {
        (0..self.capacity)
            .filter(|&i| unsafe { *self.ctrl_ptr(i) }.is_full())
            .collect()
    }

    /// Read-only probe, keyed by an arbitrary equality predicate so callers
    /// can look a bucket up by a borrowed form of `K` (spec §4.3 "Find").
    pub(crate) fn find_by(&self, hash: u64, mut eq: impl FnMut(&K) -> bool) -> Option<usize> {
        if self.capacity == 0 {
            return None;
        }
        let tag = h2(hash);
        let mut seq = ProbeSeq::new(h1(hash), self.capacity);
        loop {
            let group = unsafe { Group::load(self.ctrl_ptr(seq.offset)) };
            for bit in group.match_h2(tag) {
                let idx = (seq.offset + bit) & self.capacity;
                let slot = unsafe { &*self.slot_ptr(idx) };
                if eq(&slot.0) {
                    return Some(idx);
                }
            }
            if group.match_empty().any() {
                return None;
            }
            seq.move_next(self.capacity);
        }
    }

    pub(crate) fn find(&self, key: &K, hash: u64) -> Option<usize>
    where
        K: Eq,
    {
        self.find_by(hash, |k| k == key)
    }

    /// Read access to a known-FULL slot, for callers (the directory) that
    /// already resolved an index via `find`/`find_by`.
    #[inline(always)]
    pub(crate) fn slot(&self, idx: usize) -> &(K, V) {
        unsafe { &*self.slot_ptr(idx) }
    }

    #[inline(always)]
    pub(crate) fn slot_value_mut(&mut self, idx: usize) -> &mut V {
        unsafe { &mut (*self.slot_ptr_mut(idx)).1 }
    }

    /// Overwrites the value at a known-FULL slot, returning the old one.
    pub(crate) fn replace_at(&mut self, idx: usize, value: V) -> V {
        std::mem::replace(self.slot_value_mut(idx), value)
    }

    /// spec §4.3 "Insert": overwrite on key equality; otherwise, if there is
    /// growth room, place the entry via `unchecked_insert`.
    pub(crate) fn insert(&mut self, key: K, value: V, hash: u64) -> InsertResult<V>
    where
        K: Eq,
    {
        if self.capacity > 0 {
            let tag = h2(hash);
            let mut seq = ProbeSeq::new(h1(hash), self.capacity);
            loop {
                let group = unsafe { Group::load(self.ctrl_ptr(seq.offset)) };
                for bit in group.match_h2(tag) {
                    let idx = (seq.offset + bit) & self.capacity;
                    let slot = unsafe { &mut *self.slot_ptr_mut(idx) };
                    if slot.0 == key {
                        let old = std::mem::replace(&mut slot.1, value);
                        return InsertResult::Replaced(old);
                    }
                }
                if group.match_empty().any() {
                    break;
                }
                seq.move_next(self.capacity);
            }
        }
        if self.growth_left == 0 {
            return InsertResult::GrowthNeeded;
        }
        InsertResult::InsertedAt(self.unchecked_insert(key, value, hash))
    }

    /// spec §4.3 "Unchecked insert": caller guarantees the key is absent
    /// and `capacity > 0`.
    pub(crate) fn unchecked_insert(&mut self, key: K, value: V, hash: u64) -> usize {
        debug_assert!(self.capacity > 0);
        let mut seq = ProbeSeq::new(h1(hash), self.capacity);
        loop {
            let group = unsafe { Group::load(self.ctrl_ptr(seq.offset)) };
            if let Some(bit) = group.match_empty_or_deleted().into_iter().next() {
                let idx = (seq.offset + bit) & self.capacity;
                let was_empty = unsafe { *self.ctrl_ptr(idx) } == Tag::EMPTY;
                self.set_ctrl(idx, Tag::full(h2(hash)));
                unsafe { self.slot_ptr_mut(idx).write((key, value)) };
                if was_empty {
                    self.growth_left -= 1;
                }
                self.used += 1;
                return idx;
            }
            seq.move_next(self.capacity);
        }
    }

    /// spec §4.3 "`was_never_full(i)`".
    fn was_never_full(&self, i: usize) -> bool {
        if self.capacity < GROUP_SIZE {
            return true;
        }
        let empty_after = unsafe { Group::load(self.ctrl_ptr(i)) }.match_empty();
        let before_offset =
            (i as isize - GROUP_SIZE as isize).rem_euclid(self.capacity as isize) as usize;
        let empty_before = unsafe { Group::load(self.ctrl_ptr(before_offset)) }.match_empty();
        empty_before.any()
            && empty_after.any()
            && empty_before.absent_at_end() + empty_after.absent_at_start() < GROUP_SIZE
    }

    pub(crate) fn remove_by(
        &mut self,
        hash: u64,
        mut eq: impl FnMut(&K) -> bool,
    ) -> Option<(K, V)> {
        let idx = self.find_by(hash, &mut eq)?;
        let kv = unsafe { self.slot_ptr(idx).read() };
        let empty = self.was_never_full(idx);
        self.set_ctrl(idx, if empty { Tag::EMPTY } else { Tag::DELETED });
        self.used -= 1;
        if empty {
            self.growth_left += 1;
        }
        Some(kv)
    }

    pub(crate) fn clear(&mut self) {
        if self.capacity == 0 {
            return;
        }
        for idx in self.full_slot_indices() {
            unsafe { self.slot_ptr_mut(idx).drop_in_place() };
        }
        unsafe {
            for i in 0..self.capacity {
                *self.ctrl.as_ptr().add(i) = Tag::EMPTY;
            }
        }
        self.resync_mirror();
        self.used = 0;
        self.growth_left = growth_left_for(self.capacity);
    }

    /// spec §4.4 "Rehash in place": no allocation, just a relocation pass.
    pub(crate) fn rehash_in_place(&mut self, hash_of: impl Fn(&K) -> u64) {
        debug_assert!(self.capacity >= GROUP_SIZE);

        let mut offset = 0;
        while offset < self.capacity {
            let group = unsafe { Group::load(self.ctrl_ptr(offset)) };
            let converted = group.convert_non_full_to_empty_and_full_to_deleted();
            for (j, tag) in converted.into_iter().enumerate() {
                let idx = offset + j;
                if idx < self.capacity {
                    unsafe { *self.ctrl.as_ptr().add(idx) = tag };
                }
            }
            offset += GROUP_SIZE;
        }
        self.resync_mirror();

        let mut i = 0;
        while i < self.capacity {
            if unsafe { *self.ctrl_ptr(i) } != Tag::DELETED {
                i += 1;
                continue;
            }
            loop {
                let key_hash = hash_of(unsafe { &(*self.slot_ptr(i)).0 });
                let mut seq = ProbeSeq::new(h1(key_hash), self.capacity);
                let target = loop {
                    let group = unsafe { Group::load(self.ctrl_ptr(seq.offset)) };
                    if let Some(bit) = group.match_empty_or_deleted().into_iter().next() {
                        break (seq.offset + bit) & self.capacity;
                    }
                    seq.move_next(self.capacity);
                };
                if target == i {
                    self.set_ctrl(i, Tag::full(h2(key_hash)));
                    break;
                }
                match unsafe { *self.ctrl_ptr(target) } {
                    Tag::EMPTY => {
                        unsafe {
                            let kv = self.slot_ptr(i).read();
                            self.slot_ptr_mut(target).write(kv);
                        }
                        self.set_ctrl(target, Tag::full(h2(key_hash)));
                        self.set_ctrl(i, Tag::EMPTY);
                        break;
                    }
                    _ => {
                        // DELETED: swap and keep processing `i`, which now
                        // holds the key that was resident at `target`.
                        unsafe {
                            let a = self.slot_ptr(i).read();
                            let b = self.slot_ptr(target).read();
                            self.slot_ptr_mut(i).write(b);
                            self.slot_ptr_mut(target).write(a);
                        }
                        self.set_ctrl(target, Tag::full(h2(key_hash)));
                        continue;
                    }
                }
            }
            i += 1;
        }
        self.growth_left = growth_left_for(self.capacity).saturating_sub(self.used);
    }

    /// spec §4.4 "Resize": allocate a larger bucket, migrate every FULL
    /// slot, then adopt the new arrays.
    pub(crate) fn resize(
        &mut self,
        new_capacity: usize,
        hash_of: impl Fn(&K) -> u64,
    ) -> Result<(), MapError> {
        let mut fresh = Bucket::with_capacity(new_capacity, self.alloc.clone())?;
        for idx in self.full_slot_indices() {
            let (k, v) = unsafe { self.slot_ptr(idx).read() };
            let hash = hash_of(&k);
            fresh.unchecked_insert(k, v, hash);
        }
        fresh.local_depth = self.local_depth;
        fresh.index = self.index;
        self.adopt(fresh);
        Ok(())
    }

    /// spec §4.4 "Split": partitions FULL slots by the next directory bit
    /// past those `local_depth_before` already distinguishes on, moving the
    /// `1` side into a freshly created sibling of equal capacity.
    pub(crate) fn split(
        &mut self,
        local_depth_before: u32,
        hash_of: impl Fn(&K) -> u64,
    ) -> Result<Bucket<K, V, A>, MapError> {
        debug_assert!(local_depth_before < 64);
        let mut sibling = Bucket::with_capacity(self.capacity, self.alloc.clone())?;
        let shift = 63 - local_depth_before;
        for idx in self.full_slot_indices() {
            let hash = hash_of(unsafe { &(*self.slot_ptr(idx)).0 });
            if (hash >> shift) & 1 == 1 {
                let (k, v) = unsafe { self.slot_ptr(idx).read() };
                sibling.unchecked_insert(k, v, hash);
                let empty = self.was_never_full(idx);
                self.set_ctrl(idx, if empty { Tag::EMPTY } else { Tag::DELETED });
                self.used -= 1;
                if empty {
                    self.growth_left += 1;
                }
            }
        }
        Ok(sibling)
    }

    /// Adopts `other`'s arrays/counters as this bucket's own, freeing the
    /// previous (already-migrated, now logically empty) arrays without
    /// running slot destructors on them.
    fn adopt(&mut self, other: Bucket<K, V, A>) {
        let old_ctrl = self.ctrl;
        let old_slots = self.slots;
        let old_capacity = self.capacity;
        let old_alloc = self.alloc.clone();

        self.capacity = other.capacity;
        self.ctrl = other.ctrl;
        self.slots = other.slots;
        self.used = other.used;
        self.growth_left = other.growth_left;
        self.local_depth = other.local_depth;
        self.index = other.index;
        // `other`'s arrays are now owned by `self`; forget it so its Drop
        // does not free (or double-drop) what we just adopted.
        std::mem::forget(other);

        if old_capacity > 0 {
            unsafe {
                old_alloc.deallocate(old_ctrl.cast(), Self::ctrl_layout(old_capacity));
                old_alloc.deallocate(old_slots.cast(), Self::slots_layout(old_capacity));
            }
        }
    }

    /// Consumes the bucket, returning every live entry by value. Used by
    /// the map's owned `IntoIterator` impl, which tears every bucket down
    /// this way instead of cloning out of a live snapshot.
    pub(crate) fn into_vec(mut self) -> Vec<(K, V)> {
        let mut out = Vec::with_capacity(self.used);
        if self.capacity > 0 {
            for idx in self.full_slot_indices() {
                out.push(unsafe { self.slot_ptr(idx).read() });
            }
            unsafe {
                self.alloc
                    .deallocate(self.ctrl.cast(), Self::ctrl_layout(self.capacity));
                self.alloc
                    .deallocate(self.slots.cast(), Self::slots_layout(self.capacity));
            }
            // Slots have already been moved out and the arrays freed;
            // mark empty so `Drop` does not touch either again.
            self.capacity = 0;
        }
        out
    }

    pub(crate) fn iter(&self) -> BucketIter<'_, K, V> {
        BucketIter {
            bucket_ctrl: self.ctrl,
            bucket_slots: self.slots,
            capacity: self.capacity,
            next: 0,
            _marker: std::marker::PhantomData,
        }
    }
}

impl<K, V, A: Allocator> Drop for Bucket<K, V, A> {
    fn drop(&mut self) {
        if self.capacity == 0 {
            return;
        }
        for idx in self.full_slot_indices() {
            unsafe { self.slot_ptr_mut(idx).drop_in_place() };
        }
        unsafe {
            self.alloc
                .deallocate(self.ctrl.cast(), Self::ctrl_layout(self.capacity));
            self.alloc
                .deallocate(self.slots.cast(), Self::slots_layout(self.capacity));
        }
    }
}

/// Snapshot iterator over one bucket's live slots (spec §5 "Iteration").
/// Captures `(capacity, ctrl pointer, slots pointer)` up front, so a
/// resize that happens after this snapshot is taken (but before the
/// iterator reaches this bucket) is invisible to it — the old arrays stay
/// alive as long as this iterator holds the pointers the bucket handed it,
/// which is why `Bucket::adopt` frees the pre-resize arrays only after
/// installing the replacement, never while a live borrow could still see
/// the old one.
pub(crate) struct BucketIter<'a, K, V> {
    bucket_ctrl: NonNull<Tag>,
    bucket_slots: NonNull<(K, V)>,
    capacity: usize,
    next: usize,
    _marker: std::marker::PhantomData<&'a (K, V)>,
}

impl<'a, K, V> Iterator for BucketIter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.capacity {
            let idx = self.next;
            self.next += 1;
            let tag = unsafe { *self.bucket_ctrl.as_ptr().add(idx) };
            if tag.is_full() {
                let slot = unsafe { &*self.bucket_slots.as_ptr().add(idx) };
                return Some((&slot.0, &slot.1));
            }
        }
        None
    }
}
