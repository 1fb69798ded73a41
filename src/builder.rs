//! Configuration surface (spec §6, §4.5 "Initial sizing"): a builder
//! gathering the handful of construction-time options, analogous to the
//! teacher's constructor parameters (capacity + explicit seed) but plural
//! now that callers can also swap the hasher and allocator.

use crate::alloc::{Allocator, Global};
use crate::directory::{Map, DEFAULT_MAX_BUCKET_CAPACITY};
use crate::error::MapError;
use crate::hasher::FoldHashBuilder;

pub struct MapBuilder<H = FoldHashBuilder, A: Allocator = Global> {
    initial_capacity: usize,
    max_bucket_capacity: usize,
    hasher: H,
    alloc: A,
}

impl Default for MapBuilder<FoldHashBuilder, Global> {
    fn default() -> Self {
        Self::new()
    }
}

impl MapBuilder<FoldHashBuilder, Global> {
    pub fn new() -> Self {
        Self {
            initial_capacity: 0,
            max_bucket_capacity: DEFAULT_MAX_BUCKET_CAPACITY,
            hasher: FoldHashBuilder,
            alloc: Global,
        }
    }
}

impl<H, A: Allocator> MapBuilder<H, A> {
    /// Reserve room for at least `capacity` entries up front (spec §4.5).
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Caps how large a single bucket may grow before a split is preferred
    /// over an in-place resize. Rounded down to the nearest `2^k - 1`.
    pub fn with_max_bucket_capacity(mut self, max_bucket_capacity: usize) -> Self {
        self.max_bucket_capacity = max_bucket_capacity;
        self
    }

    pub fn with_hash<H2>(self, hasher: H2) -> MapBuilder<H2, A> {
        MapBuilder {
            initial_capacity: self.initial_capacity,
            max_bucket_capacity: self.max_bucket_capacity,
            hasher,
            alloc: self.alloc,
        }
    }

    pub fn with_allocator<A2: Allocator>(self, alloc: A2) -> MapBuilder<H, A2> {
        MapBuilder {
            initial_capacity: self.initial_capacity,
            max_bucket_capacity: self.max_bucket_capacity,
            hasher: self.hasher,
            alloc,
        }
    }

    pub fn build<K, V>(self) -> Map<K, V, H, A>
    where
        A: Clone,
    {
        Map::new_internal(
            self.initial_capacity,
            self.max_bucket_capacity,
            self.hasher,
            self.alloc,
        )
    }

    /// Fallible counterpart of `build` (spec §7 **[ADDED]**): reports an
    /// allocator refusal instead of panicking, for callers that sized
    /// `with_capacity` aggressively enough to risk it up front.
    pub fn try_build<K, V>(self) -> Result<Map<K, V, H, A>, MapError>
    where
        A: Clone,
    {
        Map::try_new_internal(
            self.initial_capacity,
            self.max_bucket_capacity,
            self.hasher,
            self.alloc,
        )
    }
}
