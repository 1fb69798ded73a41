//! `Entry` API (spec §6 [ADDED]): layered entirely on `find`/`insert`
//! primitives the bucket and directory already expose, the way
//! `std::collections::HashMap`/`hashbrown::HashMap` build their own entry
//! APIs on top of raw table operations.

use crate::alloc::Allocator;
use crate::directory::Map;
use crate::hasher::BuildMapHash;

pub enum Entry<'a, K, V, H, A: Allocator> {
    Occupied(&'a mut V),
    Vacant(VacantEntry<'a, K, V, H, A>),
}

pub struct VacantEntry<'a, K, V, H, A: Allocator> {
    pub(crate) map: &'a mut Map<K, V, H, A>,
    pub(crate) key: K,
}

impl<'a, K: Eq, V, H: BuildMapHash<K> + Clone, A: Allocator + Clone> Entry<'a, K, V, H, A> {
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(v) => v,
            Entry::Vacant(e) => e.insert(default),
        }
    }

    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(v) => v,
            Entry::Vacant(e) => e.insert(default()),
        }
    }

    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Self {
        match self {
            Entry::Occupied(v) => {
                f(v);
                Entry::Occupied(v)
            }
            vacant => vacant,
        }
    }
}

impl<'a, K: Eq, V, H: BuildMapHash<K> + Clone, A: Allocator + Clone> VacantEntry<'a, K, V, H, A> {
    pub fn insert(self, value: V) -> &'a mut V {
        self.map.insert_vacant(self.key, value)
    }
}
