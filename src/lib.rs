//! An extendible Swiss-Tables associative map.
//!
//! [`Map`] is a single-threaded, generic `HashMap`-shaped container: each
//! addressable unit is a Swiss-Tables [`bucket`] (SIMD-style group probing
//! over 1-byte control metadata), and an extendible-hashing directory on
//! top lets the map grow by splitting one overfull bucket at a time
//! instead of rehashing everything at once. See `DESIGN.md` in the crate
//! repository for the grounding of each piece in the codebases this was
//! built from.
//!
//! ```
//! use extendible_swiss_map::Map;
//!
//! let mut map: Map<&str, i32> = Map::default();
//! map.insert("a", 1);
//! assert_eq!(map.get(&"a"), Some(&1));
//! ```

cfg_if::cfg_if! {
    if #[cfg(target_endian = "little")] {
        // The control group loads its 8 bytes as a single `u64` via a raw,
        // unaligned, little-endian read (see `control::group::Group::load`);
        // this is the one place the crate depends on the host's endianness.
    } else {
        compile_error!("this crate only supports little-endian targets (see control::group::Group::load)");
    }
}

mod alloc;
mod bucket;
mod builder;
mod control;
mod directory;
mod entry;
mod error;
mod hasher;
mod iter;
mod probe;
mod uunwrap;

pub use alloc::{Allocator, Global};
pub use builder::MapBuilder;
pub use directory::{Map, DEFAULT_MAX_BUCKET_CAPACITY};
pub use entry::{Entry, VacantEntry};
pub use error::MapError;
pub use hasher::{fold_hash_fast, h1, h2, BuildMapHash, FoldHashBuilder};
pub use iter::{IntoIter, Iter};

impl<K, V> Default for Map<K, V, FoldHashBuilder, Global> {
    fn default() -> Self {
        MapBuilder::new().build()
    }
}
