//! Error taxonomy for the map.
//!
//! The core has exactly one recoverable error: the allocator refusing a
//! request. Everything else (invariant violations) is a bug and panics.
//! Surfaced directly by `Map::try_insert` and `MapBuilder::try_build`;
//! every other entry point is infallible and panics with this error's
//! `Display` message instead.

use std::alloc::Layout;

/// The only error a caller of this crate can observe.
#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// The configured allocator could not satisfy a request for a control or
    /// slot array. The bucket that attempted the allocation is left exactly
    /// as it was before the attempt.
    #[error("allocation failed for layout {layout:?}")]
    AllocationFailed { layout: Layout },
}
