//! Control byte encoding and group SWAR primitives (spec §3, §4.1).
//!
//! This mirrors the directory shape of the teacher's own `control/group`
//! module (which dispatched across AVX2/SSE2/NEON/generic backends), but
//! collapses to a single backend: the spec fixes `GROUP_SIZE` at 8 and
//! derives the mirror-region and probe-stride arithmetic directly from
//! that width, so a wider SIMD lane would require re-deriving those
//! invariants rather than simply swapping an intrinsic. See DESIGN.md for
//! the full reasoning. `cfg-if` is kept as a dependency and used instead
//! for the little-endian platform check in `lib.rs`.

mod group;

pub use group::{Group, MatchSet, GROUP_SIZE};

/// One byte of control metadata per slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Tag(pub u8);

impl Tag {
    /// Slot never used, or proven unobservable after deletion.
    pub const EMPTY: Tag = Tag(0b1000_0000);
    /// Tombstone: counts as occupied for probe termination, carries no value.
    pub const DELETED: Tag = Tag(0b1111_1110);
    /// Terminates probing unconditionally. Exactly one per bucket.
    pub const SENTINEL: Tag = Tag(0b1111_1111);

    /// Builds a FULL tag carrying the low 7 bits of `hash` as H2.
    #[inline(always)]
    pub fn full(h2: u8) -> Tag {
        debug_assert!(h2 & 0x80 == 0, "h2 must fit in 7 bits");
        Tag(h2)
    }

    /// True iff this tag marks an occupied, live slot.
    #[inline(always)]
    pub fn is_full(self) -> bool {
        self.0 & 0x80 == 0
    }
}
