//! Allocator surface (spec §4.6 / §4.7).
//!
//! The core never calls `std::alloc` directly from bucket logic; it goes
//! through this trait so a host can supply an arena, a pool, or anything
//! else. `Global` is the default and is a zero-sized wrapper around
//! `std::alloc`, the same allocation primitives the teacher's
//! `aligned_cuckoo_table` uses directly (`Layout` + `NonNull<u8>` +
//! manual `dealloc` on drop).

use std::alloc::Layout;
use std::ptr::NonNull;

use crate::error::MapError;
use crate::uunwrap::UUnwrap;

/// Supplies and reclaims raw memory for control and slot arrays.
///
/// # Safety
///
/// Implementors must return memory that is valid for reads and writes for
/// the requested layout until it is passed back to `deallocate` with the
/// same layout, and `deallocate` must not be called twice for the same
/// allocation.
pub unsafe trait Allocator: Clone {
    /// Allocate at least `layout.size()` bytes aligned to `layout.align()`.
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, MapError>;

    /// Free memory previously returned by `allocate` with the same layout.
    ///
    /// # Safety
    /// `ptr` must have come from `self.allocate(layout)` (or a clone of
    /// `self` with an equal layout) and must not be used again afterward.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);
}

/// Default allocator: the process's global allocator.
#[derive(Clone, Copy, Debug, Default)]
pub struct Global;

unsafe impl Allocator for Global {
    #[inline]
    fn allocate(&self, layout: Layout) -> Result<NonNull<u8>, MapError> {
        if layout.size() == 0 {
            // Dangling-but-aligned, matches Vec's convention for ZST/empty allocations.
            return Ok(NonNull::new(layout.align() as *mut u8).uunwrap());
        }
        let ptr = unsafe { std::alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(MapError::AllocationFailed { layout })
    }

    #[inline]
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        if layout.size() == 0 {
            return;
        }
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_allocate_roundtrip() {
        let layout = Layout::array::<u64>(64).unwrap();
        let ptr = Global.allocate(layout).unwrap();
        unsafe {
            ptr.as_ptr().write_bytes(0u8, layout.size());
            Global.deallocate(ptr, layout);
        }
    }

    #[test]
    fn global_zero_sized_layout_is_noop() {
        let layout = Layout::new::<()>();
        let ptr = Global.allocate(layout).unwrap();
        unsafe { Global.deallocate(ptr, layout) };
    }
}
