//! Utility functions and layout constants.

use core::mem::size_of;

/// Alignment of every block and of every [`CachePadded`](crate::sharded::CachePadded) shard.
pub const CACHE_LINE_SIZE: usize = 64;

/// The smallest slot size a pool hands out, a freed slot must be able to hold a recycle link.
pub const POINTER_WIDTH: usize = size_of::<*mut u8>();

/// Clamps a requested object size upward so that a freed slot can hold a recycle-list link.
#[inline(always)]
pub(crate) const fn clamp_object_size(size: usize) -> usize {
    if size < POINTER_WIDTH {
        POINTER_WIDTH
    } else {
        size
    }
}

/// Returns the smallest (in address) `align`-aligned pointer
/// with an address greater or equal to that of `ptr`
/// or `None` if no such pointer exists.
///
/// # Panics
/// Panics if `align` is not a power-of-two.
#[inline]
pub(crate) fn find_aligned(ptr: *const u8, align: usize) -> Option<*const u8> {
    let offset = ptr.align_offset(align);
    debug_assert_ne!(
        offset,
        usize::MAX,
        "align_offset() on a *const u8 should never fail."
    );
    if usize::MAX - offset < ptr as usize {
        return None;
    }
    Some(ptr.wrapping_add(offset))
}

#[cfg(test)]
#[inline(always)]
pub(crate) fn checked_add(ptr: *const u8, offset: usize) -> Option<*const u8> {
    (ptr as usize <= usize::MAX - offset).then_some(ptr.wrapping_add(offset))
}
