//! Defines the [`BlockHeader`] struct and associated constants and functions.

use core::mem::{align_of, size_of};
use core::ops::Range;
use core::ptr::NonNull;

use static_assertions::const_assert_eq;

use crate::util::CACHE_LINE_SIZE;

pub const HEADER_SIZE: usize = size_of::<BlockHeader>();
pub const HEADER_ALIGN: usize = align_of::<BlockHeader>();

// The slot array starts right after the header and must stay cache-line aligned.
const_assert_eq!(HEADER_ALIGN, CACHE_LINE_SIZE);
const_assert_eq!(HEADER_SIZE % CACHE_LINE_SIZE, 0);

/// Bookkeeping for one block, stored at the very beginning of the block's storage.
/// The slot array (the "heap" of the block) follows immediately after it.
///
/// # Chain links
/// `next` and `back` are indices into the owning pool's block table rather than pointers.
/// `back` is only ever read by rollback.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct BlockHeader {
    /// Total number of slots in the block.
    pub entries: usize,
    /// Slots that were never bump-allocated (or were rolled back).
    pub free_entries: usize,
    /// Index of the next never-used slot.
    pub cursor: usize,
    pub object_size: usize,
    pub next: Option<usize>,
    pub back: Option<usize>,
}

impl BlockHeader {
    /// Creates the header of an empty block.
    #[inline]
    pub const fn new(entries: usize, object_size: usize, back: Option<usize>) -> BlockHeader {
        BlockHeader {
            entries,
            free_entries: entries,
            cursor: 0,
            object_size,
            next: None,
            back,
        }
    }

    /// Returns how many `object_size` slots fit in a block of `block_size` raw bytes
    /// or `None` if the header alone doesn't fit.
    ///
    /// # Panics
    /// Panics if `object_size` is 0.
    #[inline]
    pub const fn capacity(block_size: usize, object_size: usize) -> Option<usize> {
        match block_size.checked_sub(HEADER_SIZE) {
            Some(heap_size) => Some(heap_size / object_size),
            None => None,
        }
    }

    /// Claims the slot at the cursor and returns its index,
    /// or `None` if every slot of the block was already handed out.
    #[inline(always)]
    pub fn bump(&mut self) -> Option<usize> {
        if self.free_entries == 0 {
            return None;
        }
        let index = self.cursor;
        self.cursor += 1;
        self.free_entries -= 1;
        debug_assert_eq!(self.cursor, self.entries - self.free_entries);
        Some(index)
    }

    /// Rewinds the cursor by up to `n` slots and returns how many slots were actually given back.
    /// When `n` exceeds the cursor the block is reset entirely.
    #[inline]
    pub fn rewind(&mut self, n: usize) -> usize {
        if n <= self.cursor {
            self.cursor -= n;
            self.free_entries += n;
            debug_assert_eq!(self.cursor, self.entries - self.free_entries);
            n
        } else {
            let undone = self.cursor;
            self.reset();
            undone
        }
    }

    /// Marks every slot of the block as never used.
    #[inline]
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.free_entries = self.entries;
    }

    /// Returns a pointer to the slot at `index` within the block headed by `this`.
    ///
    /// # Safety
    /// This function is unsafe since it assumes that `this` points to an initialized header
    /// at the beginning of a live block and that `index` is less than the block's `entries`.
    #[inline(always)]
    pub unsafe fn slot(this: NonNull<BlockHeader>, index: usize) -> NonNull<u8> {
        let object_size = (*this.as_ptr()).object_size;
        debug_assert!(index < (*this.as_ptr()).entries);
        this.cast::<u8>().add(HEADER_SIZE + index * object_size)
    }

    /// Returns the address range spanned by the slots of the block headed by `this`.
    ///
    /// # Safety
    /// Same as [`slot`](BlockHeader::slot), minus the index requirement.
    #[inline]
    pub unsafe fn slots(this: NonNull<BlockHeader>) -> Range<*const u8> {
        let header = &*this.as_ptr();
        let start: *const u8 = this.cast::<u8>().as_ptr().add(HEADER_SIZE);
        start..start.add(header.entries * header.object_size)
    }
}
