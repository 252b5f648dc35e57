//! [`BlockSource`] trait and structures that implement it.
//!
//! The [`BlockSource`] trait allows users to change where a [`Pool`](crate::Pool)
//! gets the raw memory for its blocks from.

use core::alloc::{GlobalAlloc, Layout};
use core::ptr::NonNull;
use std::alloc::System;

use tracing::error;

/// A trait for types that hand out and take back fixed-size raw memory blocks.
///
/// # Safety
/// * a block returned by [`acquire`](BlockSource::acquire) must be valid for reads and
///   writes of `layout.size()` bytes, aligned to `layout.align()` and must not overlap
///   any other block that was acquired and not yet released.
/// * the block must stay valid until it is passed back to [`release`](BlockSource::release),
///   even if the source itself is moved.
pub unsafe trait BlockSource {
    /// Acquires a block with the size and alignment of `layout`.
    /// Returns `Err(())` if the source cannot supply it.
    ///
    /// # Safety
    /// `layout` must have a nonzero size.
    unsafe fn acquire(&mut self, layout: Layout) -> Result<NonNull<u8>, ()>;

    /// Gives a block back to the source.
    ///
    /// # Safety
    /// `block` must have been returned by [`acquire`](BlockSource::acquire) on this very source
    /// with the same `layout` and must not have been released already.
    unsafe fn release(&mut self, block: NonNull<u8>, layout: Layout);
}

/// A source backed by the [`System`] allocator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSource;

impl SystemSource {
    #[inline(always)]
    pub const fn new() -> Self {
        SystemSource
    }
}

unsafe impl BlockSource for SystemSource {
    unsafe fn acquire(&mut self, layout: Layout) -> Result<NonNull<u8>, ()> {
        match NonNull::new(System.alloc(layout)) {
            Some(block) => Ok(block),
            None => {
                error!(size = layout.size(), "System allocator returned null.");
                Err(())
            }
        }
    }

    unsafe fn release(&mut self, block: NonNull<u8>, layout: Layout) {
        System.dealloc(block.as_ptr(), layout)
    }
}

#[cfg(unix)]
pub use self::mmap::MmapSource;

#[cfg(unix)]
mod mmap {
    use super::BlockSource;

    use core::alloc::Layout;
    use core::ptr::{null_mut, NonNull};

    use libc::{
        mmap, munmap, sysconf, MAP_ANONYMOUS, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE,
        _SC_PAGESIZE,
    };
    use tracing::error;

    /// A source that maps every block as its own anonymous private mapping
    /// through [`libc::mmap`], so releasing a block hands its pages straight back to the kernel.
    #[derive(Debug, Clone, Copy)]
    pub struct MmapSource {
        page_size: usize,
    }

    impl MmapSource {
        pub fn new() -> Self {
            let page_size = unsafe { sysconf(_SC_PAGESIZE) };
            debug_assert!(page_size > 0, "sysconf(_SC_PAGESIZE) should never fail.");
            MmapSource {
                page_size: page_size as usize,
            }
        }

        /// Size of the pages the blocks are mapped with.
        #[inline]
        pub fn page_size(&self) -> usize {
            self.page_size
        }
    }

    impl Default for MmapSource {
        fn default() -> Self {
            MmapSource::new()
        }
    }

    unsafe impl BlockSource for MmapSource {
        unsafe fn acquire(&mut self, layout: Layout) -> Result<NonNull<u8>, ()> {
            // Mappings are page aligned, nothing stronger can be honored.
            if layout.align() > self.page_size {
                error!(
                    align = layout.align(),
                    page_size = self.page_size,
                    "Alignment exceeds page size."
                );
                return Err(());
            }
            let p = mmap(
                null_mut(),
                layout.size(),
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS,
                -1,
                0,
            );
            if p == MAP_FAILED {
                error!(size = layout.size(), "mmap failed.");
                return Err(());
            }
            NonNull::new(p.cast()).ok_or(())
        }

        unsafe fn release(&mut self, block: NonNull<u8>, layout: Layout) {
            let r = munmap(block.as_ptr().cast(), layout.size());
            debug_assert_eq!(r, 0, "munmap of a mapped block should never fail.");
        }
    }
}

unsafe impl<T: BlockSource + ?Sized> BlockSource for &mut T {
    unsafe fn acquire(&mut self, layout: Layout) -> Result<NonNull<u8>, ()> {
        (**self).acquire(layout)
    }

    unsafe fn release(&mut self, block: NonNull<u8>, layout: Layout) {
        (**self).release(block, layout)
    }
}
