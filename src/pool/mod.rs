//! A single-owner fixed-size block pool.
//!
// For a general view of the pool's operational semantics see the [`crate`] level documentation.
//
// # Additional implementation notes
// ## Block table
// Every block ever acquired is recorded in `blocks`, in acquisition order, and never removed
// until teardown. The chain links stored in block headers are indices into that table, so
// the table index of a block never changes for the lifetime of the pool.
//
// ## Header references
// Headers are reached through the `NonNull<BlockHeader>` kept in the table. References to a
// header are short-lived and never overlap a slot pointer computed from the same block,
// slot pointers are always derived from the table entry itself.

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::freelist::RecycleList;
use crate::header::BlockHeader;
use crate::sources::{BlockSource, SystemSource};
use crate::util::{find_aligned, CACHE_LINE_SIZE};

use core::alloc::Layout;
use core::fmt::Debug;
use core::ops::Range;
use core::ptr::NonNull;

use tracing::{debug, error, instrument, warn, Level};

/// A fixed-object-size allocator owning a chain of blocks.
///
/// Every slot handed out by a pool is `object_size()` bytes large and
/// [`POINTER_WIDTH`](crate::util::POINTER_WIDTH)-sized at the very least.
/// Slot contents are never initialized by the pool.
pub struct Pool<S: BlockSource = SystemSource> {
    recycle_list: RecycleList,
    blocks: Vec<NonNull<BlockHeader>>,
    /// First block ever created, teardown starts from it.
    head: usize,
    /// Block currently receiving bump allocations.
    current: usize,
    object_size: usize,
    entries_per_block: usize,
    block_layout: Layout,
    source: S,
}

// A pool exclusively owns its blocks and every slot reachable from its recycle list,
// so moving it to another thread moves all of its memory along with it.
unsafe impl<S: BlockSource + Send> Send for Pool<S> {}

impl<S: BlockSource> Debug for Pool<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("object_size", &self.object_size)
            .field("entries_per_block", &self.entries_per_block)
            .field("block_count", &self.blocks.len())
            .field("current", &self.current)
            .finish()
    }
}

impl Pool<SystemSource> {
    /// Creates a pool for objects of `object_size` bytes backed by the system allocator
    /// and the default [`PoolConfig`].
    pub fn new(object_size: usize) -> Result<Self, PoolError> {
        Pool::with_config(object_size, PoolConfig::new(), SystemSource)
    }
}

impl<S: BlockSource> Pool<S> {
    /// Creates a pool for objects of `object_size` bytes which gets its blocks from `source`.
    /// The first block is acquired right away.
    ///
    /// `object_size` is raised to pointer width when smaller.
    /// Fails with [`PoolError::InvalidConfiguration`] when an object does not fit in a block
    /// and with [`PoolError::OutOfMemory`] when `source` cannot supply the first block.
    #[instrument(level = "info", skip(source), err(Display, level = Level::ERROR))]
    pub fn with_config(
        object_size: usize,
        config: PoolConfig,
        source: S,
    ) -> Result<Self, PoolError> {
        let geometry = config.geometry(object_size)?;
        debug!(?geometry, "Block geometry resolved.");

        let mut pool = Pool {
            recycle_list: RecycleList::new(),
            blocks: Vec::new(),
            head: 0,
            current: 0,
            object_size: geometry.object_size,
            entries_per_block: geometry.entries,
            block_layout: geometry.layout,
            source,
        };
        let first = pool.acquire_block(None)?;
        pool.head = first;
        pool.current = first;
        Ok(pool)
    }

    /// Returns an `object_size()`-byte slot.
    ///
    /// Recycled slots are handed out first (most recently recycled first), then never-used
    /// slots of the current block. When the current block is exhausted the pool moves on
    /// to the next block of the chain, acquiring a new one if there is none.
    ///
    /// Fails only with [`PoolError::OutOfMemory`], when a new block is needed and
    /// the source cannot supply it.
    #[inline]
    pub fn allocate(&mut self) -> Result<NonNull<u8>, PoolError> {
        if let Some(slot) = unsafe { self.recycle_list.pop_front() } {
            return Ok(slot);
        }

        loop {
            let block = self.blocks[self.current];
            let header = unsafe { &mut *block.as_ptr() };

            if let Some(index) = header.bump() {
                return Ok(unsafe { BlockHeader::slot(block, index) });
            }

            match header.next {
                Some(next) => {
                    debug!(block = next, "Current block exhausted, moving to next block.");
                    self.current = next;
                }
                None => self.grow()?,
            }
        }
    }

    /// Makes `slot` available to the next [`allocate`](Pool::allocate) call.
    /// Memory is not released. A null `slot` is ignored.
    ///
    /// # Safety
    /// `slot` must have been returned by [`allocate`](Pool::allocate) on this very pool and
    /// must not have been recycled since. The first pointer-width bytes of the slot are
    /// overwritten.
    #[inline]
    pub unsafe fn recycle(&mut self, slot: *mut u8) {
        let Some(slot) = NonNull::new(slot) else {
            return;
        };
        debug_assert!(
            self.contains(slot.as_ptr()),
            "Recycled slots should belong to the pool."
        );
        self.recycle_list.push_front(slot);
    }

    /// Undoes the last `n` bump allocations, most recent first,
    /// so that the next `n` allocations return the same slots again.
    /// Returns how many allocations were undone.
    ///
    /// Recycled slots are not affected and no memory is released.
    /// If the chain head is reached before `n` allocations were undone, the rollback stops
    /// there and the returned count is less than `n`.
    #[instrument(level = "debug", skip(self), ret(level = Level::DEBUG))]
    pub fn rollback(&mut self, n: usize) -> usize {
        let mut remaining = n;
        while remaining > 0 {
            let header = self.header_mut(self.current);
            remaining -= header.rewind(remaining);
            let back = header.back;

            if remaining == 0 {
                break;
            }
            match back {
                Some(back) => self.current = back,
                None => {
                    warn!(
                        requested = n,
                        undone = n - remaining,
                        "Rollback reached the chain head."
                    );
                    break;
                }
            }
        }
        n - remaining
    }

    /// Releases every block back to the source. Equivalent to dropping the pool.
    pub fn destroy(mut self) {
        self.release_blocks();
    }

    /// Number of slots in a block.
    #[inline]
    pub fn entries_per_block(&self) -> usize {
        self.entries_per_block
    }

    /// Size of a slot, the requested object size raised to pointer width.
    #[inline]
    pub fn object_size(&self) -> usize {
        self.object_size
    }

    /// Number of blocks in the chain.
    #[inline]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Index of the first block of the chain.
    #[inline]
    pub fn head_block(&self) -> usize {
        self.head
    }

    /// Index of the block currently receiving bump allocations.
    #[inline]
    pub fn current_block(&self) -> usize {
        self.current
    }

    /// Returns the address range of the slots of the block at `index`,
    /// or `None` if there is no such block.
    pub fn block_slots(&self, index: usize) -> Option<Range<*const u8>> {
        self.blocks
            .get(index)
            .map(|&block| unsafe { BlockHeader::slots(block) })
    }

    /// Returns whether `ptr` points into a slot region of this pool.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.blocks
            .iter()
            .any(|&block| unsafe { BlockHeader::slots(block) }.contains(&ptr))
    }

    /// Number of slots waiting on the recycle list.
    /// This walks the list and is meant for diagnostics only.
    pub fn recycled_len(&self) -> usize {
        unsafe { self.recycle_list.len() }
    }
}

impl<S: BlockSource> Pool<S> {
    /// Acquires a block from the source, writes its header and records it in the block table.
    /// Returns the table index of the new block.
    #[instrument(level = "debug", skip(self), err(Display, level = Level::ERROR))]
    fn acquire_block(&mut self, back: Option<usize>) -> Result<usize, PoolError> {
        let block = match unsafe { self.source.acquire(self.block_layout) } {
            Ok(block) => block,
            Err(()) => {
                error!(
                    block_size = self.block_layout.size(),
                    "Block acquisition failed, no memory."
                );
                return Err(PoolError::OutOfMemory {
                    block_size: self.block_layout.size(),
                });
            }
        };
        debug_assert_eq!(
            find_aligned(block.as_ptr(), CACHE_LINE_SIZE),
            Some(block.as_ptr() as *const u8),
            "Sources should honor the block alignment."
        );

        let header: NonNull<BlockHeader> = block.cast();
        unsafe {
            header
                .as_ptr()
                .write(BlockHeader::new(self.entries_per_block, self.object_size, back))
        };
        self.blocks.push(header);

        let index = self.blocks.len() - 1;
        debug!(index, start = ?block.as_ptr(), "Acquired a new block.");
        Ok(index)
    }

    /// Appends a new block after the current one and makes it current.
    #[instrument(level = "debug", skip(self), err(Display, level = Level::ERROR))]
    fn grow(&mut self) -> Result<(), PoolError> {
        debug_assert!(self.header_mut(self.current).next.is_none());

        let back = self.current;
        let new = self.acquire_block(Some(back))?;
        self.header_mut(back).next = Some(new);
        self.current = new;
        Ok(())
    }

    /// Walks the chain from its head and hands every block back to the source.
    #[instrument(level = "debug", skip(self), fields(blocks = self.blocks.len()))]
    fn release_blocks(&mut self) {
        if self.blocks.is_empty() {
            return;
        }

        let mut next = Some(self.head);
        let mut released = 0;
        while let Some(index) = next {
            let block = self.blocks[index];
            next = unsafe { (*block.as_ptr()).next };
            unsafe { self.source.release(block.cast(), self.block_layout) };
            released += 1;
        }
        debug_assert_eq!(
            released,
            self.blocks.len(),
            "Every block should be reachable from the chain head."
        );

        self.blocks.clear();
        self.recycle_list.clear();
        debug!(released, "Released all blocks.");
    }

    #[inline(always)]
    fn header_mut(&mut self, index: usize) -> &mut BlockHeader {
        unsafe { &mut *self.blocks[index].as_ptr() }
    }
}

impl<S: BlockSource> Drop for Pool<S> {
    fn drop(&mut self) {
        self.release_blocks();
    }
}

#[cfg(test)]
mod tests;
