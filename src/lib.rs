//! A segregated fixed-size block pool allocator.
//!
//! A [`Pool`] hands out slots of one fixed size at bump-allocator speed. Freeing a slot
//! does not give memory back, it puts the slot on a recycle list from which the next
//! allocation is served. On top of that the most recent allocations can be rolled back,
//! which makes the pool a good fit for speculative work that may need to be undone.
//!
//! # Usage
//! ```
//! use block_pool::{Pool, PoolConfig, SystemSource};
//!
//! # fn main() -> Result<(), block_pool::PoolError> {
//! let config = PoolConfig::new().with_block_size(64 * 1024);
//! let mut pool = Pool::with_config(16, config, SystemSource)?;
//!
//! let a = pool.allocate()?;
//! let b = pool.allocate()?;
//! assert_ne!(a, b);
//!
//! // Recycled slots are reused first.
//! unsafe { pool.recycle(b.as_ptr()) };
//! assert_eq!(pool.allocate()?, b);
//!
//! // Rolled back slots come out again, in the same order.
//! let c = pool.allocate()?;
//! assert_eq!(pool.rollback(1), 1);
//! assert_eq!(pool.allocate()?, c);
//!
//! pool.destroy();
//! # Ok(())
//! # }
//! ```
//!
//! # Mode of operation
//! - An allocation first pops the recycle list. Only when it is empty is a never-used slot
//!   taken from the current block by advancing the block's cursor.
//! - When the current block has no never-used slots left, the pool moves to the next block
//!   of its chain, or acquires a new block from its [source](#block-sources) if there is none.
//! - Recycling pushes the slot on the recycle list, nothing else is touched.
//! - Rolling back `n` allocations moves cursors back by `n`, walking the chain backward
//!   when a block's cursor reaches zero.
//!
//! Below is a list of the abstractions the pool operates with:
//!
//! ## Blocks
//! A block is one fixed-size, cache-line-aligned chunk of raw memory. It begins with a
//! header holding its bookkeeping (capacity, cursor, free count, object size and its
//! neighbours in the chain) and the rest of it is a flat array of slots. All blocks of a
//! pool have the same size and thus the same number of slots, reported by
//! [`Pool::entries_per_block`]. Blocks are never released before the pool is destroyed.
//!
//! ## Slots
//! A slot is an object-sized region inside a block. The pool knows nothing about what is
//! stored there. Slots are at least one pointer wide so that a recycled slot can hold the
//! link to the next recycled one.
//!
//! ## Recycle list
//! The recycle list is a singly-linked list embedded in the recycled slots themselves.
//! It costs no extra memory and both pushing and popping are *O*(1). Recycling the
//! same slot twice, or a slot of another pool, corrupts it, which is why
//! [`Pool::recycle`] is unsafe.
//!
//! ## Block sources
//! A pool gets its blocks from a [`BlockSource`]. [`SystemSource`] uses the system allocator,
//! [`MmapSource`] maps every block on its own. Anything that can hand out aligned
//! fixed-size memory can implement the trait.
//!
//! # Threads
//! A pool performs no synchronization whatsoever and is not `Sync`. To allocate from many
//! threads give each one its own pool, [`ShardedPools`] builds such a set up front and
//! pads every pool to its own cache line so that neighbouring pools don't false-share.
//!
//! [`MmapSource`]: sources::MmapSource
//! [`BlockSource`]: sources::BlockSource
//! [`SystemSource`]: sources::SystemSource
//! [`ShardedPools`]: sharded::ShardedPools

pub use crate::config::PoolConfig;
pub use crate::error::PoolError;
pub use crate::pool::Pool;
pub use crate::sharded::ShardedPools;
pub use crate::sources::SystemSource;

pub mod config;
mod error;
mod freelist;
mod header;
pub mod pool;
pub mod sharded;
pub mod sources;
pub mod util;
