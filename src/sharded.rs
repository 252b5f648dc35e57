//! One pool per worker.

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::pool::Pool;
use crate::sources::{BlockSource, SystemSource};
use crate::util::CACHE_LINE_SIZE;

use core::mem::align_of;
use core::ops::{Deref, DerefMut};

use static_assertions::const_assert_eq;
use tracing::{info, instrument};

/// Pads and aligns a value to a cache line, so that two adjacent values in an array never
/// share one.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(C, align(64))]
pub struct CachePadded<T>(T);

const_assert_eq!(align_of::<CachePadded<u8>>(), CACHE_LINE_SIZE);

impl<T> CachePadded<T> {
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        CachePadded(value)
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for CachePadded<T> {
    type Target = T;

    #[inline(always)]
    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for CachePadded<T> {
    #[inline(always)]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

/// A set of independently owned pools of the same object size, one per worker.
///
/// No pool is ever shared, so no locking is involved: a worker borrows its own pool
/// mutably (for example through [`iter_mut`](ShardedPools::iter_mut) inside
/// [`std::thread::scope`]) and allocates from it directly.
///
/// ```
/// use block_pool::{PoolConfig, ShardedPools, SystemSource};
///
/// # fn main() -> Result<(), block_pool::PoolError> {
/// let config = PoolConfig::new().with_block_size(16 * 1024);
/// let mut pools = ShardedPools::with_config(16, config, (0..4).map(|_| SystemSource))?;
///
/// std::thread::scope(|s| {
///     for pool in pools.iter_mut() {
///         s.spawn(move || {
///             for _ in 0..2000 {
///                 let slot = pool.allocate().unwrap();
///                 unsafe { slot.as_ptr().write(1) };
///             }
///         });
///     }
/// });
/// assert!(pools.iter_mut().all(|pool| pool.block_count() > 1));
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ShardedPools<S: BlockSource = SystemSource> {
    shards: Vec<CachePadded<Pool<S>>>,
}

impl ShardedPools<SystemSource> {
    /// Creates `shards` pools for objects of `object_size` bytes, all backed by the
    /// system allocator and the default [`PoolConfig`].
    pub fn new(shards: usize, object_size: usize) -> Result<Self, PoolError> {
        ShardedPools::with_config(
            object_size,
            PoolConfig::new(),
            (0..shards).map(|_| SystemSource),
        )
    }
}

impl<S: BlockSource> ShardedPools<S> {
    /// Creates one pool per source in `sources`. Either every pool is created or the first
    /// error is returned and the pools created so far are destroyed.
    #[instrument(level = "info", skip(sources))]
    pub fn with_config<I>(
        object_size: usize,
        config: PoolConfig,
        sources: I,
    ) -> Result<Self, PoolError>
    where
        I: IntoIterator<Item = S>,
    {
        let shards = sources
            .into_iter()
            .map(|source| Pool::with_config(object_size, config, source).map(CachePadded::new))
            .collect::<Result<Vec<_>, _>>()?;
        info!(shards = shards.len(), "Created sharded pools.");
        Ok(ShardedPools { shards })
    }

    /// Returns the pool of shard `id`, or `None` if there is no such shard.
    #[inline]
    pub fn shard_mut(&mut self, id: usize) -> Option<&mut Pool<S>> {
        self.shards.get_mut(id).map(|shard| &mut **shard)
    }

    /// Returns every pool, in shard order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Pool<S>> {
        self.shards.iter_mut().map(|shard| &mut **shard)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.shards.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Destroys every pool.
    pub fn destroy(self) {
        for shard in self.shards {
            shard.into_inner().destroy();
        }
    }
}
