//! Pool configuration.

use core::alloc::Layout;

use crate::error::PoolError;
use crate::header::{BlockHeader, HEADER_SIZE};
use crate::util::{clamp_object_size, CACHE_LINE_SIZE};

/// Raw size of a block when none is configured, 32 MiB.
pub const DEFAULT_BLOCK_SIZE: usize = 4096 * 8192;

/// Settings shared by every block of a [`Pool`](crate::Pool).
///
/// ```
/// use block_pool::PoolConfig;
///
/// const CONFIG: PoolConfig = PoolConfig::new().with_block_size(64 * 1024);
/// assert_eq!(CONFIG.block_size(), 64 * 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    block_size: usize,
}

/// What a validated configuration resolves to for one object size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockGeometry {
    pub object_size: usize,
    pub entries: usize,
    pub layout: Layout,
}

impl PoolConfig {
    #[inline(always)]
    pub const fn new() -> Self {
        PoolConfig {
            block_size: DEFAULT_BLOCK_SIZE,
        }
    }

    /// Sets the raw size of each block, header included.
    #[inline(always)]
    pub const fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    #[inline(always)]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Resolves the block geometry for objects of `object_size` bytes.
    ///
    /// Fails with [`PoolError::InvalidConfiguration`] if the object does not fit in
    /// the space a block leaves after its header, or if the block size cannot be
    /// described by a cache-line aligned [`Layout`].
    pub(crate) fn geometry(&self, object_size: usize) -> Result<BlockGeometry, PoolError> {
        let invalid = PoolError::InvalidConfiguration {
            object_size,
            block_size: self.block_size,
        };

        let heap_size = self.block_size.checked_sub(HEADER_SIZE).ok_or(invalid)?;
        if object_size > heap_size {
            return Err(invalid);
        }

        let object_size = clamp_object_size(object_size);
        let entries = match BlockHeader::capacity(self.block_size, object_size) {
            Some(entries) if entries > 0 => entries,
            _ => return Err(invalid),
        };
        let layout = Layout::from_size_align(self.block_size, CACHE_LINE_SIZE).map_err(|_| invalid)?;

        Ok(BlockGeometry {
            object_size,
            entries,
            layout,
        })
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig::new()
    }
}
