//! Monotonic image pool shared by the two drive slots.
//!
//! The pool is a bump arena: allocations only move the cursor forward and
//! the whole pool is reset at once when no drive holds an image any more.
//! There is no per-region free.

use crate::error::{DiskError, DiskResult};

/// Default pool capacity (8 MiB of PSRAM on the reference board).
pub const DEFAULT_POOL_CAPACITY: usize = 8 * 1024 * 1024;

/// Allocation granule.
const ALIGN: usize = 4;

/// A region handed out by the pool. Not `Clone`: exactly one drive slot owns
/// it until it is given back with `MemoryPool::free`.
#[derive(Debug, PartialEq, Eq)]
pub struct PoolRegion {
    offset: usize,
    len: usize,
}

impl PoolRegion {
    /// Start of the region inside the pool.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Requested length (before alignment).
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// One past the last byte of the region.
    pub fn end(&self) -> usize {
        self.offset + self.len
    }
}

/// Bump allocator backing staged disk images.
pub struct MemoryPool {
    arena: Vec<u8>,
    offset: usize,
    capacity: usize,
}

impl Default for MemoryPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

impl MemoryPool {
    /// Create a pool. Backing memory grows on demand up to `capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            arena: Vec::new(),
            offset: 0,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes consumed since the last reset (aligned sizes).
    pub fn used(&self) -> usize {
        self.offset
    }

    pub fn available(&self) -> usize {
        self.capacity - self.offset
    }

    /// Allocate `size` bytes rounded up to 4. Fails without side effect when
    /// the pool cannot hold the request.
    pub fn alloc(&mut self, size: usize) -> DiskResult<PoolRegion> {
        let aligned = size
            .checked_add(ALIGN - 1)
            .map(|s| s & !(ALIGN - 1))
            .filter(|s| *s <= self.available())
            .ok_or_else(|| {
                log::warn!(
                    "Pool allocation failed: need {}, have {}",
                    size,
                    self.available()
                );
                DiskError::PoolExhausted {
                    requested: size,
                    available: self.available(),
                }
            })?;

        let region = PoolRegion {
            offset: self.offset,
            len: size,
        };
        self.offset += aligned;
        if self.arena.len() < self.offset {
            self.arena.resize(self.offset, 0);
        }
        log::debug!(
            "Pool allocated {} bytes at {:#x} (total used: {})",
            aligned,
            region.offset,
            self.offset
        );
        Ok(region)
    }

    /// Give a region back. The pool only resets when `slots_idle` says no
    /// drive holds an image; otherwise this is a no-op. Returns whether the
    /// pool was reset.
    pub fn free(&mut self, region: PoolRegion, slots_idle: bool) -> bool {
        drop(region);
        if !slots_idle {
            return false;
        }
        self.offset = 0;
        self.arena.clear();
        log::debug!("Pool reset");
        true
    }

    /// Bytes of a live region.
    pub fn bytes(&self, region: &PoolRegion) -> &[u8] {
        &self.arena[region.offset..region.end()]
    }

    /// Mutable bytes of a live region.
    pub fn bytes_mut(&mut self, region: &PoolRegion) -> &mut [u8] {
        &mut self.arena[region.offset..region.end()]
    }
}
