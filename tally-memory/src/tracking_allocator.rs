use std::{alloc::Layout, cell::RefCell, ptr::NonNull};

use log::{trace, warn};
use rustc_hash::FxHashMap;

#[cfg(feature = "memory_stats")]
use super::AllocatorStats;
use super::{AllocError, MemoryResource, resource::dangling};

/// A [`MemoryResource`] that records every block it has handed out and not
/// yet taken back.
///
/// Blocks come from the global allocator. The live set is keyed by block
/// address and remembers each block's layout, so the count of outstanding
/// blocks can be queried at any time and anything still outstanding when
/// the allocator is dropped is returned to the global allocator.
///
/// The allocator is single-threaded: the live set sits in a [`RefCell`], so
/// the type is `!Sync` and can only be shared by reference within a thread.
///
/// ```
/// use std::alloc::Layout;
///
/// use tally_memory::{MemoryResource, TrackingAllocator};
///
/// let allocator = TrackingAllocator::new();
/// let layout = Layout::new::<u64>();
///
/// let block = allocator.allocate(layout);
/// assert_eq!(allocator.allocated_count(), 1);
///
/// unsafe { allocator.deallocate(block, layout) };
/// assert_eq!(allocator.allocated_count(), 0);
/// ```
pub struct TrackingAllocator {
    live: RefCell<FxHashMap<NonNull<u8>, Layout>>,
    #[cfg(feature = "memory_stats")]
    stats: RefCell<AllocatorStats>,
}

impl TrackingAllocator {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an allocator whose live set can hold `capacity` blocks before
    /// it has to grow.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            live: RefCell::new(FxHashMap::with_capacity_and_hasher(
                capacity,
                Default::default(),
            )),
            #[cfg(feature = "memory_stats")]
            stats: RefCell::new(AllocatorStats::default()),
        }
    }

    /// Number of blocks currently handed out.
    #[inline(always)]
    pub fn allocated_count(&self) -> usize {
        self.live.borrow().len()
    }

    /// Total size in bytes of the blocks currently handed out.
    pub fn allocated_bytes(&self) -> usize {
        self.live.borrow().values().map(Layout::size).sum()
    }

    /// Whether `ptr` is a block this allocator handed out and has not taken
    /// back yet.
    pub fn contains(&self, ptr: NonNull<u8>) -> bool {
        self.live.borrow().contains_key(&ptr)
    }

    #[cfg(feature = "memory_stats")]
    pub fn stats(&self) -> AllocatorStats {
        *self.stats.borrow()
    }

    /// Returns `ptr` to the global allocator if it is live in this allocator
    /// and was recorded with `layout`.
    ///
    /// Unknown addresses (double frees, foreign pointers) and layout
    /// mismatches are rejected without touching the global allocator, and
    /// the live set is left as it was.
    ///
    /// # Safety
    ///
    /// On success the block is freed, so nothing may access it afterwards.
    pub unsafe fn try_deallocate(
        &self,
        ptr: NonNull<u8>,
        layout: Layout,
    ) -> Result<(), AllocError> {
        if layout.size() == 0 {
            return Ok(());
        }

        let address = ptr.as_ptr().addr();

        let recorded = self.live.borrow().get(&ptr).copied();

        match recorded {
            None => {
                self.record_rejected();
                return Err(AllocError::UnknownBlock { address });
            }
            Some(expected) if expected != layout => {
                self.record_rejected();
                return Err(AllocError::LayoutMismatch {
                    address,
                    expected,
                    actual: layout,
                });
            }
            Some(_) => {
                self.live.borrow_mut().remove(&ptr);
            }
        }

        #[cfg(feature = "memory_stats")]
        {
            let mut stats = self.stats.borrow_mut();
            stats.total_deallocations += 1;
            stats.live_blocks -= 1;
            stats.live_bytes -= layout.size();
        }

        trace!(
            "deallocate {:#x} ({} bytes, align {})",
            address,
            layout.size(),
            layout.align()
        );

        // SAFETY: the block was live in this allocator with exactly this
        // layout, so it came from `std::alloc::alloc` with it.
        unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };

        Ok(())
    }

    #[inline(always)]
    fn record_rejected(&self) {
        #[cfg(feature = "memory_stats")]
        {
            self.stats.borrow_mut().rejected_deallocations += 1;
        }
    }
}

impl Default for TrackingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: every non-zero-sized block is a fresh `std::alloc::alloc` result
// that stays allocated until it is released through `try_deallocate` or the
// allocator is dropped; zero-sized layouts get a dangling pointer that is
// never dereferenced.
unsafe impl MemoryResource for TrackingAllocator {
    fn allocate(&self, layout: Layout) -> NonNull<u8> {
        if layout.size() == 0 {
            return dangling(layout);
        }

        // SAFETY: the layout has a non-zero size.
        let raw = unsafe { std::alloc::alloc(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            std::alloc::handle_alloc_error(layout);
        };

        let previous = self.live.borrow_mut().insert(ptr, layout);
        debug_assert!(
            previous.is_none(),
            "Global allocator handed out live block {:p} twice",
            ptr
        );

        #[cfg(feature = "memory_stats")]
        {
            let mut stats = self.stats.borrow_mut();
            stats.total_allocations += 1;
            stats.live_blocks += 1;
            stats.live_bytes += layout.size();
            stats.peak_live_blocks = stats.peak_live_blocks.max(stats.live_blocks);
        }

        trace!(
            "allocate {:#x} ({} bytes, align {})",
            ptr.as_ptr().addr(),
            layout.size(),
            layout.align()
        );

        ptr
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) {
        // SAFETY: forwarded caller contract.
        if let Err(err) = unsafe { self.try_deallocate(ptr, layout) } {
            warn!("Ignoring deallocation: {err}");
        }
    }
}

impl PartialEq for TrackingAllocator {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl Eq for TrackingAllocator {}

impl std::fmt::Debug for TrackingAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingAllocator")
            .field("allocated_count", &self.allocated_count())
            .field("allocated_bytes", &self.allocated_bytes())
            .finish()
    }
}

impl Drop for TrackingAllocator {
    fn drop(&mut self) {
        #[cfg(feature = "tracy")]
        let _span = tracy_client::span!("TrackingAllocator::drop");

        let live = self.live.get_mut();

        if !live.is_empty() {
            warn!(
                "Reclaiming {} block(s), {} bytes still live at allocator drop",
                live.len(),
                live.values().map(Layout::size).sum::<usize>()
            );
        }

        for (ptr, layout) in live.drain() {
            // SAFETY: every live entry came from `std::alloc::alloc` with the
            // recorded layout and was never released.
            unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
        }
    }
}
