use std::{alloc::Layout, marker::PhantomData, ptr::NonNull};

use log::warn;

use super::{AllocError, MemoryResource, TrackingAllocator};

/// Typed view of a borrowed [`MemoryResource`] that hands out storage for
/// `count` contiguous values of `T`.
///
/// The handle is `Copy` and only borrows the resource, so the resource has
/// to outlive every handle (and every container holding one).
pub struct BlockAllocator<'r, T, R: ?Sized = TrackingAllocator> {
    resource: &'r R,
    _marker: PhantomData<fn() -> T>,
}

impl<'r, T, R: MemoryResource + ?Sized> BlockAllocator<'r, T, R> {
    #[inline(always)]
    pub const fn new(resource: &'r R) -> Self {
        Self {
            resource,
            _marker: PhantomData,
        }
    }

    #[inline(always)]
    pub const fn resource(&self) -> &'r R {
        self.resource
    }

    /// Layout of a block holding `count` values of `T`.
    pub fn layout(count: usize) -> Result<Layout, AllocError> {
        Layout::array::<T>(count).map_err(|_| AllocError::CapacityOverflow {
            count,
            elem_size: std::mem::size_of::<T>(),
        })
    }

    /// Uninitialized storage for `count` values of `T`.
    ///
    /// # Panics
    ///
    /// Panics if the total size overflows `isize::MAX`. Exhaustion of the
    /// underlying memory aborts through the resource.
    pub fn allocate(&self, count: usize) -> NonNull<T> {
        match self.try_allocate(count) {
            Ok(block) => block,
            Err(err) => panic!("{err}"),
        }
    }

    pub fn try_allocate(&self, count: usize) -> Result<NonNull<T>, AllocError> {
        let layout = Self::layout(count)?;

        Ok(self.resource.allocate(layout).cast())
    }

    /// Returns storage obtained from [`BlockAllocator::allocate`].
    ///
    /// Values still living in the block are not dropped.
    ///
    /// # Safety
    ///
    /// `block` must come from `allocate(count)` on a handle whose resource is
    /// equal to this one, with the same `count`, and must not be used again.
    pub unsafe fn deallocate(&self, block: NonNull<T>, count: usize) {
        let Ok(layout) = Self::layout(count) else {
            warn!("Ignoring deallocation of {count} blocks: size overflows isize::MAX");
            return;
        };

        // SAFETY: forwarded caller contract; the layout is recomputed exactly
        // as `allocate` computed it.
        unsafe { self.resource.deallocate(block.cast(), layout) };
    }
}

impl<T, R: ?Sized> Clone for BlockAllocator<'_, T, R> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, R: ?Sized> Copy for BlockAllocator<'_, T, R> {}

impl<T, U, R, S> PartialEq<BlockAllocator<'_, U, S>> for BlockAllocator<'_, T, R>
where
    R: MemoryResource + ?Sized,
    S: MemoryResource + ?Sized,
{
    fn eq(&self, other: &BlockAllocator<'_, U, S>) -> bool {
        std::ptr::addr_eq(self.resource, other.resource)
    }
}

impl<T, R: ?Sized> std::fmt::Debug for BlockAllocator<'_, T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockAllocator")
            .field("type", &std::any::type_name::<T>())
            .field("resource", &(self.resource as *const R))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_allocator_basic() {
        let resource = TrackingAllocator::new();
        let blocks: BlockAllocator<'_, u64> = BlockAllocator::new(&resource);

        let block = blocks.allocate(1);
        unsafe { block.as_ptr().write(42) };
        assert_eq!(unsafe { *block.as_ptr() }, 42);
        assert_eq!(resource.allocated_count(), 1);
        assert_eq!(resource.allocated_bytes(), 8);

        unsafe { blocks.deallocate(block, 1) };
        assert_eq!(resource.allocated_count(), 0);
    }

    #[test]
    fn test_block_allocator_array() {
        let resource = TrackingAllocator::new();
        let blocks: BlockAllocator<'_, u32> = BlockAllocator::new(&resource);

        let block = blocks.allocate(100);
        assert_eq!(resource.allocated_count(), 1);
        assert_eq!(resource.allocated_bytes(), 400);

        unsafe { blocks.deallocate(block, 100) };
        assert_eq!(resource.allocated_count(), 0);
    }

    #[test]
    fn test_block_allocator_zero_count() {
        let resource = TrackingAllocator::new();
        let blocks: BlockAllocator<'_, u64> = BlockAllocator::new(&resource);

        let block = blocks.allocate(0);
        assert_eq!(resource.allocated_count(), 0);

        unsafe { blocks.deallocate(block, 0) };
        assert_eq!(resource.allocated_count(), 0);
    }

    #[test]
    fn test_block_allocator_capacity_overflow() {
        let resource = TrackingAllocator::new();
        let blocks: BlockAllocator<'_, u64> = BlockAllocator::new(&resource);

        assert_eq!(
            blocks.try_allocate(usize::MAX),
            Err(AllocError::CapacityOverflow {
                count: usize::MAX,
                elem_size: 8,
            })
        );
        assert_eq!(resource.allocated_count(), 0);
    }

    #[test]
    #[should_panic(expected = "size overflows isize::MAX")]
    fn test_block_allocator_capacity_overflow_panics() {
        let resource = TrackingAllocator::new();
        let blocks: BlockAllocator<'_, u64> = BlockAllocator::new(&resource);

        let _ = blocks.allocate(usize::MAX);
    }

    #[test]
    fn test_block_allocator_equality_follows_resource() {
        let first = TrackingAllocator::new();
        let second = TrackingAllocator::new();

        let a: BlockAllocator<'_, u8> = BlockAllocator::new(&first);
        let b: BlockAllocator<'_, [u64; 4]> = BlockAllocator::new(&first);
        let c: BlockAllocator<'_, u8> = BlockAllocator::new(&second);

        assert!(a == b);
        assert!(a != c);
        assert!(std::ptr::eq(a.resource(), &first));
    }

    #[test]
    fn test_block_allocator_over_dyn_resource() {
        let resource = TrackingAllocator::new();
        let as_dyn: &dyn MemoryResource = &resource;
        let blocks = BlockAllocator::<u16, _>::new(as_dyn);

        let block = blocks.allocate(3);
        assert_eq!(resource.allocated_count(), 1);

        unsafe { blocks.deallocate(block, 3) };
        assert_eq!(resource.allocated_count(), 0);
    }
}
