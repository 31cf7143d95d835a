use std::{alloc::Layout, ptr::NonNull};

/// A source of raw memory blocks that containers can be generic over.
///
/// Implementors hand out blocks with the exact size and alignment requested
/// and take them back with the same [`Layout`]. Running out of memory is
/// fatal and is reported through [`std::alloc::handle_alloc_error`], never
/// through a return value.
///
/// # Safety
///
/// Containers write values straight into the blocks this trait hands out,
/// so implementors must guarantee that every block returned by
/// [`MemoryResource::allocate`]:
///
/// - is valid for reads and writes of `layout.size()` bytes and aligned to
///   `layout.align()`;
/// - does not overlap any other block that is still live in this resource;
/// - stays valid until it is passed back to [`MemoryResource::deallocate`]
///   or the resource is dropped.
///
/// [`MemoryResource::is_equal`] may only return `true` for resources that
/// can release each other's blocks.
///
/// A resource that hands out the same storage twice cannot be written in
/// safe code:
///
/// ```compile_fail
/// use std::{alloc::Layout, ptr::NonNull};
///
/// use tally_memory::MemoryResource;
///
/// struct OneSlot(NonNull<u8>);
///
/// impl MemoryResource for OneSlot {
///     fn allocate(&self, _layout: Layout) -> NonNull<u8> {
///         self.0
///     }
///
///     unsafe fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) {}
/// }
/// ```
pub unsafe trait MemoryResource {
    /// Returns a block fitting `layout`.
    ///
    /// Zero-sized layouts yield a dangling, well-aligned pointer that must
    /// never be dereferenced.
    fn allocate(&self, layout: Layout) -> NonNull<u8>;

    /// Returns `ptr` to this resource.
    ///
    /// # Safety
    ///
    /// `ptr` must have been returned by [`MemoryResource::allocate`] on a
    /// resource equal to `self` with the same `layout`, and nothing may
    /// access the block afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, layout: Layout);

    /// Whether blocks allocated from `self` can be released through `other`
    /// and vice versa. The default is identity: the same instance.
    fn is_equal(&self, other: &dyn MemoryResource) -> bool {
        std::ptr::addr_eq(self, other)
    }
}

#[inline(always)]
pub(crate) fn dangling(layout: Layout) -> NonNull<u8> {
    // SAFETY: alignments are non-zero powers of two.
    unsafe { NonNull::new_unchecked(std::ptr::without_provenance_mut(layout.align())) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dangling_is_aligned() {
        #[repr(align(64))]
        struct Aligned64;

        let layout = Layout::new::<Aligned64>();
        let ptr = dangling(layout);

        assert_eq!(ptr.as_ptr().align_offset(64), 0);
    }
}
