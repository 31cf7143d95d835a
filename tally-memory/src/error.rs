use std::alloc::Layout;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    /// The address was never handed out by this allocator, or was already
    /// returned to it.
    #[error("block {address:#x} is not live in this allocator (double free or foreign pointer)")]
    UnknownBlock { address: usize },

    #[error("block {address:#x} was allocated as {expected:?} but released as {actual:?}")]
    LayoutMismatch {
        address: usize,
        expected: Layout,
        actual: Layout,
    },

    #[error("cannot allocate {count} blocks of {elem_size} bytes: size overflows isize::MAX")]
    CapacityOverflow { count: usize, elem_size: usize },
}
