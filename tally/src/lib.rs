mod iter;
mod stack;

pub use iter::{Iter, IterMut};
pub use stack::Stack;

pub use tally_memory as memory;
#[cfg(feature = "memory_stats")]
pub use tally_memory::AllocatorStats;
pub use tally_memory::{AllocError, BlockAllocator, MemoryResource, TrackingAllocator};
