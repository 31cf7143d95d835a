#[cfg(feature = "memory_stats")]
mod allocator_stats;
mod block_allocator;
mod error;
mod resource;
mod tracking_allocator;

#[cfg(feature = "memory_stats")]
pub use allocator_stats::AllocatorStats;
pub use block_allocator::BlockAllocator;
pub use error::AllocError;
pub use resource::MemoryResource;
pub use tracking_allocator::TrackingAllocator;
