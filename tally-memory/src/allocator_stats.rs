#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AllocatorStats {
    pub total_allocations: usize,
    pub total_deallocations: usize,
    pub rejected_deallocations: usize,
    pub live_blocks: usize,
    pub peak_live_blocks: usize,
    pub live_bytes: usize,
}
