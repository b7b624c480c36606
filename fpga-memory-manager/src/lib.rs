pub mod device_memory;
pub mod slab_allocator;
pub mod transfer_stats;

pub use device_memory::DeviceMemory;
pub use slab_allocator::SlabAllocator;
pub use transfer_stats::{TransferDirection, TransferStats, TransferTotals};
