use anyhow::Result;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Slab allocator for device address space
///
/// Hands out device addresses in fixed-size slabs carved from a linear
/// region. Freed slabs are pooled per size class and reused. No host memory
/// is reserved here; see [`crate::DeviceMemory`] for backing storage.
pub struct SlabAllocator {
    base: u64,
    capacity: u64,
    slab_classes: Vec<SlabClass>,
    /// Next unused address in the region.
    next: Mutex<u64>,
    /// Live allocations: address -> slab class.
    live: Mutex<HashMap<u64, usize>>,
}

struct SlabClass {
    size: u64,
    free_slabs: Mutex<VecDeque<u64>>,
    max_slabs: usize,
    allocated_count: Mutex<usize>,
}

impl SlabAllocator {
    pub fn new(base: u64, capacity: u64, slab_sizes: &[u64], max_slabs_per_class: usize) -> Result<Self> {
        if slab_sizes.is_empty() {
            anyhow::bail!("At least one slab size is required");
        }
        if slab_sizes.windows(2).any(|w| w[0] >= w[1]) {
            anyhow::bail!("Slab sizes must be strictly increasing: {:?}", slab_sizes);
        }

        info!("Initializing device slab allocator");
        info!("  Region: {:#x} + {:#x}", base, capacity);
        info!("  Slab sizes: {:?}", slab_sizes);
        info!("  Max slabs per class: {}", max_slabs_per_class);

        let slab_classes = slab_sizes
            .iter()
            .map(|&size| SlabClass {
                size,
                free_slabs: Mutex::new(VecDeque::new()),
                max_slabs: max_slabs_per_class,
                allocated_count: Mutex::new(0),
            })
            .collect();

        Ok(Self {
            base,
            capacity,
            slab_classes,
            next: Mutex::new(base),
            live: Mutex::new(HashMap::new()),
        })
    }

    /// Power-of-four classes from 4 KiB up to 16 GiB, keeping only those
    /// that can still be placed after a smaller slab: a class of size `s`
    /// needs `2 * s <= capacity`.
    pub fn with_default_classes(base: u64, capacity: u64) -> Result<Self> {
        let sizes: Vec<u64> = (0..12)
            .map(|k| 4096u64 << (2 * k))
            .filter(|size| size.saturating_mul(2) <= capacity)
            .collect();
        Self::new(base, capacity, &sizes, 64)
    }

    /// Allocate a slab able to hold `size` bytes and return its address
    pub fn allocate(&self, size: u64) -> Result<u64> {
        // Smallest slab >= requested size
        let slab_class_idx = self.find_slab_class(size)?;
        let slab_class = &self.slab_classes[slab_class_idx];

        let ptr = {
            let mut free_slabs = slab_class.free_slabs.lock();
            if let Some(ptr) = free_slabs.pop_front() {
                debug!("Reusing slab from class {} (size {})", slab_class_idx, slab_class.size);
                ptr
            } else {
                drop(free_slabs);
                self.allocate_new_slab(slab_class, slab_class_idx)?
            }
        };

        self.live.lock().insert(ptr, slab_class_idx);
        Ok(ptr)
    }

    /// Return a slab to its pool
    pub fn free(&self, ptr: u64) -> Result<()> {
        let Some(slab_class_idx) = self.live.lock().remove(&ptr) else {
            anyhow::bail!("Device address {:#x} is not allocated", ptr);
        };

        let slab_class = &self.slab_classes[slab_class_idx];
        debug!("Returning slab {:#x} to pool (class {})", ptr, slab_class_idx);
        slab_class.free_slabs.lock().push_back(ptr);
        Ok(())
    }

    /// Slab size backing a live allocation.
    pub fn slab_size(&self, ptr: u64) -> Option<u64> {
        self.live
            .lock()
            .get(&ptr)
            .map(|&idx| self.slab_classes[idx].size)
    }

    pub fn live_allocations(&self) -> usize {
        self.live.lock().len()
    }

    /// Bytes of the region carved into slabs so far.
    pub fn used_bytes(&self) -> u64 {
        *self.next.lock() - self.base
    }

    fn find_slab_class(&self, size: u64) -> Result<usize> {
        for (idx, slab_class) in self.slab_classes.iter().enumerate() {
            if slab_class.size >= size {
                return Ok(idx);
            }
        }

        let largest = self.slab_classes.last().map(|c| c.size).unwrap_or(0);
        anyhow::bail!("Requested size {} exceeds largest slab size {}", size, largest);
    }

    fn allocate_new_slab(&self, slab_class: &SlabClass, class_idx: usize) -> Result<u64> {
        let mut count = slab_class.allocated_count.lock();

        if *count >= slab_class.max_slabs {
            anyhow::bail!(
                "Maximum number of slabs ({}) reached for class {}",
                slab_class.max_slabs,
                class_idx
            );
        }

        let mut next = self.next.lock();
        // Slabs are aligned to their own size within the region.
        let offset = (*next - self.base).div_ceil(slab_class.size) * slab_class.size;
        let aligned = self.base + offset;
        let end = aligned
            .checked_add(slab_class.size)
            .ok_or_else(|| anyhow::anyhow!("Device address space overflow"))?;
        if end > self.base + self.capacity {
            anyhow::bail!(
                "Device memory exhausted: slab of {} bytes does not fit below {:#x}",
                slab_class.size,
                self.base + self.capacity
            );
        }

        debug!(
            "Allocating new slab {:#x} for class {} (size {})",
            aligned, class_idx, slab_class.size
        );
        *next = end;
        *count += 1;

        Ok(aligned)
    }
}

impl Drop for SlabAllocator {
    fn drop(&mut self) {
        debug!(
            "Shutting down device slab allocator, {} bytes carved",
            self.used_bytes()
        );
        for (idx, slab_class) in self.slab_classes.iter().enumerate() {
            let allocated = *slab_class.allocated_count.lock();
            if allocated > 0 {
                debug!(
                    "  Class {}: {} slabs, {} free",
                    idx,
                    allocated,
                    slab_class.free_slabs.lock().len()
                );
            }
        }
    }
}
