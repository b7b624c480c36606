//! Binding of record batches to a platform.

use std::sync::Arc;

use arrow::array::{Array, ArrayData};
use arrow::buffer::Buffer;
use arrow::record_batch::RecordBatch;
use tracing::{debug, info, warn};

use crate::error::{FletcherError, Result};
use crate::platform::{DeviceAddress, Platform};
use crate::registers::{batch_first_index_reg, buffer_address_reg};

/// A device-resident copy of one Arrow buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceBuffer {
    pub device_address: DeviceAddress,
    pub size: u64,
    /// Index of the record batch the buffer belongs to.
    pub batch: usize,
}

/// An execution session on a platform.
///
/// Record batches are queued first; [`Context::enable`] then places every
/// Arrow buffer of every batch in device memory, in schema order (validity
/// bitmap, then data buffers, then children), and publishes the row ranges
/// and buffer addresses through the schema registers.
pub struct Context {
    platform: Arc<dyn Platform>,
    batches: Vec<RecordBatch>,
    buffers: Vec<DeviceBuffer>,
    enabled: bool,
}

impl Context {
    pub fn make(platform: Arc<dyn Platform>) -> Result<Self> {
        debug!("Creating context on platform '{}'", platform.name());
        Ok(Self {
            platform,
            batches: Vec::new(),
            buffers: Vec::new(),
            enabled: false,
        })
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    pub fn queue_record_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if self.enabled {
            return Err(FletcherError::AlreadyEnabled);
        }
        debug!(
            "Queued RecordBatch {}: {} rows, {} columns",
            self.batches.len(),
            batch.num_rows(),
            batch.num_columns()
        );
        self.batches.push(batch);
        Ok(())
    }

    /// Copy queued batches to the device and write the schema registers.
    pub fn enable(&mut self) -> Result<()> {
        if self.enabled {
            return Err(FletcherError::AlreadyEnabled);
        }
        let num_batches = self.batches.len();

        for (i, batch) in self.batches.iter().enumerate() {
            let last = u32::try_from(batch.num_rows()).map_err(|_| {
                FletcherError::SizeMismatch(format!(
                    "RecordBatch {} has {} rows, more than a register holds",
                    i,
                    batch.num_rows()
                ))
            })?;
            let first_reg = batch_first_index_reg(i);
            self.platform.write_mmio(first_reg, 0)?;
            self.platform.write_mmio(first_reg + 1, last)?;
        }

        let mut host_buffers = Vec::new();
        for (i, batch) in self.batches.iter().enumerate() {
            for column in batch.columns() {
                let mut column_buffers = Vec::new();
                collect_buffers(&column.to_data(), &mut column_buffers);
                host_buffers.extend(column_buffers.into_iter().map(|b| (i, b)));
            }
        }

        for (index, (batch, host)) in host_buffers.iter().enumerate() {
            let size = host.len() as u64;
            let device_address = self.platform.device_malloc(size)?;
            self.buffers.push(DeviceBuffer {
                device_address,
                size,
                batch: *batch,
            });
            if size > 0 {
                self.platform
                    .copy_host_to_device(host.as_slice(), device_address)?;
            }
            self.platform
                .write_mmio64(buffer_address_reg(num_batches, index), device_address)?;
        }

        self.enabled = true;
        info!(
            "Context enabled: {} RecordBatches, {} device buffers",
            num_batches,
            self.buffers.len()
        );
        Ok(())
    }

    pub fn device_buffer(&self, index: usize) -> Result<&DeviceBuffer> {
        self.buffers
            .get(index)
            .ok_or(FletcherError::NoSuchBuffer(index))
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        for buffer in self.buffers.drain(..) {
            if let Err(e) = self.platform.device_free(buffer.device_address) {
                warn!(
                    "Could not free device buffer {:#x}: {}",
                    buffer.device_address, e
                );
            }
        }
    }
}

fn collect_buffers(data: &ArrayData, out: &mut Vec<Buffer>) {
    if let Some(nulls) = data.nulls() {
        out.push(nulls.buffer().clone());
    }
    out.extend(data.buffers().iter().cloned());
    for child in data.child_data() {
        collect_buffers(child, out);
    }
}
