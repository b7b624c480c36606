//! Behavioral model of the PTOA bitstream for the simulation platform.
//!
//! The hardware pipeline reads the Parquet file from device memory, decodes
//! the first column and writes it as an Arrow Int64 values buffer. This model
//! does the same with the software Parquet reader, so host-side sequencing
//! can be exercised without a device.

use anyhow::{Context, Result};
use arrow_array::Array;
use bytes::Bytes;
use fletcher_runtime::registers::{buffer_address_reg, split_u64, REG_RETURN0, REG_RETURN1};
use fletcher_runtime::{KernelModel, SimDevice};
use tracing::{debug, warn};

use crate::arguments::{ADDRESS_OFFSET, NUM_VAL_OFFSET, SIZE_OFFSET};

pub struct PtoaKernelModel {
    reg_base: u64,
    /// Register holding the low word of the output values buffer address.
    output_address_reg: u64,
}

impl PtoaKernelModel {
    /// Model for a context with one queued output batch.
    pub fn new(reg_base: u64) -> Self {
        Self {
            reg_base,
            output_address_reg: buffer_address_reg(1, 0),
        }
    }
}

impl KernelModel for PtoaKernelModel {
    fn name(&self) -> &str {
        "ptoa"
    }

    fn run(&mut self, device: &mut SimDevice<'_>) -> Result<()> {
        let num_val = device.register(self.reg_base + NUM_VAL_OFFSET)? as usize;
        let address = device.register64(self.reg_base + ADDRESS_OFFSET)?;
        let size = device.register64(self.reg_base + SIZE_OFFSET)?;
        let output = device.register64(self.output_address_reg)?;
        debug!(
            "PTOA model: {} values from {:#x} ({} bytes) to {:#x}",
            num_val, address, size, output
        );

        let size = usize::try_from(size).context("Parquet size does not fit in memory")?;
        let parquet = device
            .read_memory(address, size)
            .context("Reading Parquet data from device memory")?;
        let column = arrow_interop::decode_column_as_int64(Bytes::from(parquet))
            .context("Decoding Parquet data")?;

        let written = num_val.min(column.len());
        if written < num_val {
            warn!(
                "PTOA model: column has {} values, {} requested",
                column.len(),
                num_val
            );
        }
        let mut values = Vec::with_capacity(written * 8);
        for i in 0..written {
            // Nulls have no representation in the values buffer.
            let v = if column.is_valid(i) { column.value(i) } else { 0 };
            values.extend_from_slice(&v.to_le_bytes());
        }
        device
            .write_memory(output, &values)
            .context("Writing values to the output buffer")?;

        let (lo, hi) = split_u64(written as u64);
        device.set_register(REG_RETURN0, lo)?;
        device.set_register(REG_RETURN1, hi)?;
        Ok(())
    }
}
