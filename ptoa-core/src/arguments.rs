//! PTOA argument registers.
//!
//! Layout, relative to the register base:
//!
//! | offset | contents                         |
//! |--------|----------------------------------|
//! | 0      | number of values to decode       |
//! | 1, 2   | Parquet data device address lo/hi|
//! | 3, 4   | Parquet data size in bytes lo/hi |

use fletcher_runtime::{DeviceAddress, Platform, Result};
use tracing::{debug, info, warn};

/// First PTOA register after the Fletcher default and schema registers.
pub const DEFAULT_REG_BASE: u64 = 10;

pub const NUM_VAL_OFFSET: u64 = 0;
pub const ADDRESS_OFFSET: u64 = 1;
pub const SIZE_OFFSET: u64 = 3;

/// Write the kernel arguments.
pub fn set_ptoa_arguments(
    platform: &dyn Platform,
    reg_base: u64,
    num_val: u32,
    max_size: u64,
    device_parquet_address: DeviceAddress,
) -> Result<()> {
    debug!(
        "PTOA arguments: num_val={}, address={:#x}, size={}",
        num_val, device_parquet_address, max_size
    );
    platform.write_mmio(reg_base + NUM_VAL_OFFSET, num_val)?;
    platform.write_mmio64(reg_base + ADDRESS_OFFSET, device_parquet_address)?;
    platform.write_mmio64(reg_base + SIZE_OFFSET, max_size)
}

/// Read the value count back and report whether it matches.
pub fn check_mmio(platform: &dyn Platform, reg_base: u64, num_val: u32) -> Result<bool> {
    let value = platform.read_mmio(reg_base + NUM_VAL_OFFSET)?;
    info!("MMIO num_val={}, should be {}", value, num_val);
    if value != num_val {
        warn!("MMIO readback mismatch at register {}", reg_base + NUM_VAL_OFFSET);
    }
    Ok(value == num_val)
}
