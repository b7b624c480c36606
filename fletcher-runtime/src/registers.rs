//! Fletcher default register map.
//!
//! Every Fletcher kernel exposes control, status and two return registers,
//! followed by the schema registers written by [`crate::Context::enable`]
//! (per record batch a first and last row index, then every buffer address
//! as a low/high word pair). Application registers come after those.

pub const REG_CONTROL: u64 = 0;
pub const REG_STATUS: u64 = 1;
pub const REG_RETURN0: u64 = 2;
pub const REG_RETURN1: u64 = 3;
/// First schema register.
pub const REG_SCHEMA: u64 = 4;

pub const CONTROL_START: u32 = 1 << 0;
pub const CONTROL_STOP: u32 = 1 << 1;
pub const CONTROL_RESET: u32 = 1 << 2;

pub const STATUS_IDLE: u32 = 1 << 0;
pub const STATUS_BUSY: u32 = 1 << 1;
pub const STATUS_DONE: u32 = 1 << 2;

/// Split a 64-bit value into the (low, high) words written to two
/// consecutive 32-bit registers.
pub fn split_u64(value: u64) -> (u32, u32) {
    (value as u32, (value >> 32) as u32)
}

pub fn join_u64(lo: u32, hi: u32) -> u64 {
    (u64::from(hi) << 32) | u64::from(lo)
}

/// Register holding the first row index of record batch `batch`.
pub fn batch_first_index_reg(batch: usize) -> u64 {
    REG_SCHEMA + 2 * batch as u64
}

/// Register holding the low word of buffer `buffer`, given `num_batches`
/// queued record batches.
pub fn buffer_address_reg(num_batches: usize, buffer: usize) -> u64 {
    REG_SCHEMA + 2 * num_batches as u64 + 2 * buffer as u64
}
