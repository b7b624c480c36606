//! An owned host buffer holding one Int64 column in device layout.

use anyhow::{bail, Result};
use arrow_array::Int64Array;

/// Byte width of one element. The PTOA kernel only emits Int64.
pub const ELEMENT_WIDTH: usize = std::mem::size_of::<i64>();

/// Host memory the device result is copied back into.
#[derive(Debug, Clone)]
pub struct ColumnBuffer {
    /// Raw bytes in device layout (little-endian, packed, no validity bitmap).
    data: Vec<u8>,
    /// Number of rows represented.
    pub n_rows: usize,
}

impl ColumnBuffer {
    /// Allocate a zero-filled buffer for `n_rows` elements.
    ///
    /// Allocation failure is reported as an error rather than aborting.
    pub fn zeroed(n_rows: usize) -> Result<Self> {
        let len = match n_rows.checked_mul(ELEMENT_WIDTH) {
            Some(len) => len,
            None => bail!("Could not allocate values buffer: {} rows overflow", n_rows),
        };
        let mut data = Vec::new();
        if let Err(e) = data.try_reserve_exact(len) {
            bail!("Could not allocate values buffer of {} bytes: {}", len, e);
        }
        data.resize(len, 0);
        Ok(Self { data, n_rows })
    }

    /// Mutable view used as the destination of a device-to-host copy.
    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Return the size in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }

    pub fn fill_zero(&mut self) {
        self.data.fill(0);
    }

    /// Copy the buffer into an Arrow array.
    pub fn to_int64_array(&self) -> Int64Array {
        let values: Vec<i64> = self
            .data
            .chunks_exact(ELEMENT_WIDTH)
            .map(|c| {
                let mut word = [0u8; ELEMENT_WIDTH];
                word.copy_from_slice(c);
                i64::from_le_bytes(word)
            })
            .collect();
        Int64Array::from(values)
    }
}
