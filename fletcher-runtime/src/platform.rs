use crate::error::Result;

/// Opaque device memory handle returned by [`Platform::device_malloc`].
pub type DeviceAddress = u64;

/// A physical or simulated accelerator.
///
/// All calls block until the device completes them. Implementations use
/// interior mutability so a platform can be shared as `Arc<dyn Platform>`
/// between a context and its kernels.
pub trait Platform: Send + Sync {
    fn name(&self) -> &str;

    /// Bring the device up. Must succeed before any other call.
    fn init(&self) -> Result<()>;

    fn write_mmio(&self, offset: u64, value: u32) -> Result<()>;
    fn read_mmio(&self, offset: u64) -> Result<u32>;

    fn device_malloc(&self, size: u64) -> Result<DeviceAddress>;
    fn device_free(&self, address: DeviceAddress) -> Result<()>;

    fn copy_host_to_device(&self, host: &[u8], device: DeviceAddress) -> Result<()>;
    fn copy_device_to_host(&self, device: DeviceAddress, host: &mut [u8]) -> Result<()>;

    /// Release the device. Further calls may fail.
    fn terminate(&self) -> Result<()>;

    /// Write a 64-bit value as low/high words to `offset` and `offset + 1`.
    fn write_mmio64(&self, offset: u64, value: u64) -> Result<()> {
        let (lo, hi) = crate::registers::split_u64(value);
        self.write_mmio(offset, lo)?;
        self.write_mmio(offset + 1, hi)
    }

    fn read_mmio64(&self, offset: u64) -> Result<u64> {
        let lo = self.read_mmio(offset)?;
        let hi = self.read_mmio(offset + 1)?;
        Ok(crate::registers::join_u64(lo, hi))
    }
}
