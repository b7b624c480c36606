//! Kernel lifecycle through the Fletcher control and status registers.

use std::thread;
use std::time::Duration;

use tracing::{debug, info};

use crate::context::Context;
use crate::error::Result;
use crate::registers::{
    CONTROL_RESET, CONTROL_START, CONTROL_STOP, REG_CONTROL, REG_RETURN0, REG_STATUS, STATUS_DONE,
};

/// A runnable unit on an enabled context.
pub struct Kernel<'a> {
    context: &'a Context,
}

impl<'a> Kernel<'a> {
    pub fn new(context: &'a Context) -> Self {
        Self { context }
    }

    fn pulse(&self, bits: u32) -> Result<()> {
        let platform = self.context.platform();
        platform.write_mmio(REG_CONTROL, bits)?;
        platform.write_mmio(REG_CONTROL, 0)
    }

    pub fn reset(&self) -> Result<()> {
        debug!("Kernel reset");
        self.pulse(CONTROL_RESET)
    }

    pub fn start(&self) -> Result<()> {
        info!("Starting kernel");
        self.pulse(CONTROL_START)
    }

    pub fn stop(&self) -> Result<()> {
        debug!("Kernel stop");
        self.pulse(CONTROL_STOP)
    }

    pub fn status(&self) -> Result<u32> {
        self.context.platform().read_mmio(REG_STATUS)
    }

    pub fn is_done(&self) -> Result<bool> {
        Ok(self.status()? & STATUS_DONE != 0)
    }

    /// Block until the done bit is raised, polling every `poll_interval`.
    ///
    /// There is no timeout; a kernel that never finishes blocks forever.
    pub fn wait_for_finish(&self, poll_interval: Duration) -> Result<()> {
        let mut polls: u64 = 0;
        while !self.is_done()? {
            polls += 1;
            if !poll_interval.is_zero() {
                thread::sleep(poll_interval);
            }
        }
        info!("Kernel finished after {} polls", polls);
        Ok(())
    }

    /// 64-bit value from the two return registers.
    pub fn return_value(&self) -> Result<u64> {
        self.context.platform().read_mmio64(REG_RETURN0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Platform;
    use crate::registers::{STATUS_BUSY, STATUS_IDLE};
    use crate::sim::tests::sim;
    use std::sync::Arc;

    #[test]
    fn start_then_wait_reaches_done() {
        let platform = Arc::new(sim(3));
        platform.init().unwrap();
        let src = platform.device_malloc(4).unwrap();
        let dst = platform.device_malloc(4).unwrap();
        platform.copy_host_to_device(&[9, 8, 7, 6], src).unwrap();
        platform.write_mmio64(10, src).unwrap();
        platform.write_mmio64(12, dst).unwrap();
        platform.write_mmio(14, 4).unwrap();

        let context = Context::make(platform.clone()).unwrap();
        let kernel = Kernel::new(&context);
        assert_eq!(kernel.status().unwrap(), STATUS_IDLE);
        kernel.start().unwrap();
        assert_eq!(kernel.status().unwrap(), STATUS_BUSY);
        kernel.wait_for_finish(Duration::ZERO).unwrap();
        assert!(kernel.is_done().unwrap());
        assert_eq!(kernel.return_value().unwrap(), 4);

        let mut out = [0u8; 4];
        platform.copy_device_to_host(dst, &mut out).unwrap();
        assert_eq!(out, [9, 8, 7, 6]);
    }

    #[test]
    fn start_pulse_clears_control_register() {
        let platform = Arc::new(sim(0));
        platform.init().unwrap();
        let buf = platform.device_malloc(1).unwrap();
        platform.write_mmio64(10, buf).unwrap();
        platform.write_mmio64(12, buf).unwrap();

        let context = Context::make(platform.clone()).unwrap();
        let kernel = Kernel::new(&context);
        kernel.start().unwrap();
        assert_eq!(platform.read_mmio(REG_CONTROL).unwrap(), 0);
        kernel.reset().unwrap();
        assert_eq!(kernel.status().unwrap(), STATUS_IDLE);

        kernel.start().unwrap();
        assert!(kernel.is_done().unwrap());
        kernel.stop().unwrap();
        assert_eq!(kernel.status().unwrap(), STATUS_IDLE);
    }
}
