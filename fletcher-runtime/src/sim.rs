//! In-process simulation platform.
//!
//! Stands in for a hardware platform when no device is available. Device
//! memory is modelled on the host, MMIO registers live in a plain register
//! file, and the accelerator itself is a [`KernelModel`] that runs when the
//! control start bit is written. The status register reports busy for a
//! configurable number of polls before raising done, so host code exercises
//! the same wait loop as on hardware.

use fpga_memory_manager::{DeviceMemory, SlabAllocator, TransferDirection, TransferStats};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::{FletcherError, Result};
use crate::platform::{DeviceAddress, Platform};
use crate::registers::{
    join_u64, CONTROL_RESET, CONTROL_START, CONTROL_STOP, REG_CONTROL, REG_SCHEMA, REG_STATUS,
    STATUS_BUSY, STATUS_DONE, STATUS_IDLE,
};

/// Behavioral model of an accelerator bitstream.
pub trait KernelModel: Send {
    fn name(&self) -> &str;

    /// Execute one kernel invocation to completion against the device state.
    fn run(&mut self, device: &mut SimDevice<'_>) -> anyhow::Result<()>;
}

/// Device state handed to a [`KernelModel`] while it runs.
pub struct SimDevice<'a> {
    registers: &'a mut [u32],
    memory: &'a mut DeviceMemory,
}

impl SimDevice<'_> {
    pub fn register(&self, offset: u64) -> anyhow::Result<u32> {
        self.registers
            .get(offset as usize)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("Register {} is out of range", offset))
    }

    /// 64-bit value stored as low/high words at `offset` and `offset + 1`.
    pub fn register64(&self, offset: u64) -> anyhow::Result<u64> {
        Ok(join_u64(self.register(offset)?, self.register(offset + 1)?))
    }

    pub fn set_register(&mut self, offset: u64, value: u32) -> anyhow::Result<()> {
        let slot = self
            .registers
            .get_mut(offset as usize)
            .ok_or_else(|| anyhow::anyhow!("Register {} is out of range", offset))?;
        *slot = value;
        Ok(())
    }

    pub fn read_memory(&mut self, address: u64, len: usize) -> anyhow::Result<Vec<u8>> {
        self.memory.read(address, len)
    }

    pub fn write_memory(&mut self, address: u64, data: &[u8]) -> anyhow::Result<()> {
        self.memory.write(address, data)
    }
}

#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Number of 32-bit MMIO registers.
    pub num_registers: usize,
    /// Start of the simulated DDR window.
    pub memory_base: u64,
    /// Size of the simulated DDR window.
    pub memory_capacity: u64,
    /// Status polls reporting busy before done is raised.
    pub busy_polls: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            num_registers: 64,
            memory_base: 0x1_0000_0000,
            memory_capacity: 16 * 1024 * 1024 * 1024, // one 16 GiB DDR bank
            busy_polls: 2,
        }
    }
}

struct SimState {
    initialized: bool,
    registers: Vec<u32>,
    memory: DeviceMemory,
    busy_polls_left: u32,
}

/// Simulated accelerator platform.
pub struct SimPlatform {
    name: String,
    config: SimConfig,
    allocator: SlabAllocator,
    state: Mutex<SimState>,
    model: Mutex<Box<dyn KernelModel>>,
    stats: TransferStats,
}

impl SimPlatform {
    pub fn new(model: Box<dyn KernelModel>, config: SimConfig) -> anyhow::Result<Self> {
        if config.num_registers <= REG_SCHEMA as usize {
            anyhow::bail!(
                "Simulated register file needs more than {} registers, got {}",
                REG_SCHEMA,
                config.num_registers
            );
        }
        let allocator =
            SlabAllocator::with_default_classes(config.memory_base, config.memory_capacity)?;
        let mut registers = vec![0u32; config.num_registers];
        registers[REG_STATUS as usize] = STATUS_IDLE;
        Ok(Self {
            name: format!("sim:{}", model.name()),
            config,
            allocator,
            state: Mutex::new(SimState {
                initialized: false,
                registers,
                memory: DeviceMemory::new(),
                busy_polls_left: 0,
            }),
            model: Mutex::new(model),
            stats: TransferStats::new(),
        })
    }

    /// Host/device copy totals since creation.
    pub fn stats(&self) -> &TransferStats {
        &self.stats
    }

    pub fn live_allocations(&self) -> usize {
        self.allocator.live_allocations()
    }

    fn ensure_initialized(&self, state: &SimState) -> Result<()> {
        if state.initialized {
            Ok(())
        } else {
            Err(FletcherError::NotInitialized(self.name.clone()))
        }
    }

    fn control(&self, state: &mut SimState, value: u32) -> Result<()> {
        if value & CONTROL_RESET != 0 {
            debug!("{}: reset", self.name);
            state.registers[REG_STATUS as usize] = STATUS_IDLE;
            state.busy_polls_left = 0;
            return Ok(());
        }
        if value & CONTROL_STOP != 0 {
            debug!("{}: stop", self.name);
            state.registers[REG_STATUS as usize] = STATUS_IDLE;
            state.busy_polls_left = 0;
            return Ok(());
        }
        if value & CONTROL_START == 0 {
            return Ok(());
        }
        if state.registers[REG_STATUS as usize] & STATUS_BUSY != 0 {
            debug!("{}: start ignored, kernel busy", self.name);
            return Ok(());
        }

        let mut model = self.model.lock();
        info!("{}: starting kernel model '{}'", self.name, model.name());
        let mut device = SimDevice {
            registers: &mut state.registers,
            memory: &mut state.memory,
        };
        model.run(&mut device).map_err(|e| FletcherError::KernelModel {
            model: model.name().to_string(),
            reason: format!("{:#}", e),
        })?;

        if self.config.busy_polls == 0 {
            state.registers[REG_STATUS as usize] = STATUS_DONE;
        } else {
            state.registers[REG_STATUS as usize] = STATUS_BUSY;
            state.busy_polls_left = self.config.busy_polls;
        }
        Ok(())
    }
}

impl Platform for SimPlatform {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.initialized = true;
        info!(
            "{}: initialized, {} registers, DDR window {:#x} + {:#x}",
            self.name, self.config.num_registers, self.config.memory_base, self.config.memory_capacity
        );
        Ok(())
    }

    fn write_mmio(&self, offset: u64, value: u32) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_initialized(&state)?;
        if offset as usize >= state.registers.len() {
            return Err(FletcherError::RegisterOutOfRange(offset));
        }
        debug!("{}: MMIO write [{}] = {:#010x}", self.name, offset, value);
        if offset == REG_CONTROL {
            state.registers[REG_CONTROL as usize] = value;
            return self.control(&mut state, value);
        }
        state.registers[offset as usize] = value;
        Ok(())
    }

    fn read_mmio(&self, offset: u64) -> Result<u32> {
        let mut state = self.state.lock();
        self.ensure_initialized(&state)?;
        if offset as usize >= state.registers.len() {
            return Err(FletcherError::RegisterOutOfRange(offset));
        }
        if offset == REG_STATUS && state.busy_polls_left > 0 {
            state.busy_polls_left -= 1;
            if state.busy_polls_left == 0 {
                state.registers[REG_STATUS as usize] = STATUS_DONE;
            }
            return Ok(STATUS_BUSY);
        }
        Ok(state.registers[offset as usize])
    }

    fn device_malloc(&self, size: u64) -> Result<DeviceAddress> {
        let mut state = self.state.lock();
        self.ensure_initialized(&state)?;
        let address = self
            .allocator
            .allocate(size)
            .map_err(FletcherError::device_memory)?;
        if let Err(e) = state.memory.map(address, size) {
            let _ = self.allocator.free(address);
            return Err(FletcherError::device_memory(e));
        }
        debug!(
            "{}: device malloc {} bytes at {:#x} (slab of {})",
            self.name,
            size,
            address,
            self.allocator.slab_size(address).unwrap_or(size)
        );
        Ok(address)
    }

    fn device_free(&self, address: DeviceAddress) -> Result<()> {
        let mut state = self.state.lock();
        state
            .memory
            .unmap(address)
            .map_err(FletcherError::device_memory)?;
        self.allocator
            .free(address)
            .map_err(FletcherError::device_memory)?;
        debug!("{}: device free {:#x}", self.name, address);
        Ok(())
    }

    fn copy_host_to_device(&self, host: &[u8], device: DeviceAddress) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_initialized(&state)?;
        state
            .memory
            .write(device, host)
            .map_err(FletcherError::device_memory)?;
        self.stats
            .record(TransferDirection::HostToDevice, device, host.len() as u64);
        Ok(())
    }

    fn copy_device_to_host(&self, device: DeviceAddress, host: &mut [u8]) -> Result<()> {
        let mut state = self.state.lock();
        self.ensure_initialized(&state)?;
        state
            .memory
            .read_into(device, host)
            .map_err(FletcherError::device_memory)?;
        self.stats
            .record(TransferDirection::DeviceToHost, device, host.len() as u64);
        Ok(())
    }

    fn terminate(&self) -> Result<()> {
        let mut state = self.state.lock();
        if state.initialized {
            info!(
                "{}: terminating after {} transfers, {} device allocations still live",
                self.name,
                self.stats.total_transfers(),
                self.allocator.live_allocations()
            );
        }
        state.initialized = false;
        Ok(())
    }
}
