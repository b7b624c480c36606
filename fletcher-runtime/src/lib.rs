//! Platform, context and kernel abstractions for Fletcher-managed FPGA
//! accelerators.
//!
//! The object model follows the Fletcher runtime:
//!
//! * a [`Platform`] is the physical or simulated device: MMIO registers,
//!   device memory and host/device copies;
//! * a [`Context`] binds record batches to a platform and places their
//!   buffers in device memory;
//! * a [`Kernel`] starts the accelerator and waits for it through the
//!   control and status registers.
//!
//! Lifetimes nest strictly: the platform outlives the context, which outlives
//! every kernel borrowed from it.
//!
//! Two platform implementations are provided: [`SimPlatform`], an in-process
//! simulator driving a pluggable [`KernelModel`], and (on Unix)
//! [`DylibPlatform`], which loads a Fletcher platform library such as
//! `libfletcher_aws.so` at runtime.

pub mod context;
pub mod error;
#[cfg(unix)]
pub mod ffi;
pub mod kernel;
pub mod platform;
pub mod registers;
pub mod sim;

pub use context::{Context, DeviceBuffer};
pub use error::{FletcherError, Result};
#[cfg(unix)]
pub use ffi::{AwsSimInitOptions, DylibPlatform, InitData};
pub use fpga_memory_manager::{TransferDirection, TransferStats, TransferTotals};
pub use kernel::Kernel;
pub use platform::{DeviceAddress, Platform};
pub use sim::{KernelModel, SimConfig, SimDevice, SimPlatform};
