use anyhow::Result;
use fletcher_runtime::Platform;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub mod arguments;
pub mod executor;
pub mod input;
pub mod model;
pub mod platform;

pub use arguments::{check_mmio, set_ptoa_arguments, DEFAULT_REG_BASE};
pub use arrow_interop::VerificationReport;
pub use executor::RunOutcome;
pub use model::PtoaKernelModel;

/// Name of the built-in simulation platform.
pub const SIM_PLATFORM: &str = "sim";

/// Harness for one PTOA kernel run
pub struct PtoaHarness {
    config: HarnessConfig,
}

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Prefix of the `NNN.rb` record batch files
    pub recordbatch_basename: String,
    /// Number of kernels, one record batch file each
    pub num_kernels: u32,
    /// Number of output registers of the kernel
    pub num_output_registers: u32,
    /// Parquet file sent to the device
    pub input_path: PathBuf,
    /// Parquet file decoded in software; defaults to `input_path`
    pub reference_path: Option<PathBuf>,
    /// Elements in the output array; defaults to the reference row count
    pub num_values: Option<u32>,
    /// `sim` or the name of a Fletcher platform library
    pub platform: String,
    /// First PTOA argument register
    pub reg_base: u64,
    /// Kernel status polling interval
    pub poll_interval: Duration,
    /// Skip DDR initialization on the `aws_sim` platform
    pub skip_ddr_init: bool,
    /// Status polls the simulator reports busy for
    pub sim_busy_polls: u32,
    /// Read the argument registers back before starting the kernel
    pub check_mmio: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            recordbatch_basename: String::new(),
            num_kernels: 0,
            num_output_registers: 0,
            input_path: PathBuf::new(),
            reference_path: None,
            num_values: None,
            platform: SIM_PLATFORM.to_string(),
            reg_base: DEFAULT_REG_BASE,
            poll_interval: Duration::from_micros(10),
            skip_ddr_init: true, // single-DDR builds do not initialize DDR
            sim_busy_polls: 4,
            check_mmio: false,
        }
    }
}

impl HarnessConfig {
    pub fn reference_path(&self) -> &PathBuf {
        self.reference_path.as_ref().unwrap_or(&self.input_path)
    }
}

impl PtoaHarness {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Create the configured platform and run the kernel on it
    pub fn run(&self) -> Result<RunOutcome> {
        let platform = platform::open_platform(&self.config)?;
        self.run_on(platform)
    }

    /// Run the kernel on an already created platform
    pub fn run_on(&self, platform: Arc<dyn Platform>) -> Result<RunOutcome> {
        executor::execute(&self.config, platform)
    }
}
