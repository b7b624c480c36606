mod logging;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use ptoa_core::{HarnessConfig, PtoaHarness, VerificationReport, DEFAULT_REG_BASE, SIM_PLATFORM};
use tracing::info;

#[derive(Parser)]
#[command(
    name = "ptoa",
    version,
    about = "Run the Parquet-to-Arrow FPGA kernel and check it against a software decode"
)]
struct Cli {
    /// Prefix of the NNN.rb RecordBatch files, one per kernel
    recordbatch_basename: String,

    /// Number of kernels
    num_kernels: u32,

    /// Number of output registers of the kernel
    num_output_registers: u32,

    /// Parquet file sent to the device
    #[arg(long, env = "PTOA_INPUT")]
    input: PathBuf,

    /// Parquet file decoded in software (default: --input)
    #[arg(long, env = "PTOA_REFERENCE")]
    reference: Option<PathBuf>,

    /// Elements in the output array (default: reference row count)
    #[arg(long)]
    num_values: Option<u32>,

    /// Platform: "sim" or a Fletcher platform library name (aws, aws_sim, ...)
    #[arg(long, default_value = SIM_PLATFORM, env = "PTOA_PLATFORM")]
    platform: String,

    /// First PTOA argument register
    #[arg(long, default_value_t = DEFAULT_REG_BASE)]
    reg_base: u64,

    /// Kernel status polling interval in microseconds
    #[arg(long, default_value_t = 10)]
    poll_interval_us: u64,

    /// Initialize DDR on the aws_sim platform (skipped by default)
    #[arg(long)]
    init_ddr: bool,

    /// Read the argument registers back before starting the kernel
    #[arg(long)]
    check_mmio: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> HarnessConfig {
        HarnessConfig {
            recordbatch_basename: self.recordbatch_basename,
            num_kernels: self.num_kernels,
            num_output_registers: self.num_output_registers,
            input_path: self.input,
            reference_path: self.reference,
            num_values: self.num_values,
            platform: self.platform,
            reg_base: self.reg_base,
            poll_interval: Duration::from_micros(self.poll_interval_us),
            skip_ddr_init: !self.init_ddr,
            check_mmio: self.check_mmio,
            ..HarnessConfig::default()
        }
    }
}

/// Text printed for a finished comparison: on failure the first sample
/// pairs, one `result reference` pair per line, then the verdict.
fn render_report(report: &VerificationReport) -> String {
    let mut out = String::new();
    if !report.passed() {
        for (got, expected) in &report.samples {
            match expected {
                Some(e) => out.push_str(&format!("{} {}\n", got, e)),
                None => out.push_str(&format!("{} <missing>\n", got)),
            }
        }
    }
    out.push_str(&report.to_string());
    out
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&cli.log_level);
    println!("\n\tPTOA runtime\n");

    let harness = PtoaHarness::new(cli.into_config());
    match harness.run() {
        Ok(outcome) => {
            info!(
                "Run finished: {} values, {} byte Parquet file, kernel returned {}",
                outcome.num_val, outcome.parquet_size, outcome.kernel_return
            );
            println!("Parquet file checksum 0x{:x}", outcome.checksum);
            println!("{}", render_report(&outcome.report));
            if outcome.passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => {
            eprintln!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
