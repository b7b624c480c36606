use anyhow::{bail, Context, Result};
use arrow_interop::{compare_arrays, prepare_record_batch, VerificationReport};
use fletcher_runtime::{Context as FletcherContext, Kernel, Platform};
use std::sync::Arc;
use tracing::{debug, info};

use crate::arguments::{check_mmio, set_ptoa_arguments};
use crate::input::{load_record_batches, ParquetInput};
use crate::HarnessConfig;

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub num_val: u32,
    pub parquet_size: u64,
    pub checksum: u32,
    /// Batches read from the `NNN.rb` files.
    pub recordbatches_loaded: usize,
    /// Value of the kernel return registers.
    pub kernel_return: u64,
    pub report: VerificationReport,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        self.report.passed()
    }
}

/// Execute the full host sequence on `platform`.
///
/// Every failure aborts the run; no step after a failed one is attempted.
pub fn execute(config: &HarnessConfig, platform: Arc<dyn Platform>) -> Result<RunOutcome> {
    info!("PTOA runtime on platform '{}'", platform.name());

    let batches = load_record_batches(&config.recordbatch_basename, config.num_kernels)?;
    info!(
        "Loaded {} RecordBatches for {} kernels ({} output registers)",
        batches.len(),
        config.num_kernels,
        config.num_output_registers
    );

    let input = ParquetInput::load(&config.input_path)?;
    info!("Parquet file checksum {:#x}", input.checksum);

    let num_val = resolve_num_values(config)?;
    let mut output = prepare_record_batch(num_val)?;

    platform
        .init()
        .context("Could not initialize Fletcher platform.")?;

    let mut context =
        FletcherContext::make(platform.clone()).context("Could not create Fletcher context.")?;
    context
        .queue_record_batch(output.to_record_batch()?)
        .context("Could not queue RecordBatch to the context.")?;
    context.enable().context("Could not enable the context.")?;

    let parquet_address = platform
        .device_malloc(input.size())
        .context("Could not allocate device memory for the Parquet file.")?;
    set_ptoa_arguments(
        platform.as_ref(),
        config.reg_base,
        num_val,
        input.size(),
        parquet_address,
    )
    .context("Could not write the PTOA arguments.")?;

    output.zero();
    platform
        .copy_host_to_device(&input.bytes, parquet_address)
        .context("Could not copy the Parquet file to the device.")?;
    let (checksum, parquet_size) = (input.checksum, input.size());
    drop(input);

    if config.check_mmio {
        check_mmio(platform.as_ref(), config.reg_base, num_val)
            .context("Could not read back the PTOA arguments.")?;
    }

    let kernel = Kernel::new(&context);
    kernel.start().context("Could not start the kernel.")?;
    kernel
        .wait_for_finish(config.poll_interval)
        .context("Something went wrong waiting for the kernel to finish.")?;
    let kernel_return = kernel
        .return_value()
        .context("Could not read the kernel return value.")?;
    debug!("Kernel returned {}", kernel_return);

    let result_address = context.device_buffer(0)?.device_address;
    platform
        .copy_device_to_host(result_address, output.values_mut())
        .context("Could not copy the result from the device.")?;
    platform
        .device_free(parquet_address)
        .context("Could not free the Parquet device buffer.")?;

    let reference_path = config.reference_path();
    let reference = arrow_interop::read_column_as_int64(reference_path)
        .with_context(|| format!("Could not read reference {}", reference_path.display()))?;
    let report = compare_arrays(&output.to_array(), &reference, output.num_rows());
    debug!(
        "Compared {} result bytes, {} errors",
        output.values_byte_len(),
        report.error_count
    );

    Ok(RunOutcome {
        num_val,
        parquet_size,
        checksum,
        recordbatches_loaded: batches.len(),
        kernel_return,
        report,
    })
}

fn resolve_num_values(config: &HarnessConfig) -> Result<u32> {
    if let Some(n) = config.num_values {
        return Ok(n);
    }
    let rows = arrow_interop::parquet_row_count(config.reference_path())?;
    match u32::try_from(rows) {
        Ok(n) => {
            info!("Using {} values from the reference file", n);
            Ok(n)
        }
        Err(_) => bail!("Reference has {} rows, more than the kernel can count", rows),
    }
}
