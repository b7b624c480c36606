//! End-to-end tests of the PTOA host sequence.
//!
//! These run the full harness against the built-in simulation platform, with
//! Parquet and RecordBatch files written to a temporary directory (no FPGA
//! or Fletcher platform library required).

use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arrow::ipc::writer::FileWriter;
use arrow_array::{Int64Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema};
use fletcher_runtime::{
    DeviceAddress, FletcherError, Platform, SimConfig, SimPlatform, TransferDirection,
};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::{WriterProperties, WriterVersion};
use ptoa_core::input::record_batch_file_name;
use ptoa_core::{HarnessConfig, PtoaHarness, PtoaKernelModel};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn write_parquet(path: &Path, values: &[i64]) {
    let schema = Arc::new(Schema::new(vec![
        Field::new("l_extendedprice", DataType::Int64, false),
        Field::new("l_quantity", DataType::Int64, false),
    ]));
    let quantities: Vec<i64> = values.iter().map(|v| v % 50).collect();
    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(Int64Array::from(values.to_vec())),
            Arc::new(Int64Array::from(quantities)),
        ],
    )
    .unwrap();

    let props = WriterProperties::builder()
        .set_writer_version(WriterVersion::PARQUET_1_0)
        .set_max_row_group_size(64)
        .build();
    let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, Some(props)).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

fn write_record_batches(basename: &str, num_kernels: u32) {
    let schema = Arc::new(Schema::new(vec![Field::new("int", DataType::Int64, false)]));
    for i in 0..num_kernels {
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![Arc::new(Int64Array::from(vec![0i64; 8]))],
        )
        .unwrap();
        let file = File::create(record_batch_file_name(basename, i)).unwrap();
        let mut writer = FileWriter::try_new(file, &schema).unwrap();
        writer.write(&batch).unwrap();
        writer.finish().unwrap();
    }
}

fn prices(n: i64) -> Vec<i64> {
    (0..n).map(|i| i * 1_000 + 17).collect()
}

fn config(dir: &TempDir, values: &[i64]) -> HarnessConfig {
    let input_path = dir.path().join("extendedprice.parquet");
    write_parquet(&input_path, values);
    HarnessConfig {
        recordbatch_basename: dir.path().join("batch").display().to_string(),
        input_path,
        poll_interval: Duration::ZERO,
        ..HarnessConfig::default()
    }
}

fn sim_platform(config: &HarnessConfig) -> Arc<SimPlatform> {
    Arc::new(
        SimPlatform::new(
            Box::new(PtoaKernelModel::new(config.reg_base)),
            SimConfig {
                busy_polls: 3,
                ..SimConfig::default()
            },
        )
        .unwrap(),
    )
}

/// Platform call a [`RecordingPlatform`] refuses.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    Init,
    DeviceMalloc,
}

/// Forwards to a simulator and counts what the harness asked of it.
struct RecordingPlatform {
    inner: SimPlatform,
    fault: Fault,
    inits: AtomicUsize,
    device_calls: AtomicUsize,
    /// Offsets of every MMIO write, in order.
    mmio_writes: Mutex<Vec<u64>>,
    host_to_device: AtomicUsize,
}

impl RecordingPlatform {
    fn new(config: &HarnessConfig, fault: Fault) -> Arc<Self> {
        Arc::new(Self {
            inner: SimPlatform::new(
                Box::new(PtoaKernelModel::new(config.reg_base)),
                SimConfig::default(),
            )
            .unwrap(),
            fault,
            inits: AtomicUsize::new(0),
            device_calls: AtomicUsize::new(0),
            mmio_writes: Mutex::new(Vec::new()),
            host_to_device: AtomicUsize::new(0),
        })
    }

    fn touch(&self) {
        self.device_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn refused(operation: &'static str) -> FletcherError {
        FletcherError::Status {
            platform: "recording".into(),
            operation,
            status: 1,
        }
    }
}

impl Platform for RecordingPlatform {
    fn name(&self) -> &str {
        "recording"
    }

    fn init(&self) -> fletcher_runtime::Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        if self.fault == Fault::Init {
            return Err(Self::refused("init"));
        }
        self.inner.init()
    }

    fn write_mmio(&self, offset: u64, value: u32) -> fletcher_runtime::Result<()> {
        self.touch();
        self.mmio_writes.lock().unwrap().push(offset);
        self.inner.write_mmio(offset, value)
    }

    fn read_mmio(&self, offset: u64) -> fletcher_runtime::Result<u32> {
        self.touch();
        self.inner.read_mmio(offset)
    }

    fn device_malloc(&self, size: u64) -> fletcher_runtime::Result<DeviceAddress> {
        self.touch();
        if self.fault == Fault::DeviceMalloc {
            return Err(Self::refused("device malloc"));
        }
        self.inner.device_malloc(size)
    }

    fn device_free(&self, address: DeviceAddress) -> fletcher_runtime::Result<()> {
        self.touch();
        self.inner.device_free(address)
    }

    fn copy_host_to_device(&self, host: &[u8], device: DeviceAddress) -> fletcher_runtime::Result<()> {
        self.touch();
        self.host_to_device.fetch_add(1, Ordering::SeqCst);
        self.inner.copy_host_to_device(host, device)
    }

    fn copy_device_to_host(&self, device: DeviceAddress, host: &mut [u8]) -> fletcher_runtime::Result<()> {
        self.touch();
        self.inner.copy_device_to_host(device, host)
    }

    fn terminate(&self) -> fletcher_runtime::Result<()> {
        self.inner.terminate()
    }
}

// ---------------------------------------------------------------------------
// Passing runs
// ---------------------------------------------------------------------------

#[test]
fn test_simulated_run_matches_reference() {
    let dir = TempDir::new().unwrap();
    let config = HarnessConfig {
        num_kernels: 2,
        check_mmio: true,
        ..config(&dir, &prices(300))
    };
    write_record_batches(&config.recordbatch_basename, 2);

    let outcome = PtoaHarness::new(config).run().unwrap();
    assert!(outcome.passed(), "{}", outcome.report);
    assert_eq!(outcome.report.error_count, 0);
    assert_eq!(outcome.num_val, 300);
    assert_eq!(outcome.kernel_return, 300);
    assert_eq!(outcome.recordbatches_loaded, 2);
}

#[test]
fn test_fewer_values_than_rows() {
    let dir = TempDir::new().unwrap();
    let config = HarnessConfig {
        num_values: Some(1),
        ..config(&dir, &prices(100))
    };

    let outcome = PtoaHarness::new(config).run().unwrap();
    assert!(outcome.passed());
    assert_eq!(outcome.report.result_len, 1);
}

#[test]
fn test_transfers_and_checksum() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, &prices(10));
    let expected_checksum = ptoa_core::input::checksum(&std::fs::read(&config.input_path).unwrap());
    let file_size = std::fs::metadata(&config.input_path).unwrap().len();

    let platform = sim_platform(&config);
    let outcome = PtoaHarness::new(config).run_on(platform.clone()).unwrap();
    assert!(outcome.passed());
    assert_eq!(outcome.checksum, expected_checksum);
    assert_eq!(outcome.parquet_size, file_size);

    // Output batch and Parquet file go to the device, the result comes back.
    let h2d = platform.stats().totals(TransferDirection::HostToDevice);
    assert_eq!(h2d.transfers, 2);
    assert_eq!(h2d.bytes, 10 * 8 + file_size);
    let d2h = platform.stats().totals(TransferDirection::DeviceToHost);
    assert_eq!(d2h.bytes, 10 * 8);
    // Parquet buffer freed by the harness, output buffer by the context.
    assert_eq!(platform.live_allocations(), 0);
}

// ---------------------------------------------------------------------------
// Failing verification
// ---------------------------------------------------------------------------

#[test]
fn test_more_values_than_rows_reports_missing_elements() {
    let dir = TempDir::new().unwrap();
    let config = HarnessConfig {
        num_values: Some(12),
        ..config(&dir, &prices(10))
    };

    let outcome = PtoaHarness::new(config).run().unwrap();
    assert!(!outcome.passed());
    assert_eq!(outcome.report.error_count, 2);
    assert_eq!(outcome.kernel_return, 10);
    assert_eq!(
        outcome.report.to_string(),
        "Test failed. Found 2 errors in the output Arrow array"
    );
}

#[test]
fn test_differing_reference_is_counted() {
    let dir = TempDir::new().unwrap();
    let mut reference = prices(50);
    reference[3] += 1;
    reference[40] = -1;
    let reference_path = dir.path().join("reference.parquet");
    write_parquet(&reference_path, &reference);

    let config = HarnessConfig {
        reference_path: Some(reference_path),
        ..config(&dir, &prices(50))
    };

    let outcome = PtoaHarness::new(config).run().unwrap();
    assert_eq!(outcome.report.error_count, 2);
    let indices: Vec<usize> = outcome.report.first_mismatches.iter().map(|m| m.index).collect();
    assert_eq!(indices, vec![3, 40]);
}

// ---------------------------------------------------------------------------
// Setup failures
// ---------------------------------------------------------------------------

#[test]
fn test_init_failure_stops_before_device_work() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, &prices(10));
    let platform = RecordingPlatform::new(&config, Fault::Init);

    let err = PtoaHarness::new(config).run_on(platform.clone()).unwrap_err();
    assert!(format!("{:#}", err).contains("Could not initialize Fletcher platform."));
    assert_eq!(platform.inits.load(Ordering::SeqCst), 1);
    assert_eq!(platform.device_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_context_enable_failure_stops_before_transfers() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, &prices(10));
    let platform = RecordingPlatform::new(&config, Fault::DeviceMalloc);

    let err = PtoaHarness::new(config).run_on(platform.clone()).unwrap_err();
    assert!(format!("{:#}", err).contains("Could not enable the context."));
    assert_eq!(platform.inits.load(Ordering::SeqCst), 1);
    // Only the row range of the output batch was published; neither buffer
    // reached the device and no argument register was written.
    assert_eq!(platform.host_to_device.load(Ordering::SeqCst), 0);
    assert_eq!(*platform.mmio_writes.lock().unwrap(), vec![4, 5]);
    assert_eq!(platform.inner.stats().total_transfers(), 0);
    assert_eq!(platform.inner.live_allocations(), 0);
}

#[test]
fn test_recording_platform_passes_through_a_full_run() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir, &prices(10));
    let platform = RecordingPlatform::new(&config, Fault::None);

    let outcome = PtoaHarness::new(config).run_on(platform.clone()).unwrap();
    assert!(outcome.passed());
    assert_eq!(platform.host_to_device.load(Ordering::SeqCst), 2);
    let writes = platform.mmio_writes.lock().unwrap().clone();
    let reg_base = ptoa_core::DEFAULT_REG_BASE;
    for offset in reg_base..reg_base + 5 {
        assert!(writes.contains(&offset), "argument register {} not written", offset);
    }
}

#[test]
fn test_missing_recordbatch_file_stops_before_platform_init() {
    let dir = TempDir::new().unwrap();
    let config = HarnessConfig {
        num_kernels: 1,
        ..config(&dir, &prices(10))
    };
    let platform = RecordingPlatform::new(&config, Fault::None);

    assert!(PtoaHarness::new(config).run_on(platform.clone()).is_err());
    assert_eq!(platform.inits.load(Ordering::SeqCst), 0);
    assert_eq!(platform.device_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_kernel_failure_skips_result_copy() {
    let dir = TempDir::new().unwrap();
    let reference_path = dir.path().join("reference.parquet");
    write_parquet(&reference_path, &prices(10));
    let input_path = dir.path().join("corrupt.parquet");
    std::fs::write(&input_path, b"PAR1 this is not a parquet file PAR1").unwrap();

    let config = HarnessConfig {
        recordbatch_basename: dir.path().join("batch").display().to_string(),
        input_path,
        reference_path: Some(reference_path),
        poll_interval: Duration::ZERO,
        ..HarnessConfig::default()
    };
    let platform = sim_platform(&config);

    let err = PtoaHarness::new(config).run_on(platform.clone()).unwrap_err();
    assert!(format!("{:#}", err).contains("Could not start the kernel."));
    assert_eq!(platform.stats().totals(TransferDirection::DeviceToHost).transfers, 0);
}

#[test]
fn test_empty_basename_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = HarnessConfig {
        recordbatch_basename: String::new(),
        ..config(&dir, &prices(4))
    };
    let err = PtoaHarness::new(config).run().unwrap_err();
    assert!(err.to_string().contains("Something is wrong with the recordbatch basename."));
}
