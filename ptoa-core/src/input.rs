//! Loading of the files a run consumes.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use arrow_array::RecordBatch;
use tracing::info;

/// File name of record batch `index`: basename, zero-padded index, `.rb`.
pub fn record_batch_file_name(basename: &str, index: u32) -> String {
    format!("{}{:03}.rb", basename, index)
}

/// Read `<basename>000.rb` .. `<basename>{n-1}.rb` and collect their batches.
pub fn load_record_batches(basename: &str, num_kernels: u32) -> Result<Vec<RecordBatch>> {
    if basename.is_empty() {
        bail!("Something is wrong with the recordbatch basename.");
    }
    let mut batches = Vec::new();
    for i in 0..num_kernels {
        let name = record_batch_file_name(basename, i);
        let mut read = arrow_interop::read_record_batches_from_file(&name)
            .with_context(|| format!("Could not read RecordBatches for kernel {}", i))?;
        batches.append(&mut read);
    }
    Ok(batches)
}

/// Wrapping byte sum of the raw file contents.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, b| acc.wrapping_add(u32::from(*b)))
}

/// Raw bytes of the Parquet file sent to the device.
#[derive(Debug)]
pub struct ParquetInput {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub checksum: u32,
}

impl ParquetInput {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .with_context(|| format!("Error opening Parquet file {}", path.display()))?;
        let checksum = checksum(&bytes);
        info!(
            "Loaded {} ({} bytes), checksum {:#010x}",
            path.display(),
            bytes.len(),
            checksum
        );
        Ok(Self {
            path: path.to_path_buf(),
            bytes,
            checksum,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}
