//! Software decoding of the files the harness consumes.
//!
//! Parquet columns are read with the `parquet` crate's Arrow reader and Arrow
//! IPC files with `arrow::ipc`. Only the first column of a Parquet file is
//! ever needed.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use arrow::compute::{cast, concat};
use arrow::ipc::reader::FileReader;
use arrow_array::{Array, ArrayRef, Int64Array, RecordBatch};
use arrow_schema::DataType;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ProjectionMask;
use parquet::file::reader::ChunkReader;
use tracing::{debug, info};

use crate::schema_utils::SchemaExt;

fn decode_first_column<T: ChunkReader + 'static>(input: T, source: &str) -> Result<Vec<ArrayRef>> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(input)
        .with_context(|| format!("Failed to create Parquet reader for {}", source))?;
    builder
        .schema()
        .ensure_integer_column(0)
        .with_context(|| format!("Cannot compare {} as Int64", source))?;

    let mask = ProjectionMask::roots(builder.parquet_schema(), [0]);
    let reader = builder
        .with_projection(mask)
        .build()
        .context("Failed to build Parquet column reader")?;

    let mut chunks = Vec::new();
    for batch in reader {
        let batch = batch.context("Failed to decode Parquet record batch")?;
        chunks.push(batch.column(0).clone());
    }
    debug!("Read {} chunks from {}", chunks.len(), source);
    Ok(chunks)
}

fn concat_as_int64(chunks: Vec<ArrayRef>) -> Result<Int64Array> {
    let joined: ArrayRef = match chunks.len() {
        0 => return Ok(Int64Array::from(Vec::<i64>::new())),
        1 => chunks[0].clone(),
        _ => {
            let refs: Vec<&dyn Array> = chunks.iter().map(|c| c.as_ref()).collect();
            concat(&refs).context("Concatenating column chunks")?
        }
    };

    let as_int64 = if joined.data_type() == &DataType::Int64 {
        joined
    } else {
        cast(joined.as_ref(), &DataType::Int64).context("Casting column to Int64")?
    };

    let array = as_int64
        .as_any()
        .downcast_ref::<Int64Array>()
        .context("Column is not Int64 after cast")?
        .clone();
    Ok(array)
}

/// Decode column 0 of a Parquet file, one chunk per decoded batch.
///
/// Version-1 style files are what the accelerator understands; the reader
/// accepts both, so the format version is not checked here.
pub fn read_array(path: impl AsRef<Path>) -> Result<Vec<ArrayRef>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Error opening Parquet file: {}", path.display()))?;
    decode_first_column(file, &path.display().to_string())
}

/// Decode column 0 of a Parquet file and return it as a single Int64 array.
pub fn read_column_as_int64(path: impl AsRef<Path>) -> Result<Int64Array> {
    concat_as_int64(read_array(path)?)
}

/// Decode column 0 of an in-memory Parquet file as a single Int64 array.
pub fn decode_column_as_int64(data: Bytes) -> Result<Int64Array> {
    concat_as_int64(decode_first_column(data, "in-memory Parquet file")?)
}

/// Row count recorded in the Parquet footer.
pub fn parquet_row_count(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Error opening Parquet file: {}", path.display()))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .with_context(|| format!("Failed to read Parquet footer of {}", path.display()))?;
    let rows = builder.metadata().file_metadata().num_rows();
    u64::try_from(rows).with_context(|| format!("Negative row count {} in footer", rows))
}

/// Read every record batch of an Arrow IPC file.
pub fn read_record_batches_from_file(path: impl AsRef<Path>) -> Result<Vec<RecordBatch>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open RecordBatch file: {}", path.display()))?;
    let reader = FileReader::try_new(file, None)
        .with_context(|| format!("Failed to read Arrow IPC header of {}", path.display()))?;

    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read RecordBatches from {}", path.display()))?;
    info!("Read {} RecordBatches from {}", batches.len(), path.display());
    Ok(batches)
}
