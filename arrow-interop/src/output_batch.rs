//! The one-column record batch the accelerator writes its result into.

use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{ArrayRef, Int64Array, RecordBatch};
use arrow_schema::{DataType, Field, Schema, SchemaRef};
use tracing::debug;

use crate::column_buffer::ColumnBuffer;

/// Name of the single output column.
pub const OUTPUT_FIELD_NAME: &str = "int";

/// Schema of the output batch: one non-nullable Int64 column.
pub fn output_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new(
        OUTPUT_FIELD_NAME,
        DataType::Int64,
        false,
    )]))
}

/// Host-side output record batch.
///
/// Arrow arrays are immutable, so the values live in a [`ColumnBuffer`] that
/// the device copy writes into; Arrow views are built on demand.
#[derive(Debug, Clone)]
pub struct OutputBatch {
    schema: SchemaRef,
    values: ColumnBuffer,
}

/// Allocate a zeroed output batch of `num_val` rows.
pub fn prepare_record_batch(num_val: u32) -> Result<OutputBatch> {
    let schema = output_schema();
    let n_rows = num_val as usize;
    let values = ColumnBuffer::zeroed(n_rows)?;

    debug!(
        "Prepared output batch: {} rows, {} bytes",
        n_rows,
        values.byte_len()
    );
    Ok(OutputBatch { schema, values })
}

impl OutputBatch {
    pub fn num_rows(&self) -> usize {
        self.values.n_rows
    }

    /// Raw values buffer; the destination of the device-to-host copy.
    pub fn values_mut(&mut self) -> &mut [u8] {
        self.values.as_mut_bytes()
    }

    pub fn values_byte_len(&self) -> usize {
        self.values.byte_len()
    }

    pub fn zero(&mut self) {
        self.values.fill_zero();
    }

    pub fn to_array(&self) -> Int64Array {
        self.values.to_int64_array()
    }

    /// Snapshot of the current buffer contents as a record batch.
    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let column: ArrayRef = Arc::new(self.to_array());
        RecordBatch::try_new(self.schema.clone(), vec![column])
            .context("Building output RecordBatch")
    }
}
