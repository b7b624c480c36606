//! Arrow and Parquet glue for the PTOA harness.
//!
//! The accelerator writes its result into a plain host buffer laid out as an
//! Arrow Int64 values buffer:
//!
//! ```text
//! [  value[0]  |  value[1]  | ... |  value[n-1]  ]   (8 bytes each, little-endian)
//! ```
//!
//! This crate owns that buffer ([`ColumnBuffer`]), wraps it in the one-column
//! record batch the device context expects ([`OutputBatch`]), decodes the
//! software reference from Parquet ([`reference`]) and compares the two
//! ([`verify`]).

pub mod column_buffer;
pub mod output_batch;
pub mod reference;
pub mod schema_utils;
pub mod verify;

pub use column_buffer::ColumnBuffer;
pub use output_batch::{output_schema, prepare_record_batch, OutputBatch, OUTPUT_FIELD_NAME};
pub use reference::{
    decode_column_as_int64, parquet_row_count, read_array, read_column_as_int64,
    read_record_batches_from_file,
};
pub use schema_utils::SchemaExt;
pub use verify::{compare_arrays, Mismatch, VerificationReport, SAMPLE_LIMIT};
