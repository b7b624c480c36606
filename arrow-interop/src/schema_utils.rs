use anyhow::{bail, Result};
use arrow_schema::{DataType, Schema};

pub trait SchemaExt {
    /// Fail unless column `index` is a primitive type the kernel emits or a
    /// reference can be cast from.
    fn ensure_integer_column(&self, index: usize) -> Result<&DataType>;
}

impl SchemaExt for Schema {
    fn ensure_integer_column(&self, index: usize) -> Result<&DataType> {
        let Some(field) = self.fields().get(index) else {
            bail!("Schema has {} columns, column {} requested", self.fields().len(), index);
        };
        match field.data_type() {
            dt @ (DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Date32
            | DataType::Date64
            | DataType::Timestamp(_, _)) => Ok(dt),
            other => bail!(
                "Column '{}' has type {:?}, expected an integer column",
                field.name(),
                other
            ),
        }
    }
}
