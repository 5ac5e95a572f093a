//! Storage sink: schema-to-DDL mapping and batched row writes.

pub mod mysql;

pub use mysql::MySqlSink;

use crate::schema::{ColumnSchema, InferredType, TableSchema, TypedRow};
use crate::Result;
use async_trait::async_trait;

/// Capability contract for the storage side.
///
/// `provision` deterministically (re)creates the durable structure for a
/// schema and caches it as the sink's session schema; `write_batch` writes
/// all given rows in one batched operation.
#[async_trait]
pub trait RowSink: Send + Sync {
    /// Create the durable structure for `schema` if it does not exist.
    async fn provision(&self, schema: &TableSchema) -> Result<()>;

    /// Write all rows in one batch. Returns the number of rows written.
    ///
    /// Callers must not invoke this with zero rows; the flush state machine
    /// guarantees that.
    async fn write_batch(&self, rows: &[TypedRow]) -> Result<u64>;
}

/// Storage column type for an inferred column.
pub fn ddl_type(column: &ColumnSchema) -> String {
    match column.column_type {
        InferredType::Boolean => "BOOLEAN".into(),
        InferredType::Date => "DATE".into(),
        InferredType::Timestamp => "DATETIME".into(),
        InferredType::Int => "INT".into(),
        InferredType::BigInt => "BIGINT".into(),
        InferredType::Float => "FLOAT".into(),
        InferredType::Varchar => {
            format!("VARCHAR({})", column.max_length.unwrap_or(255))
        }
        InferredType::Text => "TEXT".into(),
    }
}

/// Columns actually present across a batch's rows, in schema order.
///
/// The written column set is derived from the keys present, so row shape
/// must be consistent within one batch to avoid partial-column writes.
pub fn present_columns(schema: &TableSchema, rows: &[TypedRow]) -> Vec<String> {
    schema
        .column_names()
        .filter(|name| rows.iter().any(|row| row.get(name).is_some()))
        .map(str::to_string)
        .collect()
}
