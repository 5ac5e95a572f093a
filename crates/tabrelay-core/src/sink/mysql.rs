//! MySQL implementation of the storage sink.
//!
//! Provisioning creates the table with two implicit columns the inferred
//! schema never carries: a synthetic auto-incrementing `id` and a write-time
//! `loaded_at` timestamp. Batch writes go through one multi-row INSERT.

use crate::config::StorageConfig;
use crate::error::{Error, Result, StorageError};
use crate::schema::{CellValue, TableSchema, TypedRow};
use crate::sink::{ddl_type, present_columns, RowSink};
use async_trait::async_trait;
use parking_lot::RwLock;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{MySql, MySqlPool, QueryBuilder};
use tracing::{debug, info};

/// MySQL-backed row sink.
pub struct MySqlSink {
    pool: MySqlPool,
    table: String,
    /// Session schema cached at provisioning time
    schema: RwLock<Option<TableSchema>>,
}

impl MySqlSink {
    /// Connect to the configured database.
    ///
    /// Connection loss here is fatal at consumer startup.
    pub async fn connect(config: &StorageConfig) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size)
            .connect(&config.url)
            .await
            .map_err(|e| {
                Error::Storage(StorageError::ConnectionFailed {
                    url: config.url.clone(),
                    message: e.to_string(),
                })
            })?;

        info!(table = %config.table, "Storage sink connected");

        Ok(Self {
            pool,
            table: config.table.clone(),
            schema: RwLock::new(None),
        })
    }

    /// Target table name.
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// CREATE TABLE statement for a schema, including the implicit columns.
fn create_table_sql(table: &str, schema: &TableSchema) -> String {
    let mut sql = format!(
        "CREATE TABLE IF NOT EXISTS `{}` (`id` BIGINT NOT NULL AUTO_INCREMENT",
        table
    );
    for column in &schema.columns {
        sql.push_str(&format!(", `{}` {}", column.name, ddl_type(column)));
    }
    sql.push_str(", `loaded_at` TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP");
    sql.push_str(", PRIMARY KEY (`id`))");
    sql
}

#[async_trait]
impl RowSink for MySqlSink {
    async fn provision(&self, schema: &TableSchema) -> Result<()> {
        let sql = create_table_sql(&self.table, schema);
        sqlx::query(&sql).execute(&self.pool).await.map_err(|e| {
            Error::Storage(StorageError::Provision {
                table: self.table.clone(),
                message: e.to_string(),
            })
        })?;

        *self.schema.write() = Some(schema.clone());

        info!(
            table = %self.table,
            columns = schema.len(),
            "Table provisioned"
        );
        Ok(())
    }

    async fn write_batch(&self, rows: &[TypedRow]) -> Result<u64> {
        let schema = self
            .schema
            .read()
            .clone()
            .ok_or(Error::Storage(StorageError::NotProvisioned))?;

        let columns = present_columns(&schema, rows);
        if columns.is_empty() {
            return Err(Error::Storage(StorageError::WriteFailed {
                table: self.table.clone(),
                message: "no schema columns present in batch".into(),
            }));
        }

        let column_list = columns
            .iter()
            .map(|c| format!("`{}`", c))
            .collect::<Vec<_>>()
            .join(", ");

        let mut builder: QueryBuilder<MySql> =
            QueryBuilder::new(format!("INSERT INTO `{}` ({}) ", self.table, column_list));

        builder.push_values(rows, |mut b, row| {
            for column in &columns {
                match row.get(column) {
                    Some(CellValue::Bool(v)) => {
                        b.push_bind(*v);
                    }
                    Some(CellValue::Int(v)) => {
                        b.push_bind(*v);
                    }
                    Some(CellValue::Float(v)) => {
                        b.push_bind(*v);
                    }
                    Some(CellValue::Text(v)) => {
                        b.push_bind(v.clone());
                    }
                    Some(CellValue::Null) | None => {
                        b.push("NULL");
                    }
                }
            }
        });

        let result = builder.build().execute(&self.pool).await.map_err(|e| {
            Error::Storage(StorageError::WriteFailed {
                table: self.table.clone(),
                message: e.to_string(),
            })
        })?;

        debug!(
            table = %self.table,
            rows = result.rows_affected(),
            "Batch written"
        );

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnSchema, InferredType};

    #[test]
    fn test_create_table_sql_includes_implicit_columns() {
        let schema = TableSchema::new(vec![
            ColumnSchema::varchar("name", 255),
            ColumnSchema::typed("age", InferredType::Int),
        ]);
        let sql = create_table_sql("extracted", &schema);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS `extracted` \
             (`id` BIGINT NOT NULL AUTO_INCREMENT, \
             `name` VARCHAR(255), \
             `age` INT, \
             `loaded_at` TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
             PRIMARY KEY (`id`))"
        );
    }

    #[test]
    fn test_create_table_sql_is_deterministic() {
        let schema = TableSchema::new(vec![ColumnSchema::typed("n", InferredType::BigInt)]);
        assert_eq!(
            create_table_sql("t", &schema),
            create_table_sql("t", &schema)
        );
        assert!(create_table_sql("t", &schema).contains("`n` BIGINT"));
    }
}
