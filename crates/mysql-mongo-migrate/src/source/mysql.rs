//! MySQL/MariaDB source implementation.
//!
//! Uses SQLx for connection pooling and async query execution. Rows are
//! decoded by the column type the server reports; the driver row is dropped
//! right after decoding so only column name/value pairs leave this module.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::info;

use super::SourceReader;
use crate::config::SourceConfig;
use crate::core::{Chunk, Value};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source.
pub struct MysqlSource {
    pool: MySqlPool,
    database: String,
}

impl MysqlSource {
    /// Connect to the source and verify the connection.
    pub async fn new(config: &SourceConfig, max_conns: usize) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(config.connect_options())
            .await
            .map_err(|e| MigrateError::connection(e, "creating MySQL source pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::connection(e, "testing MySQL source connection"))?;

        info!(
            "Connected to MySQL source: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    /// Quote a MySQL identifier.
    fn quote_ident(name: &str) -> String {
        format!("`{}`", name.replace('`', "``"))
    }

    /// Build the range scan for one chunk. LIMIT and OFFSET are bound.
    fn build_range_query(table: &str, order_by: &[String]) -> String {
        let mut query = format!("SELECT * FROM {}", Self::quote_ident(table));
        if !order_by.is_empty() {
            let cols = order_by
                .iter()
                .map(|c| Self::quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ");
            query.push_str(" ORDER BY ");
            query.push_str(&cols);
        }
        query.push_str(" LIMIT ? OFFSET ?");
        query
    }

    /// Convert a MySQL row to values in column order.
    fn row_to_values(table: &str, row: &MySqlRow) -> Result<Vec<Value>> {
        (0..row.columns().len())
            .map(|i| Self::decode_column(table, row, i))
            .collect()
    }

    /// Error for a column value that could not be read. A non-NULL value is
    /// never replaced by NULL.
    fn undecodable(
        table: &str,
        column: &str,
        type_name: &str,
        err: impl ToString,
    ) -> MigrateError {
        MigrateError::source_query(
            table,
            format!(
                "cannot decode column {} ({}): {}",
                column,
                type_name,
                err.to_string()
            ),
        )
    }

    fn decode_column(table: &str, row: &MySqlRow, i: usize) -> Result<Value> {
        let column = &row.columns()[i];
        let type_name = column.type_info().name().to_ascii_uppercase();

        let raw = row
            .try_get_raw(i)
            .map_err(|e| Self::undecodable(table, column.name(), &type_name, e))?;
        if raw.is_null() {
            return Ok(Value::Null);
        }

        let decoded = match type_name.as_str() {
            "BOOLEAN" => row.try_get::<bool, _>(i).map(Value::Bool),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" => {
                row.try_get::<i64, _>(i).map(Value::I64)
            }
            t if t.ends_with("UNSIGNED") => row.try_get::<u64, _>(i).map(Value::U64),
            "YEAR" => row.try_get::<u16, _>(i).map(|v| Value::I64(v as i64)),
            "FLOAT" => row.try_get::<f32, _>(i).map(|v| Value::F64(v as f64)),
            "DOUBLE" => row.try_get::<f64, _>(i).map(Value::F64),
            "DECIMAL" => row
                .try_get::<rust_decimal::Decimal, _>(i)
                .map(Value::Decimal),
            "DATE" => row.try_get::<NaiveDate, _>(i).map(Value::Date),
            "TIME" => row.try_get::<NaiveTime, _>(i).map(Value::Time),
            "DATETIME" => row.try_get::<NaiveDateTime, _>(i).map(Value::DateTime),
            "TIMESTAMP" => row.try_get::<DateTime<Utc>, _>(i).map(Value::Timestamp),
            "JSON" => row.try_get::<serde_json::Value, _>(i).map(Value::Json),
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BIT"
            | "GEOMETRY" => row.try_get::<Vec<u8>, _>(i).map(Value::Bytes),
            _ => row.try_get::<String, _>(i).map(Value::Text),
        };

        // Fall back to text, then raw bytes, for types the match above misjudged.
        decoded
            .or_else(|_| row.try_get::<String, _>(i).map(Value::Text))
            .or_else(|_| row.try_get::<Vec<u8>, _>(i).map(Value::Bytes))
            .map_err(|e| Self::undecodable(table, column.name(), &type_name, e))
    }
}

#[async_trait]
impl SourceReader for MysqlSource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        // CAST to CHAR to handle collation differences
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::source_query(&self.database, e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("TABLE_NAME")
                    .map_err(|e| MigrateError::source_query(&self.database, e))
            })
            .collect()
    }

    async fn read_chunk(
        &self,
        table: &str,
        offset: u64,
        limit: usize,
        order_by: &[String],
    ) -> Result<Chunk> {
        let query = Self::build_range_query(table, order_by);

        let rows: Vec<MySqlRow> = sqlx::query(&query)
            .bind(limit as u64)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::source_query(table, e))?;

        let Some(first) = rows.first() else {
            return Ok(Chunk::empty(offset));
        };

        let columns: Vec<String> = first
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let values = rows
            .iter()
            .map(|row| Self::row_to_values(table, row))
            .collect::<Result<Vec<_>>>()?;

        Ok(Chunk::new(offset, Arc::new(columns), values))
    }

    async fn count_rows(&self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", Self::quote_ident(table));

        let row = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::source_query(table, e))?;

        row.try_get::<i64, _>(0)
            .map_err(|e| MigrateError::source_query(table, e))
    }

    async fn primary_key(&self, table: &str) -> Result<Vec<String>> {
        let query = r#"
            SELECT CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::source_query(table, e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("COLUMN_NAME")
                    .map_err(|e| MigrateError::source_query(table, e))
            })
            .collect()
    }

    async fn test_connection(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::connection(e, "pinging MySQL source"))?;
        Ok(())
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
