/// Thin wrapper around the `clickhouse` crate's `Client`.
///
/// The core only ever needs a handful of primitives against the target
/// store: run a statement (DDL, `INSERT`, `ALTER ... DELETE`), fetch a
/// single count, and fetch a single optional string column. Dynamic,
/// entity-kind-agnostic row inserts are built as literal SQL by the
/// ingest buffer (see `scalar::Scalar::to_sql_literal`) rather than routed
/// through the crate's compile-time-typed `Row` insert path, since the row
/// shape here is only known at runtime. See DESIGN.md for why this
/// dependency replaces an embedded key-value store.
use clickhouse::{Client, Row};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Result, StoreError};

#[derive(Clone)]
pub struct ClickHouseClient {
    inner: Client,
}

#[derive(Debug, Row, Deserialize)]
struct CountRow {
    count: u64,
}

#[derive(Debug, Row, Deserialize)]
struct OptionalStringRow {
    value: String,
}

impl ClickHouseClient {
    pub fn new(url: &str) -> Self {
        Self { inner: Client::default().with_url(url) }
    }

    pub fn with_database(url: &str, database: &str) -> Self {
        Self { inner: Client::default().with_url(url).with_database(database) }
    }

    /// Run a statement with no expected result rows: DDL, `INSERT`,
    /// `ALTER TABLE ... DELETE`, `INSERT ... SELECT`.
    pub async fn execute(&self, sql: &str) -> Result<()> {
        self.inner
            .query(sql)
            .execute()
            .await
            .map_err(StoreError::Database)
    }

    /// Fetch a single count. `sql` must alias its result column as
    /// `count` (e.g. `SELECT count() AS count FROM t WHERE height <= 10`).
    pub async fn fetch_count(&self, sql: &str) -> Result<u64> {
        let row: Option<CountRow> = self
            .inner
            .query(sql)
            .fetch_optional()
            .await
            .map_err(StoreError::Database)?;
        Ok(row.map(|r| r.count).unwrap_or(0))
    }

    /// Fetch a single optional string column. `sql` must alias its result
    /// column as `value`.
    pub async fn fetch_optional_string(&self, sql: &str) -> Result<Option<String>> {
        let row: Option<OptionalStringRow> = self
            .inner
            .query(sql)
            .fetch_optional()
            .await
            .map_err(StoreError::Database)?;
        Ok(row.map(|r| r.value))
    }

    /// Fetch every row matching `sql` into a caller-defined `Row` type.
    /// Used by components whose result shape is specific to them (the
    /// registry's `{height, hash, timestamp}` rows, migration's per-table
    /// counts) rather than the generic scalar helpers above.
    pub async fn fetch_all<T: Row + DeserializeOwned>(&self, sql: &str) -> Result<Vec<T>> {
        self.inner
            .query(sql)
            .fetch_all::<T>()
            .await
            .map_err(StoreError::Database)
    }

    /// Whether a table currently exists. Used to silently skip migration
    /// and validation work against tables unknown to the database.
    pub async fn table_exists(&self, database: &str, table: &str) -> Result<bool> {
        let sql = format!(
            "SELECT count() AS count FROM system.tables WHERE database = '{database}' AND name = '{table}'"
        );
        Ok(self.fetch_count(&sql).await? > 0)
    }
}
