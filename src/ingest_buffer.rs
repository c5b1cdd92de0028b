/// Ingest Buffer (component D): per-batch in-memory staging,
/// field normalization, batched physical insert with retry.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::clickhouse_client::ClickHouseClient;
use crate::error::{Result, StoreError};
use crate::metrics;
use crate::scalar::{NormalizedRow, Scalar};
use crate::schema::SchemaCatalog;
use crate::telemetry::ProgressCounter;

/// Single batch write cap; larger groups are split into sequential
/// chunks.
pub const BATCH_SIZE: usize = 200_000;

/// Total attempts (including the first) for a transient insert failure,
/// with linear backoff between them.
const MAX_ATTEMPTS: u32 = 3;
const BACKOFF_STEPS_MS: [u64; 2] = [500, 1000];

pub struct IngestBuffer {
    client: Arc<ClickHouseClient>,
    /// Staged rows per destination table, in producer-supplied order.
    staged: HashMap<String, Vec<NormalizedRow>>,
}

impl IngestBuffer {
    pub fn new(client: Arc<ClickHouseClient>) -> Self {
        Self { client, staged: HashMap::new() }
    }

    /// Stage a row for `table`, applying the hex-field normalization
    /// declared for `kind` by the schema catalog. Within a table, rows are
    /// kept in the order they were staged (ordering guarantee).
    pub fn insert(&mut self, table: &str, kind: &str, catalog: &dyn SchemaCatalog, row: NormalizedRow) {
        let hex_columns: Vec<&str> = catalog.hex_fields(kind).iter().map(|f| f.column.as_str()).collect();
        let normalized = normalize_hex_declared_fields(row, &hex_columns);
        self.staged.entry(table.to_string()).or_default().push(normalized);
    }

    pub fn staged_count(&self, table: &str) -> usize {
        self.staged.get(table).map(|rows| rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.staged.values().all(|rows| rows.is_empty())
    }

    /// Flush every staged table. Tables are flushed concurrently; within
    /// a table, chunks are written in order.
    pub async fn flush(&mut self) -> Result<()> {
        let staged = std::mem::take(&mut self.staged);
        let client = self.client.clone();

        let mut handles = Vec::with_capacity(staged.len());
        for (table, rows) in staged {
            let client = client.clone();
            handles.push(tokio::spawn(async move { flush_table(&client, &table, rows).await }));
        }

        let mut first_error = None;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(join_err) => {
                    if first_error.is_none() {
                        first_error = Some(StoreError::TransientIo {
                            attempts: 1,
                            message: format!("flush task panicked: {join_err}"),
                        });
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn flush_table(client: &ClickHouseClient, table: &str, rows: Vec<NormalizedRow>) -> Result<()> {
    if rows.is_empty() {
        return Ok(());
    }
    let columns: Vec<String> = rows[0].columns().into_iter().map(String::from).collect();
    let start = Instant::now();

    let progress = ProgressCounter::new(4);
    for chunk in rows.chunks(BATCH_SIZE) {
        insert_chunk_with_retry(client, table, &columns, chunk).await?;
        if rows.len() > BATCH_SIZE && progress.should_log() {
            info!(table, chunk_rows = chunk.len(), total_rows = rows.len(), "flushed chunk of large batch");
        }
    }
    metrics::INGEST_ROWS_FLUSHED.with_label_values(&[table]).inc_by(rows.len() as u64);
    metrics::INGEST_FLUSH_DURATION.observe(start.elapsed().as_secs_f64());
    info!(table, rows = rows.len(), "flushed ingest batch");
    Ok(())
}

async fn insert_chunk_with_retry(
    client: &ClickHouseClient,
    table: &str,
    columns: &[String],
    chunk: &[NormalizedRow],
) -> Result<()> {
    let values_sql: Vec<String> = chunk.iter().map(|r| r.values_sql()).collect();
    let sql = format!(
        "INSERT INTO {table} ({}) VALUES {}",
        columns.join(", "),
        values_sql.join(", ")
    );

    let mut attempt = 1u32;
    loop {
        match client.execute(&sql).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay_ms = BACKOFF_STEPS_MS[(attempt - 1) as usize];
                warn!(table, attempt, delay_ms, error = %e, "transient insert failure, retrying");
                metrics::INGEST_RETRIES.inc();
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                return Err(StoreError::TransientIo { attempts: attempt, message: e.to_string() });
            }
            Err(e) => return Err(e),
        }
    }
}

fn normalize_hex_declared_fields(mut row: NormalizedRow, hex_columns: &[&str]) -> NormalizedRow {
    for (column, value) in row.fields.iter_mut() {
        if hex_columns.contains(&column.as_str()) {
            if let Scalar::Text(s) = value {
                *value = Scalar::Text(crate::scalar::strip_0x(s).to_string());
            }
        }
    }
    row
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scalar::HexFieldSpec;
    use crate::schema::StaticSchemaCatalog;
    use crate::types::ManagedTable;

    #[test]
    fn hex_declared_text_fields_are_stripped_of_0x_prefix() {
        let mut row = NormalizedRow::new();
        row.push("tx_hash", Scalar::Text("0xabcdef".to_string()));
        row.push("amount", Scalar::Int64(5));
        let normalized = normalize_hex_declared_fields(row, &["tx_hash"]);
        match &normalized.fields[0].1 {
            Scalar::Text(s) => assert_eq!(s, "abcdef"),
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn non_hex_columns_are_left_untouched() {
        let mut row = NormalizedRow::new();
        row.push("label", Scalar::Text("0xnotactuallyhex".to_string()));
        let normalized = normalize_hex_declared_fields(row, &["other_column"]);
        match &normalized.fields[0].1 {
            Scalar::Text(s) => assert_eq!(s, "0xnotactuallyhex"),
            other => panic!("expected Text, got {other:?}"),
        }
    }

    #[test]
    fn large_groups_would_split_into_batch_size_chunks() {
        let rows: Vec<NormalizedRow> = (0..450_000u32)
            .map(|i| {
                let mut r = NormalizedRow::new();
                r.push("height", Scalar::UInt64(i as u64));
                r
            })
            .collect();
        let chunks: Vec<&[NormalizedRow]> = rows.chunks(BATCH_SIZE).collect();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), BATCH_SIZE);
        assert_eq!(chunks[2].len(), 50_000);
    }

    #[test]
    fn catalog_lookup_feeds_into_insert_staging() {
        let catalog = StaticSchemaCatalog::new(vec![ManagedTable::Regular {
            kind: "Vote".into(),
            snake_name: "votes".into(),
        }])
        .with_hex_fields("Vote", vec![HexFieldSpec { column: "tx_hash".into(), declared_len: 32 }]);
        let hex_cols: Vec<&str> = catalog.hex_fields("Vote").iter().map(|f| f.column.as_str()).collect();
        assert_eq!(hex_cols, vec!["tx_hash"]);
    }
}
