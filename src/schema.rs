/// Schema catalog (Design Notes, ambient component P).
///
/// Populating this from on-disk schema directories (`tablesPath`,
/// `hotSupportedTablesPath`) is the external schema loader's job — an
/// explicit non-goal. The core only consumes the result: which
/// tables are managed, which of those are hot-supported, and which fields
/// of which entity kinds are hex-bytes.
use std::collections::HashMap;

use crate::scalar::HexFieldSpec;
use crate::types::ManagedTable;

pub trait SchemaCatalog: Send + Sync {
    fn managed_tables(&self) -> &[ManagedTable];
    fn hex_fields(&self, kind: &str) -> &[HexFieldSpec];
    /// The configured height column name (`heightColumnName`,
    /// default `"height"`), used for cutoff queries and schema
    /// validation.
    fn height_column_name(&self) -> &str;
}

/// In-memory implementation for tests and for callers who already have
/// their schema available without a file-backed loader.
pub struct StaticSchemaCatalog {
    tables: Vec<ManagedTable>,
    hex_fields: HashMap<String, Vec<HexFieldSpec>>,
    height_column_name: String,
}

impl StaticSchemaCatalog {
    pub fn new(tables: Vec<ManagedTable>) -> Self {
        Self { tables, hex_fields: HashMap::new(), height_column_name: "height".to_string() }
    }

    pub fn with_height_column(mut self, name: impl Into<String>) -> Self {
        self.height_column_name = name.into();
        self
    }

    pub fn with_hex_fields(mut self, kind: impl Into<String>, fields: Vec<HexFieldSpec>) -> Self {
        self.hex_fields.insert(kind.into(), fields);
        self
    }

    /// Validates that every hot-supported table in this catalog declares
    /// the configured height column. `SchemaError`: "a
    /// hot-supported table lacks the configured height column ... the
    /// error message enumerates the offending tables."
    ///
    /// Since the catalog here does not carry full column lists (that's
    /// the loader's concern), this takes the set of columns discovered
    /// per table from the caller (e.g. read from `system.columns`) and
    /// reports any hot-supported table missing the height column.
    pub fn validate_height_columns(&self, columns_by_table: &HashMap<String, Vec<String>>) -> Result<(), String> {
        let mut offending = Vec::new();
        for table in &self.tables {
            if let ManagedTable::HotSupported { snake_name, .. } = table {
                if let Some(cols) = columns_by_table.get(snake_name) {
                    if !cols.iter().any(|c| c == &self.height_column_name) {
                        offending.push(snake_name.clone());
                    }
                }
            }
        }
        if offending.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "hot-supported table(s) missing height column '{}': {:?}",
                self.height_column_name, offending
            ))
        }
    }
}

impl SchemaCatalog for StaticSchemaCatalog {
    fn managed_tables(&self) -> &[ManagedTable] {
        &self.tables
    }

    fn hex_fields(&self, kind: &str) -> &[HexFieldSpec] {
        self.hex_fields.get(kind).map(|v| v.as_slice()).unwrap_or(&[])
    }

    fn height_column_name(&self) -> &str {
        &self.height_column_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_hot_supported_tables_missing_the_height_column() {
        let catalog = StaticSchemaCatalog::new(vec![
            ManagedTable::HotSupported { kind: "Transfer".into(), snake_name: "transfers".into() },
        ]);
        let mut columns = HashMap::new();
        columns.insert("transfers".to_string(), vec!["from".to_string(), "to".to_string()]);
        let result = catalog.validate_height_columns(&columns);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("transfers"));
    }

    #[test]
    fn passes_when_height_column_present() {
        let catalog = StaticSchemaCatalog::new(vec![
            ManagedTable::HotSupported { kind: "Transfer".into(), snake_name: "transfers".into() },
        ]);
        let mut columns = HashMap::new();
        columns.insert("transfers".to_string(), vec!["height".to_string(), "from".to_string()]);
        assert!(catalog.validate_height_columns(&columns).is_ok());
    }
}
