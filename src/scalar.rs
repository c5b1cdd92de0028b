/// The `Scalar` sum type and the field-normalization rules a row must pass
/// through before it reaches the database.
///
/// Money-sized integers never round-trip through a native double: they
/// carry their magnitude as raw big-endian bytes and are only turned into a
/// decimal string at the SQL-literal boundary, where the column's declared
/// width is the source of truth, not our in-memory representation.
use chrono::{DateTime, Utc};
use num_bigint::BigUint;
use num_traits::Zero;

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Int64(i64),
    UInt64(u64),
    /// Wide unsigned integer, big-endian magnitude bytes.
    BigUint(Vec<u8>),
    Text(String),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    /// A field declared "hex-bytes" by the entity's metadata.
    HexBytes(Vec<u8>),
    Array(Vec<Scalar>),
    Null,
}

impl Scalar {
    /// Normalize and render this value as a SQL literal suitable for an
    /// `INSERT ... VALUES (...)` statement. `Scalar::HexBytes` always goes
    /// through the hex-specific branch below; fields that arrive already
    /// hex-encoded as plain text are stripped elsewhere, by the ingest
    /// buffer, using the per-entity-kind hex-field metadata from the
    /// schema catalog.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Scalar::Int64(v) => v.to_string(),
            Scalar::UInt64(v) => v.to_string(),
            Scalar::BigUint(bytes) => {
                let value = BigUint::from_bytes_be(bytes);
                if value.is_zero() {
                    "0".to_string()
                } else {
                    value.to_str_radix(10)
                }
            }
            Scalar::Text(s) => quote(s),
            Scalar::Bool(b) => if *b { "1".to_string() } else { "0".to_string() },
            Scalar::Timestamp(ts) => quote(&format_timestamp(*ts)),
            Scalar::HexBytes(bytes) => quote(&normalize_hex(bytes)),
            Scalar::Array(items) => {
                let rendered: Vec<String> = items.iter().map(Scalar::to_sql_literal).collect();
                format!("[{}]", rendered.join(", "))
            }
            Scalar::Null => "NULL".to_string(),
        }
    }
}

/// ISO-8601 with a space separator and millisecond precision, no trailing
/// zone indicator.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Strip a leading `0x`/`0X` if present; an empty string after stripping is
/// passed through as `""` (the column treats it as a zero-byte fixed
/// string of its declared length — validating that length upstream is the
/// caller's responsibility).
pub fn normalize_hex(bytes: &[u8]) -> String {
    let hex = hex::encode(bytes);
    strip_0x(&hex).to_string()
}

/// Same stripping rule, for hex already supplied as a string (e.g. from a
/// producer that already hex-encoded its own fields).
pub fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

fn quote(s: &str) -> String {
    let escaped = s.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}

/// A row destined for a single physical table: an ordered list of
/// `(column, value)` pairs. Order matters only for readability of the
/// generated SQL; the column list is emitted alongside the values so
/// ordering within a row is not load-bearing.
#[derive(Debug, Clone, Default)]
pub struct NormalizedRow {
    pub fields: Vec<(String, Scalar)>,
}

impl NormalizedRow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, column: impl Into<String>, value: Scalar) {
        self.fields.push((column.into(), value));
    }

    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|(c, _)| c.as_str()).collect()
    }

    pub fn values_sql(&self) -> String {
        let rendered: Vec<String> = self.fields.iter().map(|(_, v)| v.to_sql_literal()).collect();
        format!("({})", rendered.join(", "))
    }
}

/// Per-column hex-field metadata for one entity kind, populated from the
/// schema catalog — a per-kind descriptor rather than a per-instance
/// sidecar.
#[derive(Debug, Clone)]
pub struct HexFieldSpec {
    pub column: String,
    pub declared_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn wide_integer_renders_as_decimal_string_without_native_overflow() {
        // 2^130, far past u64/i64 range.
        let huge = BigUint::from(2u32).pow(130);
        let scalar = Scalar::BigUint(huge.to_bytes_be());
        assert_eq!(scalar.to_sql_literal(), huge.to_str_radix(10));
    }

    #[test]
    fn empty_wide_integer_is_zero() {
        assert_eq!(Scalar::BigUint(vec![]).to_sql_literal(), "0");
    }

    #[test]
    fn timestamp_uses_space_separator_and_millis_no_zone() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(format_timestamp(ts), "2024-01-02 03:04:05.000");
    }

    #[test]
    fn hex_bytes_strip_0x_prefix() {
        assert_eq!(strip_0x("0xabcdef"), "abcdef");
        assert_eq!(strip_0x("abcdef"), "abcdef");
    }

    #[test]
    fn empty_hex_field_becomes_empty_string_literal() {
        assert_eq!(Scalar::HexBytes(vec![]).to_sql_literal(), "''");
    }

    #[test]
    fn text_values_escape_quotes() {
        assert_eq!(Scalar::Text("O'Brien".to_string()).to_sql_literal(), "'O\\'Brien'");
    }

    #[test]
    fn array_passes_through_element_rendering() {
        let arr = Scalar::Array(vec![Scalar::Int64(1), Scalar::Int64(2)]);
        assert_eq!(arr.to_sql_literal(), "[1, 2]");
    }
}
