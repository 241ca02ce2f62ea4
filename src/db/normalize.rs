//! Result normalization.
//!
//! Converts driver rows into [`QueryData`]: unique display names for colliding column
//! names, positional value scanning, and a dialect-independent [`CellValue`] per cell.
//!
//! # Architecture
//!
//! Decoding uses a two-phase approach, per dialect:
//! 1. `TypeCategory` classifies the value's type name
//! 2. a dialect submodule extracts the value, falling back to the raw text
//!
//! Anything that is not a number, boolean, JSON or binary value is read as the
//! driver's text representation, so dates, decimals and vendor types stay readable.

use crate::models::{CellValue, Column, QueryData, RowMap};
use serde_json::Value as JsonValue;
use sqlx::mysql::MySqlRow;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column as _, Row, TypeInfo, ValueRef};
use std::collections::HashSet;

// =============================================================================
// Display Names
// =============================================================================

/// Build a unique display name for every column, left to right.
///
/// The first occurrence of a name keeps it. A later duplicate gets the smallest
/// `__N` suffix not already taken by an earlier column, including columns whose
/// literal name already carries a suffix.
///
/// `id, name, type_id, id, name, id -> id, name, type_id, id__1, name__1, id__2`
pub fn display_names<S: AsRef<str>>(column_names: &[S]) -> Vec<String> {
    let mut taken: HashSet<String> = HashSet::with_capacity(column_names.len());
    let mut names = Vec::with_capacity(column_names.len());

    for name in column_names {
        let name = name.as_ref();
        let display = if taken.contains(name) {
            (1..)
                .map(|n| format!("{}__{}", name, n))
                .find(|candidate| !taken.contains(candidate))
                .unwrap_or_else(|| name.to_string())
        } else {
            name.to_string()
        };
        taken.insert(display.clone());
        names.push(display);
    }

    names
}

// =============================================================================
// Row Scanning
// =============================================================================

/// A driver row that can be read positionally.
pub trait ScanRow {
    /// Column names in physical order.
    fn column_names(&self) -> Vec<String>;

    /// Cell values in physical order.
    fn values(&self) -> Vec<CellValue>;
}

/// Map one row's values onto display names by position.
pub fn scan_row<R: ScanRow>(row: &R, display_names: &[String]) -> RowMap {
    display_names
        .iter()
        .cloned()
        .zip(row.values())
        .collect()
}

/// Accumulates rows of one execution into [`QueryData`].
///
/// Columns are fixed by the first row seen. Once that result set ends, rows of any
/// later statement in the same script are ignored, so names and positions never
/// drift apart.
#[derive(Debug, Default)]
pub struct ResultBuilder {
    columns: Vec<Column>,
    display_names: Vec<String>,
    rows: Vec<RowMap>,
    sealed: bool,
}

impl ResultBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<R: ScanRow>(&mut self, row: &R) {
        if self.sealed {
            return;
        }
        if self.columns.is_empty() {
            let names = row.column_names();
            self.display_names = display_names(&names);
            self.columns = names
                .into_iter()
                .zip(self.display_names.iter().cloned())
                .map(|(name, field_name)| Column { name, field_name })
                .collect();
        }
        self.rows.push(scan_row(row, &self.display_names));
    }

    /// Mark the end of one statement's result set.
    pub fn end_result_set(&mut self) {
        if !self.rows.is_empty() {
            self.sealed = true;
        }
    }

    pub fn finish(self) -> QueryData {
        QueryData {
            columns: self.columns,
            rows: self.rows,
        }
    }
}

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for a value's type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Boolean,
    Binary,
    Json,
    /// Read as text (dates, decimals, strings, vendor types)
    Other,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - exact values are kept as text
    if lower.contains("decimal") || lower.contains("numeric") {
        return TypeCategory::Other;
    }

    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    if (lower.contains("int") && !lower.contains("point") && !lower.contains("interval"))
        || lower.contains("serial")
    {
        return TypeCategory::Integer;
    }

    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    TypeCategory::Other
}

fn parse_json_text(text: String) -> CellValue {
    match serde_json::from_str::<JsonValue>(&text) {
        Ok(json) => CellValue::Json(json),
        Err(_) => CellValue::Text(text),
    }
}

// =============================================================================
// ScanRow Implementations
// =============================================================================

impl ScanRow for MySqlRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn values(&self) -> Vec<CellValue> {
        (0..self.len()).map(|idx| mysql::decode_column(self, idx)).collect()
    }
}

impl ScanRow for PgRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn values(&self) -> Vec<CellValue> {
        (0..self.len())
            .map(|idx| postgres::decode_column(self, idx))
            .collect()
    }
}

impl ScanRow for SqliteRow {
    fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name().to_string()).collect()
    }

    fn values(&self) -> Vec<CellValue> {
        (0..self.len())
            .map(|idx| sqlite::decode_column(self, idx))
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================
//
// The modules below are intentionally parallel. Each typed decode returns `None`
// when the driver refuses the conversion, and the caller falls back to text.

mod mysql {
    use super::*;

    pub fn decode_column(row: &MySqlRow, idx: usize) -> CellValue {
        let type_name = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return CellValue::Null,
            Ok(raw) => raw.type_info().name().to_string(),
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to read column");
                return CellValue::Null;
            }
        };

        let decoded = match categorize_type(&type_name) {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(CellValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_bytes(row, idx),
            TypeCategory::Json => decode_text(row, idx).map(|v| match v {
                CellValue::Text(s) => parse_json_text(s),
                other => other,
            }),
            TypeCategory::Other => None,
        };
        decoded
            .or_else(|| decode_text(row, idx))
            .or_else(|| decode_bytes(row, idx))
            .unwrap_or_else(|| {
                tracing::debug!(column = idx, type_name = %type_name, "Undecodable value");
                CellValue::Null
            })
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Option<CellValue> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(CellValue::Int(v));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(CellValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i16, _>(idx) {
            return Some(CellValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<i8, _>(idx) {
            return Some(CellValue::Int(v.into()));
        }
        // Unsigned types
        if let Ok(v) = row.try_get::<u64, _>(idx) {
            return Some(match i64::try_from(v) {
                Ok(v) => CellValue::Int(v),
                Err(_) => CellValue::UInt(v),
            });
        }
        if let Ok(v) = row.try_get::<u32, _>(idx) {
            return Some(CellValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<u16, _>(idx) {
            return Some(CellValue::Int(v.into()));
        }
        if let Ok(v) = row.try_get::<u8, _>(idx) {
            return Some(CellValue::Int(v.into()));
        }
        None
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Option<CellValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(CellValue::from_f64(v));
        }
        row.try_get::<f32, _>(idx)
            .ok()
            .map(|v| CellValue::from_f64(v.into()))
    }

    fn decode_bytes(row: &MySqlRow, idx: usize) -> Option<CellValue> {
        row.try_get_unchecked::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| CellValue::from_bytes(&v))
    }

    fn decode_text(row: &MySqlRow, idx: usize) -> Option<CellValue> {
        row.try_get_unchecked::<String, _>(idx)
            .ok()
            .map(CellValue::Text)
    }
}

mod postgres {
    use super::*;

    pub fn decode_column(row: &PgRow, idx: usize) -> CellValue {
        let type_name = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return CellValue::Null,
            Ok(raw) => raw.type_info().name().to_string(),
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to read column");
                return CellValue::Null;
            }
        };

        let decoded = match categorize_type(&type_name) {
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(CellValue::Bool),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => row
                .try_get::<Vec<u8>, _>(idx)
                .ok()
                .map(|v| CellValue::from_bytes(&v)),
            TypeCategory::Json => row
                .try_get::<JsonValue, _>(idx)
                .ok()
                .map(CellValue::Json),
            TypeCategory::Other => None,
        };
        decoded.or_else(|| decode_text(row, idx)).unwrap_or_else(|| {
            tracing::debug!(column = idx, type_name = %type_name, "Undecodable value");
            CellValue::Null
        })
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Option<CellValue> {
        if let Ok(v) = row.try_get::<i64, _>(idx) {
            return Some(CellValue::Int(v));
        }
        if let Ok(v) = row.try_get::<i32, _>(idx) {
            return Some(CellValue::Int(v.into()));
        }
        row.try_get::<i16, _>(idx)
            .ok()
            .map(|v| CellValue::Int(v.into()))
    }

    fn decode_float(row: &PgRow, idx: usize) -> Option<CellValue> {
        if let Ok(v) = row.try_get::<f64, _>(idx) {
            return Some(CellValue::from_f64(v));
        }
        row.try_get::<f32, _>(idx)
            .ok()
            .map(|v| CellValue::from_f64(v.into()))
    }

    /// Simple-protocol results arrive in text format, so any value reads as its
    /// server-side text representation.
    fn decode_text(row: &PgRow, idx: usize) -> Option<CellValue> {
        row.try_get_unchecked::<String, _>(idx)
            .ok()
            .map(CellValue::Text)
    }
}

mod sqlite {
    use super::*;

    pub fn decode_column(row: &SqliteRow, idx: usize) -> CellValue {
        // SQLite values carry their own storage class, independent of the column
        let type_name = match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return CellValue::Null,
            Ok(raw) => raw.type_info().name().to_string(),
            Err(e) => {
                tracing::warn!(column = idx, error = %e, "Failed to read column");
                return CellValue::Null;
            }
        };

        let decoded = match categorize_type(&type_name) {
            TypeCategory::Integer => row.try_get::<i64, _>(idx).ok().map(CellValue::Int),
            TypeCategory::Boolean => row.try_get::<bool, _>(idx).ok().map(CellValue::Bool),
            TypeCategory::Float => row
                .try_get::<f64, _>(idx)
                .ok()
                .map(CellValue::from_f64),
            TypeCategory::Binary => decode_bytes(row, idx),
            TypeCategory::Json | TypeCategory::Other => None,
        };
        decoded
            .or_else(|| decode_text(row, idx))
            .or_else(|| decode_bytes(row, idx))
            .unwrap_or(CellValue::Null)
    }

    fn decode_bytes(row: &SqliteRow, idx: usize) -> Option<CellValue> {
        row.try_get_unchecked::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| CellValue::from_bytes(&v))
    }

    fn decode_text(row: &SqliteRow, idx: usize) -> Option<CellValue> {
        row.try_get_unchecked::<String, _>(idx)
            .ok()
            .map(CellValue::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(input: &[&str]) -> Vec<String> {
        display_names(input)
    }

    #[test]
    fn test_display_names_unique_input_unchanged() {
        assert_eq!(names(&["id", "name"]), vec!["id", "name"]);
    }

    #[test]
    fn test_display_names_duplicates_get_suffix() {
        assert_eq!(
            names(&["id", "name", "id", "name"]),
            vec!["id", "name", "id__1", "name__1"]
        );
        assert_eq!(
            names(&["id", "name", "type_id", "group_id", "id", "name", "id", "name"]),
            vec![
                "id", "name", "type_id", "group_id", "id__1", "name__1", "id__2", "name__2"
            ]
        );
    }

    #[test]
    fn test_display_names_skip_literal_suffix() {
        assert_eq!(
            names(&["id__1", "id", "id", "id"]),
            vec!["id__1", "id", "id__2", "id__3"]
        );
    }

    #[test]
    fn test_display_names_suffix_collides_with_later_literal() {
        assert_eq!(
            names(&["id", "id", "id", "id__1"]),
            vec!["id", "id__1", "id__2", "id__1__1"]
        );
    }

    #[test]
    fn test_display_names_properties() {
        let inputs: Vec<Vec<&str>> = vec![
            vec![],
            vec!["a"],
            vec!["a", "a", "a", "a", "a"],
            vec!["a__1", "a__2", "a", "a", "a"],
            vec!["x", "x__1", "x", "x__1", "x__1__1", "x"],
            vec!["", "", "__1"],
        ];
        for input in inputs {
            let output = display_names(&input);
            assert_eq!(output.len(), input.len());

            let unique: HashSet<&String> = output.iter().collect();
            assert_eq!(unique.len(), output.len(), "duplicates in {:?}", output);

            // Already-unique input is a fixed point
            assert_eq!(display_names(&output), output);

            // First occurrence keeps its name
            for (i, name) in input.iter().enumerate() {
                if !input[..i].contains(name) && !output[..i].iter().any(|o| o == name) {
                    assert_eq!(&output[i], name);
                }
            }
        }
    }

    #[test]
    fn test_categorize_type() {
        assert_eq!(categorize_type("INT4"), TypeCategory::Integer);
        assert_eq!(categorize_type("BIGINT UNSIGNED"), TypeCategory::Integer);
        assert_eq!(categorize_type("INTEGER"), TypeCategory::Integer);
        assert_eq!(categorize_type("NUMERIC"), TypeCategory::Other);
        assert_eq!(categorize_type("DECIMAL"), TypeCategory::Other);
        assert_eq!(categorize_type("BOOL"), TypeCategory::Boolean);
        assert_eq!(categorize_type("FLOAT8"), TypeCategory::Float);
        assert_eq!(categorize_type("REAL"), TypeCategory::Float);
        assert_eq!(categorize_type("JSONB"), TypeCategory::Json);
        assert_eq!(categorize_type("BYTEA"), TypeCategory::Binary);
        assert_eq!(categorize_type("VARBINARY"), TypeCategory::Binary);
        assert_eq!(categorize_type("BLOB"), TypeCategory::Binary);
        assert_eq!(categorize_type("POINT"), TypeCategory::Other);
        assert_eq!(categorize_type("INTERVAL"), TypeCategory::Other);
        assert_eq!(categorize_type("TIMESTAMPTZ"), TypeCategory::Other);
    }

    struct FakeRow {
        names: Vec<&'static str>,
        values: Vec<CellValue>,
    }

    impl ScanRow for FakeRow {
        fn column_names(&self) -> Vec<String> {
            self.names.iter().map(|s| s.to_string()).collect()
        }

        fn values(&self) -> Vec<CellValue> {
            self.values.clone()
        }
    }

    #[test]
    fn test_result_builder_positional_scan() {
        let mut builder = ResultBuilder::new();
        builder.push(&FakeRow {
            names: vec!["id", "name", "id"],
            values: vec![
                CellValue::Int(1),
                CellValue::Text("a".into()),
                CellValue::Int(7),
            ],
        });
        let data = builder.finish();
        assert_eq!(
            data.field_names().collect::<Vec<_>>(),
            vec!["id", "name", "id__1"]
        );
        assert_eq!(data.columns[2].name, "id");
        assert_eq!(data.rows[0]["id"], CellValue::Int(1));
        assert_eq!(data.rows[0]["id__1"], CellValue::Int(7));
    }

    #[test]
    fn test_result_builder_empty() {
        let mut builder = ResultBuilder::new();
        builder.end_result_set();
        let data = builder.finish();
        assert!(data.columns.is_empty());
        assert!(data.rows.is_empty());
    }

    #[test]
    fn test_result_builder_ignores_later_result_sets() {
        let mut builder = ResultBuilder::new();
        builder.end_result_set();
        builder.push(&FakeRow {
            names: vec!["a"],
            values: vec![CellValue::Int(1)],
        });
        builder.end_result_set();
        builder.push(&FakeRow {
            names: vec!["b", "c"],
            values: vec![CellValue::Int(2), CellValue::Int(3)],
        });
        let data = builder.finish();
        assert_eq!(data.rows.len(), 1);
        assert_eq!(data.columns.len(), 1);
        assert_eq!(data.rows[0]["a"], CellValue::Int(1));
    }
}
