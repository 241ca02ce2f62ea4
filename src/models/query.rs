//! Query-related data models.
//!
//! This module defines the JSON-facing shape of query results. Field names are part of
//! the HTTP contract: `groupName`, `data.columns[].name`, `data.columns[].fieldName`,
//! `data.rows[]` and `error.message`.

use crate::error::DbError;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// A single cell value, normalized across dialects.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Unsigned values above `i64::MAX` (MySQL `BIGINT UNSIGNED`)
    UInt(u64),
    Float(f64),
    /// Text, and byte sequences decoded as UTF-8
    Text(String),
    Json(JsonValue),
}

impl CellValue {
    /// Coerce raw bytes to text. Invalid UTF-8 sequences are replaced.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self::Text(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Float values that JSON cannot represent are kept as text.
    pub fn from_f64(v: f64) -> Self {
        if v.is_finite() {
            Self::Float(v)
        } else {
            Self::Text(v.to_string())
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One result row, keyed by display name. Column order lives in [`QueryData::columns`].
pub type RowMap = BTreeMap<String, CellValue>;

/// Original column name and the unique key used for it in each row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "fieldName")]
    pub field_name: String,
}

/// Normalized result of one execution.
///
/// `columns` stays empty when no row was ever fetched, even if the statement has a
/// known shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryData {
    pub columns: Vec<Column>,
    pub rows: Vec<RowMap>,
}

impl QueryData {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.rows.is_empty()
    }

    /// Field names in column order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.field_name.as_str())
    }
}

/// Error payload embedded in a per-target result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryError {
    pub message: String,
    pub kind: &'static str,
    /// Rows and columns read before the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<QueryData>,
}

impl QueryError {
    pub fn new(err: &DbError, partial: Option<QueryData>) -> Self {
        Self {
            message: err.to_string(),
            kind: err.kind(),
            partial: partial.filter(|p| !p.is_empty()),
        }
    }
}

/// Outcome for one target; exactly one of `data` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupQueryResult {
    #[serde(rename = "groupName")]
    pub group_name: String,
    pub data: Option<QueryData>,
    pub error: Option<QueryError>,
}

impl GroupQueryResult {
    pub fn success(group_name: impl Into<String>, data: QueryData) -> Self {
        Self {
            group_name: group_name.into(),
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(group_name: impl Into<String>, error: QueryError) -> Self {
        Self {
            group_name: group_name.into(),
            data: None,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
