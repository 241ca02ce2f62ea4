//! Data models for the query router.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;

// Re-export commonly used types
pub use connection::{
    ConnectionConfig, DataSource, DatabaseConfig, DatabaseItem, Dialect, GroupIdentity,
    PoolConfig,
};
pub use query::{CellValue, Column, GroupQueryResult, QueryData, QueryError, RowMap};
