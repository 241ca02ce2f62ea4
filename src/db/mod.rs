//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Per-dialect capability table (connection strings, introspection)
//! - Connection pool factory
//! - Transactional query execution with cancellation
//! - Result normalization
//! - The database registry and fan-out dispatch
//! - Catalog bootstrap

#[macro_use]
pub mod macros;
pub mod bootstrap;
pub mod dialect;
pub mod executor;
#[cfg(feature = "firebird")]
pub mod firebird;
pub mod normalize;
pub mod pool;
pub mod store;

pub use bootstrap::resolve_data_sources;
pub use dialect::{DialectSpec, connection_string};
pub use executor::{Execution, execute_query};
pub use normalize::{ResultBuilder, ScanRow, display_names};
pub use pool::DbPool;
pub use store::{DatabaseHandle, DatabaseStore, TablesMetadata};
