//! Multi-tenant SQL query router.
//!
//! Keeps a registry of database pools keyed by `(groupName, groupType)` and runs
//! ad-hoc SQL against one database or, concurrently, against every database of a
//! group type. Results come back as JSON with de-duplicated column names.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod transport;

pub use config::Config;
pub use db::DatabaseStore;
pub use error::DbError;
