//! ArcadeDB Connector Core
//!
//! Network-free building blocks shared by the client crate:
//! - Validated connection configuration
//! - Error taxonomy
//! - Identifier and record id sanitization
//! - Retry policy with exponential backoff
//! - Result and document models
//! - Versioned table names

pub mod config;
pub mod error;
pub mod models;
pub mod retry;
pub mod sanitize;
pub mod versioning;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder};
pub use error::{ArcadeError, ErrorKind, Result};
pub use models::*;
pub use retry::{RetryPolicy, Sleeper, TokioSleeper};
pub use sanitize::{
    build_filter, build_where_clause, sanitize_identifier, validate_record_id, WhereClause,
};
pub use versioning::{TableRef, VersionedTable, VERSIONS_TYPE};
