//! ArcadeDB Client Library
//!
//! Async client for the ArcadeDB HTTP/JSON API with bounded retries,
//! single-flight re-authentication, parameter-safe query helpers,
//! server-side transactions and versioned tables.
//!
//! ```rust,no_run
//! use arcadedb_rs::{Client, Config};
//! use serde_json::json;
//!
//! # async fn example() -> arcadedb_rs::Result<()> {
//! let config = Config::builder()
//!     .host("localhost")
//!     .database("demo")
//!     .credentials("root", "playwithdata")
//!     .build()?;
//!
//! let client = Client::open(config).await?;
//! let params = json!({"min_age": 25}).as_object().cloned();
//! let adults = client
//!     .execute_query("SELECT * FROM Person WHERE age > :min_age", params)
//!     .await?;
//! println!("{} rows", adults.len());
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

mod client;
pub mod session;
mod transaction;
pub mod transport;
mod versioning;

pub use arcadedb_core::{
    build_filter, build_where_clause, sanitize_identifier, validate_record_id, ArcadeError,
    BatchResult, BulkInsertReport, ColumnSpec, Config, ConfigBuilder, Cursor, Document, ErrorKind,
    Params, PropertyType, QueryResult, ReadOptions, Result, RetryPolicy, Rid, Row, Sleeper,
    TableRef, TokioSleeper, VersionedTable, WhereClause, VERSIONS_TYPE,
};
pub use client::{within, Client, ClientBuilder};
pub use session::{Credentials, Session, Token};
pub use transaction::Transaction;
pub use transport::{
    ApiRequest, ApiResponse, Auth, HttpTransport, Method, Transport, SESSION_HEADER,
};
pub use versioning::VersionedInsert;
