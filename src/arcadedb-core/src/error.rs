//! Error taxonomy shared by every layer of the connector.
//!
//! Callers match on [`ArcadeError::kind`] (or on the variant directly) rather
//! than on a hierarchy of error types. Variants carry the context the server
//! gave us: status code, extracted message and the raw body.

use std::time::Duration;

use serde_json::Value;

use crate::models::BatchResult;

/// Flat tag for an [`ArcadeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Authentication,
    Query,
    Timeout,
    Configuration,
    Validation,
    BulkInsert,
}

#[derive(Debug, thiserror::Error)]
pub enum ArcadeError {
    /// Server unreachable, connection reset, or the session was closed.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Credentials rejected by the server.
    #[error("Authentication failed: {message}")]
    Authentication { status: Option<u16>, message: String },

    /// Malformed query, server-side failure, or an unparseable response.
    #[error("Query failed with status {status}: {message}")]
    Query {
        status: u16,
        message: String,
        body: String,
    },

    /// A request or a whole operation ran past its deadline.
    #[error("Operation timed out after {after:?}")]
    Timeout { after: Duration },

    /// Invalid or missing settings, raised before any network activity.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Untrusted input rejected locally.
    #[error("Invalid {what}: {message}")]
    Validation { what: &'static str, message: String },

    /// A bulk insert batch failed after exhausting its retries. Batches in
    /// `completed` were already written and are not rolled back. A
    /// transactional insert rolls everything back and leaves it empty.
    #[error("Bulk insert failed at batch {batch} after {} completed batches: {source}", completed.len())]
    BulkInsert {
        batch: usize,
        completed: Vec<BatchResult>,
        #[source]
        source: Box<ArcadeError>,
    },
}

pub type Result<T> = std::result::Result<T, ArcadeError>;

impl ArcadeError {
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    pub fn validation(what: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            what,
            message: message.into(),
        }
    }

    /// Build an error from a non-success HTTP response.
    pub fn from_status(status: u16, body: String) -> Self {
        let message = extract_message(&body).unwrap_or_else(|| format!("HTTP {}", status));
        match status {
            401 | 403 => Self::Authentication {
                status: Some(status),
                message,
            },
            _ => Self::Query {
                status,
                message,
                body,
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Authentication { .. } => ErrorKind::Authentication,
            Self::Query { .. } => ErrorKind::Query,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::BulkInsert { .. } => ErrorKind::BulkInsert,
        }
    }

    /// HTTP status attached to the error, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Authentication { status, .. } => *status,
            Self::Query { status, .. } => Some(*status),
            Self::BulkInsert { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Whether a retry can reasonably be expected to succeed.
    ///
    /// Network failures, per-request timeouts and 5xx responses are
    /// transient. Everything else, including every 4xx, is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::Query { status, .. } => (500..600).contains(status),
            _ => false,
        }
    }
}

/// Pull a human-readable message out of an ArcadeDB error body.
pub fn extract_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["error", "exception", "detail", "message"]
        .iter()
        .find_map(|key| value.get(key))
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
}
