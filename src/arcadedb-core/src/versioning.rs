//! Versioned table names.
//!
//! A versioned table is a document type named `<bucket>#<name>#<version>`.
//! Every stored version is recorded as a row of the `versions` type, so the
//! latest one can be looked up by bucket and name.

use std::fmt;
use std::str::FromStr;

use crate::error::{ArcadeError, Result};
use crate::sanitize::sanitize_identifier;

/// Type holding one row per stored table version.
pub const VERSIONS_TYPE: &str = "versions";

/// One concrete version of a table family.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionedTable {
    pub bucket: String,
    pub name: String,
    pub version: u64,
}

impl VersionedTable {
    pub fn new(bucket: &str, name: &str, version: u64) -> Result<Self> {
        Ok(Self {
            bucket: sanitize_identifier(bucket)?.to_string(),
            name: sanitize_identifier(name)?.to_string(),
            version,
        })
    }

    /// Backtick-quoted type name for SQL text.
    pub fn quoted(&self) -> String {
        format!("`{}`", self)
    }
}

impl fmt::Display for VersionedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}#{}", self.bucket, self.name, self.version)
    }
}

/// A table as callers name it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRef {
    /// `name`: an ordinary type.
    Plain(String),
    /// `bucket#name`: a table family without a version.
    Family { bucket: String, name: String },
    /// `bucket#name#version`.
    Exact(VersionedTable),
}

impl TableRef {
    /// Bucket and name of a versioned reference.
    pub fn family(&self) -> Option<(&str, &str)> {
        match self {
            Self::Plain(_) => None,
            Self::Family { bucket, name } => Some((bucket, name)),
            Self::Exact(table) => Some((&table.bucket, &table.name)),
        }
    }
}

impl FromStr for TableRef {
    type Err = ArcadeError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split('#').collect();
        match parts.as_slice() {
            [name] => Ok(Self::Plain(sanitize_identifier(name)?.to_string())),
            [bucket, name] => Ok(Self::Family {
                bucket: sanitize_identifier(bucket)?.to_string(),
                name: sanitize_identifier(name)?.to_string(),
            }),
            [bucket, name, version] => {
                if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ArcadeError::validation(
                        "table name",
                        format!("'{}' has a non-numeric version", s),
                    ));
                }
                let version = version.parse().map_err(|_| {
                    ArcadeError::validation("table name", format!("'{}' version is out of range", s))
                })?;
                Ok(Self::Exact(VersionedTable::new(bucket, name, version)?))
            }
            _ => Err(ArcadeError::validation(
                "table name",
                format!("'{}' is not name, bucket#name or bucket#name#version", s),
            )),
        }
    }
}

/// Current UTC time in the format stored in `versions.timestamp`.
pub fn version_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}
