use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{ArcadeError, Result};

/// One row or document as returned by the server.
pub type Row = Map<String, Value>;

/// Named query parameters, sent alongside the query text.
pub type Params = Map<String, Value>;

/// Record id of the form `#<bucket>:<position>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rid {
    pub bucket: u64,
    pub position: u64,
}

impl Rid {
    pub fn new(bucket: u64, position: u64) -> Self {
        Self { bucket, position }
    }

    /// Path segment form used by the document endpoint (no leading `#`).
    pub fn to_path(&self) -> String {
        format!("{}:{}", self.bucket, self.position)
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.bucket, self.position)
    }
}

impl FromStr for Rid {
    type Err = ArcadeError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            ArcadeError::validation(
                "record id",
                format!("'{}' does not match #<bucket>:<position>", s),
            )
        };

        let rest = s.strip_prefix('#').ok_or_else(invalid)?;
        let (bucket, position) = rest.split_once(':').ok_or_else(invalid)?;

        let parse = |part: &str| -> Result<u64> {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        Ok(Self {
            bucket: parse(bucket)?,
            position: parse(position)?,
        })
    }
}

impl Serialize for Rid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Rid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Position of the next page in a paginated read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cursor {
    pub skip: u64,
    pub limit: u64,
}

impl Cursor {
    pub fn first(limit: u64) -> Self {
        Self { skip: 0, limit }
    }

    pub fn next(&self) -> Self {
        Self {
            skip: self.skip + self.limit,
            limit: self.limit,
        }
    }
}

/// Rows returned by a command, in server order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    #[serde(rename = "result")]
    pub rows: Vec<Row>,
    /// Set by paginated reads when another page may follow.
    #[serde(skip)]
    pub cursor: Option<Cursor>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// A stored record with its server-assigned id.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub rid: Rid,
    pub type_name: Option<String>,
    pub fields: Row,
}

impl Document {
    /// Split the `@rid` / `@type` metadata out of a server row.
    ///
    /// Other `@`-prefixed metadata (`@cat`, `@out`, ...) is dropped.
    pub fn from_row(mut row: Row) -> Result<Self> {
        let rid = match row.remove("@rid") {
            Some(Value::String(s)) => s.parse()?,
            _ => {
                return Err(ArcadeError::validation(
                    "document",
                    "server row has no @rid",
                ))
            }
        };
        let type_name = match row.remove("@type") {
            Some(Value::String(s)) => Some(s),
            _ => None,
        };
        row.retain(|key, _| !key.starts_with('@'));

        Ok(Self {
            rid,
            type_name,
            fields: row,
        })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }
}

/// Outcome of one bulk insert batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    /// 1-based batch number.
    pub batch: usize,
    pub inserted: usize,
    pub rows: Vec<Row>,
}

/// Accumulated outcome of a bulk insert that completed every batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkInsertReport {
    pub batches: Vec<BatchResult>,
}

impl BulkInsertReport {
    pub fn total_inserted(&self) -> usize {
        self.batches.iter().map(|b| b.inserted).sum()
    }
}

/// Column types accepted by `CREATE PROPERTY`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PropertyType {
    Boolean,
    Integer,
    Short,
    Long,
    Float,
    Double,
    Datetime,
    #[default]
    String,
    Binary,
    Embedded,
    List,
    Map,
    Link,
    Byte,
    Date,
    Decimal,
}

impl PropertyType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Short => "SHORT",
            Self::Long => "LONG",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::Datetime => "DATETIME",
            Self::String => "STRING",
            Self::Binary => "BINARY",
            Self::Embedded => "EMBEDDED",
            Self::List => "LIST",
            Self::Map => "MAP",
            Self::Link => "LINK",
            Self::Byte => "BYTE",
            Self::Date => "DATE",
            Self::Decimal => "DECIMAL",
        }
    }
}

/// A typed column of a table created from column declarations.
///
/// Reads the `{"name": .., "type": ..}` entries of a column file; other keys
/// are ignored. `type` defaults to `STRING`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub property_type: PropertyType,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, property_type: PropertyType) -> Self {
        Self {
            name: name.into(),
            property_type,
        }
    }
}

/// Projection and filters for a full-table read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadOptions {
    /// Columns to return. Empty returns whole records.
    pub fields: Vec<String>,
    /// `column = value` tests; `null` tests `IS NULL`.
    pub conditions: BTreeMap<String, Value>,
    /// Columns that must not be null.
    pub not_null: Vec<String>,
}

impl ReadOptions {
    pub fn select(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn where_eq(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.insert(column.into(), value.into());
        self
    }

    pub fn where_not_null(mut self, column: impl Into<String>) -> Self {
        self.not_null.push(column.into());
        self
    }
}
