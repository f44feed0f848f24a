//! Input checks applied before anything reaches the network.
//!
//! Values always travel as bound parameters. These helpers cover the
//! positions parameters cannot protect: record ids in URLs and identifiers
//! spliced into SQL text.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::{ArcadeError, Result};
use crate::models::{Params, Rid};

/// Parse and validate a record id (`#<bucket>:<position>`).
pub fn validate_record_id(id: &str) -> Result<Rid> {
    id.parse()
}

/// Accept a type, bucket or column name made only of ASCII letters, digits
/// and underscores, returned unchanged.
pub fn sanitize_identifier(name: &str) -> Result<&str> {
    if name.is_empty() {
        return Err(ArcadeError::validation("identifier", "identifier is empty"));
    }

    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_'))
    {
        return Err(ArcadeError::validation(
            "identifier",
            format!("'{}' contains forbidden character {:?}", name, c),
        ));
    }

    Ok(name)
}

/// A rendered `WHERE` clause and the parameters it binds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhereClause {
    pub sql: String,
    pub params: Params,
}

impl WhereClause {
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Render `column = :column` conditions joined by `AND`, in column order.
///
/// `null` renders as `column IS NULL` and binds nothing. An empty map gives
/// an empty clause.
pub fn build_where_clause(conditions: &BTreeMap<String, Value>) -> Result<WhereClause> {
    build_filter(conditions, &[])
}

/// Like [`build_where_clause`], followed by a `column IS NOT NULL` test for
/// each of `not_null`.
pub fn build_filter(conditions: &BTreeMap<String, Value>, not_null: &[String]) -> Result<WhereClause> {
    let mut clauses = Vec::with_capacity(conditions.len() + not_null.len());
    let mut params = Params::new();

    for (column, value) in conditions {
        let column = sanitize_identifier(column)?;
        if value.is_null() {
            clauses.push(format!("{} IS NULL", column));
        } else {
            clauses.push(format!("{} = :{}", column, column));
            params.insert(column.to_string(), value.clone());
        }
    }

    for column in not_null {
        clauses.push(format!("{} IS NOT NULL", sanitize_identifier(column)?));
    }

    if clauses.is_empty() {
        return Ok(WhereClause::default());
    }

    Ok(WhereClause {
        sql: format!("WHERE {}", clauses.join(" AND ")),
        params,
    })
}

/// Named `:placeholders` in query text, in order of first appearance.
///
/// Quoted strings and backtick identifiers are skipped, and a colon that
/// follows an identifier character (`schema:types`, `#12:3`) is not a
/// placeholder.
pub fn placeholders(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut found: Vec<&str> = Vec::new();
    let mut quote: Option<u8> = None;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match b {
            b'\'' | b'"' | b'`' => quote = Some(b),
            b':' => {
                let preceded = i > 0 && is_ident_byte(bytes[i - 1]);
                let start = i + 1;
                if !preceded && start < bytes.len() && is_ident_start(bytes[start]) {
                    let mut end = start;
                    while end < bytes.len() && is_ident_byte(bytes[end]) {
                        end += 1;
                    }
                    let name = &text[start..end];
                    if !found.contains(&name) {
                        found.push(name);
                    }
                    i = end;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }

    found
}

/// Every placeholder in `text` must have a parameter. Extra parameters are
/// allowed.
pub fn check_parameters(text: &str, params: Option<&Params>) -> Result<()> {
    let missing: Vec<&str> = placeholders(text)
        .into_iter()
        .filter(|name| params.map_or(true, |p| !p.contains_key(*name)))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(ArcadeError::validation(
            "query parameters",
            format!("no value bound for :{}", missing.join(", :")),
        ))
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
