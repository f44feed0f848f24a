//! Versioned tables on top of [`Client`].
//!
//! Loading `bucket#name` creates the next `bucket#name#<n>` type, declares
//! its columns, records the version in `versions` and inserts the rows.
//! Reads resolve a family to its newest version.

use arcadedb_core::versioning::version_timestamp;
use arcadedb_core::{
    build_filter, sanitize_identifier, ArcadeError, BulkInsertReport, ColumnSpec, Params,
    QueryResult, ReadOptions, Result, Row, TableRef, VersionedTable, VERSIONS_TYPE,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::client::Client;

/// Where a versioned load went and what it wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedInsert {
    /// Type the rows were written to.
    pub table: String,
    pub report: BulkInsertReport,
}

fn family_params(bucket: &str, name: &str) -> Option<Params> {
    json!({"classname": name, "bucket": bucket}).as_object().cloned()
}

impl Client {
    /// Highest recorded version of `bucket#name`, 0 when none.
    async fn last_version(&self, bucket: &str, name: &str) -> Result<u64> {
        let sql = format!(
            "SELECT max(version) AS lastversion FROM `{}` WHERE classname = :classname AND `bucket` = :bucket",
            VERSIONS_TYPE
        );
        let result = self.execute_query(&sql, family_params(bucket, name)).await?;
        Ok(result
            .rows
            .first()
            .and_then(|row| row.get("lastversion"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    /// Version number the next load of `bucket#name` gets, and whether an
    /// earlier version exists.
    pub async fn next_version(&self, bucket: &str, name: &str) -> Result<(u64, bool)> {
        let bucket = sanitize_identifier(bucket)?;
        let name = sanitize_identifier(name)?;
        let last = self.last_version(bucket, name).await?;
        debug!("Last version of {}#{} is {}", bucket, name, last);
        Ok((last + 1, last > 0))
    }

    /// Resolve `table` to the type holding its newest version.
    ///
    /// Plain names come back unchanged. `bucket#name` and
    /// `bucket#name#<n>` resolve to `bucket#name#<latest>`, with version 0
    /// when nothing was recorded yet.
    pub async fn latest_table_name(&self, table: &str) -> Result<String> {
        let table: TableRef = table.parse()?;
        match table.family() {
            None => Ok(table_type_name(&table)),
            Some((bucket, name)) => {
                let version = self.last_version(bucket, name).await?;
                Ok(VersionedTable::new(bucket, name, version)?.to_string())
            }
        }
    }

    /// Record `table` in `versions` with the current time.
    pub async fn save_version(&self, table: &VersionedTable) -> Result<QueryResult> {
        let sql = format!(
            "INSERT INTO `{}` SET classname = :classname, timestamp = :timestamp, version = :version, `bucket` = :bucket",
            VERSIONS_TYPE
        );
        let params = json!({
            "classname": table.name,
            "timestamp": version_timestamp(),
            "version": table.version,
            "bucket": table.bucket,
        });

        let result = self.execute_query(&sql, params.as_object().cloned()).await?;
        debug!("Recorded version {}", table);
        Ok(result)
    }

    /// Set `field` to `value` on every record of `type_name`.
    pub async fn update_counter(&self, type_name: &str, field: &str, value: Value) -> Result<QueryResult> {
        let type_name = sanitize_identifier(type_name)?;
        let field = sanitize_identifier(field)?;
        let mut params = Params::new();
        params.insert("value".to_string(), value);

        self.execute_query(
            &format!("UPDATE `{}` SET `{}` = :value", type_name, field),
            Some(params),
        )
        .await
    }

    /// Create a typed table from `columns` and load `records` into it.
    ///
    /// `bucket#name` (or `bucket#name#<n>`) creates the next version and
    /// records it in `versions`. A plain name is dropped and recreated.
    /// Only the declared columns are written; a missing value is stored as
    /// null.
    pub async fn insert_versioned(
        &self,
        table: &str,
        records: &[Row],
        columns: &[ColumnSpec],
    ) -> Result<VersionedInsert> {
        if columns.is_empty() {
            return Err(ArcadeError::validation("columns", "at least one column is required"));
        }
        for column in columns {
            sanitize_identifier(&column.name)?;
        }

        let (target, version) = match table.parse::<TableRef>()? {
            TableRef::Plain(name) => {
                self.drop_type(&name).await?;
                (name, None)
            }
            family => {
                let (bucket, name) = family
                    .family()
                    .ok_or_else(|| ArcadeError::validation("table name", "missing table family"))?;
                let (next, _) = self.next_version(bucket, name).await?;
                let versioned = VersionedTable::new(bucket, name, next)?;
                (versioned.to_string(), Some(versioned))
            }
        };
        let quoted = format!("`{}`", target);

        self.create_type_quoted(&quoted).await?;
        for column in columns {
            self.create_property_quoted(&quoted, &column.name, column.property_type)
                .await?;
        }
        info!("Created {} with {} columns", target, columns.len());

        if records.is_empty() {
            warn!("No records to insert into {}", target);
            return Ok(VersionedInsert {
                table: target,
                report: BulkInsertReport::default(),
            });
        }

        if let Some(versioned) = &version {
            self.save_version(versioned).await?;
        }

        let projected: Vec<Row> = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| (c.name.clone(), record.get(&c.name).cloned().unwrap_or(Value::Null)))
                    .collect()
            })
            .collect();

        let report = self.insert_batches(&quoted, &projected, None).await?;
        Ok(VersionedInsert {
            table: target,
            report,
        })
    }

    /// Read every record of `table` matching `options`.
    ///
    /// With `versioning`, a table family resolves to its newest version;
    /// without it, a family must name its version. Record metadata
    /// (`@rid`, `@type`, `@cat`) is stripped from the rows.
    pub async fn read_data(&self, table: &str, options: &ReadOptions, versioning: bool) -> Result<Vec<Row>> {
        let target = if versioning {
            self.latest_table_name(table).await?
        } else {
            match table.parse::<TableRef>()? {
                TableRef::Family { bucket, name } => {
                    return Err(ArcadeError::validation(
                        "table name",
                        format!("{}#{} needs a version when versioning is off", bucket, name),
                    ))
                }
                other => table_type_name(&other),
            }
        };

        let clause = build_filter(&options.conditions, &options.not_null)?;
        let mut rows = self
            .drain_pages(&format!("`{}`", target), &options.fields, &clause)
            .await?;

        for row in &mut rows {
            for meta in ["@rid", "@type", "@cat"] {
                row.remove(meta);
            }
        }

        if rows.is_empty() {
            warn!("No records found in {}", target);
        }
        Ok(rows)
    }
}

/// Type name of a plain or exact reference.
fn table_type_name(table: &TableRef) -> String {
    match table {
        TableRef::Plain(name) => name.clone(),
        TableRef::Family { bucket, name } => format!("{}#{}", bucket, name),
        TableRef::Exact(versioned) => versioned.to_string(),
    }
}
