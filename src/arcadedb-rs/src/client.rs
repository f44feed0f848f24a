use crate::session::{Credentials, Session};
use crate::transaction::Transaction;
use crate::transport::{ApiRequest, ApiResponse, Auth, HttpTransport, Method, Transport};
use arcadedb_core::sanitize::check_parameters;
use arcadedb_core::{
    build_where_clause, sanitize_identifier, validate_record_id, ArcadeError, BatchResult,
    BulkInsertReport, Config, Cursor, Document, Params, PropertyType, QueryResult, Result,
    RetryPolicy, Row, Sleeper, TokioSleeper, WhereClause,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Bound a whole operation, retries and backoff waits included.
///
/// When `limit` passes first the operation future is dropped, which cancels
/// the in-flight request or wait.
pub async fn within<T, F>(limit: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!("Operation exceeded {:?}", limit);
            Err(ArcadeError::Timeout { after: limit })
        }
    }
}

#[derive(Deserialize)]
struct SingleResult<T> {
    result: T,
}

/// ArcadeDB REST API client
///
/// Owns one session. Requests go through the retry policy and the
/// whole-operation timeout from the configuration. Dropping the client
/// releases its connection pool; [`Client::close`] also logs out.
pub struct Client {
    config: Arc<Config>,
    session: Session,
    retry: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

pub struct ClientBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    retry: Option<RetryPolicy>,
}

impl ClientBuilder {
    /// Use a custom transport instead of the pooled HTTP client.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a custom source of backoff waits.
    pub fn sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    /// Override the retry policy derived from the configuration.
    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn build(self) -> Result<Client> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::new(&self.config)?),
        };
        let credentials = Credentials::new(self.config.username(), self.config.password());
        let retry = self
            .retry
            .unwrap_or_else(|| RetryPolicy::from_config(&self.config));

        info!(
            "Initialized ArcadeDB client for {}:{}/{}",
            self.config.host(),
            self.config.port(),
            self.config.database()
        );

        Ok(Client {
            config: Arc::new(self.config),
            session: Session::new(transport, credentials),
            retry,
            sleeper: self.sleeper.unwrap_or_else(|| Arc::new(TokioSleeper)),
        })
    }
}

impl Client {
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder {
            config,
            transport: None,
            sleeper: None,
            retry: None,
        }
    }

    /// Create a client over HTTP. No request is sent yet.
    pub fn new(config: Config) -> Result<Self> {
        Self::builder(config).build()
    }

    /// Create a client and check that the server is reachable.
    pub async fn open(config: Config) -> Result<Self> {
        let client = Self::new(config)?;
        client.connect().await?;
        Ok(client)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Reachability check; does not authenticate.
    pub async fn connect(&self) -> Result<()> {
        within(self.config.timeout(), self.session.connect()).await
    }

    /// Log in with the configured credentials. A no-op once authenticated.
    pub async fn authenticate(&self) -> Result<()> {
        within(self.config.timeout(), self.session.token()).await?;
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        self.session.close().await
    }

    /// Run a SQL command with named parameters.
    ///
    /// Every `:name` placeholder in `text` must have an entry in
    /// `parameters`; parameters nobody references are sent anyway.
    pub async fn execute_query(&self, text: &str, parameters: Option<Params>) -> Result<QueryResult> {
        self.command(text, parameters, None).await
    }

    /// [`Client::execute_query`], inside the transaction `session` when set.
    pub(crate) async fn command(
        &self,
        text: &str,
        parameters: Option<Params>,
        session: Option<&str>,
    ) -> Result<QueryResult> {
        check_parameters(text, parameters.as_ref())?;

        let mut payload = json!({
            "language": "sql",
            "command": text,
        });
        if let Some(params) = parameters.filter(|p| !p.is_empty()) {
            payload["parameters"] = Value::Object(params);
        }

        let path = format!("command/{}", self.config.database());
        let response = self
            .call_in(session, Method::Post, &path, Some(payload))
            .await?;
        let result: QueryResult = response.json()?;

        debug!("Query returned {} rows", result.len());
        Ok(result)
    }

    /// Insert one document into `bucket` and return it with its record id.
    pub async fn create_document(&self, bucket: &str, fields: Row) -> Result<Document> {
        let bucket = sanitize_identifier(bucket)?;

        let mut body = fields.clone();
        body.insert("@type".to_string(), Value::String(bucket.to_string()));

        let path = format!("document/{}", self.config.database());
        let response = self.call(Method::Post, &path, Some(Value::Object(body))).await?;
        let created: SingleResult<Value> = response.json()?;

        let document = match created.result {
            // Older servers answer with the bare record id.
            Value::String(rid) => Document {
                rid: rid.parse()?,
                type_name: Some(bucket.to_string()),
                fields,
            },
            Value::Object(row) => Document::from_row(row)?,
            other => {
                return Err(ArcadeError::Query {
                    status: response.status,
                    message: format!("unexpected create result: {}", other),
                    body: response.body,
                })
            }
        };

        debug!("Created document {} in {}", document.rid, bucket);
        Ok(document)
    }

    /// Fetch a document by record id. Malformed ids fail before any request.
    pub async fn get_document(&self, rid: &str) -> Result<Option<Document>> {
        let rid = validate_record_id(rid)?;
        let path = format!("document/{}/{}", self.config.database(), rid.to_path());

        let response = match self.call(Method::Get, &path, None).await {
            Ok(response) => response,
            Err(ArcadeError::Query { status: 404, .. }) => return Ok(None),
            Err(e) => return Err(e),
        };

        let found: SingleResult<Row> = response.json()?;
        Document::from_row(found.result).map(Some)
    }

    /// Insert `records` in batches of the configured size.
    ///
    /// Not atomic: when a batch fails after its retries, the error reports
    /// its 1-based number and the batches already written stay written.
    pub async fn bulk_insert(&self, bucket: &str, records: &[Row]) -> Result<BulkInsertReport> {
        let bucket = sanitize_identifier(bucket)?;
        self.insert_batches(&format!("`{}`", bucket), records, None)
            .await
    }

    /// Insert `records` in batches inside one transaction.
    ///
    /// Either every batch is committed or none is. On failure the
    /// transaction is rolled back and the `BulkInsert` error lists no
    /// completed batches.
    pub async fn bulk_insert_atomic(&self, bucket: &str, records: &[Row]) -> Result<BulkInsertReport> {
        let bucket = sanitize_identifier(bucket)?;
        if records.is_empty() {
            return Ok(BulkInsertReport::default());
        }

        let tx = self.begin_transaction().await?;
        match tx.bulk_insert(bucket, records).await {
            Ok(report) => {
                tx.commit().await?;
                Ok(report)
            }
            Err(err) => {
                if let Err(e) = tx.rollback().await {
                    warn!("Rollback after failed insert into {} failed: {}", bucket, e);
                }
                Err(match err {
                    ArcadeError::BulkInsert { batch, source, .. } => ArcadeError::BulkInsert {
                        batch,
                        completed: Vec::new(),
                        source,
                    },
                    other => other,
                })
            }
        }
    }

    /// Open a server-side transaction.
    pub async fn begin_transaction(&self) -> Result<Transaction<'_>> {
        Transaction::begin(self).await
    }

    /// Batch loop behind the bulk inserts. `target` is a quoted type name.
    pub(crate) async fn insert_batches(
        &self,
        target: &str,
        records: &[Row],
        session: Option<&str>,
    ) -> Result<BulkInsertReport> {
        let sql = format!("INSERT INTO {} CONTENT :records", target);
        let batch_size = self.config.batch_size();
        let total_batches = records.len().div_ceil(batch_size);

        info!(
            "Inserting {} records into {} in {} batches",
            records.len(),
            target,
            total_batches
        );

        let mut report = BulkInsertReport::default();
        for (index, chunk) in records.chunks(batch_size).enumerate() {
            let batch = index + 1;

            let mut params = Params::new();
            params.insert(
                "records".to_string(),
                Value::Array(chunk.iter().cloned().map(Value::Object).collect()),
            );

            match self.command(&sql, Some(params), session).await {
                Ok(result) => {
                    debug!("Batch {}/{} inserted {} records", batch, total_batches, chunk.len());
                    report.batches.push(BatchResult {
                        batch,
                        inserted: chunk.len(),
                        rows: result.rows,
                    });
                }
                Err(e) => {
                    error!("Batch {}/{} into {} failed: {}", batch, total_batches, target, e);
                    return Err(ArcadeError::BulkInsert {
                        batch,
                        completed: report.batches,
                        source: Box::new(e),
                    });
                }
            }
        }

        info!("Inserted {} records into {}", report.total_inserted(), target);
        Ok(report)
    }

    /// Server version and settings.
    pub async fn server_info(&self) -> Result<Value> {
        self.call(Method::Get, "server", None).await?.json()
    }

    pub async fn list_databases(&self) -> Result<Vec<String>> {
        let response = self.call(Method::Get, "databases", None).await?;
        let databases: SingleResult<Vec<String>> = response.json()?;
        debug!("Retrieved {} databases", databases.result.len());
        Ok(databases.result)
    }

    /// Whether the configured database exists on the server.
    pub async fn database_exists(&self) -> Result<bool> {
        let path = format!("exists/{}", self.config.database());
        let response = self.call(Method::Get, &path, None).await?;
        let exists: SingleResult<bool> = response.json()?;
        Ok(exists.result)
    }

    /// Names of all types in the schema.
    pub async fn list_types(&self) -> Result<Vec<String>> {
        let result = self.execute_query("SELECT name FROM schema:types", None).await?;
        Ok(result
            .rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    pub async fn create_document_type(&self, name: &str) -> Result<QueryResult> {
        let name = sanitize_identifier(name)?;
        self.create_type_quoted(&format!("`{}`", name)).await
    }

    pub(crate) async fn create_type_quoted(&self, target: &str) -> Result<QueryResult> {
        self.execute_query(&format!("CREATE DOCUMENT TYPE {} IF NOT EXISTS", target), None)
            .await
    }

    pub async fn create_property(
        &self,
        type_name: &str,
        field: &str,
        property_type: PropertyType,
    ) -> Result<QueryResult> {
        let type_name = sanitize_identifier(type_name)?;
        self.create_property_quoted(&format!("`{}`", type_name), field, property_type)
            .await
    }

    pub(crate) async fn create_property_quoted(
        &self,
        target: &str,
        field: &str,
        property_type: PropertyType,
    ) -> Result<QueryResult> {
        let field = sanitize_identifier(field)?;
        let sql = format!(
            "CREATE PROPERTY {}.`{}` IF NOT EXISTS {}",
            target,
            field,
            property_type.as_sql()
        );
        self.execute_query(&sql, None).await
    }

    pub async fn drop_type(&self, name: &str) -> Result<QueryResult> {
        let name = sanitize_identifier(name)?;
        self.execute_query(&format!("DROP TYPE `{}` IF EXISTS", name), None)
            .await
    }

    /// Number of records in `bucket` matching `conditions`.
    pub async fn count(&self, bucket: &str, conditions: &BTreeMap<String, Value>) -> Result<u64> {
        let bucket = sanitize_identifier(bucket)?;
        let clause = build_where_clause(conditions)?;
        let sql = format!("SELECT count(*) AS count FROM `{}` {}", bucket, clause.sql);

        let result = self
            .execute_query(sql.trim_end(), Some(clause.params))
            .await?;
        Ok(result
            .rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    /// Read one page of `bucket`. The returned cursor is set when the page
    /// came back full and another one may follow.
    pub async fn read_page(
        &self,
        bucket: &str,
        conditions: &BTreeMap<String, Value>,
        cursor: Cursor,
    ) -> Result<QueryResult> {
        let bucket = sanitize_identifier(bucket)?;
        let clause = build_where_clause(conditions)?;
        self.select_page(&format!("`{}`", bucket), &[], &clause, cursor)
            .await
    }

    /// One page of `target` (a quoted type name), projected to `fields`
    /// when any are given.
    pub(crate) async fn select_page(
        &self,
        target: &str,
        fields: &[String],
        clause: &WhereClause,
        cursor: Cursor,
    ) -> Result<QueryResult> {
        let mut sql = String::from("SELECT ");
        if !fields.is_empty() {
            let projection = fields
                .iter()
                .map(|f| sanitize_identifier(f).map(|f| format!("`{}`", f)))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(&projection.join(", "));
            sql.push(' ');
        }
        sql.push_str(&format!("FROM {}", target));
        if !clause.is_empty() {
            sql.push(' ');
            sql.push_str(&clause.sql);
        }
        sql.push_str(&format!(" SKIP {} LIMIT {}", cursor.skip, cursor.limit));

        let mut result = self
            .execute_query(&sql, Some(clause.params.clone()))
            .await?;
        result.cursor = (result.len() as u64 == cursor.limit).then(|| cursor.next());
        Ok(result)
    }

    /// Read every matching record of `bucket`, one page at a time.
    pub async fn read_all(&self, bucket: &str, conditions: &BTreeMap<String, Value>) -> Result<Vec<Row>> {
        let bucket = sanitize_identifier(bucket)?;
        let clause = build_where_clause(conditions)?;
        self.drain_pages(&format!("`{}`", bucket), &[], &clause).await
    }

    pub(crate) async fn drain_pages(
        &self,
        target: &str,
        fields: &[String],
        clause: &WhereClause,
    ) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        let mut cursor = Some(Cursor::first(self.config.page_size()));

        while let Some(current) = cursor {
            let page = self.select_page(target, fields, clause, current).await?;
            cursor = page.cursor;
            rows.extend(page.rows);
        }

        debug!("Read {} rows from {}", rows.len(), target);
        Ok(rows)
    }

    pub(crate) async fn call(&self, method: Method, path: &str, body: Option<Value>) -> Result<ApiResponse> {
        self.call_in(None, method, path, body).await
    }

    /// Send through the retry path, inside the transaction `session` when set.
    pub(crate) async fn call_in(
        &self,
        session: Option<&str>,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<ApiResponse> {
        if self.session.is_closed().await {
            return Err(ArcadeError::connection("session is closed"));
        }

        let body = body.as_ref();
        let operation = self.retry.run(self.sleeper.as_ref(), move |attempt| {
            self.attempt(session, method, path, body, attempt)
        });
        within(self.config.operation_timeout(), operation).await
    }

    /// One attempt. A 401 on a held token triggers one re-authentication
    /// and one resend.
    async fn attempt(
        &self,
        session: Option<&str>,
        method: Method,
        path: &str,
        body: Option<&Value>,
        attempt: u32,
    ) -> Result<ApiResponse> {
        let request = ApiRequest {
            method,
            path: path.to_string(),
            body: body.cloned(),
            auth: Auth::None,
            session_id: session.map(str::to_string),
        };

        let token = self.session.token().await?;
        debug!("{} {} (attempt {})", method, path, attempt + 1);

        let mut response = self
            .session
            .send(request.clone().with_auth(token.bearer()))
            .await?;

        if response.status == 401 {
            let fresh = self.session.refresh(&token).await?;
            response = self.session.send(request.with_auth(fresh.bearer())).await?;
        }

        response.error_for_status()
    }
}
