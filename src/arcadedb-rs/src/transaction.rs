//! Server-side transactions.
//!
//! `POST begin/<db>` answers with an `arcadedb-session-id` header. Requests
//! that carry the header run inside that transaction until it is committed
//! or rolled back.

use arcadedb_core::{
    sanitize_identifier, ArcadeError, BulkInsertReport, Params, QueryResult, Result, Row,
};
use tracing::{debug, info, warn};

use crate::client::Client;
use crate::transport::{ApiRequest, Method};

/// An open transaction, borrowed from its [`Client`].
///
/// Dropping it before [`Transaction::commit`] or [`Transaction::rollback`]
/// finishes sends a rollback in the background.
pub struct Transaction<'a> {
    client: &'a Client,
    id: String,
    finished: bool,
}

impl<'a> Transaction<'a> {
    pub(crate) async fn begin(client: &'a Client) -> Result<Transaction<'a>> {
        let path = format!("begin/{}", client.config().database());
        let response = client.call(Method::Post, &path, None).await?;

        let Some(id) = response.session_id.clone() else {
            return Err(ArcadeError::Query {
                status: response.status,
                message: "begin returned no transaction session id".to_string(),
                body: response.body,
            });
        };

        debug!("Transaction {} started", id);
        Ok(Self {
            client,
            id,
            finished: false,
        })
    }

    /// Session id the server assigned to this transaction.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub async fn execute_query(&self, text: &str, parameters: Option<Params>) -> Result<QueryResult> {
        self.client.command(text, parameters, Some(&self.id)).await
    }

    pub async fn bulk_insert(&self, bucket: &str, records: &[Row]) -> Result<BulkInsertReport> {
        let bucket = sanitize_identifier(bucket)?;
        self.client
            .insert_batches(&format!("`{}`", bucket), records, Some(&self.id))
            .await
    }

    /// Commit. A failed commit is followed by a best-effort rollback.
    pub async fn commit(mut self) -> Result<()> {
        let result = self.end("commit").await;
        self.finished = true;

        match result {
            Ok(()) => {
                info!("Transaction {} committed", self.id);
                Ok(())
            }
            Err(e) => {
                warn!("Commit of transaction {} failed: {}", self.id, e);
                if let Err(rollback) = self.end("rollback").await {
                    warn!("Rollback of transaction {} failed: {}", self.id, rollback);
                }
                Err(e)
            }
        }
    }

    pub async fn rollback(mut self) -> Result<()> {
        let result = self.end("rollback").await;
        self.finished = true;
        result?;
        debug!("Transaction {} rolled back", self.id);
        Ok(())
    }

    async fn end(&self, action: &str) -> Result<()> {
        let path = format!("{}/{}", action, self.client.config().database());
        self.client
            .call_in(Some(&self.id), Method::Post, &path, None)
            .await?;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        warn!("Transaction {} dropped while open; rolling back", self.id);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime left to roll back transaction {}", self.id);
            return;
        };
        let Some((transport, token)) = self.client.session().detached() else {
            return;
        };

        let path = format!("rollback/{}", self.client.config().database());
        let mut request = ApiRequest::post(path, None).with_session(self.id.clone());
        if let Some(token) = token {
            request = request.with_auth(token.bearer());
        }

        let id = self.id.clone();
        runtime.spawn(async move {
            match transport.send(request).await {
                Ok(response) if response.is_success() => debug!("Transaction {} rolled back", id),
                Ok(response) => warn!("Rollback of transaction {} returned HTTP {}", id, response.status),
                Err(e) => warn!("Rollback of transaction {} failed: {}", id, e),
            }
        });
    }
}
