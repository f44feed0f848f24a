//! Session lifecycle: reachability, login token, and pooled transport.
//!
//! A session starts unauthenticated. `authenticate` logs in once and keeps
//! the token; every data call borrows it. When the server rejects a token,
//! `refresh` re-authenticates under a mutex so that concurrent callers
//! holding the same stale token cause exactly one login.

use arcadedb_core::{ArcadeError, Result};
use serde::Deserialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::transport::{ApiRequest, ApiResponse, Auth, Transport};

/// Username and password. The password never shows up in `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    fn basic_auth(&self) -> Auth {
        Auth::Basic {
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A login token and the login that produced it.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    generation: u64,
}

impl Token {
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Increases by one with every successful login on the session.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn bearer(&self) -> Auth {
        Auth::Bearer(self.value.clone())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"<redacted>")
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

pub struct Session {
    transport: RwLock<Option<Arc<dyn Transport>>>,
    credentials: Credentials,
    token: RwLock<Option<Token>>,
    login: Mutex<()>,
    generation: AtomicU64,
}

impl Session {
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials) -> Self {
        Self {
            transport: RwLock::new(Some(transport)),
            credentials,
            token: RwLock::new(None),
            login: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    async fn transport(&self) -> Result<Arc<dyn Transport>> {
        self.transport
            .read()
            .await
            .clone()
            .ok_or_else(|| ArcadeError::connection("session is closed"))
    }

    /// Send a request as-is over the session's transport.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.transport().await?.send(request).await
    }

    /// Check that the server answers, without logging in.
    pub async fn connect(&self) -> Result<()> {
        let response = self.send(ApiRequest::get("ready")).await?;
        if response.is_success() {
            info!("Connected to ArcadeDB server");
            Ok(())
        } else {
            warn!("ArcadeDB server not ready: HTTP {}", response.status);
            Err(ArcadeError::connection(format!(
                "server not ready: HTTP {}",
                response.status
            )))
        }
    }

    pub async fn is_authenticated(&self) -> bool {
        self.token.read().await.is_some()
    }

    pub async fn is_closed(&self) -> bool {
        self.transport.read().await.is_none()
    }

    /// Log in with `credentials` unless a token is already held.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Token> {
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }

        let _guard = self.login.lock().await;
        if let Some(token) = self.token.read().await.clone() {
            return Ok(token);
        }
        self.login(credentials).await
    }

    /// Current token, logging in with the session credentials if needed.
    pub async fn token(&self) -> Result<Token> {
        self.authenticate(&self.credentials).await
    }

    /// Replace a token the server rejected.
    ///
    /// If another caller already replaced `stale`, its token is returned
    /// without a second login.
    pub async fn refresh(&self, stale: &Token) -> Result<Token> {
        let _guard = self.login.lock().await;

        if let Some(current) = self.token.read().await.clone() {
            if current.generation > stale.generation {
                debug!("Token already refreshed (generation {})", current.generation);
                return Ok(current);
            }
        }

        debug!("Re-authenticating after rejected token");
        self.token.write().await.take();
        self.login(&self.credentials).await
    }

    /// Caller must hold the login mutex.
    async fn login(&self, credentials: &Credentials) -> Result<Token> {
        let request = ApiRequest::post("login", None).with_auth(credentials.basic_auth());
        let response = self.send(request).await?;

        if !response.is_success() {
            self.token.write().await.take();
            let err = match response.status {
                401 | 403 => ArcadeError::Authentication {
                    status: Some(response.status),
                    message: format!("credentials for '{}' rejected", credentials.username()),
                },
                _ => ArcadeError::from_status(response.status, response.body),
            };
            warn!("Authentication failed: {}", err);
            return Err(err);
        }

        let login: LoginResponse = response.json()?;
        if self.is_closed().await {
            return Err(ArcadeError::connection("session is closed"));
        }
        let token = Token {
            value: login.token,
            generation: self.generation.fetch_add(1, Ordering::SeqCst) + 1,
        };
        *self.token.write().await = Some(token.clone());

        info!(
            "Authenticated as '{}' (generation {})",
            credentials.username(),
            token.generation
        );
        Ok(token)
    }

    /// Transport and token without waiting on either lock. Used for cleanup
    /// from `Drop`, where awaiting is not possible.
    pub(crate) fn detached(&self) -> Option<(Arc<dyn Transport>, Option<Token>)> {
        let transport = self.transport.try_read().ok()?.clone()?;
        let token = self.token.try_read().ok().and_then(|token| token.clone());
        Some((transport, token))
    }

    /// Log out, drop the token and release the transport.
    ///
    /// Calling it again is a no-op. Afterwards every request fails with a
    /// connection error.
    pub async fn close(&self) -> Result<()> {
        // waits for an in-flight login so its token is logged out too
        let _guard = self.login.lock().await;

        let Some(transport) = self.transport.write().await.take() else {
            return Ok(());
        };

        let token = self.token.write().await.take();
        if let Some(token) = token {
            let request = ApiRequest::post("logout", None).with_auth(token.bearer());
            match transport.send(request).await {
                Ok(response) if response.is_success() => debug!("Logged out"),
                Ok(response) => debug!("Logout returned HTTP {}", response.status),
                Err(e) => debug!("Logout failed: {}", e),
            }
        }

        drop(transport);
        info!("Session closed");
        Ok(())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.transport.get_mut().is_some() {
            debug!("Session dropped without close; releasing connection pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("root", "playwithdata");
        let printed = format!("{:?}", creds);
        assert!(printed.contains("root"));
        assert!(!printed.contains("playwithdata"));
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token {
            value: "AU-1234".to_string(),
            generation: 2,
        };
        assert!(!format!("{:?}", token).contains("AU-1234"));
        assert_eq!(token.bearer(), Auth::Bearer("AU-1234".to_string()));
    }
}
