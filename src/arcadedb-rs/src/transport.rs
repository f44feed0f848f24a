//! HTTP boundary of the client.
//!
//! Everything above this module speaks [`ApiRequest`] / [`ApiResponse`]; the
//! [`Transport`] trait is the one place a real network is touched, which lets
//! tests swap in an in-memory server.

use arcadedb_core::{ArcadeError, Config, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Header carrying the server-side transaction a request belongs to.
pub const SESSION_HEADER: &str = "arcadedb-session-id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// How a request identifies itself to the server.
#[derive(Clone, PartialEq, Eq)]
pub enum Auth {
    None,
    Basic { username: String, password: String },
    Bearer(String),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Basic { username, .. } => write!(f, "Basic({}, <redacted>)", username),
            Auth::Bearer(_) => write!(f, "Bearer(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below `/api/v1/`, without a leading slash.
    pub path: String,
    pub body: Option<Value>,
    pub auth: Auth,
    /// Transaction id sent as [`SESSION_HEADER`].
    pub session_id: Option<String>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            auth: Auth::None,
            session_id: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body,
            auth: Auth::None,
            session_id: None,
        }
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
    /// [`SESSION_HEADER`] value, set when the server opened a transaction.
    pub session_id: Option<String>,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            session_id: None,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body. A body that does not fit `T` becomes a query error
    /// carrying the raw status and body.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| ArcadeError::Query {
            status: self.status,
            message: format!("malformed response: {}", e),
            body: self.body.clone(),
        })
    }

    /// Non-success responses become the matching [`ArcadeError`].
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ArcadeError::from_status(self.status, self.body))
        }
    }
}

/// Sends one request and returns whatever the server answered.
///
/// Implementations return `Err` only when no response was received
/// (unreachable, reset, timed out). HTTP error statuses are `Ok`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse>;
}

/// [`Transport`] over a pooled `reqwest` client.
pub struct HttpTransport {
    api_url: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(config.pool_max_idle_per_host())
            .default_headers(headers)
            .user_agent(concat!("arcadedb-rs/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ArcadeError::Configuration(format!("cannot build HTTP client: {}", e)))?;

        Ok(Self {
            api_url: config.api_url(),
            client,
            timeout: config.timeout(),
        })
    }

    fn map_error(&self, url: &str, err: reqwest::Error) -> ArcadeError {
        if err.is_timeout() {
            ArcadeError::Timeout {
                after: self.timeout,
            }
        } else {
            ArcadeError::connection(format!("request to {} failed: {}", url, err))
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let url = format!("{}/{}", self.api_url, request.path);
        tracing::debug!("{} {}", request.method, url);

        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };

        builder = match &request.auth {
            Auth::None => builder,
            Auth::Basic { username, password } => builder.basic_auth(username, Some(password)),
            Auth::Bearer(token) => builder.bearer_auth(token),
        };

        if let Some(session_id) = &request.session_id {
            builder = builder.header(SESSION_HEADER, session_id);
        }

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| self.map_error(&url, e))?;
        let status = response.status().as_u16();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|e| self.map_error(&url, e))?;

        tracing::debug!("{} {} -> {}", request.method, url, status);
        Ok(ApiResponse {
            status,
            body,
            session_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcadedb_core::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_auth_debug_is_redacted() {
        let basic = Auth::Basic {
            username: "root".to_string(),
            password: "hunter2".to_string(),
        };
        let bearer = Auth::Bearer("AU-secret".to_string());

        assert!(!format!("{:?}", basic).contains("hunter2"));
        assert!(format!("{:?}", basic).contains("root"));
        assert!(!format!("{:?}", bearer).contains("AU-secret"));
    }

    #[test]
    fn test_response_json_error_keeps_body() {
        let response = ApiResponse::new(200, "<html>proxy error</html>");
        let err = response.json::<Value>().unwrap_err();

        match err {
            ArcadeError::Query { status, body, .. } => {
                assert_eq!(status, 200);
                assert_eq!(body, "<html>proxy error</html>");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_session_id_travels_on_request_and_response() {
        let request = ApiRequest::post("commit/db", None).with_session("AS-1");
        assert_eq!(request.session_id.as_deref(), Some("AS-1"));
        assert!(ApiRequest::get("ready").session_id.is_none());

        let response = ApiResponse::new(204, "").with_session_id("AS-1");
        assert_eq!(response.session_id.as_deref(), Some("AS-1"));
    }

    #[test]
    fn test_error_for_status() {
        assert!(ApiResponse::new(204, "").error_for_status().is_ok());

        let err = ApiResponse::new(500, json!({"error": "boom"}).to_string())
            .error_for_status()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Query);
        assert!(err.is_transient());
    }

    #[test]
    fn test_http_transport_builds_from_config() {
        let config = Config::builder()
            .database("db")
            .credentials("root", "pw")
            .use_ssl(true)
            .build()
            .unwrap();
        let transport = HttpTransport::new(&config).unwrap();
        assert_eq!(transport.api_url, "https://localhost:2480/api/v1");
        assert_eq!(transport.timeout, Duration::from_secs(30));
    }
}
