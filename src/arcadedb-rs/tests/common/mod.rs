//! In-memory ArcadeDB stand-in for integration tests.

#![allow(dead_code)]

use arcadedb_rs::{ApiRequest, ApiResponse, ArcadeError, Auth, Client, Config, Result, Sleeper, Transport};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type Handler = Box<dyn Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync>;

/// Answers every request with `handler`, after an optional delay, and
/// records what it saw.
pub struct MockTransport {
    handler: Handler,
    latency: Option<Duration>,
    requests: Mutex<Vec<ApiRequest>>,
    logins: AtomicU32,
}

impl MockTransport {
    /// `login` and `logout` are answered automatically with tokens
    /// `token-1`, `token-2`, ...; everything else goes to `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ApiRequest) -> Result<ApiResponse> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            latency: None,
            requests: Mutex::new(Vec::new()),
            logins: AtomicU32::new(0),
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Requests whose path starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path.starts_with(prefix))
            .count()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path.starts_with("command"))
            .map(command_text)
            .collect()
    }

    pub fn bodies(&self, prefix: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path.starts_with(prefix))
            .filter_map(|r| r.body.clone())
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.requests.lock().unwrap().push(request.clone());

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        match request.path.as_str() {
            "login" => match &request.auth {
                Auth::Basic { password, .. } if password == "secret" => {
                    let n = self.logins.fetch_add(1, Ordering::SeqCst) + 1;
                    Ok(ok(json!({"token": format!("token-{}", n), "user": "root"})))
                }
                _ => Ok(ApiResponse::new(401, "")),
            },
            "logout" => Ok(ApiResponse::new(204, "")),
            _ => (self.handler)(&request),
        }
    }
}

/// Records backoff waits instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn waits(&self) -> Vec<Duration> {
        self.waits.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

pub fn ok(body: Value) -> ApiResponse {
    ApiResponse::new(200, body.to_string())
}

pub fn status(code: u16, body: Value) -> ApiResponse {
    ApiResponse::new(code, body.to_string())
}

pub fn reset() -> ArcadeError {
    ArcadeError::connection("connection reset by peer")
}

pub fn bearer(request: &ApiRequest) -> Option<&str> {
    match &request.auth {
        Auth::Bearer(token) => Some(token.as_str()),
        _ => None,
    }
}

/// SQL text of a command request.
pub fn command_text(request: &ApiRequest) -> String {
    request
        .body
        .as_ref()
        .and_then(|b| b["command"].as_str())
        .unwrap_or_default()
        .to_string()
}

/// Config with fast, deterministic retries.
pub fn test_config(max_retries: u32) -> Config {
    Config::builder()
        .database("testdb")
        .credentials("root", "secret")
        .max_retries(max_retries)
        .retry_delays(Duration::from_millis(10), Duration::from_millis(1000))
        .retry_jitter(false)
        .batch_size(100)
        .build()
        .unwrap()
}

pub fn client_with(config: Config, transport: Arc<MockTransport>, sleeper: Arc<RecordingSleeper>) -> Client {
    Client::builder(config)
        .transport(transport)
        .sleeper(sleeper)
        .build()
        .unwrap()
}
