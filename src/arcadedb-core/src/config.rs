use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::error::{ArcadeError, Result};

/// Validated, immutable connection settings.
///
/// Built through [`ConfigBuilder`], [`Config::load`] or [`Config::from_env`];
/// every path runs the same validation before a client can use it.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    host: String,
    port: u16,
    database: String,
    username: String,
    password: String,
    use_ssl: bool,
    timeout: Duration,
    max_retries: u32,
    retry_base_delay: Duration,
    retry_max_delay: Duration,
    retry_jitter: bool,
    operation_timeout: Duration,
    batch_size: usize,
    page_size: u64,
    pool_max_idle_per_host: usize,
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load settings from a JSON file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ArcadeError::Configuration(format!("cannot read {}: {}", path, e))
        })?;
        let builder: ConfigBuilder = serde_json::from_str(&contents).map_err(|e| {
            ArcadeError::Configuration(format!("cannot parse {}: {}", path, e))
        })?;
        builder.build()
    }

    /// Read `ARCADEDB_*` variables, after loading `.env` if one exists.
    ///
    /// `ARCADEDB_HOST`, `ARCADEDB_NAME`, `ARCADEDB_USER` and `ARCADEDB_PASS`
    /// are required.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Config::from_env`], loading the given env file first.
    pub fn from_env_file(path: &str) -> Result<Self> {
        dotenvy::from_path(path).map_err(|e| {
            ArcadeError::Configuration(format!("cannot load {}: {}", path, e))
        })?;
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let missing: Vec<&str> = ["ARCADEDB_HOST", "ARCADEDB_NAME", "ARCADEDB_USER", "ARCADEDB_PASS"]
            .into_iter()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ArcadeError::Configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let mut builder = ConfigBuilder::default();
        builder.host = get("ARCADEDB_HOST");
        builder.database = get("ARCADEDB_NAME");
        builder.username = get("ARCADEDB_USER");
        builder.password = get("ARCADEDB_PASS");

        if let Some(v) = get("ARCADEDB_PORT") {
            builder.port = parse_number("ARCADEDB_PORT", &v)?;
        }
        if let Some(v) = get("ARCADEDB_USE_SSL") {
            builder.use_ssl = matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on");
        }
        if let Some(v) = get("ARCADEDB_TIMEOUT") {
            builder.timeout_secs = parse_number("ARCADEDB_TIMEOUT", &v)?;
        }
        if let Some(v) = get("ARCADEDB_MAX_RETRIES") {
            builder.max_retries = parse_number("ARCADEDB_MAX_RETRIES", &v)?;
        }

        builder.build()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Never logged.
    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn use_ssl(&self) -> bool {
        self.use_ssl
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_base_delay(&self) -> Duration {
        self.retry_base_delay
    }

    pub fn retry_max_delay(&self) -> Duration {
        self.retry_max_delay
    }

    pub fn retry_jitter(&self) -> bool {
        self.retry_jitter
    }

    /// Upper bound on a whole operation, retries and backoff included.
    pub fn operation_timeout(&self) -> Duration {
        self.operation_timeout
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    pub fn pool_max_idle_per_host(&self) -> usize {
        self.pool_max_idle_per_host
    }

    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    pub fn api_url(&self) -> String {
        format!("{}/api/v1", self.base_url())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("use_ssl", &self.use_ssl)
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("retry_max_delay", &self.retry_max_delay)
            .field("retry_jitter", &self.retry_jitter)
            .field("operation_timeout", &self.operation_timeout)
            .field("batch_size", &self.batch_size)
            .field("page_size", &self.page_size)
            .finish()
    }
}

/// Unvalidated settings. Also the JSON file format read by [`Config::load`].
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct ConfigBuilder {
    host: Option<String>,
    port: u16,
    database: Option<String>,
    username: Option<String>,
    password: Option<String>,
    use_ssl: bool,
    timeout_secs: u64,
    max_retries: u32,
    retry_base_delay_ms: u64,
    retry_max_delay_ms: u64,
    retry_jitter: bool,
    operation_timeout_secs: Option<u64>,
    batch_size: usize,
    page_size: u64,
    pool_max_idle_per_host: usize,
}

impl fmt::Debug for ConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("use_ssl", &self.use_ssl)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_base_delay_ms", &self.retry_base_delay_ms)
            .field("retry_max_delay_ms", &self.retry_max_delay_ms)
            .field("retry_jitter", &self.retry_jitter)
            .field("operation_timeout_secs", &self.operation_timeout_secs)
            .field("batch_size", &self.batch_size)
            .field("page_size", &self.page_size)
            .field("pool_max_idle_per_host", &self.pool_max_idle_per_host)
            .finish()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self {
            host: Some("localhost".to_string()),
            port: 2480,
            database: None,
            username: None,
            password: None,
            use_ssl: false,
            timeout_secs: 30,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 30_000,
            retry_jitter: true,
            operation_timeout_secs: None,
            batch_size: 100,
            page_size: 1000,
            pool_max_idle_per_host: 16,
        }
    }
}

impl ConfigBuilder {
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn use_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay_ms = base.as_millis() as u64;
        self.retry_max_delay_ms = max.as_millis() as u64;
        self
    }

    pub fn retry_jitter(mut self, jitter: bool) -> Self {
        self.retry_jitter = jitter;
        self
    }

    pub fn operation_timeout_secs(mut self, secs: u64) -> Self {
        self.operation_timeout_secs = Some(secs);
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn page_size(mut self, size: u64) -> Self {
        self.page_size = size;
        self
    }

    pub fn pool_max_idle_per_host(mut self, idle: usize) -> Self {
        self.pool_max_idle_per_host = idle;
        self
    }

    pub fn build(self) -> Result<Config> {
        let host = required("host", self.host)?;
        let database = required("database", self.database)?;
        let username = required("username", self.username)?;
        let password = required("password", self.password)?;

        if host.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(ArcadeError::Configuration(format!(
                "host '{}' must be a bare host name",
                host
            )));
        }
        if self.port == 0 {
            return Err(ArcadeError::Configuration("port must be between 1 and 65535".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ArcadeError::Configuration("timeout must be at least 1 second".to_string()));
        }
        if self.batch_size == 0 || self.page_size == 0 {
            return Err(ArcadeError::Configuration(
                "batch_size and page_size must be positive".to_string(),
            ));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(ArcadeError::Configuration(
                "retry_max_delay_ms must not be below retry_base_delay_ms".to_string(),
            ));
        }
        if self.operation_timeout_secs == Some(0) {
            return Err(ArcadeError::Configuration(
                "operation timeout must be at least 1 second".to_string(),
            ));
        }

        let timeout = Duration::from_secs(self.timeout_secs);
        let retry_max_delay = Duration::from_millis(self.retry_max_delay_ms);
        // Default: every attempt may use its full timeout plus the worst-case wait between them.
        let operation_timeout = match self.operation_timeout_secs {
            Some(secs) => Duration::from_secs(secs),
            None => {
                let attempts = self.max_retries.saturating_add(1);
                timeout
                    .saturating_mul(attempts)
                    .saturating_add(retry_max_delay.saturating_mul(self.max_retries))
            }
        };

        Ok(Config {
            host,
            port: self.port,
            database,
            username,
            password,
            use_ssl: self.use_ssl,
            timeout,
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            retry_max_delay,
            retry_jitter: self.retry_jitter,
            operation_timeout,
            batch_size: self.batch_size,
            page_size: self.page_size,
            pool_max_idle_per_host: self.pool_max_idle_per_host,
        })
    }
}

fn required(field: &str, value: Option<String>) -> Result<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ArcadeError::Configuration(format!("{} is required", field))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        ArcadeError::Configuration(format!("invalid integer value for {}: {}", key, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::collections::HashMap;

    fn base() -> ConfigBuilder {
        Config::builder()
            .database("testdb")
            .credentials("root", "secret")
    }

    #[test]
    fn test_defaults() {
        let config = base().build().unwrap();
        assert_eq!(config.host(), "localhost");
        assert_eq!(config.port(), 2480);
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.max_retries(), 3);
        assert_eq!(config.batch_size(), 100);
        assert_eq!(config.base_url(), "http://localhost:2480");
        assert_eq!(config.api_url(), "http://localhost:2480/api/v1");
        // 4 attempts x 30s + 3 waits x 30s
        assert_eq!(config.operation_timeout(), Duration::from_secs(210));
    }

    #[test]
    fn test_ssl_url() {
        let config = base().host("db.example.com").port(443).use_ssl(true).build().unwrap();
        assert_eq!(config.base_url(), "https://db.example.com:443");
    }

    #[test]
    fn test_missing_required_fields() {
        let err = Config::builder().credentials("root", "x").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert!(err.to_string().contains("database"));

        let err = Config::builder().database("db").build().unwrap_err();
        assert!(err.to_string().contains("username"));

        assert!(base().host("   ").build().is_err());
        assert!(base().credentials("root", "").build().is_err());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(base().port(0).build().is_err());
        assert!(base().timeout_secs(0).build().is_err());
        assert!(base().batch_size(0).build().is_err());
        assert!(base().host("http://localhost").build().is_err());
        assert!(base()
            .retry_delays(Duration::from_secs(5), Duration::from_secs(1))
            .build()
            .is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = base().build().unwrap();
        let printed = format!("{:?}", config);
        assert!(!printed.contains("secret"));
        assert!(printed.contains("***"));
    }

    #[test]
    fn test_builder_debug_redacts_password() {
        let printed = format!("{:?}", Config::builder().credentials("root", "hunter2"));
        assert!(!printed.contains("hunter2"));
        assert!(printed.contains("root"));
        assert!(printed.contains("***"));

        let printed = format!("{:?}", Config::builder());
        assert!(printed.contains("password: None"));
    }

    #[test]
    fn test_from_lookup() {
        let env: HashMap<&str, &str> = [
            ("ARCADEDB_HOST", "arcade.local"),
            ("ARCADEDB_NAME", "demo"),
            ("ARCADEDB_USER", "root"),
            ("ARCADEDB_PASS", "pw"),
            ("ARCADEDB_PORT", "2481"),
            ("ARCADEDB_USE_SSL", "yes"),
            ("ARCADEDB_MAX_RETRIES", "5"),
        ]
        .into_iter()
        .collect();

        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.host(), "arcade.local");
        assert_eq!(config.port(), 2481);
        assert!(config.use_ssl());
        assert_eq!(config.max_retries(), 5);
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_from_lookup_reports_all_missing() {
        let err = Config::from_lookup(|k| (k == "ARCADEDB_HOST").then(|| "h".to_string()))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("ARCADEDB_NAME"));
        assert!(msg.contains("ARCADEDB_USER"));
        assert!(msg.contains("ARCADEDB_PASS"));
    }

    #[test]
    fn test_from_lookup_bad_integer() {
        let err = Config::from_lookup(|k| match k {
            "ARCADEDB_PORT" => Some("eighty".to_string()),
            _ => Some("x".to_string()),
        })
        .unwrap_err();
        assert!(err.to_string().contains("ARCADEDB_PORT"));
    }

    #[test]
    fn test_builder_from_json() {
        let builder: ConfigBuilder = serde_json::from_str(
            r#"{"host":"db","database":"demo","username":"root","password":"pw","max_retries":0}"#,
        )
        .unwrap();
        let config = builder.build().unwrap();
        assert_eq!(config.host(), "db");
        assert_eq!(config.max_retries(), 0);
        assert_eq!(config.port(), 2480);
    }
}
