use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct ForgeConfig {
    pub service: ServiceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Create the logs/summary tables on startup when missing.
    #[serde(default)]
    pub ensure_schema: bool,
}

/// Where trace snapshots are written.
///
/// `backend` is one of `fs`, `s3` or `memory`.
#[derive(Debug, Deserialize, Clone)]
pub struct BlobConfig {
    pub backend: String,
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default)]
    pub bucket: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub prefix: String,
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            backend: "fs".to_string(),
            root: Some("./data/blobs".to_string()),
            bucket: None,
            region: None,
            endpoint: None,
            prefix: String::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AggregationConfig {
    /// Total attempts per `aggregate` call, the first one included.
    pub max_attempts: usize,
    /// Delay before retry `n` is `backoff_ms * n`.
    pub backoff_ms: u64,
    /// Upper bound applied by request/response callers (HTTP, IPC with `wait`).
    pub job_timeout_seconds: u64,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 100,
            job_timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8780,
        }
    }
}

impl ForgeConfig {
    /// Load from a TOML file, with `PROMPTFORGE__SECTION__KEY` env overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .add_source(Environment::with_prefix("PROMPTFORGE").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}
