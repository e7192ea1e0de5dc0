use std::net::SocketAddr;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use url::Url;

/// Auth gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// The address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Hosted identity provider (GoTrue-style REST API)
    pub provider: ProviderConfig,

    /// Directory REST endpoint (companies, company_users, profiles)
    pub directory: DirectoryConfig,

    /// Serverless functions endpoint
    pub functions: FunctionsConfig,

    /// Session handling knobs
    #[serde(default)]
    pub session: SessionConfig,

    /// Local token cache storage
    pub storage: StorageConfig,

    /// CORS settings
    #[serde(default)]
    pub cors: CorsConfig,
}

fn default_listen_addr() -> SocketAddr {
    "127.0.0.1:3001".parse().unwrap()
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL of the provider's auth API
    pub url: Url,

    /// Public (anon) API key sent with every request
    pub anon_key: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

fn default_provider_timeout() -> u64 {
    7
}

/// Directory store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryConfig {
    /// Base URL of the directory REST endpoint
    pub url: Url,

    /// Service-role key for directory access
    pub service_key: String,

    /// Write-call timeout in seconds
    #[serde(default = "default_directory_timeout")]
    pub timeout_secs: u64,
}

fn default_directory_timeout() -> u64 {
    10
}

/// Serverless functions configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionsConfig {
    /// Base URL of the functions endpoint
    pub url: Url,

    /// Service-role key for function invocation
    pub service_key: String,
}

/// Session handling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Background monitor interval in seconds
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_secs: u64,

    /// Maximum refresh attempts during recovery
    #[serde(default = "default_refresh_max_attempts")]
    pub refresh_max_attempts: u32,

    /// Base backoff between refresh attempts in milliseconds (doubles)
    #[serde(default = "default_refresh_backoff_ms")]
    pub refresh_backoff_ms: u64,

    /// Role context cache TTL in seconds
    #[serde(default = "default_role_cache_ttl")]
    pub role_cache_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: default_monitor_interval(),
            refresh_max_attempts: default_refresh_max_attempts(),
            refresh_backoff_ms: default_refresh_backoff_ms(),
            role_cache_ttl_secs: default_role_cache_ttl(),
        }
    }
}

fn default_monitor_interval() -> u64 {
    120 // 2 minutes
}

fn default_refresh_max_attempts() -> u32 {
    2
}

fn default_refresh_backoff_ms() -> u64 {
    1000
}

fn default_role_cache_ttl() -> u64 {
    300 // 5 minutes
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StorageConfig {
    /// RocksDB storage
    #[serde(rename = "rocksdb")]
    RocksDB {
        /// The path to the RocksDB database
        path: PathBuf,
    },

    /// In-memory storage (for development only)
    #[serde(rename = "memory")]
    Memory,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// Allow any origin
    #[serde(default = "default_true")]
    pub allow_all_origins: bool,

    /// Allowed origins when not allowing all
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Allowed methods
    #[serde(default = "default_allowed_methods")]
    pub allowed_methods: Vec<String>,

    /// Allowed headers
    #[serde(default = "default_allowed_headers")]
    pub allowed_headers: Vec<String>,

    /// Max age in seconds
    #[serde(default = "default_max_age")]
    pub max_age: u64,
}

fn default_true() -> bool {
    true
}

fn default_allowed_methods() -> Vec<String> {
    vec![
        "GET".to_string(),
        "POST".to_string(),
        "OPTIONS".to_string(),
    ]
}

fn default_allowed_headers() -> Vec<String> {
    vec![
        "Authorization".to_string(),
        "Content-Type".to_string(),
        "Accept".to_string(),
    ]
}

fn default_max_age() -> u64 {
    86400 // 24 hours
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_all_origins: true,
            allowed_origins: Vec::new(),
            allowed_methods: default_allowed_methods(),
            allowed_headers: default_allowed_headers(),
            max_age: default_max_age(),
        }
    }
}

/// Load the configuration from a file, with environment overrides
/// (`CALMON_AUTH__SECTION__FIELD`).
pub fn load_config(path: &str) -> eyre::Result<AuthConfig> {
    let config = config::Config::builder()
        .add_source(config::File::with_name(path))
        .add_source(config::Environment::with_prefix("CALMON_AUTH").separator("__"))
        .build()?
        .try_deserialize()?;

    Ok(config)
}

/// Default configuration pointing at a local development stack.
pub fn default_config() -> AuthConfig {
    AuthConfig {
        listen_addr: default_listen_addr(),
        provider: ProviderConfig {
            url: Url::parse("http://localhost:9999/auth/v1/").unwrap(),
            anon_key: "dev-anon-key".to_string(),
            timeout_secs: default_provider_timeout(),
        },
        directory: DirectoryConfig {
            url: Url::parse("http://localhost:3000/rest/v1/").unwrap(),
            service_key: "dev-service-key".to_string(),
            timeout_secs: default_directory_timeout(),
        },
        functions: FunctionsConfig {
            url: Url::parse("http://localhost:54321/functions/v1/").unwrap(),
            service_key: "dev-service-key".to_string(),
        },
        session: SessionConfig::default(),
        storage: StorageConfig::RocksDB {
            path: PathBuf::from("./data/auth_db"),
        },
        cors: CorsConfig::default(),
    }
}
