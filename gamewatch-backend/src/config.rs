use std::env::var;
use std::path::Path;
use std::time::Duration;

use dotenvy::dotenv;
use gamewatch_core::{CacheConfig, ConfiguredServer, TimeoutConfig};
use thiserror::Error;

/// Application configuration with environment variable overrides
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    /// Env: PORT (default: 3000)
    pub port: u16,

    /// Request timeout in seconds
    /// Env: REQUEST_TIMEOUT_SECS (default: 30)
    pub request_timeout: Duration,

    /// How long a status stays fresh
    /// Env: CACHE_TTL_MS (default: 5000)
    pub cache_ttl: Duration,

    /// Maximum cached servers, unbounded when unset or 0
    /// Env: CACHE_CAPACITY (default: unset)
    pub cache_capacity: Option<usize>,

    /// Share one probe between concurrent misses for the same server
    /// Env: SINGLE_FLIGHT (default: true)
    pub single_flight: bool,

    /// Interval between background refreshes of the configured servers
    /// Env: REFRESH_INTERVAL_SECS (default: 5)
    pub refresh_interval: Duration,

    /// Socket timeout handed to the query protocol
    /// Env: SOCKET_TIMEOUT_MS (default: 3000)
    pub socket_timeout: Duration,

    /// Timeout for a single query attempt
    /// Env: ATTEMPT_TIMEOUT_MS (default: 5000)
    pub attempt_timeout: Duration,

    /// Retries after the first attempt
    /// Env: MAX_RETRIES (default: 2)
    pub max_retries: u32,

    /// Probes allowed to run at once across all requests
    /// Env: MAX_CONCURRENT_PROBES (default: 64)
    pub max_concurrent_probes: usize,

    /// Addresses accepted in one on-demand request
    /// Env: MAX_ADDRESSES_PER_REQUEST (default: 32)
    pub max_addresses_per_request: usize,

    /// JSON file listing the servers kept warm in the background
    /// Env: SERVERS_PATH (optional, no background servers when unset)
    pub servers_path: Option<String>,

    /// Enable per-IP rate limiting
    /// Env: RATE_LIMIT_ENABLED (default: true)
    pub rate_limit_enabled: bool,

    /// Requests per second per client IP
    /// Env: RATE_LIMIT_PER_SEC (default: 10)
    pub rate_limit_per_sec: u64,

    /// Burst size per client IP
    /// Env: RATE_LIMIT_BURST (default: 20)
    pub rate_limit_burst: u32,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let _ = dotenv(); //for debugging mostly
        let defaults = Self::default();
        Self {
            port: env_or_default("PORT", defaults.port),
            request_timeout: Duration::from_secs(env_or_default("REQUEST_TIMEOUT_SECS", 30)),
            cache_ttl: Duration::from_millis(env_or_default("CACHE_TTL_MS", 5000)),
            cache_capacity: var("CACHE_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&capacity| capacity > 0),
            single_flight: env_or_default("SINGLE_FLIGHT", defaults.single_flight),
            refresh_interval: Duration::from_secs(env_or_default("REFRESH_INTERVAL_SECS", 5)),
            socket_timeout: Duration::from_millis(env_or_default("SOCKET_TIMEOUT_MS", 3000)),
            attempt_timeout: Duration::from_millis(env_or_default("ATTEMPT_TIMEOUT_MS", 5000)),
            max_retries: env_or_default("MAX_RETRIES", defaults.max_retries),
            max_concurrent_probes: env_or_default(
                "MAX_CONCURRENT_PROBES",
                defaults.max_concurrent_probes,
            ),
            max_addresses_per_request: env_or_default(
                "MAX_ADDRESSES_PER_REQUEST",
                defaults.max_addresses_per_request,
            ),
            servers_path: var("SERVERS_PATH").ok().filter(|p| !p.is_empty()),
            rate_limit_enabled: env_or_default("RATE_LIMIT_ENABLED", defaults.rate_limit_enabled),
            rate_limit_per_sec: env_or_default("RATE_LIMIT_PER_SEC", defaults.rate_limit_per_sec),
            rate_limit_burst: env_or_default("RATE_LIMIT_BURST", defaults.rate_limit_burst),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl: self.cache_ttl,
            capacity: self.cache_capacity.filter(|&capacity| capacity > 0),
            single_flight: self.single_flight,
        }
    }

    pub fn timeout_config(&self) -> TimeoutConfig {
        TimeoutConfig {
            connect_timeout: self.socket_timeout,
            attempt_timeout: self.attempt_timeout,
            max_retries: self.max_retries,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3000,
            request_timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_millis(5000),
            cache_capacity: None,
            single_flight: true,
            refresh_interval: Duration::from_secs(5),
            socket_timeout: Duration::from_millis(3000),
            attempt_timeout: Duration::from_millis(5000),
            max_retries: 2,
            max_concurrent_probes: gamewatch_core::DEFAULT_MAX_CONCURRENT_PROBES,
            max_addresses_per_request: 32,
            servers_path: None,
            rate_limit_enabled: true,
            rate_limit_per_sec: 10,
            rate_limit_burst: 20,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read server list {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("server list {path} is not a JSON array: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Load the configured server list from a JSON array file.
///
/// Entries that fail validation are skipped with a warning; only an
/// unreadable or non-array file is an error.
pub fn load_servers(path: impl AsRef<Path>) -> Result<Vec<ConfiguredServer>, ConfigError> {
    let path = path.as_ref();
    let display = path.display().to_string();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: display.clone(),
        source,
    })?;
    let entries: Vec<serde_json::Value> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: display.clone(),
            source,
        })?;
    Ok(parse_servers(entries))
}

fn parse_servers(entries: Vec<serde_json::Value>) -> Vec<ConfiguredServer> {
    entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value(entry) {
            Ok(server) => Some(server),
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping invalid configured server");
                None
            }
        })
        .collect()
}

/// Parse environment variable or return default value
fn env_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}
