//! Configuration management for Windowgate.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{AdmissionError, Result};
use crate::http::HttpOptions;
use crate::ratelimit::{Limiter, RateLimitSpec, DEFAULT_MAX_RETRIES};

/// Prefix of environment variables overriding file settings,
/// e.g. `WINDOWGATE__LIMITER__MAX_ADMITS=20`.
pub const ENV_PREFIX: &str = "WINDOWGATE";

/// Main configuration for the Windowgate service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WindowgateConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission limits and store selection
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// HTTP rejection response
    #[serde(default)]
    pub http: HttpOptions,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// Admission limits and store selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Admits allowed per key per window
    #[serde(default = "default_max_admits")]
    pub max_admits: u64,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Where counters are kept
    #[serde(default)]
    pub store: StoreConfig,

    /// Transaction attempts per check for the Redis store
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            max_admits: default_max_admits(),
            window_ms: default_window_ms(),
            store: StoreConfig::default(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_max_admits() -> u64 {
    10
}

fn default_window_ms() -> u64 {
    1000
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Counter store selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreConfig {
    /// Counters in this process
    #[default]
    Local,
    /// Counters shared through Redis
    Redis {
        /// Connection URL, e.g. `redis://127.0.0.1:6379/0`
        url: String,
        /// Prefix prepended to every counter key
        #[serde(default)]
        key_prefix: String,
    },
}

impl StoreConfig {
    /// Point the store at the Redis server behind `url`, keeping any key
    /// prefix already configured for Redis.
    pub fn with_redis_url(self, url: impl Into<String>) -> Self {
        let key_prefix = match self {
            StoreConfig::Redis { key_prefix, .. } => key_prefix,
            StoreConfig::Local => String::new(),
        };
        StoreConfig::Redis {
            url: url.into(),
            key_prefix,
        }
    }
}

impl LimiterConfig {
    /// Validate the limits into a `RateLimitSpec`.
    pub fn spec(&self) -> Result<RateLimitSpec> {
        RateLimitSpec::new(self.max_admits, Duration::from_millis(self.window_ms))
    }

    /// Build a limiter from this configuration.
    pub fn build(&self, http: HttpOptions) -> Result<Limiter> {
        let spec = self.spec()?;
        let builder = Limiter::builder(spec.max_admits(), spec.window())
            .max_retries(self.max_retries)
            .http_options(http);

        let builder = match &self.store {
            StoreConfig::Local => builder.local_store(),
            StoreConfig::Redis { url, key_prefix } => {
                let client = redis::Client::open(url.as_str())?;
                builder.redis_store(client).key_prefix(key_prefix.clone())
            }
        };

        builder.build()
    }
}

impl WindowgateConfig {
    /// Load configuration from a YAML file, with `WINDOWGATE__*`
    /// environment variables taking precedence.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Yaml))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(|e| AdmissionError::Config(format!("Failed to load {}: {}", path.display(), e)))?;

        let config: WindowgateConfig = settings
            .try_deserialize()
            .map_err(|e| AdmissionError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: WindowgateConfig = serde_yaml::from_str(yaml)
            .map_err(|e| AdmissionError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check settings that deserialization alone cannot.
    pub fn validate(&self) -> Result<()> {
        self.limiter.spec()?;
        if http::StatusCode::from_u16(self.http.status_code).is_err() {
            return Err(AdmissionError::Config(format!(
                "invalid rejection status code {}",
                self.http.status_code
            )));
        }
        if http::HeaderName::from_bytes(self.http.header_key.as_bytes()).is_err() {
            return Err(AdmissionError::Config(format!(
                "invalid key header name {:?}",
                self.http.header_key
            )));
        }
        Ok(())
    }

    /// Build the limiter this configuration describes.
    pub fn build_limiter(&self) -> Result<Limiter> {
        self.limiter.build(self.http.clone())
    }
}
