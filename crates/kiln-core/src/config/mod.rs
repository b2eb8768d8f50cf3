//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `set_default` calls mirroring the `Default` implementations
//! 2. **Config file**: TOML file named by the `KILN_CONFIG` env var
//! 3. **Environment variables**: `KILN__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP bind address and mount prefix
//! - [`PipelineConfig`]: update periods and the processor error policy
//! - [`ResourcesConfig`]: model file, resource root and substitution variables
//! - [`MetricsConfig`]: Prometheus endpoint toggle
//! - [`LoggingConfig`]: log level and format
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! bind_port = 8080
//! mount_prefix = "assets"
//!
//! [pipeline]
//! model_update_period_seconds = 60
//! content_update_period_seconds = 0   # recompute on every request
//! on_processor_error = "skip-and-continue"
//!
//! [resources]
//! model_path = "config/groups.toml"
//! root_dir = "public"
//! variables = { brand = "#336699" }
//! ```

use crate::{cache::ContentCacheConfig, processor::ErrorPolicy};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, time::Duration};

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `3030`.
    pub bind_port: u16,

    /// Path segment groups are served under, e.g. `assets` for `/assets/g1.css`.
    #[serde(default = "default_mount_prefix")]
    pub mount_prefix: String,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_mount_prefix() -> String {
    "assets".to_string()
}

/// Request pipeline settings.
///
/// A period of `0` is valid and means "recompute on every access".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Seconds a loaded resource model is reused. Defaults to `300`.
    pub model_update_period_seconds: u64,

    /// Seconds processed content is reused. Defaults to `300`.
    pub content_update_period_seconds: u64,

    /// `fail-fast` or `skip-and-continue`. Defaults to `fail-fast`.
    #[serde(default)]
    pub on_processor_error: ErrorPolicy,

    /// Remove the previous entry when a recomputation fails. Defaults to `false`.
    #[serde(default)]
    pub evict_on_error: bool,
}

/// Where the model and resources come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourcesConfig {
    /// Model document (TOML, or JSON by extension). Defaults to `config/groups.toml`.
    pub model_path: String,

    /// Directory resource URIs are resolved against. Defaults to `.`.
    pub root_dir: String,

    /// Values for `${name}` placeholders.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
}

/// Prometheus metrics configuration. When enabled, metrics are served at `/metrics`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Defaults to `true`.
    pub enabled: bool,
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub resources: ResourcesConfig,

    #[serde(default)]
    pub metrics: MetricsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: 3030,
            mount_prefix: default_mount_prefix(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_update_period_seconds: 300,
            content_update_period_seconds: 300,
            on_processor_error: ErrorPolicy::FailFast,
            evict_on_error: false,
        }
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        Self {
            model_path: "config/groups.toml".to_string(),
            root_dir: ".".to_string(),
            variables: BTreeMap::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pipeline: PipelineConfig::default(),
            resources: ResourcesConfig::default(),
            metrics: MetricsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// Environment variables with the `KILN__` prefix can override any configuration value.
    /// Use `__` as a separator for nested fields (e.g., `KILN__SERVER__BIND_PORT=8080`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("server.bind_address", "127.0.0.1")?
            .set_default("server.bind_port", 3030)?
            .set_default("server.mount_prefix", "assets")?
            .set_default("pipeline.model_update_period_seconds", 300)?
            .set_default("pipeline.content_update_period_seconds", 300)?
            .set_default("pipeline.on_processor_error", "fail-fast")?
            .set_default("pipeline.evict_on_error", false)?
            .set_default("resources.model_path", "config/groups.toml")?
            .set_default("resources.root_dir", ".")?
            .set_default("metrics.enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("KILN").prefix_separator("__").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads configuration from `config/config.toml` with fallback to defaults.
    ///
    /// The config file path can be overridden using the `KILN_CONFIG` environment variable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("KILN_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed into a valid [`SocketAddr`].
    ///
    /// [`SocketAddr`]: std::net::SocketAddr
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    #[must_use]
    pub fn model_update_period(&self) -> Duration {
        Duration::from_secs(self.pipeline.model_update_period_seconds)
    }

    #[must_use]
    pub fn content_update_period(&self) -> Duration {
        Duration::from_secs(self.pipeline.content_update_period_seconds)
    }

    #[must_use]
    pub fn content_cache_config(&self) -> ContentCacheConfig {
        ContentCacheConfig {
            update_period: self.content_update_period(),
            evict_on_error: self.pipeline.evict_on_error,
        }
    }

    /// Mount prefix without surrounding slashes.
    #[must_use]
    pub fn mount_prefix(&self) -> &str {
        self.server.mount_prefix.trim_matches('/')
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// Zero update periods are valid.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.is_empty() {
            return Err("Bind address must not be empty".to_string());
        }

        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if self.mount_prefix().contains('/') {
            return Err(format!(
                "Mount prefix must be a single path segment: {}",
                self.server.mount_prefix
            ));
        }

        if self.resources.model_path.is_empty() {
            return Err("Model path must not be empty".to_string());
        }

        if self.resources.root_dir.is_empty() {
            return Err("Resource root directory must not be empty".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}
