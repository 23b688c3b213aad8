//! Configuration Module
//!
//! Provides TOML-based configuration for mqtt2http with support for:
//! - Logging level
//! - Bridge settings (authorize URL, default publish URL, headers, routes)
//! - Admin API and metrics listeners
//! - Shutdown grace period
//! - Environment variable overrides (MQTT2HTTP__* prefix)
//! - The flat variable names of earlier releases (`MQTT2HTTP_AUTHORIZE_URL`,
//!   `MQTT2HTTP_API_PASSWORD`, ...), see [`LEGACY_ENV_VARS`]

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

pub use bridge::{load_routes, parse_routes, BridgeConfig, RouteConfig, DEFAULT_ROUTE_NAME};
pub use metrics::MetricsConfig;

mod bridge;
mod metrics;

/// Substitute environment variables in a string.
/// Supports `${VAR}` and `${VAR:-default}` syntax.
fn substitute_env_vars(content: &str) -> String {
    let re = Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static pattern");
    re.replace_all(content, |caps: &regex::Captures| {
        let var_name = &caps[1];
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| default.to_string())
    })
    .to_string()
}


/// Flat environment variables still honoured, and the key each one sets.
/// `MQTT2HTTP__SECTION__KEY` variables take precedence over these.
pub const LEGACY_ENV_VARS: &[(&str, &str)] = &[
    ("MQTT2HTTP_AUTHORIZE_URL", "bridge.authorize_url"),
    ("MQTT2HTTP_PUBLISH_URL", "bridge.publish_url"),
    ("MQTT2HTTP_CONTENT_TYPE", "bridge.content_type"),
    ("MQTT2HTTP_TOPIC_HEADER", "bridge.topic_header"),
    ("MQTT2HTTP_ROUTES_FILE_PATH", "bridge.routes_file"),
    ("MQTT2HTTP_API_PASSWORD", "api.password"),
    ("MQTT2HTTP_HTTP_LISTEN_ADDRESS", "api.bind"),
    ("MQTT2HTTP_METRICS_HTTP_LISTEN_ADDRESS", "metrics.bind"),
];

/// Listen addresses were written as `:8080`; bind those on all interfaces
fn normalize_listen_address(value: String) -> String {
    if value.starts_with(':') {
        format!("0.0.0.0{}", value)
    } else {
        value
    }
}

/// Collect the flat variables found by `lookup` into a config source
fn legacy_env_source<F>(lookup: F) -> Result<config::Config, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut builder = config::Config::builder();
    for (var, key) in LEGACY_ENV_VARS {
        let Some(value) = lookup(var) else {
            continue;
        };
        let value = if key.ends_with(".bind") {
            normalize_listen_address(value)
        } else {
            value
        };
        builder = builder.set_override(*key, value)?;
    }
    Ok(builder.build()?)
}

/// Configuration error types
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading a config or route file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Config crate error
    Config(config::ConfigError),
    /// Route file YAML error
    Yaml(serde_yaml::Error),
    /// Validation error
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Config(e) => write!(f, "Config error: {}", e),
            ConfigError::Yaml(e) => write!(f, "YAML error: {}", e),
            ConfigError::Validation(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(e: serde_yaml::Error) -> Self {
        ConfigError::Yaml(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Config(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Authentication and forwarding
    pub bridge: BridgeConfig,
    /// Admin HTTP API
    pub api: ApiConfig,
    /// Metrics configuration
    pub metrics: MetricsConfig,
    /// Shutdown behaviour
    pub shutdown: ShutdownConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Admin API configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// HTTP bind address
    #[serde(default = "default_api_bind")]
    pub bind: SocketAddr,
    /// Password required (HTTP Basic) to read `/clients`.
    /// `None` means one is generated at startup, an empty string disables the check.
    pub password: Option<String>,
}

fn default_api_bind() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: default_api_bind(),
            password: None,
        }
    }
}

impl ApiConfig {
    /// The password `/clients` is served with.
    ///
    /// Without a configured password a random one is generated for this run
    /// and logged once, so the endpoint is never open by omission.
    pub fn resolve_password(&self) -> String {
        match &self.password {
            Some(password) => password.clone(),
            None => {
                let generated = uuid::Uuid::new_v4().to_string();
                warn!(
                    "No api.password configured, generated one for this run: {} \
                     (set api.password or MQTT2HTTP__API__PASSWORD to choose it)",
                    generated
                );
                generated
            }
        }
    }
}

/// Shutdown configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// How long in-flight work may take to finish after a stop signal
    #[serde(default = "default_grace", with = "humantime_serde")]
    pub grace: Duration,
}

fn default_grace() -> Duration {
    Duration::from_secs(30)
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace: default_grace(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// Supports two forms of environment variable usage:
    /// 1. In-file substitution: `${VAR}` or `${VAR:-default}` syntax in the TOML file
    /// 2. Override via env vars: `MQTT2HTTP__` prefix with double underscores for nesting:
    ///    - `MQTT2HTTP__BRIDGE__AUTHORIZE_URL=http://auth/check` overrides `bridge.authorize_url`
    ///    - `MQTT2HTTP__API__PASSWORD=s3cret` overrides `api.password`
    ///    - `MQTT2HTTP__METRICS__ENABLED=false` overrides `metrics.enabled`
    /// 3. The flat names in [`LEGACY_ENV_VARS`], below the nested form
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            // Start with defaults
            .set_default("log.level", "info")?
            .set_default("bridge.authorize_url", bridge::DEFAULT_AUTHORIZE_URL)?
            .set_default("bridge.publish_url", bridge::DEFAULT_PUBLISH_URL)?
            .set_default("bridge.content_type", bridge::DEFAULT_CONTENT_TYPE)?
            .set_default("bridge.topic_header", bridge::DEFAULT_TOPIC_HEADER)?
            .set_default("bridge.routes_file", bridge::DEFAULT_ROUTES_FILE)?
            .set_default("bridge.timeout", "5s")?
            .set_default("api.bind", "0.0.0.0:8080")?
            .set_default("metrics.enabled", true)?
            .set_default("metrics.bind", "0.0.0.0:9090")?
            .set_default("shutdown.grace", "30s")?;

        // Load from file with env var substitution
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let substituted = substitute_env_vars(&content);
                builder = builder.add_source(File::from_str(&substituted, FileFormat::Toml));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // File doesn't exist, use defaults
            }
            Err(e) => return Err(ConfigError::Io(e)),
        }

        // Flat names first, so the nested form below wins when both are set
        builder = builder.add_source(legacy_env_source(|var| std::env::var(var).ok())?);

        // Override with environment variables (MQTT2HTTP__BRIDGE__PUBLISH_URL, etc.)
        // Double underscore separates nested keys, single underscore preserved in field names
        let cfg = builder
            .add_source(
                Environment::with_prefix("MQTT2HTTP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = cfg.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides only (no file).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(Path::new(""))
    }

    /// Parse configuration from a string (for testing, no env var support)
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.authorize_url.is_empty() {
            return Err(ConfigError::Validation(
                "bridge.authorize_url must not be empty".to_string(),
            ));
        }

        if self.bridge.timeout.is_zero() {
            return Err(ConfigError::Validation(
                "bridge.timeout must be greater than zero".to_string(),
            ));
        }

        for route in &self.bridge.routes {
            route.validate()?;
        }

        Ok(())
    }
}
