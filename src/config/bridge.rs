//! Bridge Configuration
//!
//! Where credentials are verified, where publishes go, and the routing
//! rules that pick a destination per topic.
//!
//! # Route file
//!
//! ```yaml
//! - name: telemetry
//!   pattern: "^devices/[^/]+/telemetry$"
//!   url: "http://ingest.local/telemetry/{topic}"
//! - name: everything-else
//!   pattern: ".*"
//!   url: "http://ingest.local/other"
//! ```
//!
//! A mapping with a top-level `routes:` key holding the same list is
//! accepted as well.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use tracing::{error, info, warn};

use super::ConfigError;

pub(crate) const DEFAULT_AUTHORIZE_URL: &str = "http://example.com";
pub(crate) const DEFAULT_PUBLISH_URL: &str = "http://example.com/{topic}";
pub(crate) const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
pub(crate) const DEFAULT_TOPIC_HEADER: &str = "X-Topic";
pub(crate) const DEFAULT_ROUTES_FILE: &str = "routes.yaml";

/// Name of the catch-all route built from `publish_url`
pub const DEFAULT_ROUTE_NAME: &str = "default";

/// Bridge configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Endpoint that verifies client credentials (HTTP Basic, POST)
    pub authorize_url: String,
    /// Destination used when no routes are configured; `{topic}` is substituted
    pub publish_url: String,
    /// Content-Type sent with forwarded payloads (empty = omit)
    pub content_type: String,
    /// Header carrying the topic name on forwarded payloads (empty = omit)
    pub topic_header: String,
    /// YAML file with the ordered route list
    pub routes_file: PathBuf,
    /// Timeout of every outbound request (e.g., "5s")
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Inline routes, take precedence over `routes_file`
    pub routes: Vec<RouteConfig>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            publish_url: DEFAULT_PUBLISH_URL.to_string(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            topic_header: DEFAULT_TOPIC_HEADER.to_string(),
            routes_file: PathBuf::from(DEFAULT_ROUTES_FILE),
            timeout: Duration::from_secs(5),
            routes: Vec::new(),
        }
    }
}

/// A named routing rule as written in configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RouteConfig {
    /// Route name, used in logs
    pub name: String,
    /// Regular expression searched for in the topic
    pub pattern: String,
    /// Destination URL template (`{topic}` is substituted once)
    #[serde(alias = "destination")]
    pub url: String,
}

impl RouteConfig {
    pub fn new(name: impl Into<String>, pattern: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
            url: url.into(),
        }
    }

    /// Catch-all route towards `url`
    pub fn catch_all(url: impl Into<String>) -> Self {
        Self::new(DEFAULT_ROUTE_NAME, ".*", url)
    }

    /// Check that the pattern compiles and the route has a destination
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Validation(format!(
                "Route '{}' has no url",
                self.name
            )));
        }
        Regex::new(&self.pattern).map_err(|e| {
            ConfigError::Validation(format!(
                "Route '{}' has invalid pattern '{}': {}",
                self.name, self.pattern, e
            ))
        })?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct RouteFile {
    #[serde(default)]
    routes: Vec<RouteConfig>,
}

/// Both layouts a route file may use
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RouteDocument {
    List(Vec<RouteConfig>),
    File(RouteFile),
}

/// Parse a YAML route list.
///
/// Accepts either a bare sequence of routes or a mapping with a `routes` key.
/// An empty document yields no routes.
pub fn parse_routes(content: &str) -> Result<Vec<RouteConfig>, ConfigError> {
    let document: Option<RouteDocument> = serde_yaml::from_str(content)?;
    let routes = match document {
        None => Vec::new(),
        Some(RouteDocument::List(routes)) => routes,
        Some(RouteDocument::File(file)) => file.routes,
    };

    for route in &routes {
        route.validate()?;
    }

    Ok(routes)
}

/// Read and parse a YAML route file
pub fn load_routes<P: AsRef<Path>>(path: P) -> Result<Vec<RouteConfig>, ConfigError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    parse_routes(&content)
}

impl BridgeConfig {
    /// The ordered routes the bridge should use.
    ///
    /// Inline routes win over the route file. Problems with the file are
    /// logged and treated as "no routes". With no routes left, a single
    /// catch-all towards `publish_url` is used, unless that is empty too.
    pub fn effective_routes(&self) -> Vec<RouteConfig> {
        let routes = if !self.routes.is_empty() {
            self.routes.clone()
        } else {
            match load_routes(&self.routes_file) {
                Ok(routes) => {
                    info!(
                        "Loaded {} routes from {}",
                        routes.len(),
                        self.routes_file.display()
                    );
                    routes
                }
                Err(ConfigError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                    info!("No routes file at {}", self.routes_file.display());
                    Vec::new()
                }
                Err(e) => {
                    error!(
                        "Failed to load routes from {}: {}",
                        self.routes_file.display(),
                        e
                    );
                    Vec::new()
                }
            }
        };

        if routes.is_empty() {
            if self.publish_url.is_empty() {
                warn!("No routes configured and no publish URL, publishes will not be forwarded");
                return routes;
            }
            info!("Adding default route to {}", self.publish_url);
            return vec![RouteConfig::catch_all(&self.publish_url)];
        }

        routes
    }
}
