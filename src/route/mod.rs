//! Topic routing
//!
//! An ordered list of regular expressions, each paired with a destination
//! URL template. The first rule whose pattern occurs anywhere in the topic
//! wins. Patterns are compiled when the table is built, so a table that
//! exists can always be evaluated.

use regex::Regex;
use tracing::{debug, error};

use crate::config::{BridgeConfig, ConfigError, RouteConfig};


/// A compiled routing rule
#[derive(Debug, Clone)]
pub struct Route {
    name: String,
    pattern: Regex,
    destination: String,
}

impl Route {
    /// Compile a configured route
    pub fn compile(config: &RouteConfig) -> Result<Self, ConfigError> {
        let pattern = Regex::new(&config.pattern).map_err(|e| {
            ConfigError::Validation(format!(
                "Route '{}' has invalid pattern '{}': {}",
                config.name, config.pattern, e
            ))
        })?;

        Ok(Self {
            name: config.name.clone(),
            pattern,
            destination: config.url.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Destination URL template, `{topic}` not yet substituted
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Whether the pattern occurs anywhere in `topic`
    pub fn matches(&self, topic: &str) -> bool {
        self.pattern.is_match(topic)
    }
}

/// Ordered, immutable set of routes
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl RouteTable {
    /// Compile routes in declaration order, failing on the first bad pattern
    pub fn new(routes: &[RouteConfig]) -> Result<Self, ConfigError> {
        let routes = routes
            .iter()
            .map(Route::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes })
    }

    /// Build the table the bridge runs with.
    ///
    /// Never fails: if the configured routes do not compile, the error is
    /// logged and the table falls back to the catch-all towards
    /// `publish_url` (or stays empty when there is none).
    pub fn from_config(config: &BridgeConfig) -> Self {
        match Self::new(&config.effective_routes()) {
            Ok(table) => table,
            Err(e) => {
                error!("Invalid routes, using default route only: {}", e);
                if config.publish_url.is_empty() {
                    return Self::default();
                }
                Self::new(&[RouteConfig::catch_all(&config.publish_url)]).unwrap_or_default()
            }
        }
    }

    /// First route, in declaration order, whose pattern matches `topic`
    pub fn find(&self, topic: &str) -> Option<&Route> {
        let route = self.routes.iter().find(|route| route.matches(topic));
        match route {
            Some(route) => debug!("Topic {} matched route {}", topic, route.name),
            None => debug!("Topic {} matched no route", topic),
        }
        route
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route> {
        self.routes.iter()
    }
}
