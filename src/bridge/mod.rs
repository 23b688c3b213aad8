//! Bridge Coordinator
//!
//! Implements [`Hooks`] by combining the credential check, the session
//! registry, the route table and the HTTP forwarder.
//!
//! # Connection lifecycle
//!
//! ```text
//! Unauthenticated --(authorize ok)--> Authenticated --(disconnect)--> Disconnected
//!        |
//!        +--(denied / error)--> refused, nothing recorded
//! ```
//!
//! The registry is the only place this state lives: a client is
//! authenticated exactly while it has a session. Nothing is kept after a
//! disconnect.
//!
//! Outbound calls are bounded by the forwarder timeout and are never made
//! while the registry lock is held, so a slow endpoint only delays the
//! connection that triggered the call.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error, info};

use crate::config::{BridgeConfig, ConfigError};
use crate::forwarder::HttpForwarder;
use crate::hooks::{HookResult, Hooks};
use crate::metrics::Metrics;
use crate::registry::SessionRegistry;
use crate::route::RouteTable;


/// Where a client stands from the bridge's point of view
///
/// There is no separate disconnected state: a disconnect drops the session,
/// after which the id reads as `Unauthenticated` again. Client ids are
/// reusable, so a later connect with the same id starts a fresh session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No session: never authenticated, refused, or already gone
    Unauthenticated,
    /// Credentials accepted, session registered
    Authenticated,
}

/// MQTT-to-HTTP bridge hooks
pub struct Bridge {
    authorize_url: String,
    routes: Arc<RouteTable>,
    forwarder: HttpForwarder,
    registry: Arc<SessionRegistry>,
    metrics: Arc<Metrics>,
}

impl Bridge {
    pub fn new(
        authorize_url: impl Into<String>,
        routes: Arc<RouteTable>,
        forwarder: HttpForwarder,
        registry: Arc<SessionRegistry>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            authorize_url: authorize_url.into(),
            routes,
            forwarder,
            registry,
            metrics,
        }
    }

    /// Build a bridge and its collaborators from configuration
    pub fn from_config(config: &BridgeConfig, metrics: Arc<Metrics>) -> Result<Self, ConfigError> {
        let routes = Arc::new(RouteTable::from_config(config));
        let forwarder = HttpForwarder::new(config, metrics.clone())?;
        let registry = Arc::new(SessionRegistry::new(metrics.clone()));
        Ok(Self::new(
            config.authorize_url.clone(),
            routes,
            forwarder,
            registry,
            metrics,
        ))
    }

    /// Shared handle to the session registry (for the admin API)
    pub fn registry(&self) -> Arc<SessionRegistry> {
        self.registry.clone()
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn connection_state(&self, client_id: &str) -> ConnectionState {
        if self.registry.contains(client_id) {
            ConnectionState::Authenticated
        } else {
            ConnectionState::Unauthenticated
        }
    }
}

#[async_trait]
impl Hooks for Bridge {
    async fn on_started(&self) {
        info!(
            "Bridge started ({} routes, authorizing against {})",
            self.routes.len(),
            self.authorize_url
        );
    }

    async fn on_stopped(&self) {
        info!(
            "Bridge stopped with {} sessions still registered",
            self.registry.len()
        );
    }

    async fn on_connect_authenticate(
        &self,
        client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
    ) -> bool {
        let username = username.unwrap_or_default();
        let password = String::from_utf8_lossy(password.unwrap_or_default());
        debug!("Client {} tries to connect as {:?}", client_id, username);

        match self
            .forwarder
            .authorize(&self.authorize_url, username, &password)
            .await
        {
            Ok(()) => {
                self.registry.enter(client_id, username);
                debug!("Client {} authenticated as {:?}", client_id, username);
                true
            }
            Err(e) => {
                info!(
                    "Auth denied for client {} ({:?}): {}",
                    client_id, username, e
                );
                false
            }
        }
    }

    async fn on_acl_check(&self, client_id: &str, topic: &str, write: bool) -> bool {
        // Credentials are the only gate; topics are not restricted per client
        debug!(
            "ACL check client={} topic={} write={}",
            client_id, topic, write
        );
        true
    }

    async fn on_subscribed(&self, client_id: &str, topics: &[String]) {
        debug!("Client {} subscribed to {:?}", client_id, topics);
        self.registry.subscribe(client_id, topics);
    }

    async fn on_publish(&self, client_id: &str, topic: &str, payload: Bytes) -> HookResult<Bytes> {
        debug!(
            "Received from client {} on {} ({} bytes)",
            client_id,
            topic,
            payload.len()
        );
        self.registry.publish(client_id, topic);

        match self.routes.find(topic) {
            Some(route) => {
                if let Err(e) = self
                    .forwarder
                    .forward(route.destination(), topic, payload.clone())
                    .await
                {
                    error!(
                        "Failed to forward {} via route {}: {}",
                        topic,
                        route.name(),
                        e
                    );
                }
            }
            None => self.metrics.no_route(topic),
        }

        Ok(payload)
    }

    async fn on_disconnect(&self, client_id: &str, error: Option<&str>, will_expire: bool) {
        debug!(
            "Client {} disconnected (error={:?}, expire={})",
            client_id, error, will_expire
        );
        self.registry.leave(client_id);
    }
}
