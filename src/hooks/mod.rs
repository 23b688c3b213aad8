//! Hooks Module
//!
//! The callback surface an MQTT protocol engine drives while it handles
//! connections. The engine owns sockets, framing and delivery; everything
//! mqtt2http decides is returned through these methods.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

#[cfg(test)]
mod tests;

/// Hook error types
#[derive(Debug)]
pub enum HookError {
    /// The message must not be delivered
    Rejected(String),
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::Rejected(msg) => write!(f, "Rejected: {}", msg),
        }
    }
}

impl std::error::Error for HookError {}

/// Hook result type
pub type HookResult<T> = Result<T, HookError>;

/// Protocol engine hooks
///
/// The engine calls these concurrently from its connection tasks. Events of
/// a single connection arrive in order (connect, then subscribes and
/// publishes, then disconnect); events of different connections interleave
/// freely. Every method has a permissive default.
#[async_trait]
pub trait Hooks: Send + Sync {
    /// Called once the engine is accepting connections
    async fn on_started(&self) {}

    /// Called when the engine stops accepting connections
    async fn on_stopped(&self) {}

    /// Called when a client sends CONNECT
    ///
    /// The engine waits for the answer before it completes the handshake.
    ///
    /// # Returns
    /// * `true` - Accept the connection
    /// * `false` - Refuse the connection (CONNACK with a not-authorized code)
    async fn on_connect_authenticate(
        &self,
        _client_id: &str,
        _username: Option<&str>,
        _password: Option<&[u8]>,
    ) -> bool {
        true
    }

    /// Called before a client reads from or writes to a topic
    ///
    /// `write` is true for publishes, false for subscriptions.
    async fn on_acl_check(&self, _client_id: &str, _topic: &str, _write: bool) -> bool {
        true
    }

    /// Called after the engine accepted a SUBSCRIBE, with its topic filters
    async fn on_subscribed(&self, _client_id: &str, _topics: &[String]) {}

    /// Called for every PUBLISH received from a client
    ///
    /// Returns the payload the engine should deliver to subscribers.
    /// An `Err` makes the engine drop the message.
    async fn on_publish(&self, _client_id: &str, _topic: &str, payload: Bytes) -> HookResult<Bytes> {
        Ok(payload)
    }

    /// Called after a client connection is gone
    ///
    /// # Arguments
    /// * `error` - Why the connection ended, if it was not a clean DISCONNECT
    /// * `will_expire` - Whether the client's session expires with the connection
    async fn on_disconnect(&self, _client_id: &str, _error: Option<&str>, _will_expire: bool) {}
}

/// Implement Hooks for Arc<T> where T: Hooks
/// This allows Arc-wrapped hook providers to be handed to an engine directly
#[async_trait]
impl<T: Hooks + ?Sized> Hooks for std::sync::Arc<T> {
    async fn on_started(&self) {
        (**self).on_started().await;
    }

    async fn on_stopped(&self) {
        (**self).on_stopped().await;
    }

    async fn on_connect_authenticate(
        &self,
        client_id: &str,
        username: Option<&str>,
        password: Option<&[u8]>,
    ) -> bool {
        (**self)
            .on_connect_authenticate(client_id, username, password)
            .await
    }

    async fn on_acl_check(&self, client_id: &str, topic: &str, write: bool) -> bool {
        (**self).on_acl_check(client_id, topic, write).await
    }

    async fn on_subscribed(&self, client_id: &str, topics: &[String]) {
        (**self).on_subscribed(client_id, topics).await;
    }

    async fn on_publish(&self, client_id: &str, topic: &str, payload: Bytes) -> HookResult<Bytes> {
        (**self).on_publish(client_id, topic, payload).await
    }

    async fn on_disconnect(&self, client_id: &str, error: Option<&str>, will_expire: bool) {
        (**self).on_disconnect(client_id, error, will_expire).await;
    }
}
