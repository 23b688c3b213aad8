//! Session Registry
//!
//! In-memory record of every authenticated client for the lifetime of its
//! connection: who it is, what it subscribed to and how often it published
//! per topic. One lock guards the whole table. Mutations take it
//! exclusively, exports take it shared, and it is never held across I/O.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::metrics::Metrics;

#[cfg(test)]
mod tests;

/// One connected client
#[derive(Debug, Clone)]
struct Session {
    username: String,
    /// Insertion order, no duplicates
    subscriptions: Vec<String>,
    publications: HashMap<String, u64>,
    connected_at: DateTime<Utc>,
    last_activity_at: DateTime<Utc>,
}

impl Session {
    fn new(username: &str) -> Self {
        let now = Utc::now();
        Self {
            username: username.to_string(),
            subscriptions: Vec::new(),
            publications: HashMap::new(),
            connected_at: now,
            last_activity_at: now,
        }
    }

    fn snapshot(&self, id: &str) -> SessionSnapshot {
        SessionSnapshot {
            id: id.to_string(),
            username: self.username.clone(),
            subscriptions: self.subscriptions.clone(),
            publications: self
                .publications
                .iter()
                .map(|(topic, count)| (topic.clone(), *count))
                .collect(),
            connected_at: self.connected_at,
            last_activity_at: self.last_activity_at,
        }
    }
}

/// Point-in-time copy of a session, as served by the admin API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub username: String,
    pub subscriptions: Vec<String>,
    pub publications: BTreeMap<String, u64>,
    pub connected_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

/// Concurrency-safe table of connected clients keyed by client id
pub struct SessionRegistry {
    sessions: RwLock<BTreeMap<String, Session>>,
    metrics: Arc<Metrics>,
}

impl SessionRegistry {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
            metrics,
        }
    }

    /// Register a session for `client_id`.
    ///
    /// A second enter for a known id is ignored, so counters collected so
    /// far survive a duplicate connect event (and the first username stays).
    /// Returns whether a session was created.
    pub fn enter(&self, client_id: &str, username: &str) -> bool {
        let mut sessions = self.sessions.write();
        if sessions.contains_key(client_id) {
            return false;
        }
        sessions.insert(client_id.to_string(), Session::new(username));
        self.metrics.session_opened();
        true
    }

    /// Drop the session of `client_id`. Returns whether one existed.
    pub fn leave(&self, client_id: &str) -> bool {
        let removed = self.sessions.write().remove(client_id).is_some();
        if removed {
            self.metrics.session_closed();
        }
        removed
    }

    /// Record a subscribe request.
    ///
    /// Topics already subscribed are not duplicated, but every topic in the
    /// request is counted. Unknown clients are ignored.
    pub fn subscribe(&self, client_id: &str, topics: &[String]) {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(client_id) else {
            return;
        };

        for topic in topics {
            if !session.subscriptions.contains(topic) {
                session.subscriptions.push(topic.clone());
            }
            self.metrics.topic_subscribed(topic);
        }
        session.last_activity_at = Utc::now();
    }

    /// Count a publish on `topic`. Unknown clients are ignored.
    pub fn publish(&self, client_id: &str, topic: &str) {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(client_id) else {
            return;
        };

        *session.publications.entry(topic.to_string()).or_insert(0) += 1;
        session.last_activity_at = Utc::now();
        self.metrics.topic_published(topic);
    }

    /// Snapshot of one session
    pub fn get(&self, client_id: &str) -> Option<SessionSnapshot> {
        self.sessions
            .read()
            .get(client_id)
            .map(|session| session.snapshot(client_id))
    }

    pub fn contains(&self, client_id: &str) -> bool {
        self.sessions.read().contains_key(client_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// All sessions, ordered by client id, taken under one read lock
    pub fn export(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .iter()
            .map(|(id, session)| session.snapshot(id))
            .collect()
    }

    /// [`export`](Self::export) serialized as a JSON array
    pub fn export_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.export())
    }
}
