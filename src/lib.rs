//! mqtt2http - MQTT broker hooks that mirror traffic to HTTP
//!
//! Clients are authenticated against an HTTP endpoint, every published
//! message is POSTed to the destination of the first matching route, and
//! connected sessions can be inspected through a small admin API.
//!
//! The MQTT protocol engine itself is not part of this crate: it drives a
//! [`Bridge`] through the [`Hooks`] trait.

pub mod api;
pub mod bridge;
pub mod config;
pub mod forwarder;
pub mod hooks;
pub mod metrics;
pub mod registry;
pub mod route;

pub use api::AdminServer;
pub use bridge::{Bridge, ConnectionState};
pub use config::{BridgeConfig, Config, RouteConfig};
pub use forwarder::{ForwardError, HttpForwarder};
pub use hooks::{HookError, HookResult, Hooks};
pub use metrics::{Metrics, MetricsServer};
pub use registry::{SessionRegistry, SessionSnapshot};
pub use route::{Route, RouteTable};
