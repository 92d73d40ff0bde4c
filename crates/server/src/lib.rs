//! p2p-signal-relay
//!
//! Presence and routing engine for a peer-to-peer chat and calling app.
//! Clients identify with a public key; messages and call signals go straight
//! to a connected recipient or fall back to a push notification.
//!
//! # Architecture
//!
//! ```text
//! transport ──> ConnectionLifecycle (connect/disconnect) ──┐
//!           └─> RelayCore::handle_request ──> PresenceRouter ──> IdentityRegistry
//!                                                  │
//!                     ConnectionHub (direct) <─────┴─────> PushDispatcher (fallback)
//! ```

pub mod call_policy;
pub mod config;
pub mod hub;
pub mod lifecycle;
pub mod network;
pub mod push;
pub mod registry;
pub mod relay;
pub mod router;
pub mod stats;

pub use config::ServerConfig;
pub use hub::{ConnectionHub, EventSink, SinkError};
pub use lifecycle::{ConnectionGuard, ConnectionLifecycle, DisconnectReason};
pub use registry::IdentityRegistry;
pub use relay::RelayCore;
pub use router::{Channel, DeliveryOutcome, PresenceRouter};
pub use stats::{RelayStats, StatsSnapshot};
