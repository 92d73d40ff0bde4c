//! Connection lifecycle
//!
//! Connect registers an outbound queue and hands back a guard. The guard's
//! drop is the single place presence is torn down, so cleanup runs exactly
//! once however the connection task ends (graceful close, error, panic).

use async_channel::Receiver;
use protocol::{ConnectionId, Identity, ServerEvent};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info};

use crate::hub::ConnectionHub;
use crate::registry::IdentityRegistry;
use crate::stats::RelayStats;

/// Why a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Peer closed the connection
    PeerClosed,
    IdleTimeout,
    /// Transport or protocol failure
    Error(String),
    /// Relay is shutting down
    Shutdown,
    /// Handler ended without reporting a reason (early return or panic)
    Aborted,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::PeerClosed => write!(f, "closed by peer"),
            DisconnectReason::IdleTimeout => write!(f, "idle timeout"),
            DisconnectReason::Error(e) => write!(f, "error: {}", e),
            DisconnectReason::Shutdown => write!(f, "relay shutdown"),
            DisconnectReason::Aborted => write!(f, "aborted"),
        }
    }
}

pub struct ConnectionLifecycle {
    registry: Arc<IdentityRegistry>,
    hub: Arc<ConnectionHub>,
    stats: Arc<RelayStats>,
    next_id: AtomicU64,
    queue_depth: usize,
}

impl ConnectionLifecycle {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        hub: Arc<ConnectionHub>,
        stats: Arc<RelayStats>,
        queue_depth: usize,
    ) -> Self {
        Self {
            registry,
            hub,
            stats,
            next_id: AtomicU64::new(1),
            queue_depth,
        }
    }

    /// A transport connection opened
    ///
    /// Allocates its id and outbound queue. No presence state is created;
    /// binding happens on `Identify`.
    pub fn on_connect(self: &Arc<Self>, remote: &str) -> (ConnectionGuard, Receiver<ServerEvent>) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let events = self.hub.attach(id, self.queue_depth);
        self.stats.connection_opened();
        info!("{} connected from {}", id, remote);

        let guard = ConnectionGuard {
            id,
            lifecycle: Arc::clone(self),
            closed: false,
        };
        (guard, events)
    }

    /// A transport connection closed
    ///
    /// Returns the identity that was bound to it, if any. Display name and
    /// device token stay registered.
    pub fn on_disconnect(&self, id: ConnectionId, reason: &DisconnectReason) -> Option<Identity> {
        self.hub.detach(id);
        self.stats.connection_closed();

        let identity = self.registry.unbind_connection(id);
        match &identity {
            Some(identity) => info!("{} ({}) disconnected: {}", id, identity.short(), reason),
            None => debug!("{} disconnected before identifying: {}", id, reason),
        }
        identity
    }
}

/// Ties presence teardown to the lifetime of a connection task
pub struct ConnectionGuard {
    id: ConnectionId,
    lifecycle: Arc<ConnectionLifecycle>,
    closed: bool,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Tear down with an explicit reason
    pub fn close(mut self, reason: DisconnectReason) -> Option<Identity> {
        self.closed = true;
        self.lifecycle.on_disconnect(self.id, &reason)
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        if !self.closed {
            self.closed = true;
            self.lifecycle
                .on_disconnect(self.id, &DisconnectReason::Aborted);
        }
    }
}
