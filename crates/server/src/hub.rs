//! Outbound event hub
//!
//! Each live connection owns a bounded queue of server events drained by its
//! writer task. The router only sees the [`EventSink`] seam, so routing can be
//! tested without a network.

use async_channel::{Receiver, Sender, TrySendError};
use dashmap::DashMap;
use protocol::{ConnectionId, ServerEvent};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The connection is gone or tearing down
    #[error("Connection closed")]
    Closed,
    /// The connection is not draining its queue fast enough
    #[error("Outbound queue full")]
    QueueFull,
}

/// Transport capability "send this event to this connection"
pub trait EventSink: Send + Sync {
    fn send_to_connection(&self, connection: ConnectionId, event: ServerEvent)
    -> Result<(), SinkError>;
}

#[derive(Debug, Default)]
pub struct ConnectionHub {
    queues: DashMap<ConnectionId, Sender<ServerEvent>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the outbound queue for `connection`
    ///
    /// The returned receiver is drained by the connection's writer task.
    pub fn attach(&self, connection: ConnectionId, depth: usize) -> Receiver<ServerEvent> {
        let (tx, rx) = async_channel::bounded(depth.max(1));
        self.queues.insert(connection, tx);
        rx
    }

    /// Drop the outbound queue of `connection`, ending its writer task
    pub fn detach(&self, connection: ConnectionId) {
        if let Some((_, tx)) = self.queues.remove(&connection) {
            tx.close();
        }
    }

    pub fn is_attached(&self, connection: ConnectionId) -> bool {
        self.queues.contains_key(&connection)
    }
}

impl EventSink for ConnectionHub {
    fn send_to_connection(
        &self,
        connection: ConnectionId,
        event: ServerEvent,
    ) -> Result<(), SinkError> {
        let tx = self
            .queues
            .get(&connection)
            .map(|entry| entry.value().clone())
            .ok_or(SinkError::Closed)?;

        tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => SinkError::QueueFull,
            TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}
