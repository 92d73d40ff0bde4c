//! Client Connection Handler
//!
//! Serves one iroh connection: requests arrive one per unidirectional stream,
//! heartbeats on bidirectional streams, and queued server events leave on
//! their own unidirectional streams from a writer task.

use anyhow::{Context, Result};
use async_channel::Receiver;
use iroh::PublicKey as EndpointId;
use iroh::endpoint::{Connection, ConnectionError, RecvStream, SendStream};
use protocol::{
    ClientRequest, ConnectionId, Message, MessagePayload, ServerEvent, read_message_async,
    validate_version, write_message_async,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncReadExt;
use tokio::time::{self, Instant};
use tracing::{debug, error, info, trace, warn};

use crate::lifecycle::DisconnectReason;
use crate::relay::RelayCore;

/// Timeout for reading one request or heartbeat frame
///
/// Streams are read inline, so this also bounds how long one stalled stream
/// holds up the connection's other streams and idle timer.
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-client connection handler
pub struct ClientConnection {
    /// Client's EndpointId
    endpoint_id: EndpointId,
    /// QUIC connection
    connection: Connection,
    core: Arc<RelayCore>,
    /// Close the connection after this long without inbound streams
    idle_timeout: Duration,
}

impl ClientConnection {
    pub fn new(
        endpoint_id: EndpointId,
        connection: Connection,
        core: Arc<RelayCore>,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            endpoint_id,
            connection,
            core,
            idle_timeout,
        }
    }

    /// Run the connection handler until the connection ends
    ///
    /// Presence cleanup is owned by the lifecycle guard, so it also runs if
    /// this future is dropped or panics.
    pub async fn run(self) -> DisconnectReason {
        let (guard, events) = self
            .core
            .lifecycle()
            .on_connect(&self.endpoint_id.to_string());
        let id = guard.id();

        tokio::spawn(Self::write_events(self.connection.clone(), events, id));

        let reason = self.serve(id).await;

        if !matches!(reason, DisconnectReason::PeerClosed | DisconnectReason::Shutdown) {
            self.connection
                .close(0u32.into(), reason.to_string().as_bytes());
        }
        guard.close(reason.clone());
        reason
    }

    /// Accept streams until the connection closes or goes idle
    async fn serve(&self, id: ConnectionId) -> DisconnectReason {
        let idle = time::sleep(self.idle_timeout);
        tokio::pin!(idle);

        loop {
            tokio::select! {
                stream = self.connection.accept_uni() => {
                    match stream {
                        Ok(recv) => {
                            idle.as_mut().reset(Instant::now() + self.idle_timeout);
                            if let Err(e) = self.handle_request_stream(id, recv).await {
                                warn!("{}: dropped request: {:#}", id, e);
                            }
                        }
                        Err(e) => return Self::close_reason(e),
                    }
                }

                stream = self.connection.accept_bi() => {
                    match stream {
                        Ok((send, recv)) => {
                            idle.as_mut().reset(Instant::now() + self.idle_timeout);
                            if let Err(e) = Self::handle_heartbeat_stream(id, send, recv).await {
                                debug!("{}: heartbeat failed: {:#}", id, e);
                            }
                        }
                        Err(e) => return Self::close_reason(e),
                    }
                }

                _ = &mut idle => {
                    info!("{}: idle for {:?}, closing", id, self.idle_timeout);
                    return DisconnectReason::IdleTimeout;
                }
            }
        }
    }

    fn close_reason(error: ConnectionError) -> DisconnectReason {
        match error {
            ConnectionError::ApplicationClosed(_) => DisconnectReason::PeerClosed,
            ConnectionError::LocallyClosed => DisconnectReason::Shutdown,
            other => DisconnectReason::Error(other.to_string()),
        }
    }

    /// Read one request and apply it
    ///
    /// Registry updates are applied before the next stream is accepted so a
    /// client's `Identify` always precedes its sends. Sends run on their own
    /// task; a slow push provider never stalls this connection.
    async fn handle_request_stream(&self, id: ConnectionId, mut recv: RecvStream) -> Result<()> {
        let message = read_frame(&mut recv, MESSAGE_TIMEOUT)
            .await
            .context("Failed to read request")?;

        let request = match message.payload {
            MessagePayload::Request(request) => request,
            other => {
                warn!("{}: unexpected message on request stream: {:?}", id, other);
                return Ok(());
            }
        };
        trace!("{}: {}", id, request.name());

        match request {
            ClientRequest::SendMessage { .. } | ClientRequest::SendCallSignal { .. } => {
                let core = self.core.clone();
                tokio::spawn(async move {
                    if let Some(outcome) = core.handle_request(id, request).await {
                        trace!("{}: routed with outcome {:?}", id, outcome);
                    }
                });
            }
            _ => {
                self.core.handle_request(id, request).await;
            }
        }

        Ok(())
    }

    /// Answer a heartbeat on its bidirectional stream
    async fn handle_heartbeat_stream(
        id: ConnectionId,
        mut send: SendStream,
        mut recv: RecvStream,
    ) -> Result<()> {
        let message = read_frame(&mut recv, MESSAGE_TIMEOUT)
            .await
            .context("Failed to read heartbeat")?;

        let MessagePayload::Heartbeat {
            sequence,
            timestamp_ms,
        } = message.payload
        else {
            warn!("{}: expected Heartbeat, got {:?}", id, message.payload);
            return Ok(());
        };

        trace!("{}: heartbeat seq={}", id, sequence);
        let ack = Message::new(MessagePayload::HeartbeatAck {
            sequence,
            client_timestamp_ms: timestamp_ms,
            server_timestamp_ms: now_ms(),
        });
        write_message_async(&mut send, &ack).await?;
        send.finish().context("Failed to finish heartbeat response")?;
        Ok(())
    }

    /// Drain the outbound queue, one unidirectional stream per event
    ///
    /// Ends when the queue is closed on disconnect or the connection fails.
    async fn write_events(connection: Connection, events: Receiver<ServerEvent>, id: ConnectionId) {
        while let Ok(event) = events.recv().await {
            let name = event.name();
            if let Err(e) = Self::send_event(&connection, event).await {
                debug!("{}: failed to send {}: {:#}", id, name, e);
                break;
            }
            trace!("{}: sent {}", id, name);
        }
        events.close();
        trace!("{}: event writer stopped", id);
    }

    async fn send_event(connection: &Connection, event: ServerEvent) -> Result<()> {
        let mut send = connection
            .open_uni()
            .await
            .context("Failed to open event stream")?;
        write_message_async(&mut send, &Message::event(event)).await?;
        send.finish().context("Failed to finish event stream")?;
        Ok(())
    }
}

/// Read one version-checked frame, giving up after `limit`
async fn read_frame<R>(recv: &mut R, limit: Duration) -> Result<Message>
where
    R: AsyncReadExt + Unpin,
{
    let message = time::timeout(limit, read_message_async(recv))
        .await
        .context("Timeout reading frame")??;
    validate_version(&message.version).context("Protocol version mismatch")?;
    Ok(message)
}

fn now_ms() -> u64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as u64,
        Err(e) => {
            error!("System clock before UNIX epoch: {}", e);
            0
        }
    }
}
