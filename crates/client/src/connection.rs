//! Relay connection
//!
//! Requests go out one per unidirectional stream, heartbeats use a
//! bidirectional stream, and relay events arrive on unidirectional streams
//! opened by the relay.

use anyhow::{Context, Result, anyhow};
use async_channel::{Receiver, Sender};
use common::ALPN_PROTOCOL;
use iroh::endpoint::Connection;
use iroh::{Endpoint, PublicKey as EndpointId};
use protocol::{
    ClientRequest, Message, MessagePayload, ServerEvent, read_message_async, validate_version,
    write_message_async,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// Timeout for a heartbeat round-trip
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(10);

/// Events buffered between the reader task and the consumer
const EVENT_BUFFER: usize = 64;

pub struct RelayConnection {
    relay_id: EndpointId,
    endpoint: Endpoint,
    connection: Connection,
    next_sequence: AtomicU64,
}

impl RelayConnection {
    /// Dial the relay with a fresh endpoint
    pub async fn connect(relay_id: EndpointId) -> Result<Self> {
        let endpoint = Endpoint::builder()
            .alpns(vec![ALPN_PROTOCOL.to_vec()])
            .bind()
            .await
            .context("Failed to create Iroh endpoint")?;

        info!("Connecting to relay: {}", relay_id);
        let connection = endpoint
            .connect(relay_id, ALPN_PROTOCOL)
            .await
            .context("Failed to connect to relay")?;
        info!("Connected to relay: {}", relay_id);

        Ok(Self {
            relay_id,
            endpoint,
            connection,
            next_sequence: AtomicU64::new(1),
        })
    }

    /// Send one request; the relay never answers
    ///
    /// Waits until the relay has acknowledged the stream data so that a
    /// following close does not discard it.
    pub async fn request(&self, request: ClientRequest) -> Result<()> {
        let name = request.name();
        let mut send = self
            .connection
            .open_uni()
            .await
            .context("Failed to open request stream")?;

        write_message_async(&mut send, &Message::request(request))
            .await
            .with_context(|| format!("Failed to write {}", name))?;
        send.finish().context("Failed to finish request stream")?;
        if let Err(e) = send.stopped().await {
            debug!("{} stream ended early: {}", name, e);
        }

        debug!("Sent {}", name);
        Ok(())
    }

    /// Heartbeat round-trip, returning the measured RTT
    pub async fn heartbeat(&self) -> Result<Duration> {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();

        let exchange = async {
            let (mut send, mut recv) = self
                .connection
                .open_bi()
                .await
                .context("Failed to open heartbeat stream")?;

            let heartbeat = Message::new(MessagePayload::Heartbeat {
                sequence,
                timestamp_ms: now_ms(),
            });
            write_message_async(&mut send, &heartbeat).await?;
            send.finish().context("Failed to finish heartbeat stream")?;

            let response = read_message_async(&mut recv)
                .await
                .context("Failed to read heartbeat ack")?;
            validate_version(&response.version).context("Incompatible protocol version")?;
            Ok::<_, anyhow::Error>(response)
        };

        let response = tokio::time::timeout(HEARTBEAT_TIMEOUT, exchange)
            .await
            .context("Heartbeat timeout")??;

        match response.payload {
            MessagePayload::HeartbeatAck { sequence: ack, .. } if ack == sequence => {
                Ok(started.elapsed())
            }
            MessagePayload::HeartbeatAck { sequence: ack, .. } => Err(anyhow!(
                "Heartbeat sequence mismatch: expected {}, got {}",
                sequence,
                ack
            )),
            other => Err(anyhow!("Unexpected response to Heartbeat: {:?}", other)),
        }
    }

    /// Start reading relay events on a background task
    ///
    /// Each event stream is read to completion by the task, so consumers can
    /// `select!` on the returned receiver without losing a half-read event.
    /// The receiver closes once the connection is lost.
    pub fn spawn_event_reader(&self) -> Receiver<ServerEvent> {
        let (tx, rx) = async_channel::bounded(EVENT_BUFFER);
        tokio::spawn(read_events(self.connection.clone(), tx));
        rx
    }

    /// Close the connection
    pub async fn close(self) {
        info!("Closing connection to relay: {}", self.relay_id);
        self.connection.close(0u32.into(), b"client shutdown");
        self.endpoint.close().await;
    }
}

async fn read_events(connection: Connection, events: Sender<ServerEvent>) {
    loop {
        let mut recv = match connection.accept_uni().await {
            Ok(recv) => recv,
            Err(e) => {
                warn!("Connection to relay lost: {}", e);
                break;
            }
        };

        match read_event(&mut recv).await {
            Ok(Some(event)) => {
                if events.send(event).await.is_err() {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Dropping event stream: {:#}", e),
        }
    }
    events.close();
}

/// Read one event frame; `None` for frames that are not events
async fn read_event<R>(recv: &mut R) -> Result<Option<ServerEvent>>
where
    R: AsyncReadExt + Unpin,
{
    let message = read_message_async(recv)
        .await
        .context("Failed to read event")?;
    if let Err(e) = validate_version(&message.version) {
        warn!("Dropping event: {}", e);
        return Ok(None);
    }

    match message.payload {
        MessagePayload::Event(event) => Ok(Some(event)),
        other => {
            warn!("Unexpected message from relay: {:?}", other);
            Ok(None)
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
