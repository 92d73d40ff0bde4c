//! p2p-signal-client
//!
//! Command-line client for the signal relay: identifies, optionally registers
//! a push device token, then sends a chat message or call signal, or listens
//! for incoming events.

mod connection;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use common::setup_logging;
use connection::RelayConnection;
use iroh::PublicKey as EndpointId;
use protocol::{ClientRequest, Identity, Payload, ServerEvent};
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

/// Keeps the connection well inside the relay's idle timeout
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Parser, Debug)]
#[command(name = "p2p-signal-client")]
#[command(author, version, about = "P2P Signal Client - talk to a signal relay")]
#[command(long_about = "
Command-line client for p2p-signal-relay.

EXAMPLES:
    # Listen for messages addressed to an identity
    p2p-signal-client --relay <ENDPOINT_ID> --identity alice-key --name Alice listen

    # Send a chat message
    p2p-signal-client --relay <ENDPOINT_ID> --identity alice-key send bob-key text 'hello'

    # Send a call offer (JSON payload)
    p2p-signal-client --relay <ENDPOINT_ID> --identity alice-key call bob-key offer '{\"sdp\":\"v=0\"}'
")]
struct Args {
    /// Relay EndpointId
    #[arg(long, value_name = "ENDPOINT_ID")]
    relay: String,

    /// Public-key identity to announce
    #[arg(long, value_name = "KEY")]
    identity: String,

    /// Display name shown in the recipient's notifications
    #[arg(long, value_name = "NAME", default_value = "")]
    name: String,

    /// Push device token to register for this identity
    #[arg(long, value_name = "TOKEN")]
    device_token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print received events until Ctrl+C
    Listen,
    /// Send a chat message
    Send {
        target: String,
        message_type: String,
        payload: String,
    },
    /// Send a call signal (offer, answer, ice-candidate, hangup, hangup_unanswered)
    Call {
        target: String,
        signal_type: String,
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    setup_logging(&args.log_level).context("Failed to setup logging")?;

    let relay_id: EndpointId = args
        .relay
        .parse()
        .with_context(|| format!("Invalid relay EndpointId: {}", args.relay))?;

    let relay = RelayConnection::connect(relay_id).await?;

    relay
        .request(ClientRequest::Identify {
            identity: Identity::new(args.identity.clone()),
            display_name: args.name.clone(),
        })
        .await?;
    if let Some(token) = args.device_token.clone() {
        relay
            .request(ClientRequest::RegisterDeviceToken { token })
            .await?;
    }

    let result = match args.command {
        Command::Listen => listen(&relay).await,
        Command::Send {
            target,
            message_type,
            payload,
        } => {
            relay
                .request(ClientRequest::SendMessage {
                    target: Identity::new(target),
                    message_type,
                    payload: parse_payload(&payload),
                })
                .await
        }
        Command::Call {
            target,
            signal_type,
            payload,
        } => {
            relay
                .request(ClientRequest::SendCallSignal {
                    target: Identity::new(target),
                    signal_type,
                    payload: parse_payload(&payload),
                })
                .await
        }
    };

    relay.close().await;
    result
}

/// Print events until Ctrl+C or the relay goes away
async fn listen(relay: &RelayConnection) -> Result<()> {
    info!("Listening for events, press Ctrl+C to stop");
    let events = relay.spawn_event_reader();
    let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => println!("{}", describe(&event)),
                Err(_) => bail!("Connection to relay lost"),
            },
            _ = heartbeat.tick() => {
                match relay.heartbeat().await {
                    Ok(rtt) => tracing::debug!("Heartbeat RTT: {:?}", rtt),
                    Err(e) => warn!("Heartbeat failed: {:#}", e),
                }
            }
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, disconnecting");
                return Ok(());
            }
        }
    }
}

/// JSON objects and arrays become structured payloads, anything else is text
fn parse_payload(raw: &str) -> Payload {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(value) if value.is_object() || value.is_array() => Payload::Json(value),
        _ => Payload::Text(raw.to_string()),
    }
}

fn describe(event: &ServerEvent) -> String {
    match event {
        ServerEvent::ReceiveMessage {
            message_type,
            payload,
            sender,
        } => format!("[message:{}] {}: {}", message_type, sender, payload.to_text()),
        ServerEvent::CallSignalReceived {
            signal_type,
            payload,
            sender,
        } => format!("[call:{}] {}: {}", signal_type, sender, payload.to_text()),
    }
}
