//! Protocol message definitions
//!
//! Messages are grouped by direction:
//! - Client requests (identify, device token, chat, call signaling)
//! - Server events (received message, received call signal)
//! - Connection management (heartbeat)
//!
//! Client requests are fire-and-forget: the relay never answers them, so a
//! sender cannot tell whether (or how) a message was delivered.

use crate::types::{Identity, Payload};
use crate::version::ProtocolVersion;
use serde::{Deserialize, Serialize};

/// Top-level message envelope
///
/// All protocol messages are wrapped in this envelope which includes
/// the protocol version for compatibility checking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Protocol version of this message
    pub version: ProtocolVersion,
    /// Message payload
    pub payload: MessagePayload,
}

/// All message types in the protocol
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessagePayload {
    /// Client -> relay entry point
    Request(ClientRequest),

    /// Relay -> client event
    Event(ServerEvent),

    /// Keep-alive with timestamp for RTT measurement
    Heartbeat {
        sequence: u64,
        /// Client timestamp in milliseconds since epoch
        timestamp_ms: u64,
    },

    /// Heartbeat acknowledgment from relay
    HeartbeatAck {
        sequence: u64,
        client_timestamp_ms: u64,
        server_timestamp_ms: u64,
    },
}

/// Entry points a client may invoke on the relay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientRequest {
    /// Bind this connection to a public-key identity
    Identify {
        identity: Identity,
        display_name: String,
    },

    /// Register the push token used to wake this identity's device
    RegisterDeviceToken { token: String },

    /// Chat message for another identity
    SendMessage {
        target: Identity,
        message_type: String,
        payload: Payload,
    },

    /// WebRTC signaling message (offer, answer, ICE candidate, hangup)
    SendCallSignal {
        target: Identity,
        signal_type: String,
        payload: Payload,
    },
}

impl ClientRequest {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            ClientRequest::Identify { .. } => "Identify",
            ClientRequest::RegisterDeviceToken { .. } => "RegisterDeviceToken",
            ClientRequest::SendMessage { .. } => "SendMessage",
            ClientRequest::SendCallSignal { .. } => "SendCallSignal",
        }
    }
}

/// Events the relay delivers to a connected client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerEvent {
    /// A chat message from `sender`
    ReceiveMessage {
        message_type: String,
        payload: Payload,
        sender: Identity,
    },

    /// A call signaling message from `sender`
    CallSignalReceived {
        signal_type: String,
        payload: Payload,
        sender: Identity,
    },
}

impl ServerEvent {
    /// Event name as seen by clients
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ReceiveMessage { .. } => "ReceiveMessage",
            ServerEvent::CallSignalReceived { .. } => "CallSignalReceived",
        }
    }

    pub fn sender(&self) -> &Identity {
        match self {
            ServerEvent::ReceiveMessage { sender, .. } => sender,
            ServerEvent::CallSignalReceived { sender, .. } => sender,
        }
    }
}

impl Message {
    /// Wrap a payload in an envelope stamped with the current version
    pub fn new(payload: MessagePayload) -> Self {
        Self {
            version: crate::CURRENT_VERSION,
            payload,
        }
    }

    pub fn request(request: ClientRequest) -> Self {
        Self::new(MessagePayload::Request(request))
    }

    pub fn event(event: ServerEvent) -> Self {
        Self::new(MessagePayload::Event(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CURRENT_VERSION;

    #[test]
    fn test_message_constructors_stamp_version() {
        let msg = Message::request(ClientRequest::RegisterDeviceToken {
            token: "fcm-token".to_string(),
        });
        assert_eq!(msg.version, CURRENT_VERSION);
        assert!(matches!(
            msg.payload,
            MessagePayload::Request(ClientRequest::RegisterDeviceToken { .. })
        ));
    }

    #[test]
    fn test_event_names() {
        let sender = Identity::new("alice");
        let chat = ServerEvent::ReceiveMessage {
            message_type: "text".to_string(),
            payload: Payload::from("hi"),
            sender: sender.clone(),
        };
        let call = ServerEvent::CallSignalReceived {
            signal_type: "answer".to_string(),
            payload: Payload::from("sdp"),
            sender: sender.clone(),
        };

        assert_eq!(chat.name(), "ReceiveMessage");
        assert_eq!(call.name(), "CallSignalReceived");
        assert_eq!(call.sender(), &sender);
    }

    #[test]
    fn test_request_names() {
        let request = ClientRequest::SendCallSignal {
            target: Identity::new("bob"),
            signal_type: "offer".to_string(),
            payload: Payload::from("sdp"),
        };
        assert_eq!(request.name(), "SendCallSignal");
    }
}
