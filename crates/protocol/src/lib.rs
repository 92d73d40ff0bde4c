//! Protocol library for p2p-signal-relay
//!
//! This crate defines the message protocol spoken between chat clients and
//! the signaling relay. It provides type-safe message definitions,
//! serialization/deserialization using postcard, and protocol versioning.
//!
//! # Example
//!
//! ```
//! use protocol::{ClientRequest, Identity, Message, MessagePayload, Payload};
//! use protocol::{decode_framed, encode_framed};
//!
//! let msg = Message::request(ClientRequest::SendMessage {
//!     target: Identity::new("bob-public-key"),
//!     message_type: "text".to_string(),
//!     payload: Payload::from("ciphertext"),
//! });
//!
//! let framed = encode_framed(&msg).unwrap();
//! let decoded = decode_framed(&framed).unwrap();
//! assert!(matches!(decoded.payload, MessagePayload::Request(_)));
//! ```

pub mod account;
pub mod codec;
pub mod error;
pub mod messages;
pub mod types;
pub mod version;

pub use account::{AccountValidationError, AuthResponse, LoginRequest, RegisterRequest};
pub use codec::{
    MAX_FRAME_SIZE, decode_framed, decode_message, encode_framed, encode_message,
    validate_version,
};

#[cfg(feature = "async")]
pub use codec::{read_message_async, write_message_async};
pub use error::{ProtocolError, Result};
pub use messages::{ClientRequest, Message, MessagePayload, ServerEvent};
pub use types::{ConnectionId, Identity, Payload};
pub use version::{CURRENT_VERSION, ProtocolVersion};
