//! ALPN protocol identifier for p2p-signal-relay
//!
//! Clients and the relay must agree on this value during the QUIC handshake.

/// ALPN protocol identifier, version 1 of the signaling protocol
pub const ALPN_PROTOCOL: &[u8] = b"p2p-signal-relay/1";
