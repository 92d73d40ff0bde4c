//! Network subsystem
//!
//! Iroh QUIC transport for the relay core.
//!
//! # Architecture
//!
//! ```text
//! RelayServer
//!   ├─> accept connections
//!   └─> spawn ClientConnection per client
//!         ├─> uni stream per request   -> RelayCore::handle_request
//!         ├─> bi stream per heartbeat  -> HeartbeatAck
//!         ├─> writer task              <- ConnectionHub queue (uni stream per event)
//!         └─> lifecycle guard          -> unbind on disconnect
//! ```

pub mod connection;
pub mod server;

pub use connection::ClientConnection;
pub use server::RelayServer;
