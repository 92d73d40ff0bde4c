//! Common utilities for p2p-signal-relay
//!
//! Shared between the relay and the client: error handling, logging setup,
//! the ALPN identifier and persistent iroh secret keys.

pub mod alpn;
pub mod error;
pub mod keys;
pub mod logging;

pub use alpn::ALPN_PROTOCOL;
pub use error::{Error, Result};
pub use keys::load_or_generate_secret_key;
pub use logging::setup_logging;
