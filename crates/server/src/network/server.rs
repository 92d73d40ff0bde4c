//! Iroh relay endpoint
//!
//! Owns the iroh endpoint, accepts client connections and spawns a
//! [`ClientConnection`] per client.

use anyhow::{Context, Result};
use common::{ALPN_PROTOCOL, load_or_generate_secret_key};
use iroh::{Endpoint, PublicKey as EndpointId};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::connection::ClientConnection;
use crate::config::ServerConfig;
use crate::lifecycle::DisconnectReason;
use crate::relay::RelayCore;

/// How long startup waits for the endpoint to discover its addresses
const ONLINE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct RelayServer {
    /// Iroh network endpoint
    endpoint: Endpoint,
    core: Arc<RelayCore>,
    idle_timeout: Duration,
}

impl RelayServer {
    /// Create the endpoint with the relay's persistent identity
    pub async fn new(config: &ServerConfig, core: Arc<RelayCore>) -> Result<Self> {
        info!("Initializing relay endpoint...");

        // Load or generate persistent secret key for stable EndpointId
        let key_path = config.iroh.secret_key_path();
        let secret_key = load_or_generate_secret_key(key_path.as_deref())
            .context("Failed to load or generate secret key")?;

        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![ALPN_PROTOCOL.to_vec()])
            .bind()
            .await
            .context("Failed to create Iroh endpoint")?;

        if tokio::time::timeout(ONLINE_TIMEOUT, endpoint.online())
            .await
            .is_err()
        {
            warn!("Endpoint not online after {:?}, continuing", ONLINE_TIMEOUT);
        }

        info!("Relay EndpointId: {}", endpoint.id());

        Ok(Self {
            endpoint,
            core,
            idle_timeout: config.server.idle_timeout(),
        })
    }

    /// EndpointId clients dial to reach this relay
    pub fn endpoint_id(&self) -> EndpointId {
        self.endpoint.id()
    }

    pub fn local_addrs(&self) -> Vec<std::net::SocketAddr> {
        self.endpoint.bound_sockets().iter().copied().collect()
    }

    /// Accept connections until the endpoint closes
    pub async fn run(&self) -> Result<()> {
        info!("Relay running, waiting for connections...");

        while let Some(incoming) = self.endpoint.accept().await {
            let core = self.core.clone();
            let idle_timeout = self.idle_timeout;

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(incoming, core, idle_timeout).await {
                    error!("Connection error: {:#}", e);
                }
            });
        }

        warn!("Endpoint closed, no longer accepting connections");
        Ok(())
    }

    async fn handle_connection(
        incoming: iroh::endpoint::Incoming,
        core: Arc<RelayCore>,
        idle_timeout: Duration,
    ) -> Result<()> {
        let connection = incoming.await.context("Failed to establish connection")?;
        let remote = connection.remote_id();
        debug!("Accepted connection from: {}", remote);

        let reason = ClientConnection::new(remote, connection, core, idle_timeout)
            .run()
            .await;

        if let DisconnectReason::Error(e) = reason {
            debug!("Connection from {} ended with error: {}", remote, e);
        }
        Ok(())
    }

    /// Close the endpoint and every open connection
    pub async fn shutdown(self) {
        info!("Shutting down relay endpoint...");
        self.endpoint.close().await;
        info!("Relay endpoint closed");
    }
}
