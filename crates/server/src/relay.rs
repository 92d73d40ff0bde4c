//! Relay core
//!
//! Wires the registry, hub, lifecycle and router together and maps client
//! requests onto them. Transport code only talks to this type.

use protocol::{ClientRequest, ConnectionId};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::hub::ConnectionHub;
use crate::lifecycle::ConnectionLifecycle;
use crate::push::{PushDispatcher, PushGateway};
use crate::registry::IdentityRegistry;
use crate::router::{DeliveryOutcome, PresenceRouter};
use crate::stats::RelayStats;

pub struct RelayCore {
    registry: Arc<IdentityRegistry>,
    hub: Arc<ConnectionHub>,
    lifecycle: Arc<ConnectionLifecycle>,
    router: PresenceRouter,
    stats: Arc<RelayStats>,
}

impl RelayCore {
    pub fn new(config: &ServerConfig, gateway: Arc<dyn PushGateway>) -> Self {
        let registry = Arc::new(IdentityRegistry::new());
        let hub = Arc::new(ConnectionHub::new());
        let stats = Arc::new(RelayStats::new());

        let lifecycle = Arc::new(ConnectionLifecycle::new(
            registry.clone(),
            hub.clone(),
            stats.clone(),
            config.server.outbound_queue_depth,
        ));
        let router = PresenceRouter::new(
            registry.clone(),
            hub.clone(),
            PushDispatcher::new(gateway, config.push.max_in_flight),
            stats.clone(),
        )
        .with_default_display_name(config.routing.default_display_name.clone());

        Self {
            registry,
            hub,
            lifecycle,
            router,
            stats,
        }
    }

    pub fn lifecycle(&self) -> &Arc<ConnectionLifecycle> {
        &self.lifecycle
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &ConnectionHub {
        &self.hub
    }

    pub fn stats(&self) -> &RelayStats {
        &self.stats
    }

    /// Apply one client request from `connection`
    ///
    /// Returns the delivery outcome for sends, `None` for registry updates.
    /// Nothing is ever reported back to the client.
    pub async fn handle_request(
        &self,
        connection: ConnectionId,
        request: ClientRequest,
    ) -> Option<DeliveryOutcome> {
        match request {
            ClientRequest::Identify {
                identity,
                display_name,
            } => {
                let outcome = self.registry.bind_connection(connection, identity.clone());
                // An empty name keeps whatever was registered before
                if !display_name.trim().is_empty() {
                    self.registry.set_display_name(connection, display_name);
                }
                self.stats.identified();

                if let Some(old) = outcome.replaced_identity {
                    info!("{} re-identified: {} -> {}", connection, old.short(), identity.short());
                } else {
                    info!("{} identified as {}", connection, identity.short());
                }
                if let Some(stale) = outcome.evicted_connection {
                    debug!("{} superseded {} for {}", connection, stale, identity.short());
                }
                None
            }
            ClientRequest::RegisterDeviceToken { token } => {
                match self.registry.set_device_token(connection, token) {
                    Some(identity) => debug!("Registered device token for {}", identity.short()),
                    None => debug!("Ignoring device token from unidentified {}", connection),
                }
                None
            }
            ClientRequest::SendMessage {
                target,
                message_type,
                payload,
            } => Some(
                self.router
                    .route_message(connection, &target, &message_type, payload)
                    .await,
            ),
            ClientRequest::SendCallSignal {
                target,
                signal_type,
                payload,
            } => Some(
                self.router
                    .route_call_signal(connection, &target, &signal_type, payload)
                    .await,
            ),
        }
    }
}
