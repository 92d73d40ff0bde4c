//! Identity registry
//!
//! Bidirectional mapping between live connections and public-key identities,
//! plus the per-identity attributes that outlive a connection (display name,
//! push device token).
//!
//! Every operation is atomic per key. Cross-map updates are not transactional:
//! a concurrent reader may briefly see one direction updated before the other.
//! Disconnect cleanup is keyed by connection and only removes reverse entries
//! that still point at that connection, so the maps converge.

use dashmap::DashMap;
use protocol::{ConnectionId, Identity};

/// What a bind displaced, for logging
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindOutcome {
    /// Identity this connection was previously bound to, if it changed
    pub replaced_identity: Option<Identity>,
    /// Older connection that was still bound to the identity
    pub evicted_connection: Option<ConnectionId>,
}

#[derive(Debug, Default)]
pub struct IdentityRegistry {
    /// connection -> identity
    identities: DashMap<ConnectionId, Identity>,
    /// identity -> connection
    connections: DashMap<Identity, ConnectionId>,
    /// identity -> push device token
    device_tokens: DashMap<Identity, String>,
    /// identity -> display name
    display_names: DashMap<Identity, String>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `connection` to `identity`; the most recent bind wins
    ///
    /// Re-identifying a connection under a new identity releases the old
    /// identity. If the identity was still bound to another connection, that
    /// connection's reverse entry is evicted immediately instead of lingering
    /// until its own disconnect.
    pub fn bind_connection(&self, connection: ConnectionId, identity: Identity) -> BindOutcome {
        let mut outcome = BindOutcome::default();

        if let Some(previous) = self.identities.insert(connection, identity.clone()) {
            if previous != identity {
                self.connections
                    .remove_if(&previous, |_, bound| *bound == connection);
                outcome.replaced_identity = Some(previous);
            }
        }

        if let Some(stale) = self.connections.insert(identity.clone(), connection) {
            if stale != connection {
                self.identities
                    .remove_if(&stale, |_, bound| *bound == identity);
                outcome.evicted_connection = Some(stale);
            }
        }

        outcome
    }

    /// Remove the presence entries of `connection`
    ///
    /// Returns the identity that was bound, if any. Display name and device
    /// token are kept.
    pub fn unbind_connection(&self, connection: ConnectionId) -> Option<Identity> {
        let (_, identity) = self.identities.remove(&connection)?;
        self.connections
            .remove_if(&identity, |_, bound| *bound == connection);
        Some(identity)
    }

    /// Set the display name of the identity bound to `connection`
    ///
    /// Returns the identity updated, or `None` if the connection has not
    /// identified yet (nothing is stored).
    pub fn set_display_name(
        &self,
        connection: ConnectionId,
        name: impl Into<String>,
    ) -> Option<Identity> {
        let identity = self.resolve_identity_by_connection(connection)?;
        self.display_names.insert(identity.clone(), name.into());
        Some(identity)
    }

    /// Set the push device token of the identity bound to `connection`
    pub fn set_device_token(
        &self,
        connection: ConnectionId,
        token: impl Into<String>,
    ) -> Option<Identity> {
        let identity = self.resolve_identity_by_connection(connection)?;
        self.device_tokens.insert(identity.clone(), token.into());
        Some(identity)
    }

    pub fn resolve_identity_by_connection(&self, connection: ConnectionId) -> Option<Identity> {
        self.identities.get(&connection).map(|e| e.value().clone())
    }

    pub fn resolve_connection_by_identity(&self, identity: &Identity) -> Option<ConnectionId> {
        self.connections.get(identity).map(|e| *e.value())
    }

    pub fn resolve_device_token(&self, identity: &Identity) -> Option<String> {
        self.device_tokens.get(identity).map(|e| e.value().clone())
    }

    /// Registered display name; callers apply their own default
    pub fn resolve_display_name(&self, identity: &Identity) -> Option<String> {
        self.display_names.get(identity).map(|e| e.value().clone())
    }

    /// Number of identities with a live connection
    pub fn online_count(&self) -> usize {
        self.connections.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn id(s: &str) -> Identity {
        Identity::new(s)
    }

    #[test]
    fn test_bind_and_resolve_both_directions() {
        let registry = IdentityRegistry::new();
        let outcome = registry.bind_connection(ConnectionId(1), id("alice"));

        assert_eq!(outcome, BindOutcome::default());
        assert_eq!(
            registry.resolve_identity_by_connection(ConnectionId(1)),
            Some(id("alice"))
        );
        assert_eq!(
            registry.resolve_connection_by_identity(&id("alice")),
            Some(ConnectionId(1))
        );
        assert_eq!(registry.online_count(), 1);
    }

    #[test]
    fn test_reidentify_releases_old_identity() {
        let registry = IdentityRegistry::new();
        registry.bind_connection(ConnectionId(1), id("alice"));
        let outcome = registry.bind_connection(ConnectionId(1), id("alice-2"));

        assert_eq!(outcome.replaced_identity, Some(id("alice")));
        assert_eq!(registry.resolve_connection_by_identity(&id("alice")), None);
        assert_eq!(
            registry.resolve_connection_by_identity(&id("alice-2")),
            Some(ConnectionId(1))
        );
    }

    #[test]
    fn test_rebind_identity_evicts_stale_connection() {
        let registry = IdentityRegistry::new();
        registry.bind_connection(ConnectionId(1), id("alice"));
        let outcome = registry.bind_connection(ConnectionId(2), id("alice"));

        assert_eq!(outcome.evicted_connection, Some(ConnectionId(1)));
        assert_eq!(registry.resolve_identity_by_connection(ConnectionId(1)), None);
        assert_eq!(
            registry.resolve_connection_by_identity(&id("alice")),
            Some(ConnectionId(2))
        );

        // The old connection closing later must not unbind the new one
        assert_eq!(registry.unbind_connection(ConnectionId(1)), None);
        assert_eq!(
            registry.resolve_connection_by_identity(&id("alice")),
            Some(ConnectionId(2))
        );
    }

    #[test]
    fn test_repeat_identify_is_idempotent() {
        let registry = IdentityRegistry::new();
        registry.bind_connection(ConnectionId(5), id("alice"));
        let outcome = registry.bind_connection(ConnectionId(5), id("alice"));
        assert_eq!(outcome, BindOutcome::default());
        assert_eq!(
            registry.resolve_connection_by_identity(&id("alice")),
            Some(ConnectionId(5))
        );
    }

    #[test]
    fn test_unbind_keeps_name_and_token() {
        let registry = IdentityRegistry::new();
        registry.bind_connection(ConnectionId(1), id("bob"));
        registry.set_display_name(ConnectionId(1), "Bob");
        registry.set_device_token(ConnectionId(1), "token-b");

        assert_eq!(registry.unbind_connection(ConnectionId(1)), Some(id("bob")));
        assert_eq!(registry.unbind_connection(ConnectionId(1)), None);

        assert_eq!(registry.resolve_identity_by_connection(ConnectionId(1)), None);
        assert_eq!(registry.resolve_connection_by_identity(&id("bob")), None);
        assert_eq!(registry.resolve_display_name(&id("bob")).as_deref(), Some("Bob"));
        assert_eq!(
            registry.resolve_device_token(&id("bob")).as_deref(),
            Some("token-b")
        );
    }

    #[test]
    fn test_attributes_require_identified_connection() {
        let registry = IdentityRegistry::new();
        assert_eq!(registry.set_display_name(ConnectionId(9), "Ghost"), None);
        assert_eq!(registry.set_device_token(ConnectionId(9), "tok"), None);
        assert_eq!(registry.resolve_display_name(&id("Ghost")), None);
    }

    #[test]
    fn test_token_overwrite() {
        let registry = IdentityRegistry::new();
        registry.bind_connection(ConnectionId(1), id("bob"));
        registry.set_device_token(ConnectionId(1), "old");
        registry.set_device_token(ConnectionId(1), "new");
        assert_eq!(registry.resolve_device_token(&id("bob")).as_deref(), Some("new"));
    }

    #[test]
    fn test_concurrent_binds_converge() {
        let registry = Arc::new(IdentityRegistry::new());
        let handles: Vec<_> = (0..8u64)
            .map(|t| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    for i in 0..500u64 {
                        let conn = ConnectionId(t * 1000 + i);
                        let identity = Identity::new(format!("user-{}", i % 16));
                        registry.bind_connection(conn, identity);
                        if i % 3 == 0 {
                            registry.unbind_connection(conn);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // Every identity -> connection entry must round-trip
        for i in 0..16 {
            let identity = Identity::new(format!("user-{}", i));
            if let Some(conn) = registry.resolve_connection_by_identity(&identity) {
                assert_eq!(
                    registry.resolve_identity_by_connection(conn),
                    Some(identity)
                );
            }
        }
        assert!(registry.online_count() <= 16);
    }
}
