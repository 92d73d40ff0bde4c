//! Push notification fallback
//!
//! When a recipient has no live connection, the relay wakes their device
//! through an external push provider. Delivery is best-effort: the provider
//! result is logged and counted, never reported to the message sender.
//!
//! ```text
//! PresenceRouter ──> PushDispatcher ──spawn──> PushGateway::send
//!                         (semaphore-bounded, one task per notification)
//! ```

pub mod dispatcher;
pub mod fcm;

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub use dispatcher::PushDispatcher;
pub use fcm::FcmGateway;

/// Data field carrying the notification kind
pub const KIND_FIELD: &str = "notification_type";

/// Delivery priority hint for the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PushPriority {
    #[default]
    Normal,
    /// Time-critical (call invitations), must not be deferred or batched
    High,
}

/// Notification handed to the push provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushNotification {
    /// Target device token
    pub token: String,
    /// Visible title; `None` for data-only notifications
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: BTreeMap<String, String>,
    pub priority: PushPriority,
}

impl PushNotification {
    /// Machine-readable kind tag, or "unknown"
    pub fn kind(&self) -> &str {
        self.data
            .get(KIND_FIELD)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    /// Data-only notifications show nothing to the user by themselves
    pub fn is_silent(&self) -> bool {
        self.title.is_none() && self.body.is_none()
    }
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Push provider not configured")]
    NotConfigured,

    #[error("Push transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Push provider rejected notification (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Push dispatcher shut down")]
    Shutdown,

    #[error("Push error: {0}")]
    Other(String),
}

/// Best-effort "deliver this notification to this device" capability
#[async_trait]
pub trait PushGateway: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    async fn send(&self, notification: &PushNotification) -> Result<(), PushError>;
}

/// Gateway used when no provider is configured
///
/// Every send fails with [`PushError::NotConfigured`], so offline recipients
/// show up as push failures in logs and counters.
#[derive(Debug, Default)]
pub struct DisabledGateway;

#[async_trait]
impl PushGateway for DisabledGateway {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn send(&self, _notification: &PushNotification) -> Result<(), PushError> {
        Err(PushError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn notification(data: &[(&str, &str)]) -> PushNotification {
        PushNotification {
            token: "tok".to_string(),
            title: None,
            body: None,
            data: data
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            priority: PushPriority::Normal,
        }
    }

    #[test]
    fn test_kind_from_data() {
        assert_eq!(notification(&[(KIND_FIELD, "missed_call")]).kind(), "missed_call");
        assert_eq!(notification(&[]).kind(), "unknown");
    }

    #[test]
    fn test_is_silent() {
        let mut n = notification(&[]);
        assert!(n.is_silent());
        n.title = Some("Missed Call".to_string());
        assert!(!n.is_silent());
    }

    #[tokio::test]
    async fn test_disabled_gateway_fails() {
        let result = DisabledGateway.send(&notification(&[])).await;
        assert!(matches!(result, Err(PushError::NotConfigured)));
    }
}
