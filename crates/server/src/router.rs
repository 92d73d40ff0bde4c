//! Presence router
//!
//! Per outgoing message: deliver directly when the target has a live
//! connection, otherwise wake its device through the push provider, otherwise
//! drop. The sender never learns which branch was taken.

use protocol::{ConnectionId, Identity, Payload, ServerEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::call_policy::{CallFallback, CallSignalingPolicy};
use crate::hub::{EventSink, SinkError};
use crate::push::{KIND_FIELD, PushDispatcher, PushNotification, PushPriority};
use crate::registry::IdentityRegistry;
use crate::stats::RelayStats;

/// Display name used when the sender never registered one
pub const DEFAULT_DISPLAY_NAME: &str = "A Friend";

pub const KIND_TEXT_MESSAGE: &str = "text_message";
pub const NEW_MESSAGE_BODY: &str = "You have a new message.";

/// Which client entry point a message came through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Chat,
    CallSignal,
}

/// How a routed message was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sender connection has not identified
    Unidentified,
    DeliveredDirect,
    DeliveredPush,
    /// Push provider failed or rejected the notification
    PushFailed,
    /// No live connection and no device token
    TargetUnreachable,
    /// Offline call signal without a push shape
    SignalDropped,
    /// Target's outbound queue is full
    QueueFull,
}

/// Visible "new message" notification for an offline chat recipient
pub fn chat_notification(token: String, sender_name: &str) -> PushNotification {
    PushNotification {
        token,
        title: Some(sender_name.to_string()),
        body: Some(NEW_MESSAGE_BODY.to_string()),
        data: BTreeMap::from([(KIND_FIELD.to_string(), KIND_TEXT_MESSAGE.to_string())]),
        priority: PushPriority::Normal,
    }
}

pub struct PresenceRouter {
    registry: Arc<IdentityRegistry>,
    sink: Arc<dyn EventSink>,
    push: PushDispatcher,
    call_policy: CallSignalingPolicy,
    stats: Arc<RelayStats>,
    default_display_name: String,
}

impl PresenceRouter {
    pub fn new(
        registry: Arc<IdentityRegistry>,
        sink: Arc<dyn EventSink>,
        push: PushDispatcher,
        stats: Arc<RelayStats>,
    ) -> Self {
        Self {
            registry,
            sink,
            push,
            call_policy: CallSignalingPolicy,
            stats,
            default_display_name: DEFAULT_DISPLAY_NAME.to_string(),
        }
    }

    pub fn with_default_display_name(mut self, name: impl Into<String>) -> Self {
        self.default_display_name = name.into();
        self
    }

    pub async fn route_message(
        &self,
        sender: ConnectionId,
        target: &Identity,
        message_type: &str,
        payload: Payload,
    ) -> DeliveryOutcome {
        self.route(sender, target, Channel::Chat, message_type, payload)
            .await
    }

    pub async fn route_call_signal(
        &self,
        sender: ConnectionId,
        target: &Identity,
        signal_type: &str,
        payload: Payload,
    ) -> DeliveryOutcome {
        self.route(sender, target, Channel::CallSignal, signal_type, payload)
            .await
    }

    /// Route one message from `sender_conn` to `target`
    ///
    /// Only the push branch suspends; it waits for the provider verdict of
    /// this notification alone.
    pub async fn route(
        &self,
        sender_conn: ConnectionId,
        target: &Identity,
        channel: Channel,
        message_type: &str,
        payload: Payload,
    ) -> DeliveryOutcome {
        let Some(sender) = self.registry.resolve_identity_by_connection(sender_conn) else {
            debug!("Ignoring {} from unidentified {}", message_type, sender_conn);
            self.stats.unidentified();
            return DeliveryOutcome::Unidentified;
        };

        if let Some(connection) = self.registry.resolve_connection_by_identity(target) {
            let event = match channel {
                Channel::Chat => ServerEvent::ReceiveMessage {
                    message_type: message_type.to_string(),
                    payload: payload.clone(),
                    sender: sender.clone(),
                },
                Channel::CallSignal => ServerEvent::CallSignalReceived {
                    signal_type: message_type.to_string(),
                    payload: payload.clone().into_text(),
                    sender: sender.clone(),
                },
            };

            match self.sink.send_to_connection(connection, event) {
                Ok(()) => {
                    debug!(
                        "{} {} -> {} delivered on {}",
                        message_type,
                        sender.short(),
                        target.short(),
                        connection
                    );
                    self.stats.delivered_direct();
                    return DeliveryOutcome::DeliveredDirect;
                }
                Err(SinkError::QueueFull) => {
                    warn!(
                        "Outbound queue of {} ({}) full, dropping {}",
                        connection,
                        target.short(),
                        message_type
                    );
                    self.stats.queue_overflow();
                    return DeliveryOutcome::QueueFull;
                }
                Err(SinkError::Closed) => {
                    debug!("{} is closing, falling back to push", connection);
                }
            }
        }

        let Some(token) = self.registry.resolve_device_token(target) else {
            debug!(
                "{} {} -> {} dropped: target offline without device token",
                message_type,
                sender.short(),
                target.short()
            );
            self.stats.unreachable();
            return DeliveryOutcome::TargetUnreachable;
        };

        let sender_name = self
            .registry
            .resolve_display_name(&sender)
            .unwrap_or_else(|| self.default_display_name.clone());

        let notification = match channel {
            Channel::Chat => chat_notification(token, &sender_name),
            Channel::CallSignal => {
                let payload_text = payload.to_text();
                let fallback = self.call_policy.fallback_notification(CallFallback {
                    signal_type: message_type,
                    device_token: &token,
                    caller: &sender,
                    caller_name: &sender_name,
                    payload: &payload_text,
                });
                match fallback {
                    Some(notification) => notification,
                    None => {
                        debug!(
                            "{} signal to offline {} has no push shape, dropped",
                            message_type,
                            target.short()
                        );
                        self.stats.signal_dropped();
                        return DeliveryOutcome::SignalDropped;
                    }
                }
            }
        };

        debug!(
            "{} {} -> {} via {} push",
            message_type,
            sender.short(),
            target.short(),
            self.push.gateway_name()
        );
        if self.push.deliver(notification).await {
            self.stats.push_delivered();
            DeliveryOutcome::DeliveredPush
        } else {
            self.stats.push_failed();
            DeliveryOutcome::PushFailed
        }
    }
}
