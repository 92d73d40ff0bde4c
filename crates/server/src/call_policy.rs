//! Push shapes for call signaling
//!
//! Only the offline branch is specialised. A connected callee receives every
//! signal verbatim; an offline callee is woken for an offer and told about a
//! missed call on `hangup_unanswered`. Other signal types (answer, ICE
//! candidates, plain hangup) have no push shape and are dropped.

use std::collections::BTreeMap;
use uuid::Uuid;

use crate::push::{KIND_FIELD, PushNotification, PushPriority};
use protocol::Identity;

/// Call invitation
pub const SIGNAL_OFFER: &str = "offer";
/// Caller gave up before the callee answered
pub const SIGNAL_HANGUP_UNANSWERED: &str = "hangup_unanswered";

pub const KIND_INCOMING_CALL: &str = "incoming_call";
pub const KIND_MISSED_CALL: &str = "missed_call";

pub const MISSED_CALL_TITLE: &str = "Missed Call";

/// Data keys read by the mobile call UI
pub const FIELD_CALL_ID: &str = "id";
pub const FIELD_CALLER_NAME: &str = "nameCaller";
pub const FIELD_OFFER: &str = "handle";
pub const FIELD_CALLER_IDENTITY: &str = "callerPublicKey";

/// Everything the fallback needs to know about one undeliverable signal
#[derive(Debug, Clone, Copy)]
pub struct CallFallback<'a> {
    pub signal_type: &'a str,
    pub device_token: &'a str,
    pub caller: &'a Identity,
    pub caller_name: &'a str,
    /// Signal payload in textual form
    pub payload: &'a str,
}

/// Maps undeliverable call signals to push notifications
#[derive(Debug, Clone, Copy, Default)]
pub struct CallSignalingPolicy;

impl CallSignalingPolicy {
    /// Push notification for a signal whose callee is offline
    ///
    /// `None` means the signal has no push shape and should be dropped.
    pub fn fallback_notification(&self, call: CallFallback<'_>) -> Option<PushNotification> {
        match call.signal_type {
            SIGNAL_OFFER => Some(Self::incoming_call(call)),
            SIGNAL_HANGUP_UNANSWERED => Some(Self::missed_call(call)),
            _ => None,
        }
    }

    /// Silent, high-priority invitation the device turns into a ringing UI
    fn incoming_call(call: CallFallback<'_>) -> PushNotification {
        let data = BTreeMap::from([
            (KIND_FIELD.to_string(), KIND_INCOMING_CALL.to_string()),
            (FIELD_CALL_ID.to_string(), Uuid::new_v4().to_string()),
            (FIELD_CALLER_NAME.to_string(), call.caller_name.to_string()),
            (FIELD_OFFER.to_string(), call.payload.to_string()),
            (FIELD_CALLER_IDENTITY.to_string(), call.caller.to_string()),
        ]);

        PushNotification {
            token: call.device_token.to_string(),
            title: None,
            body: None,
            data,
            priority: PushPriority::High,
        }
    }

    fn missed_call(call: CallFallback<'_>) -> PushNotification {
        PushNotification {
            token: call.device_token.to_string(),
            title: Some(MISSED_CALL_TITLE.to_string()),
            body: Some(format!("You missed a call from {}.", call.caller_name)),
            data: BTreeMap::from([(KIND_FIELD.to_string(), KIND_MISSED_CALL.to_string())]),
            priority: PushPriority::Normal,
        }
    }
}
