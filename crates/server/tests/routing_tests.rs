//! End-to-end routing through the relay core
//!
//! Drives `RelayCore` the way connection handlers do (connect, requests,
//! disconnect) and observes the per-connection event queues and a recording
//! push gateway. No network involved.

use async_channel::Receiver;
use async_trait::async_trait;
use protocol::{ClientRequest, Identity, Payload, ServerEvent};
use serde_json::json;
use server::config::ServerConfig;
use server::push::{PushError, PushGateway, PushNotification, PushPriority};
use server::{ConnectionGuard, DeliveryOutcome, DisconnectReason, RelayCore};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingGateway {
    sent: Mutex<Vec<PushNotification>>,
}

impl RecordingGateway {
    fn sent(&self) -> Vec<PushNotification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushGateway for RecordingGateway {
    fn name(&self) -> &str {
        "recording"
    }

    async fn send(&self, notification: &PushNotification) -> Result<(), PushError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct Client {
    guard: ConnectionGuard,
    events: Receiver<ServerEvent>,
}

fn relay() -> (RelayCore, Arc<RecordingGateway>) {
    let gateway = Arc::new(RecordingGateway::default());
    let core = RelayCore::new(&ServerConfig::default(), gateway.clone());
    (core, gateway)
}

fn connect(core: &RelayCore) -> Client {
    let (guard, events) = core.lifecycle().on_connect("test-peer");
    Client { guard, events }
}

async fn identify(core: &RelayCore, client: &Client, identity: &str, name: &str) {
    let outcome = core
        .handle_request(
            client.guard.id(),
            ClientRequest::Identify {
                identity: Identity::new(identity),
                display_name: name.to_string(),
            },
        )
        .await;
    assert_eq!(outcome, None);
}

async fn register_token(core: &RelayCore, client: &Client, token: &str) {
    core.handle_request(
        client.guard.id(),
        ClientRequest::RegisterDeviceToken {
            token: token.to_string(),
        },
    )
    .await;
}

async fn send_message(core: &RelayCore, from: &Client, to: &str, payload: Payload) -> DeliveryOutcome {
    core.handle_request(
        from.guard.id(),
        ClientRequest::SendMessage {
            target: Identity::new(to),
            message_type: "text".to_string(),
            payload,
        },
    )
    .await
    .unwrap()
}

async fn send_signal(core: &RelayCore, from: &Client, to: &str, signal: &str) -> DeliveryOutcome {
    core.handle_request(
        from.guard.id(),
        ClientRequest::SendCallSignal {
            target: Identity::new(to),
            signal_type: signal.to_string(),
            payload: Payload::Json(json!({"type": signal, "sdp": "v=0"})),
        },
    )
    .await
    .unwrap()
}

/// Bob registers a token, then disconnects
async fn offline_bob(core: &RelayCore) {
    let bob = connect(core);
    identify(core, &bob, "bob-key", "Bob").await;
    register_token(core, &bob, "bob-device").await;
    bob.guard.close(DisconnectReason::PeerClosed);
}

#[tokio::test]
async fn test_connected_target_receives_exactly_one_event() {
    let (core, gateway) = relay();
    let alice = connect(&core);
    let bob = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;
    identify(&core, &bob, "bob-key", "Bob").await;

    let outcome = send_message(&core, &alice, "bob-key", Payload::from("ciphertext")).await;

    assert_eq!(outcome, DeliveryOutcome::DeliveredDirect);
    assert_eq!(
        bob.events.try_recv().unwrap(),
        ServerEvent::ReceiveMessage {
            message_type: "text".to_string(),
            payload: Payload::from("ciphertext"),
            sender: Identity::new("alice-key"),
        }
    );
    assert!(bob.events.try_recv().is_err());
    assert!(alice.events.try_recv().is_err());
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn test_connected_target_receives_any_call_signal() {
    let (core, gateway) = relay();
    let alice = connect(&core);
    let bob = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;
    identify(&core, &bob, "bob-key", "Bob").await;

    for signal in ["offer", "answer", "ice-candidate", "hangup"] {
        assert_eq!(
            send_signal(&core, &alice, "bob-key", signal).await,
            DeliveryOutcome::DeliveredDirect
        );
        let event = bob.events.try_recv().unwrap();
        let ServerEvent::CallSignalReceived {
            signal_type,
            payload,
            sender,
        } = event
        else {
            panic!("Expected CallSignalReceived, got {:?}", event);
        };
        assert_eq!(signal_type, signal);
        assert!(payload.is_text());
        assert_eq!(sender, Identity::new("alice-key"));
    }
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn test_offline_target_gets_one_push_per_message() {
    let (core, gateway) = relay();
    offline_bob(&core).await;
    let alice = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;

    send_message(&core, &alice, "bob-key", Payload::from("one")).await;
    send_message(&core, &alice, "bob-key", Payload::from("two")).await;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|n| n.title.as_deref() == Some("Alice")));
    assert!(sent.iter().all(|n| n.token == "bob-device"));
}

#[tokio::test]
async fn test_push_title_defaults_without_display_name() {
    let (core, gateway) = relay();
    offline_bob(&core).await;
    let alice = connect(&core);
    identify(&core, &alice, "alice-key", "").await;

    assert_eq!(
        send_message(&core, &alice, "bob-key", Payload::from("hi")).await,
        DeliveryOutcome::DeliveredPush
    );
    assert_eq!(gateway.sent()[0].title.as_deref(), Some("A Friend"));
}

#[tokio::test]
async fn test_offline_offer_is_high_priority_with_fresh_call_id() {
    let (core, gateway) = relay();
    offline_bob(&core).await;
    let alice = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;

    send_signal(&core, &alice, "bob-key", "offer").await;
    send_signal(&core, &alice, "bob-key", "offer").await;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 2);
    for n in &sent {
        assert_eq!(n.priority, PushPriority::High);
        assert!(n.is_silent());
        assert_eq!(n.data["callerPublicKey"], "alice-key");
        assert_eq!(n.data["nameCaller"], "Alice");
    }
    assert_ne!(sent[0].data["id"], sent[1].data["id"]);
}

#[tokio::test]
async fn test_offline_offer_carries_json_as_compact_text() {
    let (core, gateway) = relay();
    offline_bob(&core).await;
    let alice = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;

    assert_eq!(
        send_signal(&core, &alice, "bob-key", "offer").await,
        DeliveryOutcome::DeliveredPush
    );

    let sent = gateway.sent();
    let handle = &sent[0].data["handle"];
    let parsed: serde_json::Value = serde_json::from_str(handle).unwrap();
    assert_eq!(parsed, json!({"type": "offer", "sdp": "v=0"}));
    // Compact form, the same text a connected callee would receive
    assert!(!handle.contains(char::is_whitespace));
}

#[tokio::test]
async fn test_offline_hangup_unanswered_is_missed_call() {
    let (core, gateway) = relay();
    offline_bob(&core).await;
    let alice = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;

    send_signal(&core, &alice, "bob-key", "hangup_unanswered").await;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title.as_deref(), Some("Missed Call"));
    assert_eq!(sent[0].body.as_deref(), Some("You missed a call from Alice."));
}

#[tokio::test]
async fn test_offline_answer_is_dropped() {
    let (core, gateway) = relay();
    offline_bob(&core).await;
    let alice = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;

    assert_eq!(
        send_signal(&core, &alice, "bob-key", "answer").await,
        DeliveryOutcome::SignalDropped
    );
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn test_token_survives_disconnect() {
    let (core, gateway) = relay();
    let bob = connect(&core);
    let bob_id = bob.guard.id();
    identify(&core, &bob, "bob-key", "Bob").await;
    register_token(&core, &bob, "bob-device").await;

    // Abrupt end: the guard is dropped without an explicit close
    drop(bob);

    assert_eq!(core.registry().resolve_identity_by_connection(bob_id), None);
    assert!(!core.hub().is_attached(bob_id));

    let alice = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;
    assert_eq!(
        send_message(&core, &alice, "bob-key", Payload::from("hi")).await,
        DeliveryOutcome::DeliveredPush
    );
    assert_eq!(gateway.sent().len(), 1);
}

#[tokio::test]
async fn test_unknown_target_is_noop() {
    let (core, gateway) = relay();
    let alice = connect(&core);
    let carol = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;
    identify(&core, &carol, "carol-key", "Carol").await;

    assert_eq!(
        send_message(&core, &alice, "nobody", Payload::from("hi")).await,
        DeliveryOutcome::TargetUnreachable
    );
    assert!(carol.events.try_recv().is_err());
    assert!(gateway.sent().is_empty());
    assert_eq!(core.stats().snapshot().unreachable, 1);
}

#[tokio::test]
async fn test_unidentified_sender_is_ignored() {
    let (core, gateway) = relay();
    let stranger = connect(&core);
    let bob = connect(&core);
    identify(&core, &bob, "bob-key", "Bob").await;

    assert_eq!(
        send_message(&core, &stranger, "bob-key", Payload::from("hi")).await,
        DeliveryOutcome::Unidentified
    );
    assert!(bob.events.try_recv().is_err());
    assert!(gateway.sent().is_empty());
}

#[tokio::test]
async fn test_reidentify_replaces_binding() {
    let (core, _gateway) = relay();
    let client = connect(&core);
    identify(&core, &client, "old-key", "Alice").await;
    identify(&core, &client, "new-key", "Alice").await;

    assert_eq!(
        core.registry()
            .resolve_connection_by_identity(&Identity::new("old-key")),
        None
    );
    assert_eq!(
        core.registry()
            .resolve_connection_by_identity(&Identity::new("new-key")),
        Some(client.guard.id())
    );
}

#[tokio::test]
async fn test_reconnect_supersedes_stale_connection() {
    let (core, _gateway) = relay();
    let first = connect(&core);
    identify(&core, &first, "bob-key", "Bob").await;
    let second = connect(&core);
    identify(&core, &second, "bob-key", "Bob").await;

    let alice = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;

    // Old connection closing late must not take Bob offline
    first.guard.close(DisconnectReason::IdleTimeout);

    assert_eq!(
        send_message(&core, &alice, "bob-key", Payload::from("hi")).await,
        DeliveryOutcome::DeliveredDirect
    );
    assert!(second.events.try_recv().is_ok());
}

#[tokio::test]
async fn test_full_queue_drops_event() {
    let mut config = ServerConfig::default();
    config.server.outbound_queue_depth = 1;
    let gateway = Arc::new(RecordingGateway::default());
    let core = RelayCore::new(&config, gateway.clone());

    let alice = connect(&core);
    let bob = connect(&core);
    identify(&core, &alice, "alice-key", "Alice").await;
    identify(&core, &bob, "bob-key", "Bob").await;

    assert_eq!(
        send_message(&core, &alice, "bob-key", Payload::from("1")).await,
        DeliveryOutcome::DeliveredDirect
    );
    assert_eq!(
        send_message(&core, &alice, "bob-key", Payload::from("2")).await,
        DeliveryOutcome::QueueFull
    );
    assert_eq!(core.stats().snapshot().queue_overflow, 1);
}
