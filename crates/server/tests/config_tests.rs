//! Integration tests for relay configuration parsing
//!
//! - Minimal and full configs
//! - Defaults for omitted sections
//! - Invalid configuration handling
//! - Save/load through the filesystem

use server::config::ServerConfig;
use std::path::PathBuf;

const MINIMAL_CONFIG: &str = r#"
[server]
log_level = "info"
"#;

const FULL_CONFIG: &str = r#"
[server]
log_level = "debug"
idle_timeout_secs = 60
outbound_queue_depth = 32
stats_interval_secs = 0

[iroh]
secret_key_path = "/var/lib/p2p-signal-relay/relay.key"

[push]
enabled = true
provider = "fcm"
project_id = "chat-app"
access_token = "ya29.token"
endpoint = "http://127.0.0.1:9099"
timeout_secs = 5
max_in_flight = 8

[routing]
default_display_name = "Someone"
"#;

#[test]
fn test_minimal_config_uses_defaults() {
    let config = ServerConfig::from_toml(MINIMAL_CONFIG).unwrap();

    assert_eq!(config.server.idle_timeout_secs, 120);
    assert_eq!(config.server.outbound_queue_depth, 256);
    assert!(config.iroh.secret_key_path.is_none());
    assert!(!config.push.enabled);
    assert_eq!(config.push.provider, "fcm");
    assert_eq!(config.routing.default_display_name, "A Friend");
}

#[test]
fn test_full_config() {
    let config = ServerConfig::from_toml(FULL_CONFIG).unwrap();

    assert_eq!(config.server.log_level, "debug");
    assert_eq!(config.server.idle_timeout_secs, 60);
    assert_eq!(config.server.outbound_queue_depth, 32);
    assert_eq!(config.server.stats_interval_secs, 0);
    assert_eq!(
        config.iroh.secret_key_path,
        Some(PathBuf::from("/var/lib/p2p-signal-relay/relay.key"))
    );
    assert!(config.push.enabled);
    assert_eq!(config.push.project_id.as_deref(), Some("chat-app"));
    assert_eq!(config.push.endpoint.as_deref(), Some("http://127.0.0.1:9099"));
    assert_eq!(config.push.max_in_flight, 8);
    assert_eq!(config.routing.default_display_name, "Someone");
}

#[test]
fn test_full_config_builds_fcm_gateway() {
    let config = ServerConfig::from_toml(FULL_CONFIG).unwrap();
    let gateway = config.push.build_gateway().unwrap();
    assert_eq!(gateway.name(), "fcm");
}

#[test]
fn test_invalid_configs_rejected() {
    let cases = [
        ("bad log level", "[server]\nlog_level = \"loud\"\n"),
        (
            "zero idle timeout",
            "[server]\nlog_level = \"info\"\nidle_timeout_secs = 0\n",
        ),
        (
            "zero queue depth",
            "[server]\nlog_level = \"info\"\noutbound_queue_depth = 0\n",
        ),
        (
            "push without project",
            "[server]\nlog_level = \"info\"\n[push]\nenabled = true\n",
        ),
        (
            "unknown provider",
            "[server]\nlog_level = \"info\"\n[push]\nenabled = true\nprovider = \"apns\"\nproject_id = \"p\"\n",
        ),
        (
            "blank default name",
            "[server]\nlog_level = \"info\"\n[routing]\ndefault_display_name = \"  \"\n",
        ),
        ("missing server section", "[push]\nenabled = false\n"),
    ];

    for (name, toml) in cases {
        assert!(ServerConfig::from_toml(toml).is_err(), "{} should be rejected", name);
    }
}

#[test]
fn test_save_and_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("server.toml");

    let mut config = ServerConfig::default();
    config.server.outbound_queue_depth = 7;
    config.routing.default_display_name = "Pal".to_string();
    config.save(&path).unwrap();

    let loaded = ServerConfig::load(Some(path)).unwrap();
    assert_eq!(loaded.server.outbound_queue_depth, 7);
    assert_eq!(loaded.routing.default_display_name, "Pal");
}

#[test]
fn test_load_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(ServerConfig::load(Some(dir.path().join("absent.toml"))).is_err());
}
