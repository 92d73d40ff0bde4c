//! Relay configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::push::{DisabledGateway, FcmGateway, PushGateway};
use crate::router::DEFAULT_DISPLAY_NAME;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server: ServerSettings,
    #[serde(default)]
    pub iroh: IrohSettings,
    /// Push notification fallback
    #[serde(default)]
    pub push: PushSettings,
    #[serde(default)]
    pub routing: RoutingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub log_level: String,
    /// Close connections without inbound traffic for this long
    #[serde(default = "ServerSettings::default_idle_timeout")]
    pub idle_timeout_secs: u64,
    /// Pending events per connection before new ones are dropped
    #[serde(default = "ServerSettings::default_queue_depth")]
    pub outbound_queue_depth: usize,
    /// Relay statistics logging interval in seconds (0 = disabled)
    #[serde(default = "ServerSettings::default_stats_interval")]
    pub stats_interval_secs: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            idle_timeout_secs: Self::default_idle_timeout(),
            outbound_queue_depth: Self::default_queue_depth(),
            stats_interval_secs: Self::default_stats_interval(),
        }
    }
}

impl ServerSettings {
    fn default_idle_timeout() -> u64 {
        120
    }

    fn default_queue_depth() -> usize {
        256
    }

    fn default_stats_interval() -> u64 {
        300
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IrohSettings {
    /// Persistent endpoint key; a default location is used when unset
    pub secret_key_path: Option<PathBuf>,
}

impl IrohSettings {
    /// Secret key path with `~` expanded
    pub fn secret_key_path(&self) -> Option<PathBuf> {
        self.secret_key_path
            .as_ref()
            .map(|p| PathBuf::from(shellexpand::tilde(&p.to_string_lossy()).into_owned()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSettings {
    #[serde(default)]
    pub enabled: bool,
    /// Push provider (only "fcm" is supported)
    #[serde(default = "PushSettings::default_provider")]
    pub provider: String,
    /// Firebase project id
    #[serde(default)]
    pub project_id: Option<String>,
    /// Bearer token; falls back to the FCM_ACCESS_TOKEN environment variable
    #[serde(default)]
    pub access_token: Option<String>,
    /// Provider base URL override
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "PushSettings::default_timeout")]
    pub timeout_secs: u64,
    /// Concurrent provider calls
    #[serde(default = "PushSettings::default_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: Self::default_provider(),
            project_id: None,
            access_token: None,
            endpoint: None,
            timeout_secs: Self::default_timeout(),
            max_in_flight: Self::default_max_in_flight(),
        }
    }
}

impl PushSettings {
    fn default_provider() -> String {
        "fcm".to_string()
    }

    fn default_timeout() -> u64 {
        10
    }

    fn default_max_in_flight() -> usize {
        64
    }

    /// Build the configured push gateway
    ///
    /// Disabled push yields a gateway whose sends always fail.
    pub fn build_gateway(&self) -> Result<Arc<dyn PushGateway>> {
        if !self.enabled {
            return Ok(Arc::new(DisabledGateway));
        }

        match self.provider.as_str() {
            "fcm" => Ok(Arc::new(FcmGateway::from_settings(self)?)),
            other => Err(anyhow!("Unsupported push provider '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingSettings {
    /// Sender name shown in notifications when none was registered
    #[serde(default = "RoutingSettings::default_display_name")]
    pub default_display_name: String,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            default_display_name: Self::default_display_name(),
        }
    }
}

impl RoutingSettings {
    fn default_display_name() -> String {
        DEFAULT_DISPLAY_NAME.to_string()
    }
}

impl ServerConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/p2p-signal-relay/server.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Invalid config file: {}", config_path.display()))?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Parse and validate TOML configuration text
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(content).context("Failed to parse config")?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("p2p-signal-relay").join("server.toml")
        } else {
            PathBuf::from(".config/p2p-signal-relay/server.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.server.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.server.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.server.idle_timeout_secs == 0 {
            return Err(anyhow!("server.idle_timeout_secs must be greater than 0"));
        }
        if self.server.outbound_queue_depth == 0 {
            return Err(anyhow!("server.outbound_queue_depth must be greater than 0"));
        }

        if self.push.max_in_flight == 0 {
            return Err(anyhow!("push.max_in_flight must be greater than 0"));
        }
        if self.push.enabled {
            if self.push.provider != "fcm" {
                return Err(anyhow!(
                    "Unsupported push provider '{}', must be 'fcm'",
                    self.push.provider
                ));
            }
            if self.push.project_id.as_deref().is_none_or(str::is_empty) {
                return Err(anyhow!("push.project_id is required when push is enabled"));
            }
        }

        if self.routing.default_display_name.trim().is_empty() {
            return Err(anyhow!("routing.default_display_name must not be empty"));
        }

        Ok(())
    }
}
