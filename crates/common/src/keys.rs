//! Secret key persistence for stable EndpointIds
//!
//! Clients address the relay by its EndpointId, so the relay's iroh secret
//! key must survive restarts. Keys live under the platform config directory:
//! - Linux: `~/.config/p2p-signal-relay/<name>.key`
//! - macOS: `~/Library/Application Support/p2p-signal-relay/<name>.key`
//! - Windows: `%APPDATA%\p2p-signal-relay\<name>.key`

use anyhow::{Context, Result, bail};
use iroh::SecretKey;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Application directory name
const APP_NAME: &str = "p2p-signal-relay";

/// Length of secret key in bytes (Ed25519)
const SECRET_KEY_LENGTH: usize = 32;

/// Default key path for a role (`relay`, `client`)
pub fn default_secret_key_path(role: &str) -> Result<PathBuf> {
    let config_dir =
        dirs::config_dir().context("Failed to determine config directory (HOME not set?)")?;

    Ok(config_dir.join(APP_NAME).join(format!("{}.key", role)))
}

/// Load the key at `path`, or generate and persist a fresh one
///
/// With no path, the relay's default location is used.
pub fn load_or_generate_secret_key(path: Option<&Path>) -> Result<SecretKey> {
    let key_path = match path {
        Some(p) => p.to_path_buf(),
        None => default_secret_key_path("relay")?,
    };

    if key_path.exists() {
        return load_secret_key(&key_path);
    }

    let key = SecretKey::generate(&mut rand::rng());
    save_secret_key(&key, &key_path)?;
    info!(
        "Generated new secret key at {} (EndpointId: {})",
        key_path.display(),
        key.public()
    );
    Ok(key)
}

/// Load a secret key from file
pub fn load_secret_key(path: &Path) -> Result<SecretKey> {
    debug!("Loading secret key from {}", path.display());

    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read secret key file: {}", path.display()))?;

    let key_bytes: [u8; SECRET_KEY_LENGTH] = match bytes.try_into() {
        Ok(arr) => arr,
        Err(bytes) => bail!(
            "Invalid secret key file: expected {} bytes, got {} bytes",
            SECRET_KEY_LENGTH,
            bytes.len()
        ),
    };

    Ok(SecretKey::from_bytes(&key_bytes))
}

/// Save a secret key, owner read/write only on Unix
pub fn save_secret_key(key: &SecretKey, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create key directory: {}", parent.display()))?;
    }

    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to create secret key file: {}", path.display()))?;
    file.write_all(&key.to_bytes())
        .with_context(|| format!("Failed to write secret key file: {}", path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync secret key file: {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(0o600)) {
            warn!(
                "Failed to set secure permissions on {}: {}",
                path.display(),
                e
            );
        }
    }

    Ok(())
}
