//! Locally persisted device identity.
//!
//! The companion recognizes returning clients by their identity, so it is
//! generated once and reused across launches.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const IDENTITY_FILE: &str = "peer_identity.json";

/// Error loading or saving the identity file.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("identity file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("identity file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Stable identity of this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerIdentity {
    pub id: Uuid,
    pub display_name: String,
}

impl PeerIdentity {
    /// Creates a fresh identity.
    pub fn generate(display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
        }
    }

    /// Loads the stored identity, or creates and stores a new one.
    ///
    /// A missing or unreadable file yields a new identity named `display_name`
    /// (the host name when `None`). Save failures are logged; the identity is
    /// still returned and simply not stable across launches.
    pub fn load_or_create(data_dir: &Path, display_name: Option<&str>) -> Self {
        match Self::load(data_dir) {
            Ok(identity) => {
                log::debug!("[Identity] Loaded identity {}", identity.id);
                return identity;
            }
            Err(IdentityError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("[Identity] Discarding stored identity: {}", e),
        }

        let name = display_name
            .map(str::to_string)
            .unwrap_or_else(default_display_name);
        let identity = Self::generate(name);
        match identity.save(data_dir) {
            Ok(()) => log::info!(
                "[Identity] Created identity {} ({})",
                identity.id,
                identity.display_name
            ),
            Err(e) => log::warn!("[Identity] Failed to persist new identity: {}", e),
        }
        identity
    }

    /// Reads the identity file from `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(data_dir: &Path) -> Result<Self, IdentityError> {
        let contents = std::fs::read_to_string(data_dir.join(IDENTITY_FILE))?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Writes the identity file into `data_dir`.
    ///
    /// Uses atomic write (temp file + rename) to prevent corruption on crash.
    /// Creates the directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save(&self, data_dir: &Path) -> Result<(), IdentityError> {
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(IDENTITY_FILE);
        let temp_path = data_dir.join("peer_identity.json.tmp");
        let contents = serde_json::to_string_pretty(self)?;

        std::fs::write(&temp_path, contents)?;
        std::fs::rename(&temp_path, &path)?;
        Ok(())
    }
}

fn default_display_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "UniRemote".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_is_stable_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let first = PeerIdentity::load_or_create(dir.path(), Some("Phone"));
        let second = PeerIdentity::load_or_create(dir.path(), Some("Other"));
        assert_eq!(first, second);
        assert_eq!(second.display_name, "Phone");
    }

    #[test]
    fn corrupt_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(IDENTITY_FILE), "not json").unwrap();

        let identity = PeerIdentity::load_or_create(dir.path(), Some("Phone"));
        assert_eq!(PeerIdentity::load(dir.path()).unwrap(), identity);
    }

    #[test]
    fn default_name_is_not_empty() {
        let dir = tempfile::tempdir().unwrap();
        let identity = PeerIdentity::load_or_create(dir.path(), None);
        assert!(!identity.display_name.is_empty());
    }
}
