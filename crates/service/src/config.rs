//! Daemon configuration

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Service configuration; the defaults match the production platform and
/// the daemon normally runs without any configuration at all.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Motor device node.
    pub device_path: PathBuf,
    /// Local control socket path.
    pub socket_path: PathBuf,
    /// RPMSG endpoint name announced to the peer core.
    pub rpmsg_name: String,
    /// File backing the persistent property store.
    pub property_path: PathBuf,
    /// Listen backlog for both transports.
    pub accept_backlog: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("/dev/lra0"),
            socket_path: PathBuf::from("/run/vibratord.sock"),
            rpmsg_name: "vibratord".to_string(),
            property_path: PathBuf::from("/var/lib/vibrad/properties"),
            accept_backlog: 16,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from a JSON file, or the defaults when no file
    /// is given. Fields absent from the file keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&content)
                    .with_context(|| format!("parsing config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Write the configuration as JSON, creating parent directories as
    /// needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating config directory {}", parent.display()))?;
            }
        }
        let content = serde_json::to_string_pretty(self).context("serializing config")?;
        std::fs::write(path, content)
            .with_context(|| format!("writing config {}", path.display()))
    }
}
