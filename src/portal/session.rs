//! Persisted browser session (cookie jar) for skipping the Apple ID login.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Authentication state of a browsing context, stored as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub cookies: Vec<StoredCookie>,
    /// Unix timestamp of the export
    #[serde(default)]
    pub captured_at: Option<i64>,
}

/// One cookie as exported from the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Expiry as unix seconds; `None` for session cookies
    #[serde(default)]
    pub expires: Option<f64>,
    #[serde(default)]
    pub http_only: bool,
    #[serde(default)]
    pub secure: bool,
}

fn default_path() -> String {
    "/".to_string()
}

impl SessionState {
    /// Creates a session stamped with the current time.
    pub fn capture(cookies: Vec<StoredCookie>) -> Self {
        Self { cookies, captured_at: Some(Utc::now().timestamp()) }
    }

    /// Reads the session file, or `None` if it does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            debug!("No session file at {}", path.display());
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read session file: {}", path.display()))?;
        let session = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse session file: {}", path.display()))?;
        Ok(Some(session))
    }

    /// Writes the session file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write session file: {}", path.display()))?;
        debug!("Saved {} cookies to {}", self.cookies.len(), path.display());
        Ok(())
    }
}
