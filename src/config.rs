//! Configuration management with TOML and environment variable overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default landing page of the purchase-history portal.
pub const DEFAULT_PORTAL_URL: &str = "https://reportaproblem.apple.com/";

/// Application configuration with layered loading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Purchase-history portal URL
    #[serde(default = "default_portal_url")]
    pub portal_url: String,

    /// File holding the persisted browser session
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,

    /// Directory receiving the exported PDFs
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// Run the browser without a window (login then has to come from the session file)
    #[serde(default)]
    pub headless: bool,

    /// Explicit Chrome/Chromium executable; auto-detected when unset
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Pause before every browser interaction in milliseconds
    #[serde(default = "default_slow_mo_ms")]
    pub slow_mo_ms: u64,

    /// Default timeout for browser operations in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How long to wait for the purchase list on startup (covers manual login)
    #[serde(default = "default_list_wait_ms")]
    pub list_wait_ms: u64,

    /// Upper bound for the network-quiescence wait after opening a receipt
    #[serde(default = "default_network_idle_ms")]
    pub network_idle_ms: u64,

    #[serde(default = "default_viewport_width")]
    pub viewport_width: u32,

    #[serde(default = "default_viewport_height")]
    pub viewport_height: u32,

    /// Option label that shows every family member's purchases
    #[serde(default = "default_family_member_label")]
    pub family_member_label: String,

    /// Scroll attempts while loading the list down to last year's entries
    #[serde(default = "default_max_scan_scrolls")]
    pub max_scan_scrolls: u32,

    /// Scroll attempts while re-locating a single order
    #[serde(default = "default_max_locate_scrolls")]
    pub max_locate_scrolls: u32,

    /// Exports smaller than this many bytes are treated as blank
    #[serde(default = "default_min_pdf_bytes")]
    pub min_pdf_bytes: u64,

    /// Delay before the run starts in milliseconds
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,

    /// Settle delays after UI actions
    #[serde(default)]
    pub delays: Delays,
}

/// Fixed waits, in milliseconds, after actions whose rendering cannot be observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Delays {
    /// After scrolling to the bottom during the scan pass
    pub scroll_ms: u64,
    /// After scrolling to the bottom while re-locating an order
    pub locate_scroll_ms: u64,
    /// After scrolling back to the top
    pub top_ms: u64,
    /// After collapsing a row
    pub collapse_ms: u64,
    /// After expanding a row
    pub expand_ms: u64,
    /// Before reading product titles from an expanded row
    pub products_ms: u64,
    /// After switching to all family members on startup
    pub family_ms: u64,
    /// After switching to all family members on a reload
    pub family_reload_ms: u64,
    /// After the receipt reached network quiescence
    pub receipt_ms: u64,
}

impl Default for Delays {
    fn default() -> Self {
        Self {
            scroll_ms: 1500,
            locate_scroll_ms: 1000,
            top_ms: 500,
            collapse_ms: 300,
            expand_ms: 800,
            products_ms: 500,
            family_ms: 2000,
            family_reload_ms: 1500,
            receipt_ms: 3000,
        }
    }
}

impl Delays {
    /// All delays set to zero.
    pub fn none() -> Self {
        Self {
            scroll_ms: 0,
            locate_scroll_ms: 0,
            top_ms: 0,
            collapse_ms: 0,
            expand_ms: 0,
            products_ms: 0,
            family_ms: 0,
            family_reload_ms: 0,
            receipt_ms: 0,
        }
    }
}

fn default_portal_url() -> String {
    DEFAULT_PORTAL_URL.to_string()
}

fn default_session_file() -> PathBuf {
    PathBuf::from("apple-session.json")
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_slow_mo_ms() -> u64 {
    50
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_list_wait_ms() -> u64 {
    60_000
}

fn default_network_idle_ms() -> u64 {
    15_000
}

fn default_viewport_width() -> u32 {
    1280
}

fn default_viewport_height() -> u32 {
    1024
}

fn default_family_member_label() -> String {
    "Alle".to_string()
}

fn default_max_scan_scrolls() -> u32 {
    50
}

fn default_max_locate_scrolls() -> u32 {
    20
}

fn default_min_pdf_bytes() -> u64 {
    5000
}

fn default_startup_delay_ms() -> u64 {
    2000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            portal_url: default_portal_url(),
            session_file: default_session_file(),
            download_dir: default_download_dir(),
            headless: false,
            chrome_path: None,
            slow_mo_ms: default_slow_mo_ms(),
            timeout_ms: default_timeout_ms(),
            list_wait_ms: default_list_wait_ms(),
            network_idle_ms: default_network_idle_ms(),
            viewport_width: default_viewport_width(),
            viewport_height: default_viewport_height(),
            family_member_label: default_family_member_label(),
            max_scan_scrolls: default_max_scan_scrolls(),
            max_locate_scrolls: default_max_locate_scrolls(),
            min_pdf_bytes: default_min_pdf_bytes(),
            startup_delay_ms: default_startup_delay_ms(),
            delays: Delays::default(),
        }
    }
}

impl Config {
    /// Creates a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Loads configuration with fallback to default locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::from_file(path);
        }

        let local_config = Path::new("config.toml");
        if local_config.exists() {
            debug!("Found config.toml in current directory");
            return Self::from_file(local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join("apple-invoices").join("config.toml");
            if xdg_config.exists() {
                debug!("Found config in XDG config directory");
                return Self::from_file(xdg_config);
            }
        }

        debug!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Loads configuration from the file named by `APPLE_INVOICES_CONFIG`, if set.
    pub fn load_from_env() -> Result<Self> {
        let explicit = std::env::var_os("APPLE_INVOICES_CONFIG").map(PathBuf::from);
        Self::load(explicit.as_deref())
    }

    /// Applies environment variable overrides.
    pub fn with_env(mut self) -> Self {
        if let Some(session) = std::env::var_os("APPLE_INVOICES_SESSION") {
            self.session_file = PathBuf::from(session);
        }

        if let Some(dir) = std::env::var_os("APPLE_INVOICES_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(dir);
        }

        if let Ok(headless) = std::env::var("APPLE_INVOICES_HEADLESS") {
            if let Ok(h) = headless.parse() {
                self.headless = h;
            }
        }

        if let Some(chrome) = std::env::var_os("APPLE_INVOICES_CHROME") {
            self.chrome_path = Some(PathBuf::from(chrome));
        }

        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn list_wait(&self) -> Duration {
        Duration::from_millis(self.list_wait_ms)
    }

    pub fn network_idle(&self) -> Duration {
        Duration::from_millis(self.network_idle_ms)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    /// The output directory anchored at the working directory.
    pub fn resolved_download_dir(&self) -> PathBuf {
        if self.download_dir.is_absolute() {
            return self.download_dir.clone();
        }
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(&self.download_dir),
            Err(_) => self.download_dir.clone(),
        }
    }
}
