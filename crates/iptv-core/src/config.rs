use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub playlist: PlaylistConfig,
    #[serde(default)]
    pub logos: LogoConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// JSON file holding recent and favorite channels across restarts.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    /// Daily log files (`YYYY-MM-DD.log`) are written here.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub log_to_stderr: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Channel list source: an http(s) URL or a local m3u path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistConfig {
    /// Empty means "start with no catalog until a reload is requested".
    #[serde(default)]
    pub source: String,
    #[serde(default = "default_reload_timeout_secs")]
    pub reload_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoConfig {
    #[serde(default = "default_logo_cache_dir")]
    pub cache_dir: PathBuf,
    /// URL path under which the cache directory is served.
    #[serde(default = "default_public_prefix")]
    pub public_prefix: String,
    /// Placeholder image returned when a logo is missing or broken.
    #[serde(default = "default_fallback")]
    pub fallback: String,
    #[serde(default = "default_logo_width")]
    pub width: u32,
    #[serde(default = "default_logo_height")]
    pub height: u32,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            log_dir: default_log_dir(),
            log_to_stderr: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for PlaylistConfig {
    fn default() -> Self {
        Self {
            source: String::new(),
            reload_timeout_secs: default_reload_timeout_secs(),
        }
    }
}

impl PlaylistConfig {
    pub fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }
}

impl Default for LogoConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_logo_cache_dir(),
            public_prefix: default_public_prefix(),
            fallback: default_fallback(),
            width: default_logo_width(),
            height: default_logo_height(),
        }
    }
}

fn default_state_file() -> PathBuf {
    platform::data_dir().join("state.json")
}

fn default_log_dir() -> PathBuf {
    platform::data_dir().join("logs")
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_reload_timeout_secs() -> u64 {
    300
}

fn default_logo_cache_dir() -> PathBuf {
    platform::cache_dir().join("logo")
}

fn default_public_prefix() -> String {
    "/logo".to_string()
}

fn default_fallback() -> String {
    "/assets/images/missing_logo.png".to_string()
}

// 16:9 thumbnails
fn default_logo_width() -> u32 {
    320
}

fn default_logo_height() -> u32 {
    180
}

impl Config {
    /// Loads the config at `config_path`, writing defaults on first run.
    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}
