//! Settings, read from `<config dir>/qasaplug/config.toml` when present.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use tracing::debug;

use crate::error::Result;

pub const APP_NAME: &str = "qasaplug";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub refresh_interval_secs: u64,
    pub discovery_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub show_address: bool,
    pub show_power: bool,
    /// Poll known devices directly when they miss a discovery broadcast
    pub auto_reconnect: bool,
    pub color: bool,
    /// Device ids or IP addresses never to show
    pub exclude: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 60,
            discovery_timeout_secs: 3,
            request_timeout_secs: 5,
            show_address: false,
            show_power: true,
            auto_reconnect: true,
            color: true,
            exclude: Vec::new(),
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_NAME).join("config.toml"))
    }

    /// Load from `path`, or the default location. A missing file is not an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::config_path) {
            Some(path) => path,
            None => return Ok(Self::default()),
        };
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(&path)?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs.max(1))
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_secs(self.discovery_timeout_secs.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

pub(crate) fn excluded(exclude: &[String], id: &str, ip: &str) -> bool {
    exclude.iter().any(|entry| entry == id || entry == ip)
}
