use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::Result;

/// Runtime settings. Every field has a default so a partial TOML file is fine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Maximum number of chapter bodies fetched at once.
    pub fan_out: usize,
    pub request_delay_ms: u64,
    pub download_root: PathBuf,
    pub frame_width: u32,
    pub frame_height: u32,
    pub page_char_budget: usize,
    pub include_images: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string(),
            request_timeout_secs: 30,
            fan_out: 4,
            request_delay_ms: 500,
            download_root: PathBuf::from("downloads"),
            frame_width: 550,
            frame_height: 500,
            page_char_budget: 3000,
            include_images: true,
        }
    }
}

impl Settings {
    /// Reads settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no settings file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(text)?;
        settings.fan_out = settings.fan_out.max(1);
        Ok(settings)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn frame(&self) -> (u32, u32) {
        (self.frame_width, self.frame_height)
    }
}
