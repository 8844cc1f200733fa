// src/config.rs
// Application settings, loaded once at startup and passed explicitly

use dirs_next as dirs;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::AppError;
use crate::format_selector::Quality;
use crate::model::{PlaylistRequest, MAX_PLAYLIST_CONCURRENCY};
use crate::utils::default_download_dir;

const APP_DIR: &str = "tubeloader";
const CONFIG_FILE: &str = "config.json";

pub const MAX_SPEED_LIMIT_MB: u64 = 100;
pub const MIN_HISTORY_LIMIT: usize = 10;
pub const MAX_HISTORY_LIMIT: usize = 1000;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// User settings.
///
/// Missing keys fall back to their defaults, so older files stay loadable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download_folder: PathBuf,
    pub download_format: String,
    pub download_quality: Quality,
    /// MB/s, 0 for unlimited
    pub speed_limit_mb: u64,
    pub concurrent_playlist_downloads: usize,
    pub history_limit: usize,
    /// Grace window granted to in-flight tasks after a cancel
    pub cancel_timeout_ms: u64,
    pub subtitle_langs: Vec<String>,
    pub audio_quality: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_folder: default_download_dir(APP_DIR),
            download_format: "mp4".to_string(),
            download_quality: Quality::P720,
            speed_limit_mb: 0,
            concurrent_playlist_downloads: 2,
            history_limit: 100,
            cancel_timeout_ms: 2000,
            subtitle_langs: vec!["en".to_string()],
            audio_quality: "192".to_string(),
        }
    }
}

impl AppConfig {
    /// `<config_dir>/tubeloader/config.json`
    pub fn default_path() -> Result<PathBuf, AppError> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| AppError::PathError("Could not find config directory".to_string()))?;
        path.push(APP_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Result<Self, AppError> {
        Self::load_from(&Self::default_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            debug!("No config file at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let data = fs::read_to_string(path)?;
        let mut config: AppConfig = serde_json::from_str(&data)
            .map_err(|e| AppError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate();

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Reset out-of-range values to their defaults
    pub fn validate(&mut self) {
        let defaults = Self::default();

        if self.speed_limit_mb > MAX_SPEED_LIMIT_MB {
            warn!(
                "speed_limit_mb {} out of range 0..={}, using {}",
                self.speed_limit_mb, MAX_SPEED_LIMIT_MB, defaults.speed_limit_mb
            );
            self.speed_limit_mb = defaults.speed_limit_mb;
        }

        if !(1..=MAX_PLAYLIST_CONCURRENCY).contains(&self.concurrent_playlist_downloads) {
            warn!(
                "concurrent_playlist_downloads {} out of range 1..={}, using {}",
                self.concurrent_playlist_downloads,
                MAX_PLAYLIST_CONCURRENCY,
                defaults.concurrent_playlist_downloads
            );
            self.concurrent_playlist_downloads = defaults.concurrent_playlist_downloads;
        }

        if !(MIN_HISTORY_LIMIT..=MAX_HISTORY_LIMIT).contains(&self.history_limit) {
            warn!(
                "history_limit {} out of range {}..={}, using {}",
                self.history_limit, MIN_HISTORY_LIMIT, MAX_HISTORY_LIMIT, defaults.history_limit
            );
            self.history_limit = defaults.history_limit;
        }

        if self.download_format.trim().is_empty() {
            warn!("Empty download_format, using {}", defaults.download_format);
            self.download_format = defaults.download_format;
        }

        if self.download_folder.as_os_str().is_empty() {
            warn!("Empty download_folder, using {:?}", defaults.download_folder);
            self.download_folder = defaults.download_folder;
        }

        if self.subtitle_langs.is_empty() {
            self.subtitle_langs = defaults.subtitle_langs;
        }

        if self.audio_quality.trim().is_empty() {
            self.audio_quality = defaults.audio_quality;
        }
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    pub fn speed_limit_bytes_per_sec(&self) -> u64 {
        self.speed_limit_mb.saturating_mul(BYTES_PER_MB)
    }

    /// Request for `url` populated from the configured defaults
    pub fn playlist_request(&self, url: &str) -> PlaylistRequest {
        PlaylistRequest::new(url, self.download_folder.clone())
            .quality(self.download_quality)
            .container_format(&self.download_format)
            .concurrency(self.concurrent_playlist_downloads)
            .speed_limit(self.speed_limit_bytes_per_sec())
    }
}
