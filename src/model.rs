// src/model.rs
// Playlist request and metadata types

use log::debug;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::backend::RawPlaylist;
use crate::error::AppError;
use crate::format_selector::Quality;
use crate::utils::validate_url;

/// Upper bound on per-run concurrency offered to users
pub const MAX_PLAYLIST_CONCURRENCY: usize = 5;

/// 1-based playlist item selection, `end` inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRange {
    pub start: usize,
    pub end: Option<usize>,
}

impl Default for ItemRange {
    fn default() -> Self {
        Self { start: 1, end: None }
    }
}

impl ItemRange {
    pub fn new(start: usize, end: Option<usize>) -> Self {
        Self { start, end }
    }

    /// Item-selection syntax for the downloader (`start:` or `start:end`),
    /// or `None` when the whole playlist is wanted.
    pub fn selector(&self) -> Option<String> {
        match self.end {
            Some(end) => Some(format!("{}:{}", self.start, end)),
            None if self.start > 1 => Some(format!("{}:", self.start)),
            None => None,
        }
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.start == 0 {
            return Err(AppError::ValidationError(
                "Playlist start index must be at least 1".to_string(),
            ));
        }
        if let Some(end) = self.end {
            if end < self.start {
                return Err(AppError::ValidationError(format!(
                    "Playlist end index {} is before start index {}",
                    end, self.start
                )));
            }
        }
        Ok(())
    }
}

/// Everything needed for one playlist run. Not modified once a run starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistRequest {
    pub url: String,
    pub destination_directory: PathBuf,
    pub quality: Quality,
    pub container_format: String,
    pub audio_only: bool,
    pub item_range: ItemRange,
    pub include_subtitles: bool,
    pub concurrency: usize,
    /// 0 means unlimited
    pub speed_limit_bytes_per_sec: u64,
}

impl PlaylistRequest {
    pub fn new(url: &str, destination_directory: impl Into<PathBuf>) -> Self {
        Self {
            url: url.trim().to_string(),
            destination_directory: destination_directory.into(),
            quality: Quality::Best,
            container_format: "mp4".to_string(),
            audio_only: false,
            item_range: ItemRange::default(),
            include_subtitles: false,
            concurrency: 2,
            speed_limit_bytes_per_sec: 0,
        }
    }

    pub fn quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    pub fn container_format(mut self, format: &str) -> Self {
        self.container_format = format.trim().to_ascii_lowercase();
        self
    }

    pub fn audio_only(mut self, audio_only: bool) -> Self {
        self.audio_only = audio_only;
        self
    }

    pub fn item_range(mut self, start: usize, end: Option<usize>) -> Self {
        self.item_range = ItemRange::new(start, end);
        self
    }

    pub fn subtitles(mut self, include: bool) -> Self {
        self.include_subtitles = include;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn speed_limit(mut self, bytes_per_sec: u64) -> Self {
        self.speed_limit_bytes_per_sec = bytes_per_sec;
        self
    }

    /// Check the request before a run is started
    pub fn validate(&self) -> Result<(), AppError> {
        validate_url(&self.url)?;
        self.item_range.validate()?;

        if !(1..=MAX_PLAYLIST_CONCURRENCY).contains(&self.concurrency) {
            return Err(AppError::ValidationError(format!(
                "Concurrency must be between 1 and {}, got {}",
                MAX_PLAYLIST_CONCURRENCY, self.concurrency
            )));
        }

        if self.destination_directory.as_os_str().is_empty() {
            return Err(AppError::PathError(
                "Destination directory is empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// One resolvable playlist entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReference {
    /// 1-based position within the requested range
    pub index: usize,
    pub url_or_id: String,
    pub title: String,
}

/// Playlist listing fixed at fetch time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaylistMetadata {
    pub title: String,
    pub items: Vec<ItemReference>,
    pub count: usize,
}

impl PlaylistMetadata {
    /// Build metadata from a flat listing, dropping unavailable entries.
    ///
    /// Fails when the listing is not a playlist or has no usable entries.
    pub fn from_raw(raw: RawPlaylist) -> Result<Self, AppError> {
        let entries = raw
            .entries
            .ok_or_else(|| AppError::MetadataFetch("Invalid playlist URL".to_string()))?;

        let listed = entries.len();
        let items: Vec<ItemReference> = entries
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let reference = entry.reference()?.to_string();
                Some((reference, entry.title))
            })
            .enumerate()
            .map(|(position, (url_or_id, title))| {
                let index = position + 1;
                ItemReference {
                    index,
                    url_or_id,
                    title: title
                        .filter(|t| !t.trim().is_empty())
                        .unwrap_or_else(|| format!("Video {}", index)),
                }
            })
            .collect();

        if items.is_empty() {
            return Err(AppError::MetadataFetch(
                "Playlist contains no downloadable items".to_string(),
            ));
        }

        if items.len() < listed {
            debug!(
                "Dropped {} unavailable playlist entries",
                listed - items.len()
            );
        }

        Ok(Self {
            title: raw
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Playlist".to_string()),
            count: items.len(),
            items,
        })
    }
}
