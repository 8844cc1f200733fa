// src/format_selector.rs
// Maps a quality / container / audio-only request to a yt-dlp format expression

use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Selector used whenever only the audio stream is wanted
pub const AUDIO_ONLY_SELECTOR: &str = "bestaudio/best";

/// Unconstrained video + audio selector
pub const BEST_SELECTOR: &str = "bestvideo+bestaudio/best";

/// Requested video quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "480p")]
    P480,
    #[serde(rename = "360p")]
    P360,
}

impl Default for Quality {
    fn default() -> Self {
        Self::Best
    }
}

impl Quality {
    /// All selectable qualities, best first
    pub const ALL: [Quality; 5] = [
        Quality::Best,
        Quality::P1080,
        Quality::P720,
        Quality::P480,
        Quality::P360,
    ];

    /// Maximum video height, or `None` for unconstrained
    pub fn max_height(self) -> Option<u32> {
        match self {
            Quality::Best => None,
            Quality::P1080 => Some(1080),
            Quality::P720 => Some(720),
            Quality::P480 => Some(480),
            Quality::P360 => Some(360),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Quality::Best => "best",
            Quality::P1080 => "1080p",
            Quality::P720 => "720p",
            Quality::P480 => "480p",
            Quality::P360 => "360p",
        }
    }

    /// Lenient parse: anything unrecognized means "best available"
    pub fn from_label(label: &str) -> Self {
        label.parse().unwrap_or_else(|_| {
            debug!("Unrecognized quality '{}', using best available", label);
            Quality::Best
        })
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Quality {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best" | "best available" => Ok(Quality::Best),
            "1080p" | "1080" => Ok(Quality::P1080),
            "720p" | "720" => Ok(Quality::P720),
            "480p" | "480" => Ok(Quality::P480),
            "360p" | "360" => Ok(Quality::P360),
            other => Err(AppError::ValidationError(format!(
                "Unknown quality: {}",
                other
            ))),
        }
    }
}

/// Build the format-selection expression handed to yt-dlp.
///
/// Audio-only requests always get [`AUDIO_ONLY_SELECTOR`]. Otherwise the
/// expression prefers a height-bounded video+audio pair, and when the
/// container is not `best` a final alternative restricted to that extension
/// is appended.
pub fn select_format(quality: Quality, container_format: &str, audio_only: bool) -> String {
    if audio_only {
        return AUDIO_ONLY_SELECTOR.to_string();
    }

    let mut expression = match quality.max_height() {
        Some(height) => format!(
            "bestvideo[height<={h}]+bestaudio/best[height<={h}]",
            h = height
        ),
        None => BEST_SELECTOR.to_string(),
    };

    let container = container_format.trim().to_ascii_lowercase();
    if !container.is_empty() && container != "best" {
        expression.push_str(&format!("/best[ext={}]", container));
    }

    expression
}
