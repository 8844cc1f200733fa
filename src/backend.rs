// src/backend.rs
// Interface to the extraction/download capability the orchestrator drives

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::AppError;
use crate::progress::ProgressSample;
use crate::utils::sanitize_filename;

/// Callback invoked for every progress sample during a transfer
pub type ProgressHook = Arc<dyn Fn(&ProgressSample) + Send + Sync>;

/// One entry of a flat playlist listing. Any field may be absent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlaylistEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub webpage_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl PlaylistEntry {
    /// Best reference to the item: direct url, then page url, then bare id
    pub fn reference(&self) -> Option<&str> {
        [&self.url, &self.webpage_url, &self.id]
            .into_iter()
            .flatten()
            .map(|s| s.trim())
            .find(|s| !s.is_empty())
    }
}

/// Result of a lightweight (non-downloading) playlist query
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawPlaylist {
    #[serde(default)]
    pub title: Option<String>,
    /// `None` when the URL did not resolve to a playlist at all; individual
    /// `None` entries are unavailable items
    #[serde(default)]
    pub entries: Option<Vec<Option<PlaylistEntry>>>,
}

/// Audio extraction post-processing directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtraction {
    pub codec: String,
    pub quality: String,
}

/// Resolved option set for one transfer
#[derive(Clone, Default)]
pub struct DownloadOptions {
    pub format: String,
    pub output_template: String,
    pub progress_hook: Option<ProgressHook>,
    /// Bytes per second, `None` for unlimited
    pub rate_limit: Option<u64>,
    pub write_subtitles: bool,
    pub subtitle_langs: Vec<String>,
    pub audio_extraction: Option<AudioExtraction>,
    pub windows_filenames: bool,
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("format", &self.format)
            .field("output_template", &self.output_template)
            .field("progress_hook", &self.progress_hook.is_some())
            .field("rate_limit", &self.rate_limit)
            .field("write_subtitles", &self.write_subtitles)
            .field("subtitle_langs", &self.subtitle_langs)
            .field("audio_extraction", &self.audio_extraction)
            .field("windows_filenames", &self.windows_filenames)
            .finish()
    }
}

/// Metadata of a finished transfer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedInfo {
    pub id: String,
    pub title: String,
    pub ext: String,
    /// Output template the transfer used
    pub template: String,
    /// Final on-disk path, when the backend reports it
    pub filepath: Option<PathBuf>,
}

/// Expand `%(title)s`, `%(id)s` and `%(ext)s` in an output template.
pub fn render_template(template: &str, info: &ResolvedInfo) -> String {
    template
        .replace("%(title)s", &sanitize_filename(&info.title))
        .replace("%(id)s", &info.id)
        .replace("%(ext)s", &info.ext)
}

/// The extraction/download capability.
///
/// Implementations are called from worker threads and are expected to block
/// for the duration of the call. There is no cancellation entry point: once
/// `download` is running it runs to completion or failure.
pub trait MediaBackend: Send + Sync {
    /// Name of the backend (for logging)
    fn name(&self) -> &'static str;

    /// List the playlist without downloading. `item_range` uses the
    /// `start:` / `start:end` selection syntax.
    fn fetch_metadata(
        &self,
        url: &str,
        item_range: Option<&str>,
        flat: bool,
    ) -> Result<RawPlaylist, AppError>;

    /// Resolve and transfer one item, reporting progress through the hook
    /// in `options`.
    fn download(&self, url: &str, options: &DownloadOptions) -> Result<ResolvedInfo, AppError>;

    /// Final on-disk path for a completed transfer
    fn prepare_filename(&self, info: &ResolvedInfo) -> PathBuf {
        info.filepath
            .clone()
            .unwrap_or_else(|| PathBuf::from(render_template(&info.template, info)))
    }
}
