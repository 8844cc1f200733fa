// tests/common/mod.rs
// Scripted in-memory backend shared by the integration tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use tubeloader::backend::{
    DownloadOptions, MediaBackend, PlaylistEntry, RawPlaylist, ResolvedInfo,
};
use tubeloader::config::AppConfig;
use tubeloader::error::AppError;
use tubeloader::model::PlaylistRequest;
use tubeloader::notify::{EventReceiver, PlaylistEvent};
use tubeloader::progress::ProgressSample;

pub const PLAYLIST_URL: &str = "https://www.youtube.com/playlist?list=PLtest123";

/// Backend that lists `item_count` items with bare ids `vid1..vidN` and
/// "downloads" them by sleeping.
pub struct MockBackend {
    pub playlist_title: String,
    pub item_count: usize,
    pub delay: Duration,
    pub metadata_delay: Duration,
    pub fail_on: HashSet<usize>,
    pub panic_on: HashSet<usize>,
    pub metadata_error: Option<String>,
    pub requested_urls: Mutex<Vec<String>>,
    pub requested_ranges: Mutex<Vec<Option<String>>>,
    pub seen_options: Mutex<Vec<DownloadOptions>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
}

impl MockBackend {
    pub fn new(item_count: usize) -> Self {
        Self {
            playlist_title: "Test Playlist".to_string(),
            item_count,
            delay: Duration::from_millis(20),
            metadata_delay: Duration::ZERO,
            fail_on: HashSet::new(),
            panic_on: HashSet::new(),
            metadata_error: None,
            requested_urls: Mutex::new(Vec::new()),
            requested_ranges: Mutex::new(Vec::new()),
            seen_options: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn metadata_delay(mut self, delay: Duration) -> Self {
        self.metadata_delay = delay;
        self
    }

    pub fn fail_on(mut self, index: usize) -> Self {
        self.fail_on.insert(index);
        self
    }

    pub fn panic_on(mut self, index: usize) -> Self {
        self.panic_on.insert(index);
        self
    }

    pub fn metadata_error(mut self, message: &str) -> Self {
        self.metadata_error = Some(message.to_string());
        self
    }

    pub fn download_count(&self) -> usize {
        self.requested_urls.lock().unwrap().len()
    }

    fn index_of(url: &str) -> usize {
        url.rsplit("vid")
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MediaBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn fetch_metadata(
        &self,
        _url: &str,
        item_range: Option<&str>,
        _flat: bool,
    ) -> Result<RawPlaylist, AppError> {
        self.requested_ranges
            .lock()
            .unwrap()
            .push(item_range.map(str::to_string));
        thread::sleep(self.metadata_delay);

        if let Some(message) = &self.metadata_error {
            return Err(AppError::MetadataFetch(message.clone()));
        }

        let entries = (1..=self.item_count)
            .map(|i| {
                Some(PlaylistEntry {
                    id: Some(format!("vid{}", i)),
                    title: Some(format!("Video {}", i)),
                    ..Default::default()
                })
            })
            .collect();

        Ok(RawPlaylist {
            title: Some(self.playlist_title.clone()),
            entries: Some(entries),
        })
    }

    fn download(&self, url: &str, options: &DownloadOptions) -> Result<ResolvedInfo, AppError> {
        let index = Self::index_of(url);
        self.requested_urls.lock().unwrap().push(url.to_string());
        self.seen_options.lock().unwrap().push(options.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if let Some(hook) = &options.progress_hook {
            hook(&ProgressSample::downloading(512, Some(1024)));
        }
        thread::sleep(self.delay / 2);
        if let Some(hook) = &options.progress_hook {
            hook(&ProgressSample::downloading(1024, Some(1024)));
        }
        thread::sleep(self.delay / 2);

        if self.panic_on.contains(&index) {
            panic!("simulated panic for item {}", index);
        }
        if self.fail_on.contains(&index) {
            return Err(AppError::DownloadError(format!(
                "simulated failure for item {}",
                index
            )));
        }

        Ok(ResolvedInfo {
            id: format!("vid{}", index),
            title: format!("Video {}", index),
            ext: "mp4".to_string(),
            template: options.output_template.clone(),
            filepath: None,
        })
    }
}

pub fn test_config(download_folder: &Path) -> AppConfig {
    AppConfig {
        download_folder: download_folder.to_path_buf(),
        cancel_timeout_ms: 2000,
        ..AppConfig::default()
    }
}

pub fn playlist_request(destination: &Path, concurrency: usize) -> PlaylistRequest {
    PlaylistRequest::new(PLAYLIST_URL, destination).concurrency(concurrency)
}

/// Drain a run's event stream; panics if it does not end in time
pub async fn collect_events(mut events: EventReceiver) -> Vec<PlaylistEvent> {
    tokio::time::timeout(Duration::from_secs(20), async move {
        let mut collected = Vec::new();
        while let Some(event) = events.recv().await {
            collected.push(event);
        }
        collected
    })
    .await
    .expect("event stream did not finish")
}

pub fn started_indices(events: &[PlaylistEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            PlaylistEvent::FileStarted { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

pub fn completed_indices(events: &[PlaylistEvent]) -> Vec<usize> {
    let mut indices: Vec<usize> = events
        .iter()
        .filter_map(|e| match e {
            PlaylistEvent::FileCompleted { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    indices.sort_unstable();
    indices
}

pub fn failed_indices(events: &[PlaylistEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| match e {
            PlaylistEvent::FileFailed { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

pub fn final_tallies(events: &[PlaylistEvent]) -> Option<(usize, usize)> {
    match events.last() {
        Some(PlaylistEvent::PlaylistCompleted {
            success_count,
            fail_count,
        }) => Some((*success_count, *fail_count)),
        _ => None,
    }
}

pub fn shared(backend: MockBackend) -> Arc<MockBackend> {
    Arc::new(backend)
}
