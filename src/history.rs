// src/history.rs
// Bounded download history and the recorder that turns run events into records

use chrono::Local;
use dirs_next as dirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::notify::PlaylistEvent;

const APP_DIR: &str = "tubeloader";
const HISTORY_FILE: &str = "history.json";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const STATUS_DOWNLOADING: &str = "Downloading";
pub const STATUS_SUCCESS: &str = "Success";
pub const STATUS_FAILED: &str = "Failed";
pub const STATUS_CANCELLED: &str = "Cancelled";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Single,
    Playlist,
}

/// Per-item entry of a playlist record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryItem {
    pub status: String,
    pub title: String,
    pub path: String,
}

/// One finished (or abandoned) download
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub timestamp: String,
    pub status: String,
    pub title: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: HistoryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<HistoryItem>>,
}

impl HistoryRecord {
    pub fn new(kind: HistoryKind, title: &str, status: &str, path: &str) -> Self {
        Self {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            status: status.to_string(),
            title: title.to_string(),
            path: path.to_string(),
            kind,
            items: match kind {
                HistoryKind::Playlist => Some(Vec::new()),
                HistoryKind::Single => None,
            },
        }
    }
}

/// Status line of a finished playlist: `Success (s/total)` or `Failed`
pub fn playlist_status(success_count: usize, fail_count: usize) -> String {
    if success_count > 0 {
        format!(
            "{} ({}/{})",
            STATUS_SUCCESS,
            success_count,
            success_count + fail_count
        )
    } else {
        STATUS_FAILED.to_string()
    }
}

/// History list capped at `limit` entries; the oldest are dropped first
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryStore {
    records: Vec<HistoryRecord>,
    limit: usize,
}

impl HistoryStore {
    pub fn new(limit: usize) -> Self {
        Self {
            records: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// `<data_local_dir>/tubeloader/history.json`
    pub fn default_path() -> Result<PathBuf, AppError> {
        let mut path = dirs::data_local_dir()
            .ok_or_else(|| AppError::PathError("Could not find data directory".to_string()))?;
        path.push(APP_DIR);
        path.push(HISTORY_FILE);
        Ok(path)
    }

    pub fn load(limit: usize) -> Result<Self, AppError> {
        Self::load_from(&Self::default_path()?, limit)
    }

    pub fn load_from(path: &Path, limit: usize) -> Result<Self, AppError> {
        let mut store = Self::new(limit);
        if !path.exists() {
            return Ok(store);
        }

        let data = fs::read_to_string(path)?;
        store.records = serde_json::from_str(&data)?;
        store.enforce_limit();
        debug!("Loaded {} history record(s) from {:?}", store.records.len(), path);
        Ok(store)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.records)?)?;
        debug!("Saved {} history record(s) to {:?}", self.records.len(), path);
        Ok(())
    }

    pub fn append(&mut self, record: HistoryRecord) {
        info!("History: {} [{}]", record.title, record.status);
        self.records.push(record);
        self.enforce_limit();
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn enforce_limit(&mut self) {
        if self.records.len() > self.limit {
            let excess = self.records.len() - self.limit;
            self.records.drain(..excess);
        }
    }
}

/// Builds the history record of one playlist run from its event stream.
///
/// Starts as `Downloading` titled with the URL; takes the playlist title once
/// metadata arrives and settles every item it saw start.
#[derive(Debug, Clone)]
pub struct PlaylistRunRecorder {
    record: HistoryRecord,
    items: BTreeMap<usize, HistoryItem>,
    success_count: usize,
    fail_count: usize,
    run_error: Option<String>,
}

impl PlaylistRunRecorder {
    pub fn new(url: &str, destination: &Path) -> Self {
        Self {
            record: HistoryRecord::new(
                HistoryKind::Playlist,
                url,
                STATUS_DOWNLOADING,
                &destination.to_string_lossy(),
            ),
            items: BTreeMap::new(),
            success_count: 0,
            fail_count: 0,
            run_error: None,
        }
    }

    pub fn observe(&mut self, event: &PlaylistEvent) {
        match event {
            PlaylistEvent::MetadataFetched { title, .. } => {
                self.record.title = title.clone();
            }
            PlaylistEvent::FileStarted { index, title, .. } => {
                self.items.insert(
                    *index,
                    HistoryItem {
                        status: STATUS_DOWNLOADING.to_string(),
                        title: title.clone(),
                        path: String::new(),
                    },
                );
            }
            PlaylistEvent::FileCompleted {
                index,
                file_path,
                title,
            } => {
                let item = self.item_mut(*index, title);
                item.status = STATUS_SUCCESS.to_string();
                item.path = file_path.to_string_lossy().into_owned();
            }
            PlaylistEvent::FileFailed { index: 0, error } => {
                self.run_error = Some(error.clone());
            }
            PlaylistEvent::FileFailed { index, .. } => {
                let fallback = format!("Video {}", index);
                self.item_mut(*index, &fallback).status = STATUS_FAILED.to_string();
            }
            PlaylistEvent::PlaylistCompleted {
                success_count,
                fail_count,
            } => {
                self.success_count = *success_count;
                self.fail_count = *fail_count;
            }
            PlaylistEvent::FileProgress { .. } => {}
        }
    }

    /// Error that ended the run before any item was dispatched
    pub fn run_error(&self) -> Option<&str> {
        self.run_error.as_deref()
    }

    /// Finalize the record. Items that started but never settled count as
    /// cancelled when the run was cancelled, failed otherwise.
    pub fn finish(mut self, cancelled: bool) -> HistoryRecord {
        let unsettled = if cancelled {
            STATUS_CANCELLED
        } else {
            STATUS_FAILED
        };

        let items = self
            .items
            .into_values()
            .map(|mut item| {
                if item.status == STATUS_DOWNLOADING {
                    item.status = unsettled.to_string();
                }
                item
            })
            .collect();

        self.record.items = Some(items);
        self.record.status = if cancelled {
            STATUS_CANCELLED.to_string()
        } else {
            playlist_status(self.success_count, self.fail_count)
        };
        self.record
    }

    fn item_mut(&mut self, index: usize, title: &str) -> &mut HistoryItem {
        self.items.entry(index).or_insert_with(|| HistoryItem {
            status: STATUS_DOWNLOADING.to_string(),
            title: title.to_string(),
            path: String::new(),
        })
    }
}
