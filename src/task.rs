// src/task.rs
// Unit of work for one playlist item

use log::{error, info};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backend::{DownloadOptions, MediaBackend, ProgressHook, ResolvedInfo};
use crate::error::AppError;
use crate::progress::{normalize, ProgressStatus};
use crate::utils::sanitize_filename;

/// Cooperative cancellation flag shared between the orchestrator and a task.
///
/// Once set it stays set.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Terminal state of a task; exactly one is reached per run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed,
    CancelledBeforeStart,
    CancelledDuringDownload,
}

/// Outcome callbacks a task reports through, all invoked on the worker thread
pub struct TaskCallbacks {
    pub on_started: Box<dyn Fn(usize, usize, &str) + Send + Sync>,
    pub on_progress: Box<dyn Fn(usize, u8, &str, &str) + Send + Sync>,
    pub on_completed: Box<dyn Fn(usize, &Path, &str) + Send + Sync>,
    pub on_failed: Box<dyn Fn(usize, &str) + Send + Sync>,
}

/// Output template for one item: `{base}/{group}/{index} - %(title)s.%(ext)s`
pub fn item_output_template(base_directory: &Path, group_title: &str, index: usize) -> String {
    base_directory
        .join(sanitize_filename(group_title))
        .join(format!("{} - %(title)s.%(ext)s", index))
        .to_string_lossy()
        .into_owned()
}

/// Download of a single playlist item
pub struct DownloadTask {
    index: usize,
    total: usize,
    url: String,
    title: String,
    options: DownloadOptions,
    backend: Arc<dyn MediaBackend>,
    callbacks: Arc<TaskCallbacks>,
    cancelled: CancelFlag,
}

impl DownloadTask {
    /// Create a task from a copy of the shared base options.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        total: usize,
        url: &str,
        title: &str,
        base_options: &DownloadOptions,
        base_directory: &Path,
        group_title: &str,
        backend: Arc<dyn MediaBackend>,
        callbacks: Arc<TaskCallbacks>,
    ) -> Self {
        let cancelled = CancelFlag::new();

        let mut options = base_options.clone();
        options.output_template = item_output_template(base_directory, group_title, index);
        options.progress_hook = Some(progress_hook(index, cancelled.clone(), Arc::clone(&callbacks)));

        Self {
            index,
            total,
            url: url.to_string(),
            title: title.to_string(),
            options,
            backend,
            callbacks,
            cancelled,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    /// Handle the orchestrator keeps to cancel this task later
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancelled.clone()
    }

    /// Request cancellation. Only observed at the task's checkpoints; an
    /// in-progress transfer keeps running until the backend returns.
    pub fn cancel(&self) {
        self.cancelled.cancel();
    }

    /// Execute the task on the current (worker) thread
    pub fn run(self) -> TaskOutcome {
        let index = self.index;
        let total = self.total;

        if self.cancelled.is_cancelled() {
            info!("Task {}/{} cancelled before start: {}", index, total, self.title);
            return TaskOutcome::CancelledBeforeStart;
        }

        info!("Task {}/{} started: {}", index, total, self.title);
        (self.callbacks.on_started)(index, total, &self.title);

        if self.cancelled.is_cancelled() {
            info!("Task {}/{} cancelled during start: {}", index, total, self.title);
            return TaskOutcome::CancelledDuringDownload;
        }

        match self.transfer() {
            Ok(file_path) => {
                if self.cancelled.is_cancelled() {
                    info!("Task {}/{} cancelled during download: {}", index, total, self.title);
                    return TaskOutcome::CancelledDuringDownload;
                }
                info!("Task {}/{} completed: {}", index, total, self.title);
                (self.callbacks.on_completed)(index, &file_path, &self.title);
                TaskOutcome::Completed
            }
            Err(e) => {
                let message = e.to_string();
                error!("Task {}/{} failed: {}", index, total, message);
                (self.callbacks.on_failed)(index, &message);
                TaskOutcome::Failed
            }
        }
    }

    fn transfer(&self) -> Result<PathBuf, AppError> {
        let backend = &self.backend;
        let attempt = panic::catch_unwind(AssertUnwindSafe(|| -> Result<ResolvedInfo, AppError> {
            backend.download(&self.url, &self.options)
        }));

        let info = match attempt {
            Ok(result) => result?,
            Err(payload) => {
                return Err(AppError::DownloadError(format!(
                    "{} backend panicked: {}",
                    backend.name(),
                    panic_message(payload.as_ref())
                )))
            }
        };

        Ok(backend.prepare_filename(&info))
    }
}

fn progress_hook(index: usize, cancelled: CancelFlag, callbacks: Arc<TaskCallbacks>) -> ProgressHook {
    Arc::new(move |sample| {
        if cancelled.is_cancelled() || sample.status != ProgressStatus::Downloading {
            return;
        }
        let progress = normalize(sample);
        (callbacks.on_progress)(index, progress.percent, &progress.speed, &progress.eta);
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
