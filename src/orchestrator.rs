// src/orchestrator.rs
// Concurrent playlist download orchestrator

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backend::{AudioExtraction, DownloadOptions, MediaBackend};
use crate::config::AppConfig;
use crate::error::AppError;
use crate::format_selector::select_format;
use crate::model::{PlaylistMetadata, PlaylistRequest};
use crate::notify::{
    event_channel, task_callbacks, EventReceiver, EventSender, Listeners, PlaylistEvent,
    TaskMessage,
};
use crate::pool::WorkerPool;
use crate::task::{CancelFlag, DownloadTask};
use crate::utils::{canonical_watch_url, initialize_download_dir};

/// Lifecycle of the current (or last) run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    FetchingMetadata,
    Dispatching,
    Running,
    Completed,
    Cancelled,
}

impl RunPhase {
    /// Whether a run is in progress in this phase
    pub fn is_active(self) -> bool {
        matches!(
            self,
            RunPhase::FetchingMetadata | RunPhase::Dispatching | RunPhase::Running
        )
    }
}

/// Option set shared by every task of a run; each task copies it
pub fn build_base_options(request: &PlaylistRequest, config: &AppConfig) -> DownloadOptions {
    let speed_limit = request.speed_limit_bytes_per_sec;

    DownloadOptions {
        format: select_format(
            request.quality,
            &request.container_format,
            request.audio_only,
        ),
        output_template: String::new(),
        progress_hook: None,
        rate_limit: (speed_limit > 0).then_some(speed_limit),
        write_subtitles: request.include_subtitles,
        subtitle_langs: if request.include_subtitles {
            config.subtitle_langs.clone()
        } else {
            Vec::new()
        },
        audio_extraction: request.audio_only.then(|| AudioExtraction {
            codec: audio_codec(&request.container_format),
            quality: config.audio_quality.clone(),
        }),
        windows_filenames: true,
    }
}

/// Audio codec for extraction; video containers map to their usual audio codec
fn audio_codec(container_format: &str) -> String {
    match container_format.trim().to_ascii_lowercase().as_str() {
        "" | "best" => "best".to_string(),
        "mp4" => "m4a".to_string(),
        "webm" => "opus".to_string(),
        other => other.to_string(),
    }
}

/// Tallies and task registry of one run, owned by the control task
#[derive(Debug, Default)]
struct RunState {
    total_count: usize,
    success_count: usize,
    fail_count: usize,
    active_tasks: HashMap<usize, CancelFlag>,
    cancelled: bool,
}

impl RunState {
    /// Pick up a cancellation requested from outside. Returns true the first
    /// time it is observed.
    fn sync_cancellation(&mut self, ctx: &RunContext) -> bool {
        if self.cancelled || !ctx.is_cancelled() {
            return false;
        }

        self.cancelled = true;
        for flag in self.active_tasks.values() {
            flag.cancel();
        }
        let cleared = ctx.pool.clear_pending();
        info!(
            "Cancellation requested: {} task(s) flagged, {} pending task(s) cleared",
            self.active_tasks.len(),
            cleared
        );
        true
    }

    fn apply(&mut self, message: TaskMessage, events: &EventSender) {
        let suppress = self.cancelled;

        match message {
            TaskMessage::Started {
                index,
                total,
                title,
            } => {
                if suppress {
                    debug!("Task {} started after cancellation", index);
                } else {
                    events.emit(PlaylistEvent::FileStarted {
                        index,
                        total,
                        title,
                    });
                }
            }
            TaskMessage::Progress {
                index,
                percent,
                speed,
                eta,
            } => {
                if !suppress {
                    events.emit(PlaylistEvent::FileProgress {
                        index,
                        percent,
                        speed,
                        eta,
                    });
                }
            }
            TaskMessage::Completed {
                index,
                file_path,
                title,
            } => {
                self.active_tasks.remove(&index);
                if suppress {
                    info!("Task {} completed after cancellation; outcome dropped", index);
                } else {
                    self.success_count += 1;
                    events.emit(PlaylistEvent::FileCompleted {
                        index,
                        file_path,
                        title,
                    });
                }
            }
            TaskMessage::Failed { index, error } => {
                self.active_tasks.remove(&index);
                if suppress {
                    info!("Task {} failed after cancellation; outcome dropped: {}", index, error);
                } else {
                    self.fail_count += 1;
                    events.emit(PlaylistEvent::FileFailed { index, error });
                }
            }
            TaskMessage::CancelRequested => {
                debug!("Control task received cancellation request");
            }
        }
    }
}

/// Everything the control task needs for one run
struct RunContext {
    backend: Arc<dyn MediaBackend>,
    config: Arc<AppConfig>,
    request: PlaylistRequest,
    pool: WorkerPool,
    events: EventSender,
    task_tx: UnboundedSender<TaskMessage>,
    cancelled: Arc<AtomicBool>,
    phase: Arc<RwLock<RunPhase>>,
}

impl RunContext {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn set_phase(&self, phase: RunPhase) {
        set_phase(&self.phase, phase);
    }
}

fn set_phase(slot: &RwLock<RunPhase>, phase: RunPhase) {
    let mut current = slot.write().unwrap_or_else(PoisonError::into_inner);
    debug!("Run phase {:?} -> {:?}", *current, phase);
    *current = phase;
}

/// Handles `cancel` needs to reach the active run
#[derive(Clone)]
struct RunHandle {
    cancelled: Arc<AtomicBool>,
    control_tx: UnboundedSender<TaskMessage>,
    pool: WorkerPool,
}

/// Downloads whole playlists with a bounded number of concurrent transfers.
///
/// One run at a time: `start` fetches the listing, fans the items out over a
/// worker pool and reports through the returned event stream, which ends
/// after `PlaylistCompleted`.
pub struct PlaylistDownloader {
    backend: Arc<dyn MediaBackend>,
    config: Arc<AppConfig>,
    phase: Arc<RwLock<RunPhase>>,
    current: Mutex<Option<RunHandle>>,
}

impl PlaylistDownloader {
    pub fn new(backend: Arc<dyn MediaBackend>, config: Arc<AppConfig>) -> Self {
        Self {
            backend,
            config,
            phase: Arc::new(RwLock::new(RunPhase::Idle)),
            current: Mutex::new(None),
        }
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_running(&self) -> bool {
        self.phase().is_active()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Begin a run and return its event stream.
    ///
    /// Fails without side effects if the request is invalid or another run
    /// is still active.
    pub async fn start(&self, request: PlaylistRequest) -> Result<EventReceiver, AppError> {
        request.validate()?;

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_running() {
            warn!("Rejected playlist start while a run is active: {}", request.url);
            return Err(AppError::RunInProgress);
        }

        let pool = WorkerPool::new(request.concurrency)?;
        let (events, receiver) = event_channel();
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        *current = Some(RunHandle {
            cancelled: Arc::clone(&cancelled),
            control_tx: task_tx.clone(),
            pool: pool.clone(),
        });
        set_phase(&self.phase, RunPhase::FetchingMetadata);

        info!(
            "Starting playlist download: {} (concurrency {})",
            request.url, request.concurrency
        );

        let ctx = RunContext {
            backend: Arc::clone(&self.backend),
            config: Arc::clone(&self.config),
            request,
            pool,
            events,
            task_tx,
            cancelled,
            phase: Arc::clone(&self.phase),
        };
        tokio::spawn(run_playlist(ctx, task_rx));

        Ok(receiver)
    }

    /// Start a run and deliver its events to `listeners` from one dispatcher task.
    /// The returned handle finishes after the last event was delivered.
    pub async fn start_with_listeners(
        &self,
        request: PlaylistRequest,
        listeners: Listeners,
    ) -> Result<JoinHandle<()>, AppError> {
        let receiver = self.start(request).await?;
        Ok(receiver.dispatch(listeners))
    }

    /// Cancel the active run.
    ///
    /// Stops new tasks from starting, flags running ones and waits up to the
    /// configured grace period for them to settle. Transfers already in
    /// progress cannot be interrupted and may keep running after this returns.
    /// Calling it again, or with no active run, does nothing.
    pub async fn cancel(&self) {
        let run = {
            let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            match current.as_ref() {
                Some(run) if self.is_running() => run.clone(),
                _ => {
                    debug!("Cancel requested with no active run");
                    return;
                }
            }
        };

        if run.cancelled.swap(true, Ordering::SeqCst) {
            debug!("Cancellation already requested");
            return;
        }

        info!("Cancelling playlist download");
        if run.control_tx.send(TaskMessage::CancelRequested).is_err() {
            debug!("Control task already finished");
        }

        run.pool.clear_pending();
        let grace = self.config.cancel_timeout();
        if !run.pool.await_all_complete(Some(grace)).await {
            warn!(
                "{} task(s) did not settle within {:?} of cancellation",
                run.pool.active_count(),
                grace
            );
        }
    }
}

/// Control task: fetch, dispatch, supervise, then report completion.
async fn run_playlist(ctx: RunContext, mut task_rx: UnboundedReceiver<TaskMessage>) {
    let started_at = Instant::now();
    let mut state = RunState::default();

    if let Err(e) = drive(&ctx, &mut state, &mut task_rx).await {
        error!("Playlist download failed: {}", e);
        ctx.events.emit(PlaylistEvent::FileFailed {
            index: 0,
            error: e.to_string(),
        });
    }

    let cancelled = state.cancelled || ctx.is_cancelled();
    ctx.set_phase(if cancelled {
        RunPhase::Cancelled
    } else {
        RunPhase::Completed
    });

    info!(
        "Playlist download {} in {:.1}s: {} succeeded, {} failed, {} total",
        if cancelled { "cancelled" } else { "finished" },
        started_at.elapsed().as_secs_f64(),
        state.success_count,
        state.fail_count,
        state.total_count
    );

    ctx.events.emit(PlaylistEvent::PlaylistCompleted {
        success_count: state.success_count,
        fail_count: state.fail_count,
    });
}

async fn drive(
    ctx: &RunContext,
    state: &mut RunState,
    task_rx: &mut UnboundedReceiver<TaskMessage>,
) -> Result<(), AppError> {
    let request = &ctx.request;
    initialize_download_dir(&request.destination_directory)?;

    let backend = Arc::clone(&ctx.backend);
    let url = request.url.clone();
    let range = request.item_range.selector();
    debug!("Fetching metadata with {} (range {:?})", backend.name(), range);

    let raw = tokio::task::spawn_blocking(move || {
        backend.fetch_metadata(&url, range.as_deref(), true)
    })
    .await
    .map_err(|e| AppError::MetadataFetch(format!("Metadata fetch did not finish: {}", e)))??;
    let metadata = PlaylistMetadata::from_raw(raw)?;

    if ctx.is_cancelled() {
        info!("Run cancelled during metadata fetch");
        state.cancelled = true;
        return Ok(());
    }

    info!("Playlist '{}' has {} item(s)", metadata.title, metadata.count);
    state.total_count = metadata.count;
    ctx.events.emit(PlaylistEvent::MetadataFetched {
        title: metadata.title.clone(),
        count: metadata.count,
    });

    ctx.set_phase(RunPhase::Dispatching);
    dispatch(ctx, state, &metadata);

    ctx.set_phase(RunPhase::Running);
    supervise(ctx, state, task_rx).await;
    Ok(())
}

fn dispatch(ctx: &RunContext, state: &mut RunState, metadata: &PlaylistMetadata) {
    let base_options = build_base_options(&ctx.request, &ctx.config);
    let callbacks = Arc::new(task_callbacks(ctx.task_tx.clone()));

    for item in &metadata.items {
        if ctx.is_cancelled() {
            info!(
                "Dispatch stopped by cancellation after {} of {} item(s)",
                state.active_tasks.len(),
                metadata.count
            );
            break;
        }

        let task = DownloadTask::new(
            item.index,
            metadata.count,
            &canonical_watch_url(&item.url_or_id),
            &item.title,
            &base_options,
            &ctx.request.destination_directory,
            &metadata.title,
            Arc::clone(&ctx.backend),
            Arc::clone(&callbacks),
        );

        state.active_tasks.insert(item.index, task.cancel_flag());
        ctx.pool.submit(move || {
            let index = task.index();
            let outcome = task.run();
            debug!("Task {} settled: {:?}", index, outcome);
        });
    }

    debug!("Submitted {} task(s) to the worker pool", state.active_tasks.len());
}

/// React to task messages until the pool drains, or the cancellation grace
/// period runs out.
async fn supervise(
    ctx: &RunContext,
    state: &mut RunState,
    task_rx: &mut UnboundedReceiver<TaskMessage>,
) {
    let mut deadline: Option<Instant> = None;

    loop {
        if state.sync_cancellation(ctx) {
            deadline = Some(Instant::now() + ctx.config.cancel_timeout());
        }
        let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));

        tokio::select! {
            biased;
            message = task_rx.recv() => match message {
                Some(message) => {
                    if state.sync_cancellation(ctx) {
                        deadline = Some(Instant::now() + ctx.config.cancel_timeout());
                    }
                    state.apply(message, &ctx.events);
                }
                None => break,
            },
            drained = ctx.pool.await_all_complete(remaining) => {
                if !drained {
                    warn!(
                        "{} task(s) still running after the cancellation grace period; their outcomes are dropped",
                        ctx.pool.active_count()
                    );
                }
                break;
            }
        }
    }

    // Outcomes posted just before the pool drained
    while let Ok(message) = task_rx.try_recv() {
        state.sync_cancellation(ctx);
        state.apply(message, &ctx.events);
    }

    if !state.active_tasks.is_empty() {
        debug!(
            "{} task(s) ended without a reported outcome",
            state.active_tasks.len()
        );
        state.active_tasks.clear();
    }
}
