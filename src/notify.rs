// src/notify.rs
// Playlist events, listener registration and task-to-control messaging

use log::{debug, warn};
use serde::Serialize;
use std::path::PathBuf;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::task::TaskCallbacks;

/// Notifications emitted during a playlist run.
///
/// All events of a run are delivered from the orchestrator's control task,
/// in the order they were produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlaylistEvent {
    MetadataFetched {
        title: String,
        count: usize,
    },
    FileStarted {
        index: usize,
        total: usize,
        title: String,
    },
    FileProgress {
        index: usize,
        percent: u8,
        speed: String,
        eta: String,
    },
    FileCompleted {
        index: usize,
        file_path: PathBuf,
        title: String,
    },
    /// `index` 0 means the run failed as a whole
    FileFailed {
        index: usize,
        error: String,
    },
    PlaylistCompleted {
        success_count: usize,
        fail_count: usize,
    },
}

impl PlaylistEvent {
    /// Last event of every run
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlaylistEvent::PlaylistCompleted { .. })
    }
}

/// Producer half of a run's event stream
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<PlaylistEvent>,
}

impl EventSender {
    /// Queue an event without blocking. A dropped receiver is not an error.
    pub fn emit(&self, event: PlaylistEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped; event discarded");
        }
    }
}

/// Consumer half of a run's event stream
#[derive(Debug)]
pub struct EventReceiver {
    rx: UnboundedReceiver<PlaylistEvent>,
}

impl EventReceiver {
    /// Next event, or `None` once the run has finished and the stream drained
    pub async fn recv(&mut self) -> Option<PlaylistEvent> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<PlaylistEvent> {
        match self.rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Forward every event to `listeners` from a single consumer task
    pub fn dispatch(mut self, listeners: Listeners) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(event) = self.rx.recv().await {
                listeners.notify(&event);
            }
        })
    }
}

pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

type Listener = Box<dyn Fn(&PlaylistEvent) + Send + Sync>;

/// Registered event observers, invoked serially in registration order
#[derive(Default)]
pub struct Listeners {
    listeners: Vec<Listener>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(mut self, listener: F) -> Self
    where
        F: Fn(&PlaylistEvent) + Send + Sync + 'static,
    {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn notify(&self, event: &PlaylistEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }
}

/// Messages marshalled from worker threads (and `cancel`) onto the control task
#[derive(Debug, Clone, PartialEq)]
pub enum TaskMessage {
    Started {
        index: usize,
        total: usize,
        title: String,
    },
    Progress {
        index: usize,
        percent: u8,
        speed: String,
        eta: String,
    },
    Completed {
        index: usize,
        file_path: PathBuf,
        title: String,
    },
    Failed {
        index: usize,
        error: String,
    },
    CancelRequested,
}

/// Task callbacks that post every outcome onto `tx`
pub fn task_callbacks(tx: UnboundedSender<TaskMessage>) -> TaskCallbacks {
    let started = tx.clone();
    let progress = tx.clone();
    let completed = tx.clone();
    let failed = tx;

    TaskCallbacks {
        on_started: Box::new(move |index, total, title| {
            post(
                &started,
                TaskMessage::Started {
                    index,
                    total,
                    title: title.to_string(),
                },
            )
        }),
        on_progress: Box::new(move |index, percent, speed, eta| {
            post(
                &progress,
                TaskMessage::Progress {
                    index,
                    percent,
                    speed: speed.to_string(),
                    eta: eta.to_string(),
                },
            )
        }),
        on_completed: Box::new(move |index, file_path, title| {
            post(
                &completed,
                TaskMessage::Completed {
                    index,
                    file_path: file_path.to_path_buf(),
                    title: title.to_string(),
                },
            )
        }),
        on_failed: Box::new(move |index, error| {
            post(
                &failed,
                TaskMessage::Failed {
                    index,
                    error: error.to_string(),
                },
            )
        }),
    }
}

fn post(tx: &UnboundedSender<TaskMessage>, message: TaskMessage) {
    if tx.send(message).is_err() {
        warn!("Control task is gone; task message dropped");
    }
}
