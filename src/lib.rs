// src/lib.rs
// Concurrent playlist downloading on top of yt-dlp

pub mod backend;
pub mod cli;
pub mod config;
pub mod error;
pub mod format_selector;
pub mod history;
pub mod model;
pub mod notify;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod task;
pub mod utils;
pub mod ytdlp;

pub use error::AppError;
pub use model::PlaylistRequest;
pub use notify::PlaylistEvent;
pub use orchestrator::{PlaylistDownloader, RunPhase};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
