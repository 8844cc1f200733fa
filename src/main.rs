// src/main.rs

use clap::ArgMatches;
use colored::*;
use env_logger::Builder;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, error, info, warn, LevelFilter};
use notify_rust::Notification;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tubeloader::backend::MediaBackend;
use tubeloader::cli::build_cli;
use tubeloader::config::AppConfig;
use tubeloader::error::AppError;
use tubeloader::format_selector::Quality;
use tubeloader::history::{HistoryStore, PlaylistRunRecorder, STATUS_CANCELLED, STATUS_FAILED};
use tubeloader::notify::PlaylistEvent;
use tubeloader::orchestrator::{PlaylistDownloader, RunPhase};
use tubeloader::ytdlp::YtDlpBackend;
use tubeloader::VERSION;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    init_logger();
    info!("tubeloader starting up - version {}", VERSION);

    let matches = build_cli().get_matches();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            warn!("Falling back to default configuration: {}", e);
            eprintln!("{}: {}", "Warning".yellow(), e);
            AppConfig::default()
        }
    };

    match matches.subcommand() {
        Some(("download", sub)) => run_download(sub, config).await,
        Some(("history", sub)) => show_history(sub, &config),
        Some(("config", _)) => print_config(&config),
        _ => Ok(()),
    }
}

async fn run_download(matches: &ArgMatches, config: AppConfig) -> Result<(), AppError> {
    let url = matches
        .get_one::<String>("url")
        .ok_or_else(|| AppError::ValidationError("URL is required".to_string()))?;

    let mut request = config.playlist_request(url);
    if let Some(quality) = matches.get_one::<String>("quality") {
        request = request.quality(quality.parse::<Quality>()?);
    }
    if let Some(format) = matches.get_one::<String>("format") {
        request = request.container_format(format);
    }
    if matches.get_flag("audio-only") {
        request = request.audio_only(true);
        if matches.get_one::<String>("format").is_none() {
            request = request.container_format("mp3");
        }
    }
    let start = matches.get_one::<u64>("start").copied().unwrap_or(1) as usize;
    let end = matches.get_one::<u64>("end").map(|e| *e as usize);
    request = request.item_range(start, end);
    if matches.get_flag("subtitles") {
        request = request.subtitles(true);
    }
    if let Some(concurrency) = matches.get_one::<u64>("concurrency") {
        request = request.concurrency(*concurrency as usize);
    }
    if let Some(limit) = matches.get_one::<u64>("limit-rate") {
        request = request.speed_limit(limit * 1024 * 1024);
    }
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        request.destination_directory = PathBuf::from(dir);
    }
    let json = matches.get_flag("json");

    let backend = YtDlpBackend::default();
    match backend.version() {
        Ok(version) => info!("Using {} {}", backend.name(), version),
        Err(e) => {
            error!("yt-dlp check failed: {}", e);
            eprintln!(
                "{}",
                "Error: yt-dlp executable not found. Please ensure it's installed and in your PATH."
                    .red()
            );
            return Err(e);
        }
    }

    let mut history = match HistoryStore::load(config.history_limit) {
        Ok(store) => store,
        Err(e) => {
            warn!("Could not read history, starting a new one: {}", e);
            HistoryStore::new(config.history_limit)
        }
    };
    let mut recorder = PlaylistRunRecorder::new(&request.url, &request.destination_directory);

    let downloader = Arc::new(PlaylistDownloader::new(
        Arc::new(backend),
        Arc::new(config),
    ));

    if !json {
        println!("{}", "Fetching playlist information...".blue());
    }
    let mut events = downloader.start(request).await?;

    let interrupt = {
        let downloader = Arc::clone(&downloader);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\n{}", "Cancelling... waiting for running downloads to stop".yellow());
                downloader.cancel().await;
            }
        })
    };

    let mut renderer = ProgressRenderer::new();
    let mut totals = (0, 0);
    while let Some(event) = events.recv().await {
        recorder.observe(&event);
        if let PlaylistEvent::PlaylistCompleted {
            success_count,
            fail_count,
        } = event
        {
            totals = (success_count, fail_count);
        }

        if json {
            println!("{}", serde_json::to_string(&event)?);
        } else {
            renderer.render(&event);
        }
    }
    interrupt.abort();

    let cancelled = downloader.phase() == RunPhase::Cancelled;
    let run_error = recorder.run_error().map(str::to_string);
    let record = recorder.finish(cancelled);
    let title = record.title.clone();
    let status = record.status.clone();
    history.append(record);
    match HistoryStore::default_path() {
        Ok(path) => {
            if let Err(e) = history.save_to(&path) {
                warn!("Failed to save history: {}", e);
            }
        }
        Err(e) => warn!("No location for history: {}", e),
    }

    if let Some(message) = run_error {
        eprintln!("{}: {}", "Error".red(), message);
        return Err(AppError::DownloadError(message));
    }

    if !json {
        let (success, failed) = totals;
        let summary = format!(
            "{}: {} downloaded, {} failed ({})",
            title, success, failed, status
        );
        if cancelled {
            println!("{}", summary.yellow());
        } else if failed == 0 {
            println!("{}", summary.green().bold());
        } else {
            println!("{}", summary.yellow());
        }
    }

    let notification_result = Notification::new()
        .summary("Playlist Download Complete")
        .body(&format!("{}: {}", title, status))
        .show();
    if let Err(e) = notification_result {
        debug!("Failed to show notification: {}", e);
    }

    Ok(())
}

/// One progress bar per active item
struct ProgressRenderer {
    multi: MultiProgress,
    bars: HashMap<usize, ProgressBar>,
    style: ProgressStyle,
}

impl ProgressRenderer {
    fn new() -> Self {
        let style = ProgressStyle::default_bar()
            .template("{prefix:>8} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");

        Self {
            multi: MultiProgress::new(),
            bars: HashMap::new(),
            style,
        }
    }

    fn render(&mut self, event: &PlaylistEvent) {
        match event {
            PlaylistEvent::MetadataFetched { title, count } => {
                let line = format!("Playlist: {} ({} items)", title, count);
                self.println(line.bright_cyan().bold().to_string());
            }
            PlaylistEvent::FileStarted {
                index,
                total,
                title,
            } => {
                let bar = self.multi.add(ProgressBar::new(100));
                bar.set_style(self.style.clone());
                bar.set_prefix(format!("{}/{}", index, total));
                bar.set_message(title.clone());
                self.bars.insert(*index, bar);
            }
            PlaylistEvent::FileProgress {
                index,
                percent,
                speed,
                eta,
            } => {
                if let Some(bar) = self.bars.get(index) {
                    bar.set_position(u64::from(*percent));
                    bar.set_message(format!("{} ETA {}", speed, eta));
                }
            }
            PlaylistEvent::FileCompleted {
                index,
                file_path,
                title,
            } => {
                if let Some(bar) = self.bars.remove(index) {
                    bar.finish_and_clear();
                }
                let line = format!("✓ {} → {}", title, file_path.display());
                self.println(line.green().to_string());
            }
            PlaylistEvent::FileFailed { index: 0, .. } => {}
            PlaylistEvent::FileFailed { index, error } => {
                if let Some(bar) = self.bars.remove(index) {
                    bar.finish_and_clear();
                }
                let line = format!("✗ Item {}: {}", index, error);
                self.println(line.red().to_string());
            }
            PlaylistEvent::PlaylistCompleted { .. } => {
                for (_, bar) in self.bars.drain() {
                    bar.abandon();
                }
            }
        }
    }

    fn println(&self, line: String) {
        if self.multi.println(&line).is_err() {
            println!("{}", line);
        }
    }
}

fn show_history(matches: &ArgMatches, config: &AppConfig) -> Result<(), AppError> {
    let path = HistoryStore::default_path()?;
    let mut history = HistoryStore::load_from(&path, config.history_limit)?;

    if matches.get_flag("clear") {
        history.clear();
        history.save_to(&path)?;
        println!("{}", "Download history cleared.".green());
        return Ok(());
    }

    if history.is_empty() {
        println!("{}", "No downloads in history.".yellow());
        return Ok(());
    }

    for record in history.records() {
        let status = if record.status == STATUS_FAILED {
            record.status.red()
        } else if record.status == STATUS_CANCELLED {
            record.status.yellow()
        } else {
            record.status.green()
        };
        println!(
            "{}  {:<16} {}  {}",
            record.timestamp.dimmed(),
            status,
            record.title.bold(),
            record.path
        );
        for item in record.items.iter().flatten() {
            println!("    {:<10} {}", item.status, item.title);
        }
    }
    Ok(())
}

fn print_config(config: &AppConfig) -> Result<(), AppError> {
    match AppConfig::default_path() {
        Ok(path) => println!("{} {}", "Config file:".cyan(), path.display()),
        Err(e) => debug!("No config path: {}", e),
    }
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

fn init_logger() {
    // Create a custom logger builder
    let mut builder = Builder::from_default_env();

    // Set the default level based on debug/release mode
    if cfg!(debug_assertions) {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.filter_level(LevelFilter::Info);
    }

    builder.format(|buf, record| {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        writeln!(
            buf,
            "[{} {} {}] {}",
            timestamp,
            record.level().to_string().to_uppercase(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    // Allow override through RUST_LOG environment variable
    builder.parse_env("RUST_LOG");
    builder.init();
}
