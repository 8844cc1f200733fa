// src/ytdlp.rs
// MediaBackend driving the yt-dlp executable

use log::{debug, error, warn};
use std::collections::VecDeque;
use std::io::{self, BufRead, BufReader, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use crate::backend::{DownloadOptions, MediaBackend, RawPlaylist, ResolvedInfo};
use crate::error::AppError;
use crate::progress::{ProgressSample, ProgressStatus};

const PROGRESS_PREFIX: &str = "tubeloader-progress:";
const FILE_PREFIX: &str = "tubeloader-file:";
const STDERR_TAIL: usize = 50;

const PROGRESS_TEMPLATE: &str = "download:tubeloader-progress:%(progress.status)s|%(progress.downloaded_bytes)s|%(progress.total_bytes)s|%(progress.total_bytes_estimate)s|%(progress.speed)s|%(progress.eta)s|%(progress._percent_str)s|%(progress._speed_str)s|%(progress._eta_str)s";

const FILE_TEMPLATE: &str = "after_move:tubeloader-file:%(id)s\t%(ext)s\t%(filepath)s\t%(title)s";

/// Backend spawning one `yt-dlp` process per call
#[derive(Debug, Clone)]
pub struct YtDlpBackend {
    program: PathBuf,
}

impl Default for YtDlpBackend {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

impl YtDlpBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Installed yt-dlp version
    pub fn version(&self) -> Result<String, AppError> {
        let output = Command::new(&self.program)
            .arg("--version")
            .output()
            .map_err(|e| spawn_error(e, &self.program))?;

        if !output.status.success() {
            return Err(AppError::MissingDependency(format!(
                "{} --version exited with {}",
                self.program.display(),
                output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.stdin(Stdio::null());
        command
    }
}

/// Arguments for a flat metadata listing
pub fn metadata_args(url: &str, item_range: Option<&str>, flat: bool) -> Vec<String> {
    let mut args = Vec::new();
    if flat {
        args.push("--flat-playlist".to_string());
    }
    args.push("--dump-single-json".to_string());
    args.push("--no-warnings".to_string());
    if let Some(range) = item_range {
        args.push("--playlist-items".to_string());
        args.push(range.to_string());
    }
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

/// Arguments for downloading one item with machine-readable progress output
pub fn download_args(url: &str, options: &DownloadOptions) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-f".into(),
        options.format.clone(),
        "-o".into(),
        options.output_template.clone(),
        "--no-playlist".into(),
        "--newline".into(),
        "--progress".into(),
        "--progress-template".into(),
        PROGRESS_TEMPLATE.into(),
        "--print".into(),
        FILE_TEMPLATE.into(),
    ];

    if options.windows_filenames {
        args.push("--windows-filenames".into());
    }

    if let Some(rate) = options.rate_limit.filter(|r| *r > 0) {
        args.push("--limit-rate".into());
        args.push(rate.to_string());
    }

    if options.write_subtitles {
        args.push("--write-subs".into());
        args.push("--write-auto-subs".into());
        if !options.subtitle_langs.is_empty() {
            args.push("--sub-langs".into());
            args.push(options.subtitle_langs.join(","));
        }
    }

    if let Some(audio) = &options.audio_extraction {
        args.push("-x".into());
        args.push("--audio-format".into());
        args.push(audio.codec.clone());
        args.push("--audio-quality".into());
        args.push(audio.quality.clone());
    }

    args.push("--".into());
    args.push(url.to_string());
    args
}

fn optional_field(value: &str) -> Option<&str> {
    let value = value.trim();
    if value.is_empty() || value == "NA" || value == "None" {
        None
    } else {
        Some(value)
    }
}

fn number(value: &str) -> Option<f64> {
    optional_field(value)?.parse::<f64>().ok().filter(|n| n.is_finite())
}

fn bytes(value: &str) -> Option<u64> {
    number(value).filter(|n| *n >= 0.0).map(|n| n as u64)
}

/// Parse one line produced by the progress template
pub fn parse_progress_line(line: &str) -> Option<ProgressSample> {
    let payload = line.trim().strip_prefix(PROGRESS_PREFIX)?;
    let fields: Vec<&str> = payload.split('|').collect();
    if fields.len() < 9 {
        return None;
    }

    let status = ProgressStatus::parse(fields[0])?;
    Some(ProgressSample {
        status,
        downloaded_bytes: bytes(fields[1]),
        total_bytes: bytes(fields[2]),
        total_bytes_estimate: bytes(fields[3]),
        speed: number(fields[4]),
        eta: number(fields[5]),
        percent_str: optional_field(fields[6]).map(str::to_string),
        speed_str: optional_field(fields[7]).map(str::to_string),
        eta_str: optional_field(fields[8]).map(str::to_string),
        filename: None,
    })
}

/// Parse the after-move line naming the final file
pub fn parse_file_line(line: &str, template: &str) -> Option<ResolvedInfo> {
    let payload = line
        .trim_end_matches(|c: char| c == '\r' || c == '\n')
        .strip_prefix(FILE_PREFIX)?;
    let mut parts = payload.splitn(4, '\t');

    let id = parts.next()?.to_string();
    let ext = parts.next()?.to_string();
    let filepath = parts.next().and_then(optional_field).map(PathBuf::from);
    let title = parts.next().unwrap_or_default().to_string();

    Some(ResolvedInfo {
        id,
        title,
        ext,
        template: template.to_string(),
        filepath,
    })
}

fn spawn_error(e: io::Error, program: &std::path::Path) -> AppError {
    match e.kind() {
        io::ErrorKind::NotFound => AppError::MissingDependency("yt-dlp".to_string()),
        io::ErrorKind::PermissionDenied => AppError::DownloadError(format!(
            "Permission denied when running {}",
            program.display()
        )),
        _ => AppError::DownloadError(format!("Failed to execute {}: {}", program.display(), e)),
    }
}

/// Lines of a child's output stream, decoded lossily.
///
/// Titles and paths are not guaranteed to be UTF-8; a bad byte must not end
/// the read, or the child is left writing to a closed pipe.
fn lossy_lines<R: Read>(stream: R) -> impl Iterator<Item = String> {
    BufReader::new(stream)
        .split(b'\n')
        .map_while(Result::ok)
        .map(|mut bytes| {
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            String::from_utf8_lossy(&bytes).into_owned()
        })
}

/// Most useful line of yt-dlp's stderr for an error message
fn failure_reason(stderr: &[String]) -> Option<String> {
    stderr
        .iter()
        .rev()
        .find(|line| line.starts_with("ERROR:"))
        .or_else(|| stderr.iter().rev().find(|line| !line.trim().is_empty()))
        .map(|line| line.trim_start_matches("ERROR:").trim().to_string())
}

impl MediaBackend for YtDlpBackend {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    fn fetch_metadata(
        &self,
        url: &str,
        item_range: Option<&str>,
        flat: bool,
    ) -> Result<RawPlaylist, AppError> {
        debug!("Fetching playlist metadata for {}", url);
        let output = self
            .base_command()
            .args(metadata_args(url, item_range, flat))
            .output()
            .map_err(|e| spawn_error(e, &self.program))?;

        if !output.status.success() {
            let stderr: Vec<String> = String::from_utf8_lossy(&output.stderr)
                .lines()
                .map(str::to_string)
                .collect();
            let reason = failure_reason(&stderr)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", output.status));
            return Err(AppError::MetadataFetch(reason));
        }

        let raw: RawPlaylist = serde_json::from_slice(&output.stdout)
            .map_err(|e| AppError::MetadataFetch(format!("Unreadable playlist listing: {}", e)))?;

        if raw.entries.is_none() {
            return Err(AppError::MetadataFetch("Invalid playlist URL".to_string()));
        }
        Ok(raw)
    }

    fn download(&self, url: &str, options: &DownloadOptions) -> Result<ResolvedInfo, AppError> {
        let mut child = self
            .base_command()
            .args(download_args(url, options))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error(e, &self.program))?;

        let stderr_tail = Arc::new(Mutex::new(VecDeque::<String>::new()));
        let stderr_reader = child.stderr.take().map(|stream| {
            let tail = Arc::clone(&stderr_tail);
            thread::spawn(move || {
                for line in lossy_lines(stream) {
                    debug!("yt-dlp stderr: {}", line);
                    let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
                    tail.push_back(line);
                    if tail.len() > STDERR_TAIL {
                        tail.pop_front();
                    }
                }
            })
        });

        let mut resolved = None;
        if let Some(stdout) = child.stdout.take() {
            for line in lossy_lines(stdout) {
                if let Some(sample) = parse_progress_line(&line) {
                    if let Some(hook) = &options.progress_hook {
                        hook(&sample);
                    }
                } else if let Some(info) = parse_file_line(&line, &options.output_template) {
                    resolved = Some(info);
                } else if !line.trim().is_empty() {
                    debug!("yt-dlp: {}", line);
                }
            }
        }

        let status = child.wait()?;
        if let Some(reader) = stderr_reader {
            if reader.join().is_err() {
                warn!("yt-dlp stderr reader panicked");
            }
        }

        if !status.success() {
            let tail: Vec<String> = stderr_tail
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .cloned()
                .collect();
            let reason = failure_reason(&tail)
                .unwrap_or_else(|| format!("yt-dlp exited with {}", status));
            error!("yt-dlp failed for {}: {}", url, reason);
            return Err(AppError::DownloadError(reason));
        }

        resolved.ok_or_else(|| {
            AppError::DownloadError(format!("yt-dlp did not report an output file for {}", url))
        })
    }
}
