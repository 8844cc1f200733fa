// src/utils.rs

use crate::error::AppError;
use dirs_next as dirs;
use log::{debug, info};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Base for expanding bare video ids
pub const WATCH_URL_BASE: &str = "https://www.youtube.com/watch?v=";

const MAX_FILENAME_CHARS: usize = 200;

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.)?[-a-zA-Z0-9@:%._\+~#=]{1,256}\.[a-zA-Z0-9()]{1,6}\b(?:[-a-zA-Z0-9()@:%_\+.~#?&/=]*)$")
        .expect("valid URL pattern")
});

static KNOWN_PLATFORM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://(?:www\.|m\.|music\.)?(?:youtube\.com|youtu\.be)/")
        .expect("valid platform pattern")
});

/// Validate a playlist URL before handing it to the downloader
pub fn validate_url(url: &str) -> Result<(), AppError> {
    let url = url.trim();

    if url.is_empty() {
        return Err(AppError::ValidationError("URL is empty".to_string()));
    }

    // Check URL length to prevent DoS attacks
    if url.len() > 4096 {
        return Err(AppError::ValidationError(
            "URL exceeds maximum allowed length".to_string(),
        ));
    }

    if KNOWN_PLATFORM.is_match(url) {
        debug!("URL validated as known video platform");
        return Ok(());
    }

    if !URL_PATTERN.is_match(url) {
        return Err(AppError::ValidationError(format!(
            "Invalid URL format: {}",
            url
        )));
    }

    // Check only for truly problematic characters
    let unusual_chars = ['<', '>', '\\', '{', '}', '^', '`'];
    if url.chars().any(|c| unusual_chars.contains(&c)) {
        return Err(AppError::ValidationError(
            "URL contains unusual characters".to_string(),
        ));
    }

    Ok(())
}

/// Expand a bare video id into a full watch URL; URLs pass through.
pub fn canonical_watch_url(url_or_id: &str) -> String {
    let trimmed = url_or_id.trim();
    if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("{}{}", WATCH_URL_BASE, trimmed)
    }
}

/// Make a title safe to use as a file or directory name on every platform
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let trimmed = replaced.trim_end_matches(|c: char| c == '.' || c == ' ');
    let limited: String = trimmed.chars().take(MAX_FILENAME_CHARS).collect();

    if limited.is_empty() {
        "video".to_string()
    } else {
        limited
    }
}

/// Default download location: `~/Downloads/<program_name>`
pub fn default_download_dir(program_name: &str) -> PathBuf {
    match dirs::download_dir().or_else(|| dirs::home_dir().map(|h| h.join("Downloads"))) {
        Some(path) => path.join(program_name),
        None => PathBuf::from("downloads"),
    }
}

/// Create the download directory if needed and return it
pub fn initialize_download_dir(dir: &Path) -> Result<PathBuf, AppError> {
    if dir.as_os_str().is_empty() {
        return Err(AppError::PathError(
            "Download directory is empty".to_string(),
        ));
    }

    if !dir.exists() {
        fs::create_dir_all(dir)?;
        info!("Created directory: {:?}", dir);
    } else if !dir.is_dir() {
        return Err(AppError::PathError(format!(
            "{:?} exists and is not a directory",
            dir
        )));
    }

    Ok(dir.to_path_buf())
}
