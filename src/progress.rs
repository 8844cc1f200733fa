// src/progress.rs
// Normalization of raw downloader progress samples into display values

use once_cell::sync::Lazy;
use regex::Regex;

/// Placeholder shown while speed or ETA are not known yet
pub const CALCULATING: &str = "Calculating...";

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ANSI escape pattern")
});

/// Status reported by the downloader alongside each sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    Downloading,
    Finished,
    Error,
}

impl ProgressStatus {
    pub fn parse(status: &str) -> Option<Self> {
        match status.trim() {
            "downloading" => Some(Self::Downloading),
            "finished" => Some(Self::Finished),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// One progress report from the downloader.
///
/// Every field may be missing. The `*_str` fields are the downloader's own
/// human-formatted values, which can carry terminal color codes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub status: ProgressStatus,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub total_bytes_estimate: Option<u64>,
    /// Bytes per second
    pub speed: Option<f64>,
    /// Seconds remaining
    pub eta: Option<f64>,
    pub percent_str: Option<String>,
    pub speed_str: Option<String>,
    pub eta_str: Option<String>,
    pub filename: Option<String>,
}

impl ProgressSample {
    pub fn new(status: ProgressStatus) -> Self {
        Self {
            status,
            downloaded_bytes: None,
            total_bytes: None,
            total_bytes_estimate: None,
            speed: None,
            eta: None,
            percent_str: None,
            speed_str: None,
            eta_str: None,
            filename: None,
        }
    }

    /// Convenience constructor for a `downloading` sample with byte counts
    pub fn downloading(downloaded: u64, total: Option<u64>) -> Self {
        Self {
            downloaded_bytes: Some(downloaded),
            total_bytes: total,
            ..Self::new(ProgressStatus::Downloading)
        }
    }

    /// Exact total when known and non-zero, else the estimate
    fn effective_total(&self) -> Option<u64> {
        self.total_bytes
            .filter(|t| *t > 0)
            .or(self.total_bytes_estimate.filter(|t| *t > 0))
    }
}

/// Display-ready progress values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedProgress {
    pub percent: u8,
    pub speed: String,
    pub eta: String,
}

/// Convert a raw sample into (percent, speed, eta) for display.
pub fn normalize(sample: &ProgressSample) -> NormalizedProgress {
    NormalizedProgress {
        percent: percent_of(sample),
        speed: speed_display(sample),
        eta: eta_display(sample),
    }
}

fn percent_of(sample: &ProgressSample) -> u8 {
    if let Some(total) = sample.effective_total() {
        let downloaded = sample.downloaded_bytes.unwrap_or(0);
        let pct = (downloaded as f64 / total as f64 * 100.0).trunc();
        return pct.clamp(0.0, 100.0) as u8;
    }

    sample
        .percent_str
        .as_deref()
        .map(sanitize_display_text)
        .and_then(|s| s.trim_end_matches('%').trim().parse::<f64>().ok())
        .filter(|p| p.is_finite())
        .map(|p| p.trunc().clamp(0.0, 100.0) as u8)
        .unwrap_or(0)
}

fn speed_display(sample: &ProgressSample) -> String {
    match sample.speed {
        Some(speed) if speed > 0.0 => format_speed(speed),
        _ => fallback_text(sample.speed_str.as_deref(), &["N/A"]),
    }
}

fn eta_display(sample: &ProgressSample) -> String {
    match sample.eta {
        Some(eta) if eta > 0.0 => format_eta(eta),
        _ => fallback_text(sample.eta_str.as_deref(), &["N/A", "Unknown"]),
    }
}

fn fallback_text(raw: Option<&str>, placeholders: &[&str]) -> String {
    let cleaned = raw.map(sanitize_display_text).unwrap_or_default();
    if cleaned.is_empty() || placeholders.contains(&cleaned.as_str()) {
        CALCULATING.to_string()
    } else {
        cleaned
    }
}

/// Format a transfer rate with binary prefixes, e.g. `1.50 KB/s`.
pub fn format_speed(bytes_per_sec: f64) -> String {
    if !bytes_per_sec.is_finite() || bytes_per_sec <= 0.0 {
        return CALCULATING.to_string();
    }

    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    if bytes_per_sec < KB {
        format!("{:.0} B/s", bytes_per_sec)
    } else if bytes_per_sec < MB {
        format!("{:.2} KB/s", bytes_per_sec / KB)
    } else {
        format!("{:.2} MB/s", bytes_per_sec / MB)
    }
}

/// Format remaining seconds as `MM:SS`, or `HH:MM:SS` from one hour up.
pub fn format_eta(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return CALCULATING.to_string();
    }

    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Strip ANSI escapes, zero-width/invisible characters and control
/// characters (newline and tab survive), then trim.
pub fn sanitize_display_text(text: &str) -> String {
    let without_ansi = ANSI_ESCAPE.replace_all(text, "");

    without_ansi
        .chars()
        .filter(|c| matches!(c, '\n' | '\t') || !is_non_rendering(*c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Control, format (zero-width, bidi marks, BOM) and private-use characters
fn is_non_rendering(c: char) -> bool {
    if c.is_control() {
        return true;
    }

    matches!(
        c as u32,
        0x00AD
            | 0x0600..=0x0605
            | 0x061C
            | 0x06DD
            | 0x070F
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0xE000..=0xF8FF
            | 0xE0001
            | 0xE0020..=0xE007F
            | 0xF0000..=0x10FFFF
    )
}
