// tests/ytdlp_test.rs
use std::path::PathBuf;

use tubeloader::backend::{AudioExtraction, DownloadOptions, MediaBackend};
use tubeloader::error::AppError;
use tubeloader::progress::{normalize, ProgressStatus};
use tubeloader::ytdlp::{
    download_args, metadata_args, parse_file_line, parse_progress_line, YtDlpBackend,
};

fn position(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
}

#[test]
fn test_metadata_args() {
    let args = metadata_args("https://www.youtube.com/playlist?list=PL1", Some("2:5"), true);
    assert_eq!(
        args,
        vec![
            "--flat-playlist",
            "--dump-single-json",
            "--no-warnings",
            "--playlist-items",
            "2:5",
            "--",
            "https://www.youtube.com/playlist?list=PL1",
        ]
    );

    let args = metadata_args("https://x.com/p", None, false);
    assert!(position(&args, "--flat-playlist").is_none());
    assert!(position(&args, "--playlist-items").is_none());
}

#[test]
fn test_download_args_minimal() {
    let options = DownloadOptions {
        format: "bestaudio/best".to_string(),
        output_template: "/dl/%(title)s.%(ext)s".to_string(),
        ..Default::default()
    };
    let args = download_args("https://www.youtube.com/watch?v=abc", &options);

    let f = position(&args, "-f").unwrap();
    assert_eq!(args[f + 1], "bestaudio/best");
    let o = position(&args, "-o").unwrap();
    assert_eq!(args[o + 1], "/dl/%(title)s.%(ext)s");
    assert!(position(&args, "--no-playlist").is_some());
    assert!(position(&args, "--progress-template").is_some());
    assert!(position(&args, "--limit-rate").is_none());
    assert!(position(&args, "--write-subs").is_none());
    assert!(position(&args, "-x").is_none());
    assert!(position(&args, "--windows-filenames").is_none());
    assert_eq!(
        &args[args.len() - 2..],
        &["--".to_string(), "https://www.youtube.com/watch?v=abc".to_string()]
    );
}

#[test]
fn test_download_args_full() {
    let options = DownloadOptions {
        format: "bestaudio/best".to_string(),
        output_template: "/dl/%(title)s.%(ext)s".to_string(),
        rate_limit: Some(2_097_152),
        write_subtitles: true,
        subtitle_langs: vec!["en".to_string(), "de".to_string()],
        audio_extraction: Some(AudioExtraction {
            codec: "mp3".to_string(),
            quality: "192".to_string(),
        }),
        windows_filenames: true,
        ..Default::default()
    };
    let args = download_args("https://www.youtube.com/watch?v=abc", &options);

    let rate = position(&args, "--limit-rate").unwrap();
    assert_eq!(args[rate + 1], "2097152");
    assert!(position(&args, "--write-subs").is_some());
    assert!(position(&args, "--write-auto-subs").is_some());
    let langs = position(&args, "--sub-langs").unwrap();
    assert_eq!(args[langs + 1], "en,de");
    assert!(position(&args, "-x").is_some());
    let codec = position(&args, "--audio-format").unwrap();
    assert_eq!(args[codec + 1], "mp3");
    let quality = position(&args, "--audio-quality").unwrap();
    assert_eq!(args[quality + 1], "192");
    assert!(position(&args, "--windows-filenames").is_some());

    // Zero rate means unlimited
    let unlimited = DownloadOptions {
        rate_limit: Some(0),
        ..options
    };
    assert!(position(&download_args("u", &unlimited), "--limit-rate").is_none());
}

#[test]
fn test_parse_progress_line() {
    let line = "tubeloader-progress:downloading|524288|1048576|NA|262144.5|2|  50.0%|256.00KiB/s|00:02";
    let sample = parse_progress_line(line).unwrap();
    assert_eq!(sample.status, ProgressStatus::Downloading);
    assert_eq!(sample.downloaded_bytes, Some(524_288));
    assert_eq!(sample.total_bytes, Some(1_048_576));
    assert_eq!(sample.total_bytes_estimate, None);
    assert_eq!(sample.speed, Some(262_144.5));
    assert_eq!(sample.eta, Some(2.0));
    assert_eq!(sample.percent_str.as_deref(), Some("50.0%"));

    let normalized = normalize(&sample);
    assert_eq!(normalized.percent, 50);
    assert_eq!(normalized.speed, "256.00 KB/s");
    assert_eq!(normalized.eta, "00:02");
}

#[test]
fn test_parse_progress_line_with_missing_values() {
    let line = "tubeloader-progress:downloading|1000|NA|4000.0|NA|NA|  25.0%|Unknown B/s|Unknown";
    let sample = parse_progress_line(line).unwrap();
    assert_eq!(sample.total_bytes, None);
    assert_eq!(sample.total_bytes_estimate, Some(4000));
    assert_eq!(sample.speed, None);
    assert_eq!(sample.eta, None);
    assert_eq!(normalize(&sample).percent, 25);

    assert!(parse_progress_line("[download]  10.0% of 5MiB").is_none());
    assert!(parse_progress_line("tubeloader-progress:downloading|1|2").is_none());
    assert!(parse_progress_line("tubeloader-progress:weird|1|2|3|4|5|6|7|8").is_none());
}

#[test]
fn test_parse_file_line() {
    let line = "tubeloader-file:abc123\tmp4\t/dl/Mix/1 - Song.mp4\tSong\t(live)";
    let info = parse_file_line(line, "/dl/Mix/1 - %(title)s.%(ext)s").unwrap();
    assert_eq!(info.id, "abc123");
    assert_eq!(info.ext, "mp4");
    assert_eq!(info.filepath, Some(PathBuf::from("/dl/Mix/1 - Song.mp4")));
    assert_eq!(info.title, "Song\t(live)");
    assert_eq!(info.template, "/dl/Mix/1 - %(title)s.%(ext)s");

    let backend = YtDlpBackend::default();
    assert_eq!(
        backend.prepare_filename(&info),
        PathBuf::from("/dl/Mix/1 - Song.mp4")
    );

    let no_path = parse_file_line("tubeloader-file:id\twebm\tNA\tClip\r\n", "/o/%(title)s.%(ext)s").unwrap();
    assert_eq!(no_path.filepath, None);
    assert_eq!(backend.prepare_filename(&no_path), PathBuf::from("/o/Clip.webm"));

    assert!(parse_file_line("some other output", "t").is_none());
}

#[test]
fn test_missing_executable_is_reported() {
    let backend = YtDlpBackend::new("/nonexistent/tubeloader-test/yt-dlp");
    assert!(matches!(
        backend.version(),
        Err(AppError::MissingDependency(_))
    ));
    assert!(matches!(
        backend.fetch_metadata("https://www.youtube.com/playlist?list=PL1", None, true),
        Err(AppError::MissingDependency(_))
    ));
    assert!(matches!(
        backend.download("https://www.youtube.com/watch?v=a", &DownloadOptions::default()),
        Err(AppError::MissingDependency(_))
    ));
    assert_eq!(backend.name(), "yt-dlp");
}

#[cfg(unix)]
#[test]
fn test_non_utf8_output_does_not_abort_download() {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("yt-dlp");
    std::fs::write(
        &script,
        "#!/bin/sh\n\
         echo 'tubeloader-progress:downloading|10|100|NA|5.0|18|  10.0%|5.00B/s|00:18'\n\
         printf 'tubeloader-file:abc\\tmp4\\t/dl/caf\\351.mp4\\tCaf\\351\\n'\n\
         echo 'tubeloader-progress:finished|100|100|NA|NA|NA| 100.0%|NA|NA'\n\
         exit 0\n",
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

    let samples = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&samples);
    let options = DownloadOptions {
        output_template: "/dl/%(title)s.%(ext)s".to_string(),
        progress_hook: Some(Arc::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })),
        ..Default::default()
    };

    let backend = YtDlpBackend::new(&script);
    let info = backend
        .download("https://www.youtube.com/watch?v=abc", &options)
        .unwrap();

    assert_eq!(info.id, "abc");
    assert_eq!(info.title, "Caf\u{FFFD}");
    assert_eq!(info.filepath, Some(PathBuf::from("/dl/caf\u{FFFD}.mp4")));
    assert_eq!(samples.load(Ordering::SeqCst), 2);
}
