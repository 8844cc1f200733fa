// src/cli.rs

use clap::{value_parser, Arg, ArgAction, Command};

use crate::config::MAX_SPEED_LIMIT_MB;
use crate::model::MAX_PLAYLIST_CONCURRENCY;

/// Build the command-line interface for the application
pub fn build_cli() -> Command {
    Command::new("tubeloader")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Ibrahim Mohamed")
        .about("Concurrent playlist downloader built on yt-dlp")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("download")
                .about("Download every item of a playlist")
                .arg(
                    Arg::new("url")
                        .help("The URL of the playlist to download")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("quality")
                        .long("quality")
                        .short('q')
                        .help("Maximum video quality")
                        .value_parser(["best", "1080p", "720p", "480p", "360p"]),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .help("Container format for video, codec when used with --audio-only (e.g. mp4, webm, mp3)")
                        .value_name("FORMAT"),
                )
                .arg(
                    Arg::new("audio-only")
                        .long("audio-only")
                        .help("Download the audio stream only")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("start")
                        .long("start")
                        .help("First playlist item to download (1-based)")
                        .value_name("INDEX")
                        .value_parser(value_parser!(u64).range(1..)),
                )
                .arg(
                    Arg::new("end")
                        .long("end")
                        .help("Last playlist item to download (inclusive)")
                        .value_name("INDEX")
                        .value_parser(value_parser!(u64).range(1..)),
                )
                .arg(
                    Arg::new("subtitles")
                        .long("subs")
                        .help("Download subtitles if available")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .short('c')
                        .help("Number of items downloaded at the same time")
                        .value_name("N")
                        .value_parser(value_parser!(u64).range(1..=MAX_PLAYLIST_CONCURRENCY as u64)),
                )
                .arg(
                    Arg::new("limit-rate")
                        .long("limit-rate")
                        .help("Per-item speed limit in MB/s (0 for unlimited)")
                        .value_name("MBPS")
                        .value_parser(value_parser!(u64).range(0..=MAX_SPEED_LIMIT_MB)),
                )
                .arg(
                    Arg::new("output-dir")
                        .long("output-dir")
                        .short('o')
                        .help("Specify custom output directory")
                        .value_name("DIRECTORY"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .help("Print events as JSON lines instead of progress bars")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("history")
                .about("Show download history")
                .arg(
                    Arg::new("clear")
                        .long("clear")
                        .help("Delete all history entries")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(Command::new("config").about("Print the effective configuration"))
}
