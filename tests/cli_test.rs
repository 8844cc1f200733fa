// tests/cli_test.rs
use tubeloader::cli::build_cli;

#[test]
fn test_cli_basic_structure() {
    // Build the CLI
    let app = build_cli();

    // Check that the app has the expected name
    assert_eq!(app.get_name(), "tubeloader");

    let matches = app
        .clone()
        .try_get_matches_from(vec![
            "tubeloader",
            "download",
            "https://www.youtube.com/playlist?list=PL1",
        ])
        .unwrap();

    let (name, sub) = matches.subcommand().unwrap();
    assert_eq!(name, "download");
    let url = sub.get_one::<String>("url").unwrap();
    assert_eq!(url, "https://www.youtube.com/playlist?list=PL1");
    assert!(!sub.get_flag("audio-only"));
    assert!(!sub.get_flag("json"));
}

#[test]
fn test_cli_download_options() {
    let app = build_cli();

    let matches = app
        .clone()
        .try_get_matches_from(vec![
            "tubeloader",
            "download",
            "https://www.youtube.com/playlist?list=PL1",
            "--quality",
            "720p",
            "--format",
            "webm",
            "--start",
            "2",
            "--end",
            "8",
            "-c",
            "4",
            "--limit-rate",
            "10",
            "--subs",
            "--audio-only",
            "-o",
            "/tmp/videos",
            "--json",
        ])
        .unwrap();
    let sub = matches.subcommand_matches("download").unwrap();

    assert_eq!(sub.get_one::<String>("quality").unwrap(), "720p");
    assert_eq!(sub.get_one::<String>("format").unwrap(), "webm");
    assert_eq!(*sub.get_one::<u64>("start").unwrap(), 2);
    assert_eq!(*sub.get_one::<u64>("end").unwrap(), 8);
    assert_eq!(*sub.get_one::<u64>("concurrency").unwrap(), 4);
    assert_eq!(*sub.get_one::<u64>("limit-rate").unwrap(), 10);
    assert!(sub.get_flag("subtitles"));
    assert!(sub.get_flag("audio-only"));
    assert!(sub.get_flag("json"));
    assert_eq!(sub.get_one::<String>("output-dir").unwrap(), "/tmp/videos");
}

#[test]
fn test_cli_rejects_out_of_range_values() {
    let app = build_cli();
    let url = "https://www.youtube.com/playlist?list=PL1";

    for args in [
        vec!["tubeloader", "download", url, "--quality", "4k"],
        vec!["tubeloader", "download", url, "--concurrency", "6"],
        vec!["tubeloader", "download", url, "--concurrency", "0"],
        vec!["tubeloader", "download", url, "--start", "0"],
        vec!["tubeloader", "download", url, "--limit-rate", "101"],
        vec!["tubeloader", "download"],
        vec!["tubeloader"],
    ] {
        assert!(
            app.clone().try_get_matches_from(args.clone()).is_err(),
            "accepted {:?}",
            args
        );
    }
}

#[test]
fn test_cli_history_and_config() {
    let app = build_cli();

    let matches = app
        .clone()
        .try_get_matches_from(vec!["tubeloader", "history", "--clear"])
        .unwrap();
    let sub = matches.subcommand_matches("history").unwrap();
    assert!(sub.get_flag("clear"));

    let matches = app
        .clone()
        .try_get_matches_from(vec!["tubeloader", "config"])
        .unwrap();
    assert_eq!(matches.subcommand_name(), Some("config"));
}
