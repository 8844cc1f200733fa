// tests/error_test.rs
use std::io;
use tubeloader::error::AppError;

#[test]
fn test_app_error_display() {
    // Test that error messages are formatted correctly

    let error = AppError::MissingDependency("yt-dlp".to_string());
    assert_eq!(error.to_string(), "Missing dependency: yt-dlp");

    let error = AppError::MetadataFetch("Invalid playlist URL".to_string());
    assert_eq!(error.to_string(), "Metadata fetch error: Invalid playlist URL");

    let error = AppError::DownloadError("Failed to download file".to_string());
    assert_eq!(error.to_string(), "Download error: Failed to download file");

    let error = AppError::ValidationError("Invalid URL".to_string());
    assert_eq!(error.to_string(), "Validation error: Invalid URL");

    let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
    let error = AppError::IoError(io_error);
    assert_eq!(error.to_string(), "I/O error: File not found");

    let error = AppError::PathError("Invalid path".to_string());
    assert_eq!(error.to_string(), "Path error: Invalid path");

    let error = AppError::ConfigError("bad value".to_string());
    assert_eq!(error.to_string(), "Config error: bad value");

    let error = AppError::RunInProgress;
    assert_eq!(
        error.to_string(),
        "A playlist download is already in progress"
    );

    let error = AppError::General("General error".to_string());
    assert_eq!(error.to_string(), "Application error: General error");
}

#[test]
fn test_error_conversions() {
    // Test From<String> for AppError
    let error: AppError = "Test error".to_string().into();
    assert!(matches!(error, AppError::General(msg) if msg == "Test error"));

    // Test From<&str> for AppError
    let error: AppError = "Another error".into();
    assert!(matches!(error, AppError::General(msg) if msg == "Another error"));

    // Test From<io::Error> for AppError
    let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied");
    let error: AppError = io_error.into();
    assert!(matches!(error, AppError::IoError(_)));

    // Test From<serde_json::Error> for AppError
    let json_error = serde_json::from_str::<serde_json::Value>("{ invalid").unwrap_err();
    let error: AppError = json_error.into();
    assert!(matches!(error, AppError::JsonError(_)));
    assert!(error.to_string().starts_with("JSON parsing error:"));
}
