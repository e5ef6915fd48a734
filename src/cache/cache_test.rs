use tempfile::tempdir;

use super::*;
use crate::ConfigFormat;

fn writer_in(root: &Path) -> CacheWriter {
    CacheWriter::new(root, &RemoteKey::new("/hub-config/etcd", "test", ConfigFormat::Json))
}

#[tokio::test]
async fn test_prepare_should_create_nested_directories() {
    let temp_dir = tempdir().unwrap();
    let writer = writer_in(temp_dir.path());

    writer.prepare().await.expect("should create dirs");
    assert!(writer.dir().is_dir());
    assert!(writer.dir().ends_with("hub-config/etcd/test/json"));

    // idempotent
    writer.prepare().await.expect("second prepare should succeed");
}

#[tokio::test]
async fn test_write_should_replace_whole_content() {
    let temp_dir = tempdir().unwrap();
    let writer = writer_in(temp_dir.path());
    writer.prepare().await.unwrap();

    writer.write(br#"{"a":1,"long":"xxxxxxxxxxxxxxxx"}"#).await.unwrap();
    writer.write(br#"{"a":2}"#).await.unwrap();

    assert_eq!(writer.read().await.unwrap(), br#"{"a":2}"#.to_vec());
    assert_eq!(
        writer.path().file_name().unwrap().to_str(),
        Some("application.json")
    );
}

#[tokio::test]
async fn test_write_should_leave_no_temporary_file() {
    let temp_dir = tempdir().unwrap();
    let writer = writer_in(temp_dir.path());
    writer.prepare().await.unwrap();
    writer.write(b"{}").await.unwrap();

    let entries: Vec<_> = std::fs::read_dir(writer.dir())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(entries, vec![std::ffi::OsString::from("application.json")]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_write_should_apply_fixed_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = tempdir().unwrap();
    let writer = writer_in(temp_dir.path());
    writer.prepare().await.unwrap();
    writer.write(b"{}").await.unwrap();

    let mode = std::fs::metadata(writer.path()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o644);
}

#[tokio::test]
async fn test_write_without_directory_should_report_io_error() {
    let temp_dir = tempdir().unwrap();
    let writer = writer_in(temp_dir.path());

    let result = writer.write(b"{}").await;
    assert!(matches!(result, Err(Error::Io { .. })));
}
