//! Share watcher tests: the watcher must emit exactly one event per
//! catalog-relevant change and stay quiet for everything else.

use std::time::Duration;

use shoal_peer::{ShareEventKind, ShareWatcher};
use tempfile::TempDir;
use tokio::time::timeout;

#[tokio::test]
async fn test_new_file_is_announced_once() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let share = temp_dir.path().to_path_buf();

    let mut watcher =
        ShareWatcher::new(share.clone(), Vec::new()).expect("Failed to create watcher");

    // Give the watcher time to fully initialize - FSEvents on macOS needs time
    tokio::time::sleep(Duration::from_millis(500)).await;

    std::fs::write(share.join("new.txt"), b"hello").expect("Failed to write file");

    // Force a second modification to trigger FSEvents reliably; the known
    // set keeps it from double-announcing.
    tokio::time::sleep(Duration::from_millis(100)).await;
    std::fs::write(share.join("new.txt"), b"hello world").expect("Failed to modify file");

    let event = timeout(Duration::from_secs(10), watcher.event_rx().recv())
        .await
        .expect("Timeout waiting for share event")
        .expect("No event received");

    assert_eq!(event.filename, "new.txt");
    assert_eq!(event.kind, ShareEventKind::Added);

    // No duplicate announcement for the rewrite.
    let quiet = timeout(Duration::from_millis(500), watcher.event_rx().recv()).await;
    assert!(quiet.is_err(), "Rewrite of a known file should not re-announce");
}

#[tokio::test]
async fn test_removed_file_is_unannounced() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let share = temp_dir.path().to_path_buf();

    // File exists before the watcher starts, so it is part of the seed.
    let path = share.join("old.txt");
    std::fs::write(&path, b"bye").expect("Failed to write file");

    let mut watcher = ShareWatcher::new(share.clone(), vec!["old.txt".to_string()])
        .expect("Failed to create watcher");
    tokio::time::sleep(Duration::from_millis(500)).await;

    std::fs::remove_file(&path).expect("Failed to remove file");

    let event = timeout(Duration::from_secs(10), watcher.event_rx().recv())
        .await
        .expect("Timeout waiting for share event")
        .expect("No event received");

    assert_eq!(event.filename, "old.txt");
    assert_eq!(event.kind, ShareEventKind::Removed);
}

#[tokio::test]
async fn test_seeded_file_rewrite_is_quiet() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let share = temp_dir.path().to_path_buf();

    let path = share.join("known.txt");
    std::fs::write(&path, b"v1").expect("Failed to write file");

    let mut watcher = ShareWatcher::new(share.clone(), vec!["known.txt".to_string()])
        .expect("Failed to create watcher");
    tokio::time::sleep(Duration::from_millis(500)).await;

    std::fs::write(&path, b"v2").expect("Failed to modify file");

    let quiet = timeout(Duration::from_secs(1), watcher.event_rx().recv()).await;
    assert!(quiet.is_err(), "Modifying a seeded file is not a catalog change");
}

#[tokio::test]
async fn test_hidden_files_are_ignored() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let share = temp_dir.path().to_path_buf();

    let mut watcher =
        ShareWatcher::new(share.clone(), Vec::new()).expect("Failed to create watcher");
    tokio::time::sleep(Duration::from_millis(500)).await;

    // Hidden file first (should be ignored), then a visible one.
    std::fs::write(share.join(".secret"), b"x").expect("Failed to write hidden file");
    tokio::time::sleep(Duration::from_millis(200)).await;
    std::fs::write(share.join("visible.txt"), b"y").expect("Failed to write file");

    let event = timeout(Duration::from_secs(10), watcher.event_rx().recv())
        .await
        .expect("Timeout waiting for share event")
        .expect("No event received");

    assert_eq!(event.filename, "visible.txt", "Hidden files never enter the catalog");
    assert_eq!(event.kind, ShareEventKind::Added);
}
