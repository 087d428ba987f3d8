mod common;

use common::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use textures_sync_lib::commands::paths;
use textures_sync_lib::commands::sync::{check_sync_status, run_scan, run_sync, SyncOptions};
use textures_sync_lib::config::default_last_run;

fn remote_with_removal() -> FakeRemote {
    let mut remote = FakeRemote::default();
    let a = texture("A.png");
    remote.publish(&[(a.as_str(), "a")]);
    let removal = remote.removed(&texture("teams/x/old.png"));
    remote.commit("c1", "2024-06-02T10:00:00Z", vec![removal]);
    remote
}

#[tokio::test]
async fn completed_run_advances_cursor_and_prunes() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), &local("A.png"), b"a");
    write(tmp.path(), &local("teams/x/old.png"), b"o");

    let h = harness(remote_with_removal(), tmp.path(), true);
    let mut cursor = MemoryCursor::new(default_last_run());
    let result = run_sync(&h.ctx, &mut cursor, SyncOptions::default()).await.unwrap();

    assert!(cursor.advanced);
    assert!(result.cursor_advanced);
    assert!(!result.cancelled);
    assert_eq!(result.files_deleted, 1);
    assert_eq!(result.folders_pruned, 2);
    assert!(result.errors.is_empty());
    assert!(!paths::local_path(tmp.path(), &local("teams")).exists());
    assert!(h.sink.contains("GitHub API RATE LIMITS status"));
    assert!(h.sink.contains("The operation took"));
}

#[tokio::test]
async fn cancelled_run_keeps_the_cursor() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), &local("teams/x/old.png"), b"o");

    let h = harness(remote_with_removal(), tmp.path(), true);
    h.cancel.cancel();
    let start = default_last_run();
    let mut cursor = MemoryCursor::new(start);
    let result = run_sync(&h.ctx, &mut cursor, SyncOptions::default()).await.unwrap();

    assert!(result.cancelled);
    assert!(!cursor.advanced);
    assert_eq!(cursor.at, start);
    assert!(read(tmp.path(), &local("teams/x/old.png")).is_some());
}

#[tokio::test]
async fn scan_only_reconciles() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), &local("extra.png"), b"e");

    let h = harness(remote_with_removal(), tmp.path(), true);
    let result = run_scan(&h.ctx, false).await.unwrap();

    assert_eq!(result.files_deleted, 1);
    assert_eq!(result.files_downloaded, 1);
    assert!(h.remote.commit_file_requests().is_empty());
    assert_eq!(read(tmp.path(), &local("A.png")), Some(b"a".to_vec()));
}

#[tokio::test]
async fn status_compares_head_with_cursor() {
    let remote = remote_with_removal();

    let behind = check_sync_status(&remote, date("2024-06-01T00:00:00Z")).await.unwrap();
    assert!(behind.has_changes);
    assert_eq!(behind.latest_commit_sha, "c1");
    assert!(behind.rate_limit.is_some());

    let current = check_sync_status(&remote, date("2024-06-03T00:00:00Z")).await.unwrap();
    assert!(!current.has_changes);
}
