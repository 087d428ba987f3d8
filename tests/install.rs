mod common;

use common::*;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use textures_sync_lib::commands::app_info::Manifest;
use textures_sync_lib::commands::install::{plan_install, run_install, InstallOptions};
use textures_sync_lib::SyncError;

fn manifest() -> Manifest {
    serde_json::from_str(
        r#"{
            "version": "3.0",
            "min_downloader_app_version": "2.0",
            "download_complete": ["textures/SLUS-21214/replacements/ui"],
            "download_subdirectories": ["textures/SLUS-21214/replacements/teams"]
        }"#,
    )
    .unwrap()
}

fn pack(page_size: usize) -> FakeRemote {
    let mut remote = FakeRemote::default().with_page_size(page_size);
    let files = [
        texture("ui/a.png"),
        texture("ui/menus/b.png"),
        texture("teams/alabama/x.png"),
        texture("teams/auburn/y.png"),
        texture("teams/readme.txt"),
    ];
    let published: Vec<(&str, &str)> = files.iter().map(|f| (f.as_str(), "png")).collect();
    remote.publish(&published);
    remote
}

fn options() -> InstallOptions {
    InstallOptions {
        extract_retry_delay: Duration::from_millis(1),
        ..Default::default()
    }
}

#[tokio::test]
async fn plan_expands_split_directories() {
    let tmp = TempDir::new().unwrap();
    let h = harness(pack(1), tmp.path(), true);

    let groups = plan_install(&h.ctx, &manifest()).await.unwrap();

    assert_eq!(
        groups,
        vec![
            texture("ui"),
            texture("teams/alabama"),
            texture("teams/auburn"),
        ]
    );
}

#[tokio::test]
async fn install_writes_every_group() {
    let tmp = TempDir::new().unwrap();
    let Harness { remote, ctx, .. } = harness(pack(2), tmp.path(), true);

    let report = run_install(Arc::new(ctx), &manifest(), options()).await.unwrap();

    assert_eq!(report.groups, 3);
    assert_eq!(report.files_written, 4);
    assert!(report.failed_groups.is_empty());
    assert_eq!(remote.downloads(), 4);
    for name in ["ui/a.png", "ui/menus/b.png", "teams/alabama/x.png", "teams/auburn/y.png"] {
        assert_eq!(read(tmp.path(), &local(name)), Some(b"png".to_vec()), "{}", name);
    }
    assert!(read(tmp.path(), &local("teams/readme.txt")).is_none());
}

#[tokio::test]
async fn existing_target_is_refused() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), &local("mine.png"), b"m");
    let Harness { remote, ctx, .. } = harness(pack(100), tmp.path(), true);

    let err = run_install(Arc::new(ctx), &manifest(), options()).await.unwrap_err();

    assert!(matches!(err, SyncError::TargetExists { .. }));
    assert_eq!(remote.downloads(), 0);
    assert_eq!(read(tmp.path(), &local("mine.png")), Some(b"m".to_vec()));
}

#[tokio::test]
async fn existing_target_can_be_backed_up() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), &local("mine.png"), b"m");
    let Harness { ctx, .. } = harness(pack(100), tmp.path(), true);

    let report = run_install(
        Arc::new(ctx),
        &manifest(),
        InstallOptions {
            backup_existing: true,
            ..options()
        },
    )
    .await
    .unwrap();

    let backup = std::path::PathBuf::from(report.backup.unwrap());
    assert!(backup.join("replacements").join("mine.png").is_file());
    assert_eq!(report.files_written, 4);
    assert!(read(tmp.path(), &local("mine.png")).is_none());
}

#[tokio::test]
async fn missing_split_directory_is_recorded() {
    let tmp = TempDir::new().unwrap();
    let h = harness(pack(100), tmp.path(), true);
    let mut manifest = manifest();
    manifest
        .download_subdirectories
        .push("textures/SLUS-21214/replacements/nope".to_string());

    let groups = plan_install(&h.ctx, &manifest).await.unwrap();

    assert_eq!(groups.len(), 3);
    assert_eq!(h.ctx.errors().len(), 1);
}
