use super::app_info::Manifest;
use super::context::SyncContext;
use super::filesystem::{backup_existing_folder, check_existing_folder};
use super::github::ContentEntry;
use super::paths::{self, RepoPath};
use super::progress::SyncStage;
use super::rate_limit::report_rate_limits;
use super::remote_tree::raw_url;
use crate::config::{EXTRACT_ATTEMPTS, EXTRACT_RETRY_DELAY_SECS, INSTALL_CONCURRENCY, SLUS_FOLDER};
use crate::error::{Result, SyncError};
use backoff::backoff::Backoff;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Installer knobs
#[derive(Debug, Clone, Copy)]
pub struct InstallOptions {
    /// Rename an existing target folder out of the way instead of refusing
    pub backup_existing: bool,
    pub extract_attempts: u32,
    pub extract_retry_delay: Duration,
}

impl Default for InstallOptions {
    fn default() -> Self {
        Self {
            backup_existing: false,
            extract_attempts: EXTRACT_ATTEMPTS,
            extract_retry_delay: Duration::from_secs(EXTRACT_RETRY_DELAY_SECS),
        }
    }
}

/// Installation summary
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub groups: usize,
    pub files_written: usize,
    pub failed_groups: Vec<String>,
    pub backup: Option<String>,
}

/// Fixed delay between a bounded number of retries
#[derive(Debug, Clone)]
struct FixedRetries {
    delay: Duration,
    remaining: u32,
    retries: u32,
}

impl FixedRetries {
    fn new(delay: Duration, attempts: u32) -> Self {
        let retries = attempts.saturating_sub(1);
        Self {
            delay,
            remaining: retries,
            retries,
        }
    }
}

impl Backoff for FixedRetries {
    fn next_backoff(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.delay)
    }

    fn reset(&mut self) {
        self.remaining = self.retries;
    }
}

/// Lock contention and friends; Windows reports sharing violations as permission errors
fn is_transient_write_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

/// Files of one group held in memory until the whole group is fetched
#[derive(Debug, Default)]
pub struct StagedArchive {
    entries: Vec<(String, Vec<u8>)>,
}

impl StagedArchive {
    pub fn add(&mut self, relative: String, content: Vec<u8>) {
        self.entries.push((relative, content));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write every staged file under `root`, retrying transient write errors
    pub async fn extract(self, root: &Path, options: &InstallOptions) -> Result<usize> {
        let mut written = 0;
        for (relative, content) in self.entries {
            let dest = paths::local_path(root, &relative);
            let retry = FixedRetries::new(options.extract_retry_delay, options.extract_attempts);
            backoff::future::retry(retry, || async {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| classify_write_error(parent, e))?;
                }
                fs::write(&dest, &content).map_err(|e| classify_write_error(&dest, e))
            })
            .await?;
            written += 1;
        }
        Ok(written)
    }
}

fn classify_write_error(path: &Path, e: io::Error) -> backoff::Error<SyncError> {
    if is_transient_write_error(&e) {
        tracing::debug!("write to {} blocked, retrying: {}", path.display(), e);
        backoff::Error::transient(SyncError::io(path, e))
    } else {
        backoff::Error::permanent(SyncError::io(path, e))
    }
}

/// All entries of a repository directory, following pagination
async fn list_directory(ctx: &SyncContext, repo_path: &str) -> Result<Vec<ContentEntry>> {
    let mut entries = Vec::new();
    let mut page: Option<String> = None;
    loop {
        let listing = ctx.api.contents(repo_path, page.as_deref()).await?;
        entries.extend(listing.items);
        match listing.next {
            Some(next) => page = Some(next),
            None => return Ok(entries),
        }
    }
}

/// Expand the manifest into directory groups
pub async fn plan_install(ctx: &SyncContext, manifest: &Manifest) -> Result<Vec<String>> {
    let mut groups = manifest.download_complete.clone();

    for parent in &manifest.download_subdirectories {
        match list_directory(ctx, parent).await {
            Ok(entries) => groups.extend(
                entries
                    .into_iter()
                    .filter(ContentEntry::is_dir)
                    .map(|entry| entry.path),
            ),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => ctx.record_error(format!("Failed to list subdirectories of {}: {}", parent, e)),
        }
    }

    Ok(groups)
}

/// Fetch every file below `group` into memory
async fn stage_group(ctx: &SyncContext, group: &str, label: &str) -> Result<StagedArchive> {
    let subdirectory = &ctx.settings.reference.subdirectory;
    let mut archive = StagedArchive::default();
    let mut pending = vec![group.to_string()];

    while let Some(dir) = pending.pop() {
        ctx.check_cancelled()?;
        for entry in list_directory(ctx, &dir).await? {
            if entry.is_dir() {
                pending.push(entry.path);
                continue;
            }
            if !entry.is_file() {
                continue;
            }
            let RepoPath::Inside(relative) = RepoPath::resolve(&entry.path, subdirectory) else {
                continue;
            };
            ctx.check_cancelled()?;
            let url = entry
                .download_url
                .clone()
                .unwrap_or_else(|| raw_url(&ctx.settings.reference, &relative));
            match ctx.api.download(&url).await {
                Ok(content) => {
                    archive.add(relative, content);
                    if archive.len() % 25 == 0 {
                        ctx.emit(
                            SyncStage::Downloading,
                            format!("Status update ({}): {} items downloaded.", label, archive.len()),
                        );
                    }
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => ctx.record_error(format!("Failed to get file content {}: {}", entry.path, e)),
            }
        }
    }

    Ok(archive)
}

async fn install_group(ctx: &SyncContext, group: &str, options: &InstallOptions) -> Result<usize> {
    let label = group
        .strip_prefix(&format!("{}/", ctx.settings.reference.subdirectory))
        .unwrap_or(group)
        .to_string();
    ctx.emit(SyncStage::Downloading, format!("Downloading next group ({})...", label));

    let archive = stage_group(ctx, group, &label).await?;
    ctx.emit(
        SyncStage::Installing,
        format!("Finished group ({}) - {} items. Extracting...", label, archive.len()),
    );

    let written = archive.extract(&ctx.settings.local_root, options).await?;
    ctx.emit(SyncStage::Installing, format!("Extracted ({}).", label));
    Ok(written)
}

/// Bulk first-time install of the texture pack
pub async fn run_install(ctx: Arc<SyncContext>, manifest: &Manifest, options: InstallOptions) -> Result<InstallReport> {
    let root = ctx.settings.local_root.clone();
    let folder = ctx.settings.slus_folder.clone().unwrap_or_else(|| SLUS_FOLDER.to_string());
    let mut report = InstallReport::default();

    fs::create_dir_all(&root).map_err(|e| SyncError::io(&root, e))?;
    if check_existing_folder(&root, &folder) {
        if !options.backup_existing {
            return Err(SyncError::TargetExists {
                path: root.join(&folder),
            });
        }
        let backup = backup_existing_folder(&root, &folder)?;
        ctx.emit(
            SyncStage::Preparing,
            format!("Existing folder backed up to {}", backup.display()),
        );
        report.backup = Some(backup.display().to_string());
    }

    ctx.emit(
        SyncStage::Preparing,
        "Beginning initial installation of the mod textures. This is a huge download; leave it running.",
    );
    report_rate_limits(&ctx).await;

    let groups = plan_install(&ctx, manifest).await?;
    report.groups = groups.len();
    ctx.emit(SyncStage::Preparing, format!("{} download groups planned.", groups.len()));

    let semaphore = Arc::new(Semaphore::new(INSTALL_CONCURRENCY));
    let mut tasks = JoinSet::new();
    for group in groups {
        let ctx = Arc::clone(&ctx);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => install_group(&ctx, &group, &options).await,
                Err(_) => Err(SyncError::Cancelled),
            };
            (group, result)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(written))) => report.files_written += written,
            Ok((_, Err(e))) if e.is_fatal() => {
                tasks.abort_all();
                return Err(e);
            }
            Ok((group, Err(e))) => {
                ctx.record_error(format!("Group {} failed: {}", group, e));
                report.failed_groups.push(group);
            }
            Err(e) => ctx.record_error(format!("Install task failed: {}", e)),
        }
    }

    report_rate_limits(&ctx).await;
    ctx.emit(
        SyncStage::Complete,
        format!(
            "TEXTURES INSTALLATION DONE! {} files written. Run a full sync now for a deep inspection.",
            report.files_written
        ),
    );
    Ok(report)
}
