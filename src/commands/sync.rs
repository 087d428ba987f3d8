use super::cleanup::prune_empty_folders;
use super::context::SyncContext;
use super::dupes::check_for_dupes;
use super::github::RemoteApi;
use super::history::{self, WalkOptions};
use super::progress::SyncStage;
use super::rate_limit::{calls_spent, report_rate_limits, RateLimitSnapshot};
use super::reconcile::{self, ValidateOptions};
use crate::config::{default_last_run, format_last_run, parse_last_run, ConfigStore};
use crate::error::{Result, SyncError};
use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use std::time::{Duration, Instant};

/// Persisted position of the incremental walk
pub trait SyncCursor: Send {
    fn last_run(&self) -> DateTime<Utc>;

    fn advance(&mut self, to: DateTime<Utc>) -> Result<()>;
}

impl SyncCursor for ConfigStore {
    fn last_run(&self) -> DateTime<Utc> {
        self.get("last_run_date")
            .and_then(parse_last_run)
            .unwrap_or_else(default_last_run)
    }

    fn advance(&mut self, to: DateTime<Utc>) -> Result<()> {
        self.write_last_run(to)
    }
}

/// How a sync run behaves
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Walk the whole history instead of stopping at the cursor
    pub full_scan: bool,
    pub verify_hashes: bool,
    /// Skip the deep validation pass after the walk
    pub skip_validation: bool,
}

/// Sync result
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncResult {
    pub files_downloaded: u32,
    pub files_deleted: u32,
    pub files_renamed: u32,
    pub folders_pruned: u32,
    pub errors: Vec<String>,
    pub cursor_advanced: bool,
    pub cancelled: bool,
}

/// Render a duration the way the run summary shows it, e.g. "1 hr 2 min 5 sec"
pub fn format_duration(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let (hours, rest) = (total / 3600, total % 3600);
    let (minutes, seconds) = (rest / 60, rest % 60);

    let mut formatted = String::new();
    if hours > 0 {
        formatted.push_str(&format!("{} hr ", hours));
    }
    if minutes > 0 || hours == 0 {
        formatted.push_str(&format!("{} min ", minutes));
    }
    formatted.push_str(&format!("{} sec", seconds));
    formatted
}

fn prune(ctx: &SyncContext) -> u32 {
    ctx.emit(SyncStage::Cleanup, "Cleaning up empty folders...");
    prune_empty_folders(&ctx.settings.local_root, ctx.sink())
}

async fn report_usage(ctx: &SyncContext, before: Option<RateLimitSnapshot>) {
    let after = report_rate_limits(ctx).await;
    if let (Some(before), Some(after)) = (before, after) {
        if let Some(spent) = calls_spent(&before, &after) {
            ctx.emit(
                SyncStage::Complete,
                format!("Used {} API calls this sync round.", spent),
            );
        }
    }
}

fn finish(ctx: &SyncContext, mut result: SyncResult, started: Instant) -> SyncResult {
    let counts = ctx.counts();
    result.files_downloaded = counts.downloaded;
    result.files_deleted = counts.deleted;
    result.files_renamed = counts.renamed;
    result.errors = ctx.errors();

    ctx.emit(
        SyncStage::Complete,
        format!("Current time: {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
    );
    ctx.emit(
        SyncStage::Complete,
        format!("The operation took {}", format_duration(started.elapsed())),
    );
    result
}

fn cancelled(ctx: &SyncContext, mut result: SyncResult, started: Instant) -> SyncResult {
    ctx.emit(SyncStage::Complete, "Sync cancelled. The last sync date was not updated.");
    result.cancelled = true;
    finish(ctx, result, started)
}

/// Deep validation, duplicate check and pruning
async fn health_check(ctx: &SyncContext, options: SyncOptions, result: &mut SyncResult) -> Result<()> {
    ctx.emit(SyncStage::Scanning, "Starting Health Check: looking for extraneous textures and duplicate filenames...");
    let report = reconcile::deep_validate(
        ctx,
        ValidateOptions {
            verify_hashes: options.verify_hashes,
        },
    )
    .await?;
    ctx.debug(format!("Deep scan: {:?}", report));

    if ctx.settings.debug_mode {
        check_for_dupes(&ctx.local_path(&ctx.settings.replacements_root()), ctx.sink());
    }

    result.folders_pruned += prune(ctx);
    ctx.emit(SyncStage::Scanning, "Finished Health Check.");
    Ok(())
}

/// Incremental (or full) commit walk, then the deep validation pass.
///
/// The cursor only moves after a complete, uncancelled walk. Per-item
/// failures end up in `errors`; only fatal errors are returned.
pub async fn run_sync(ctx: &SyncContext, cursor: &mut dyn SyncCursor, options: SyncOptions) -> Result<SyncResult> {
    let started = Instant::now();
    let mut result = SyncResult::default();

    ctx.emit(
        SyncStage::Preparing,
        format!("Current time: {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
    );
    if ctx.settings.debug_mode {
        ctx.emit(SyncStage::Preparing, "Debug mode is on. Output will be verbose.");
    }
    let limits_before = report_rate_limits(ctx).await;

    let since = cursor.last_run();
    if options.full_scan {
        ctx.emit(SyncStage::Syncing, "Full scan: reviewing the entire commit history...");
    } else {
        ctx.emit(
            SyncStage::Syncing,
            format!(
                "Checking for new or modified files since last run date ({})...",
                format_last_run(since)
            ),
        );
    }

    let walk_started = Utc::now();
    match history::walk(
        ctx,
        WalkOptions {
            since,
            full_scan: options.full_scan,
        },
    )
    .await
    {
        Ok(summary) => {
            ctx.emit(
                SyncStage::Syncing,
                format!(
                    "Finished reviewing {} commits. {} files downloaded, {} deleted, {} renamed.",
                    summary.commits, summary.downloaded, summary.deleted, summary.renamed
                ),
            );
            match cursor.advance(walk_started) {
                Ok(()) => {
                    result.cursor_advanced = true;
                    ctx.emit(SyncStage::Syncing, "Last Sync Date updated.");
                }
                Err(e) => ctx.record_error(format!(
                    "Error writing Sync Date ({}). Try updating it manually.",
                    e
                )),
            }
        }
        Err(SyncError::Cancelled) => return Ok(cancelled(ctx, result, started)),
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => ctx.record_error(format!("Commit walk failed: {}", e)),
    }

    result.folders_pruned += prune(ctx);

    if !options.skip_validation {
        match health_check(ctx, options, &mut result).await {
            Ok(()) => {}
            Err(SyncError::Cancelled) => return Ok(cancelled(ctx, result, started)),
            Err(e) => return Err(e),
        }
    }

    report_usage(ctx, limits_before).await;
    let result = finish(ctx, result, started);
    ctx.emit(
        SyncStage::Complete,
        format!(
            "Finished with textures sync. {} files downloaded. {} files deleted.",
            result.files_downloaded, result.files_deleted
        ),
    );
    Ok(result)
}

/// Deep validation pass on its own
pub async fn run_scan(ctx: &SyncContext, verify_hashes: bool) -> Result<SyncResult> {
    let started = Instant::now();
    let mut result = SyncResult::default();
    let limits_before = report_rate_limits(ctx).await;

    let options = SyncOptions {
        verify_hashes,
        ..Default::default()
    };
    match health_check(ctx, options, &mut result).await {
        Ok(()) => {}
        Err(SyncError::Cancelled) => return Ok(cancelled(ctx, result, started)),
        Err(e) => return Err(e),
    }

    report_usage(ctx, limits_before).await;
    Ok(finish(ctx, result, started))
}

/// Head of the branch against the stored cursor
#[derive(Debug, Clone)]
pub struct SyncStatusResult {
    pub latest_commit_sha: String,
    pub latest_commit_date: DateTime<Utc>,
    pub last_sync: DateTime<Utc>,
    pub has_changes: bool,
    pub rate_limit: Option<RateLimitSnapshot>,
}

/// Check whether the remote moved since the last sync
pub async fn check_sync_status(api: &dyn RemoteApi, last_sync: DateTime<Utc>) -> Result<SyncStatusResult> {
    let latest = api.latest_commit().await?;
    let latest_date = latest.author_date()?;
    let rate_limit = match api.rate_limit().await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            tracing::warn!("rate limit query failed: {}", e);
            None
        }
    };

    Ok(SyncStatusResult {
        latest_commit_sha: latest.sha,
        latest_commit_date: latest_date,
        last_sync,
        has_changes: latest_date > last_sync,
        rate_limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn durations_match_the_summary_format() {
        assert_eq!(format_duration(Duration::from_secs(5)), "0 min 5 sec");
        assert_eq!(format_duration(Duration::from_secs(125)), "2 min 5 sec");
        assert_eq!(format_duration(Duration::from_secs(3605)), "1 hr 5 sec");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1 hr 2 min 5 sec");
    }

    #[test]
    fn config_store_is_a_cursor() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.txt");
        fs::write(&path, "owner: ncaanext\nlast_run_date: not a date\n").unwrap();
        let mut store = ConfigStore::load(&path).unwrap();
        assert_eq!(store.last_run(), default_last_run());

        let at = parse_last_run("2024-06-01 08:00:00.125").unwrap();
        store.advance(at).unwrap();
        let reloaded = ConfigStore::load(&path).unwrap();
        assert_eq!(reloaded.last_run(), at);
        assert_eq!(reloaded.get("owner"), Some("ncaanext"));
    }
}
