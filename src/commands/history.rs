use super::context::SyncContext;
use super::github::{CommitFile, CommitSummary, FileStatus};
use super::hashing::matches_remote;
use super::paths::{self, disabled_name_of, file_name, is_hidden_name, is_user_customs, RepoPath};
use super::progress::SyncStage;
use super::transfer::{self, Destination};
use crate::error::Result;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Paths already resolved by a newer commit during this walk
#[derive(Debug, Default)]
pub struct FinishedSet {
    paths: HashSet<String>,
}

impl FinishedSet {
    pub fn contains(&self, key: &str) -> bool {
        self.paths.contains(key)
    }

    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.paths.insert(key.into())
    }
}

/// What the decision table needs to know about the local tree
pub trait LocalState: Sync {
    fn exists(&self, relative: &str) -> bool;

    /// Whether the file at `relative` has the given remote object hash
    fn matches(&self, relative: &str, sha: Option<&str>) -> bool;
}

/// Local state read straight from disk
pub struct DiskState {
    root: PathBuf,
}

impl DiskState {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl LocalState for DiskState {
    fn exists(&self, relative: &str) -> bool {
        paths::local_path(&self.root, relative).is_file()
    }

    fn matches(&self, relative: &str, sha: Option<&str>) -> bool {
        matches_remote(&paths::local_path(&self.root, relative), sha)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyProcessed,
    Current,
    AlreadyGone,
    OutsideSubdirectory,
    Hidden,
    UserCustoms,
    UnknownStatus,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::AlreadyProcessed => "Skipping because already processed in a newer commit.",
            Self::Current => "Skipping download because file exists and matches GitHub file.",
            Self::AlreadyGone => "File has already been deleted locally.",
            Self::OutsideSubdirectory => "Skipping because outside of specified subdirectory.",
            Self::Hidden => "Skipping hidden file or directory.",
            Self::UserCustoms => "Skipping file in the user customizations folder.",
            Self::UnknownStatus => "Unknown file status, skipping.",
        };
        f.write_str(text)
    }
}

/// Action chosen for one touched file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skip(SkipReason),
    /// Fetch into a path that has no current copy
    Download { target: String, mode: Destination },
    /// Replace a stale copy in place
    Overwrite { target: String },
    /// Move a local file; `refresh` downloads over `from` first
    Move { from: String, to: String, refresh: bool },
    Delete { target: String },
}

/// An outcome plus the finished-set keys it resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub outcome: Outcome,
    pub finish: Vec<String>,
}

impl Decision {
    fn new(outcome: Outcome, finish: &[&str]) -> Self {
        Self {
            outcome,
            finish: finish.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// The copy used for hash comparison: the disabled one when present
fn active_copy(state: &dyn LocalState, path: &str) -> Option<String> {
    let disabled = disabled_name_of(path);
    if state.exists(&disabled) {
        Some(disabled)
    } else if state.exists(path) {
        Some(path.to_string())
    } else {
        None
    }
}

/// Added or modified file inside the subdirectory
pub fn decide_update(
    finished: &FinishedSet,
    state: &dyn LocalState,
    path: &str,
    sha: Option<&str>,
) -> Decision {
    if finished.contains(path) {
        return Decision::new(Outcome::Skip(SkipReason::AlreadyProcessed), &[]);
    }
    let outcome = match active_copy(state, path) {
        None => Outcome::Download {
            target: path.to_string(),
            mode: Destination::FollowDisabled,
        },
        Some(active) if !state.matches(&active, sha) => Outcome::Overwrite { target: active },
        Some(_) => Outcome::Skip(SkipReason::Current),
    };
    Decision::new(outcome, &[path])
}

/// Removed file inside the subdirectory
pub fn decide_removal(finished: &FinishedSet, state: &dyn LocalState, path: &str) -> Decision {
    if finished.contains(path) {
        return Decision::new(Outcome::Skip(SkipReason::AlreadyProcessed), &[]);
    }
    let disabled = disabled_name_of(path);
    let outcome = if state.exists(path) {
        Outcome::Delete {
            target: path.to_string(),
        }
    } else if state.exists(&disabled) {
        Outcome::Delete { target: disabled }
    } else {
        Outcome::Skip(SkipReason::AlreadyGone)
    };
    Decision::new(outcome, &[path])
}

/// Renamed file; the guards run strictly in this order
pub fn decide_rename(
    finished: &FinishedSet,
    state: &dyn LocalState,
    old: &RepoPath,
    new: &RepoPath,
    sha: Option<&str>,
) -> Decision {
    let both = [old.key(), new.key()];

    // 1. a newer commit already settled this lineage
    if finished.contains(new.key()) {
        return Decision::new(Outcome::Skip(SkipReason::AlreadyProcessed), &[old.key()]);
    }

    match (old, new) {
        // 2. never touched the tracked area
        (RepoPath::Outside(_), RepoPath::Outside(_)) => {
            Decision::new(Outcome::Skip(SkipReason::OutsideSubdirectory), &[])
        }
        // 3. moved out of scope
        (RepoPath::Inside(old_path), RepoPath::Outside(_)) => {
            let old_disabled = disabled_name_of(old_path);
            let outcome = if state.exists(old_path) {
                Outcome::Delete {
                    target: old_path.clone(),
                }
            } else if state.exists(&old_disabled) {
                Outcome::Delete { target: old_disabled }
            } else {
                Outcome::Skip(SkipReason::AlreadyGone)
            };
            Decision::new(outcome, &both)
        }
        // 4. moved into scope
        (RepoPath::Outside(_), RepoPath::Inside(new_path)) => Decision::new(
            Outcome::Download {
                target: new_path.clone(),
                mode: Destination::FollowDisabled,
            },
            &both,
        ),
        (RepoPath::Inside(old_path), RepoPath::Inside(new_path)) => {
            let old_disabled = disabled_name_of(old_path);
            let outcome = if state.exists(old_path) {
                // 5. plain old copy
                Outcome::Move {
                    from: old_path.clone(),
                    to: new_path.clone(),
                    refresh: !state.matches(old_path, sha),
                }
            } else if state.exists(&old_disabled) {
                // 6. disabled old copy stays disabled
                Outcome::Move {
                    refresh: !state.matches(&old_disabled, sha),
                    from: old_disabled,
                    to: disabled_name_of(new_path),
                }
            } else if state.exists(new_path) {
                // 7. already renamed locally
                if state.matches(new_path, sha) {
                    Outcome::Skip(SkipReason::Current)
                } else {
                    Outcome::Overwrite {
                        target: new_path.clone(),
                    }
                }
            } else {
                // 8. nothing local
                Outcome::Download {
                    target: new_path.clone(),
                    mode: Destination::FollowDisabled,
                }
            };
            Decision::new(outcome, &both)
        }
    }
}

/// Walk parameters
#[derive(Debug, Clone, Copy)]
pub struct WalkOptions {
    pub since: DateTime<Utc>,
    pub full_scan: bool,
}

/// Tallies of one walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    pub commits: u32,
    pub skipped_commits: u32,
    pub downloaded: u32,
    pub deleted: u32,
    pub renamed: u32,
}

async fn fetch_commit_files(ctx: &SyncContext, sha: &str) -> Result<Vec<CommitFile>> {
    let mut files = Vec::new();
    let mut page: Option<String> = None;
    loop {
        let listing = ctx.api.commit_files(sha, page.as_deref()).await?;
        files.extend(listing.items);
        match listing.next {
            Some(next) => page = Some(next),
            None => return Ok(files),
        }
    }
}

/// Pre-filters, then the decision for one touched file
fn classify(ctx: &SyncContext, finished: &FinishedSet, state: &dyn LocalState, file: &CommitFile) -> (String, Decision) {
    let subdirectory = &ctx.settings.reference.subdirectory;
    let path = RepoPath::resolve(&file.filename, subdirectory);
    let label = path.key().to_string();
    let skip = |reason| Decision::new(Outcome::Skip(reason), &[]);

    if is_hidden_name(file_name(&file.filename)) {
        return (label, skip(SkipReason::Hidden));
    }
    if is_user_customs(&file.filename, &ctx.settings.user_customs) {
        return (label, skip(SkipReason::UserCustoms));
    }

    let decision = match (file.status, &path) {
        (FileStatus::Renamed, _) => match &file.previous_filename {
            Some(previous) => {
                let old = RepoPath::resolve(previous, subdirectory);
                ctx.debug(format!("    In commit, {} renamed to {}.", old.key(), path.key()));
                decide_rename(finished, state, &old, &path, file.sha.as_deref())
            }
            None => skip(SkipReason::UnknownStatus),
        },
        (_, RepoPath::Outside(_)) => skip(SkipReason::OutsideSubdirectory),
        (FileStatus::Added | FileStatus::Modified, RepoPath::Inside(p)) => {
            decide_update(finished, state, p, file.sha.as_deref())
        }
        (FileStatus::Removed, RepoPath::Inside(p)) => decide_removal(finished, state, p),
        (FileStatus::Other, _) => skip(SkipReason::UnknownStatus),
    };
    (label, decision)
}

async fn apply(ctx: &SyncContext, file: &CommitFile, outcome: &Outcome) -> Result<()> {
    let raw_url = file.raw_url.as_deref();
    let missing_url = || ctx.record_error(format!("No download URL for {}", file.filename));

    match outcome {
        Outcome::Skip(reason) => ctx.emit(SyncStage::Syncing, format!("    {}", reason)),
        Outcome::Download { target, mode } => {
            let Some(url) = raw_url else {
                missing_url();
                return Ok(());
            };
            let dest = ctx.local_path(target);
            let written = transfer::resolve_target(&dest, *mode);
            if transfer::download(ctx, url, &dest, *mode).await?.is_some() {
                ctx.emit(
                    SyncStage::Downloading,
                    format!("    Downloaded: {}", file_label(&written)),
                );
            }
        }
        Outcome::Overwrite { target } => {
            let Some(url) = raw_url else {
                missing_url();
                return Ok(());
            };
            let dest = ctx.local_path(target);
            if transfer::download(ctx, url, &dest, Destination::Exact).await?.is_some() {
                ctx.emit(
                    SyncStage::Downloading,
                    format!("    Hashes differ. Downloaded: {}", target),
                );
            }
        }
        Outcome::Move { from, to, refresh } => {
            let from_path = ctx.local_path(from);
            if *refresh {
                ctx.emit(
                    SyncStage::Downloading,
                    "    Hashes don't match. Downloading the correct version of the file.",
                );
                let Some(url) = raw_url else {
                    missing_url();
                    return Ok(());
                };
                if transfer::download(ctx, url, &from_path, Destination::Exact)
                    .await?
                    .is_none()
                {
                    return Ok(());
                }
            }
            if transfer::rename(ctx, &from_path, &ctx.local_path(to)) {
                ctx.emit(SyncStage::Syncing, format!("    Renamed: {} to {}", from, to));
            }
        }
        Outcome::Delete { target } => {
            if transfer::delete(ctx, &ctx.local_path(target)) {
                ctx.emit(SyncStage::Deleting, format!("    Deleted {}", target));
            }
        }
    }
    Ok(())
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

async fn process_commit(
    ctx: &SyncContext,
    commit: &CommitSummary,
    finished: &mut FinishedSet,
    state: &dyn LocalState,
) -> Result<()> {
    let files = fetch_commit_files(ctx, &commit.sha).await?;
    for file in &files {
        ctx.check_cancelled()?;
        let (label, decision) = classify(ctx, finished, state, file);
        ctx.emit(
            SyncStage::Syncing,
            format!("{} {} in commit: {}", file.status.bullet(), file.status.as_str(), label),
        );
        if ctx.settings.debug_mode {
            ctx.debug(format!("    Remote hash: {}", file.sha.as_deref().unwrap_or("-")));
        }
        apply(ctx, file, &decision.outcome).await?;
        for key in decision.finish {
            if finished.insert(key.clone()) {
                ctx.debug(format!("    Added to finished files set: {}", key));
            }
        }
    }
    Ok(())
}

/// Replay commit history newest to oldest onto the local tree.
///
/// A failed commit list ends the walk with an error; a failed per-commit file
/// list only skips that commit.
pub async fn walk(ctx: &SyncContext, options: WalkOptions) -> Result<WalkSummary> {
    let before = ctx.counts();
    let state = DiskState::new(&ctx.settings.local_root);
    let mut finished = FinishedSet::default();
    let mut summary = WalkSummary::default();
    let mut page: Option<String> = None;
    let mut first_page = true;

    'pages: loop {
        ctx.check_cancelled()?;
        ctx.emit(SyncStage::Fetching, "Fetching commits...");
        let listing = ctx.api.list_commits(page.as_deref()).await?;

        for commit in &listing.items {
            ctx.check_cancelled()?;
            let date = match commit.author_date() {
                Ok(date) => date,
                Err(e) => {
                    ctx.record_error(format!("Skipping commit {}: {}", commit.short_sha(), e));
                    summary.skipped_commits += 1;
                    continue;
                }
            };
            if !options.full_scan && date <= options.since {
                ctx.debug(format!(
                    "Commit {} predates the last sync; older history is already applied.",
                    commit.short_sha()
                ));
                break 'pages;
            }

            summary.commits += 1;
            ctx.emit(
                SyncStage::Syncing,
                format!(
                    "****** GIT COMMIT ({}) DATE: {} ******",
                    commit.short_sha(),
                    date.format("%Y-%m-%d %H:%M:%S")
                ),
            );

            match process_commit(ctx, commit, &mut finished, &state).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    ctx.record_error(format!(
                        "Failed to fetch files for commit ({}) SHA: {}, Commit Date: {}: {}",
                        commit.short_sha(),
                        commit.sha,
                        date,
                        e
                    ));
                    summary.skipped_commits += 1;
                }
            }
        }

        if first_page && summary.commits == 0 && !options.full_scan {
            break;
        }
        first_page = false;

        match listing.next {
            Some(next) => page = Some(next),
            None => break,
        }
    }

    if summary.commits == 0 && !options.full_scan {
        ctx.emit(
            SyncStage::Complete,
            "There is no new or modified content in GitHub since your last sync date.",
        );
    }

    let delta = ctx.counts().since(&before);
    summary.downloaded = delta.downloaded;
    summary.deleted = delta.deleted;
    summary.renamed = delta.renamed;
    Ok(summary)
}
