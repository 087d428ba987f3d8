use super::context::SyncContext;
use super::hashing::matches_remote;
use super::local_tree::list_local;
use super::paths::{disabled_name_of, file_name, is_disabled_name, is_user_customs};
use super::progress::SyncStage;
use super::remote_tree::{fetch_remote_tree, RemoteFileRecord};
use super::transfer::{self, Destination};
use crate::error::Result;
use std::collections::BTreeSet;

/// Path filters applied to both listings
#[derive(Debug, Clone, Copy)]
pub struct ReconcileRules<'a> {
    pub user_customs: &'a str,
    /// Local-relative root the pass is limited to, e.g. `SLUS-21214/replacements`
    pub replacements_root: &'a str,
}

impl ReconcileRules<'_> {
    fn in_scope(&self, path: &str) -> bool {
        !is_user_customs(path, self.user_customs)
            && path
                .strip_prefix(self.replacements_root)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// What the deep pass would change
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub to_delete: Vec<String>,
    pub to_download: Vec<String>,
}

/// Diff the local and remote listings.
///
/// Disabled local files are never scheduled for deletion, and a remote file
/// whose disabled counterpart exists locally is never downloaded.
pub fn reconcile(local: &[String], remote: &[String], rules: ReconcileRules<'_>) -> ReconcilePlan {
    let raw_local: BTreeSet<&str> = local.iter().map(String::as_str).collect();

    let local_set: BTreeSet<&str> = local
        .iter()
        .map(String::as_str)
        .filter(|p| !is_disabled_name(file_name(p)))
        .filter(|p| rules.in_scope(p))
        .collect();

    let remote_set: BTreeSet<&str> = remote
        .iter()
        .map(String::as_str)
        .filter(|p| rules.in_scope(p))
        .collect();

    let to_delete = local_set
        .difference(&remote_set)
        .map(|p| p.to_string())
        .collect();

    let to_download = remote_set
        .difference(&local_set)
        .filter(|p| !raw_local.contains(disabled_name_of(p).as_str()))
        .map(|p| p.to_string())
        .collect();

    ReconcilePlan {
        to_delete,
        to_download,
    }
}

/// Deep pass options
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Also hash files present on both sides and offer to refresh mismatches
    pub verify_hashes: bool,
}

/// Outcome of the deep pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub extra: usize,
    pub missing: usize,
    pub mismatched: usize,
    pub deleted: u32,
    pub downloaded: u32,
    pub refreshed: u32,
}

/// Resolve a download URL through the contents endpoint, following pagination
async fn resolve_download_url(ctx: &SyncContext, relative: &str) -> Result<Option<String>> {
    let subdirectory = &ctx.settings.reference.subdirectory;
    let repo_path = if subdirectory.is_empty() {
        relative.to_string()
    } else {
        format!("{}/{}", subdirectory, relative)
    };

    let mut page: Option<String> = None;
    loop {
        ctx.check_cancelled()?;
        let listing = match ctx.api.contents(&repo_path, page.as_deref()).await {
            Ok(listing) => listing,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                ctx.record_error(format!("Failed to fetch file information for {}: {}", relative, e));
                return Ok(None);
            }
        };

        if let Some(url) = listing
            .items
            .into_iter()
            .find(|entry| entry.is_file() && entry.path == repo_path)
            .and_then(|entry| entry.download_url)
        {
            return Ok(Some(url));
        }

        match listing.next {
            Some(next) => page = Some(next),
            None => return Ok(None),
        }
    }
}

async fn delete_extra(ctx: &SyncContext, to_delete: &[String]) -> Result<u32> {
    if to_delete.is_empty() {
        ctx.emit(
            SyncStage::Comparing,
            format!(
                "No files to delete. You don't have any extra files that aren't in the GitHub repo (other than your custom textures and DLC in the '{}' folder). Great!",
                ctx.settings.user_customs
            ),
        );
        return Ok(0);
    }

    ctx.emit(SyncStage::Comparing, "EXTRA Files to be Deleted:");
    for path in to_delete {
        ctx.emit(SyncStage::Comparing, format!("- {}", path));
    }

    let prompt = format!(
        "Files were found to exist locally that are not in GitHub. These could cause issues. It is advised to delete them.\n\
         If they are your own custom files or DLC, move them to the '{}' folder where they will be ignored.\n\n\
         The {} files listed in the output WILL BE DELETED. Do you want to proceed?",
        ctx.settings.user_customs,
        to_delete.len()
    );
    if !ctx.confirm(&prompt).await {
        ctx.emit(SyncStage::Deleting, "Deletion cancelled.");
        return Ok(0);
    }

    let mut deleted = 0;
    for path in to_delete {
        ctx.check_cancelled()?;
        let full = ctx.local_path(path);
        if transfer::delete(ctx, &full) {
            deleted += 1;
            ctx.emit(SyncStage::Deleting, format!("Deleted: {}", path));
        } else if !full.exists() {
            ctx.emit(SyncStage::Deleting, format!("File not found: {}", path));
        }
    }
    Ok(deleted)
}

async fn download_missing(ctx: &SyncContext, to_download: &[String], replacements_root: &str) -> Result<u32> {
    if to_download.is_empty() {
        ctx.emit(
            SyncStage::Comparing,
            "No files to download. You have everything in the GitHub repo. Great!",
        );
        return Ok(0);
    }

    ctx.emit(SyncStage::Comparing, "MISSING Files to Download:");
    let prefix = format!("{}/", replacements_root);
    for path in to_download {
        let shown = path.strip_prefix(&prefix).unwrap_or(path.as_str());
        ctx.emit(SyncStage::Comparing, format!("- {}", shown));
    }

    let prompt = format!(
        "You're missing files that are in the GitHub repo. This will cause issues! \
         It is highly recommended that you download them now. See the output for the list of files.\n\n\
         Okay to download the {} missing files?",
        to_download.len()
    );
    if !ctx.confirm(&prompt).await {
        ctx.emit(SyncStage::Downloading, "Download cancelled.");
        return Ok(0);
    }

    let total = to_download.len() as u32;
    let mut downloaded = 0;
    for (i, path) in to_download.iter().enumerate() {
        ctx.check_cancelled()?;
        let dest = ctx.local_path(path);
        if dest.exists() {
            ctx.emit(SyncStage::Downloading, format!("Skipping existing file: {}", path));
            continue;
        }
        let Some(url) = resolve_download_url(ctx, path).await? else {
            ctx.emit(
                SyncStage::Downloading,
                format!("Download URL not available for file: {}", path),
            );
            continue;
        };
        if transfer::download(ctx, &url, &dest, Destination::Exact).await?.is_some() {
            downloaded += 1;
            ctx.emit_counted(SyncStage::Downloading, format!("Downloaded: {}", path), i as u32 + 1, total);
        }
    }
    Ok(downloaded)
}

/// Files present on both sides whose active local copy differs from the remote
fn find_mismatched(
    ctx: &SyncContext,
    remote: &[RemoteFileRecord],
    rules: ReconcileRules<'_>,
) -> Result<Vec<(RemoteFileRecord, String)>> {
    let mut mismatched = Vec::new();
    for record in remote.iter().filter(|r| rules.in_scope(&r.path)) {
        ctx.check_cancelled()?;
        let disabled = disabled_name_of(&record.path);
        let active = if ctx.local_path(&disabled).is_file() {
            disabled
        } else if ctx.local_path(&record.path).is_file() {
            record.path.clone()
        } else {
            continue;
        };
        if !matches_remote(&ctx.local_path(&active), Some(&record.sha)) {
            ctx.debug(format!("Hash mismatch: {}", active));
            mismatched.push((record.clone(), active));
        }
    }
    Ok(mismatched)
}

async fn refresh_mismatched(ctx: &SyncContext, mismatched: &[(RemoteFileRecord, String)]) -> Result<u32> {
    if mismatched.is_empty() {
        ctx.emit(SyncStage::Verifying, "All local files match the GitHub repo.");
        return Ok(0);
    }

    ctx.emit(SyncStage::Verifying, "OUTDATED Files to Refresh:");
    for (_, active) in mismatched {
        ctx.emit(SyncStage::Verifying, format!("- {}", active));
    }

    let prompt = format!(
        "{} local files differ from the GitHub repo. Okay to replace them with the repo versions?",
        mismatched.len()
    );
    if !ctx.confirm(&prompt).await {
        ctx.emit(SyncStage::Verifying, "Refresh cancelled.");
        return Ok(0);
    }

    let total = mismatched.len() as u32;
    let mut refreshed = 0;
    for (i, (record, active)) in mismatched.iter().enumerate() {
        let dest = ctx.local_path(active);
        if transfer::download(ctx, &record.url, &dest, Destination::Exact).await?.is_some() {
            refreshed += 1;
            ctx.emit_counted(SyncStage::Verifying, format!("Refreshed: {}", active), i as u32 + 1, total);
        }
    }
    Ok(refreshed)
}

/// Deep validation: compare full listings and offer to fix what differs.
///
/// Nothing is deleted or downloaded without a positive confirmation.
pub async fn deep_validate(ctx: &SyncContext, options: ValidateOptions) -> Result<ValidationReport> {
    ctx.emit(SyncStage::Scanning, "Analyzing local directory structure...");
    let local = list_local(&ctx.settings.local_root, ctx.settings.slus_folder.as_deref());
    ctx.emit(
        SyncStage::Scanning,
        format!("Directory tree generated for the local directory ({} files).", local.len()),
    );

    ctx.emit(SyncStage::Fetching, "Analyzing GitHub repo directory structure...");
    let remote = fetch_remote_tree(ctx).await?;
    ctx.emit(
        SyncStage::Fetching,
        format!("Directory tree generated for the GitHub repository ({} files).", remote.len()),
    );

    ctx.emit(
        SyncStage::Comparing,
        "Comparing the GitHub repo directory structure to your local textures folder...",
    );
    let replacements_root = ctx.settings.replacements_root();
    let rules = ReconcileRules {
        user_customs: &ctx.settings.user_customs,
        replacements_root: &replacements_root,
    };
    let remote_paths: Vec<String> = remote.iter().map(|r| r.path.clone()).collect();
    let plan = reconcile(&local, &remote_paths, rules);

    let mut report = ValidationReport {
        extra: plan.to_delete.len(),
        missing: plan.to_download.len(),
        ..Default::default()
    };

    report.deleted = delete_extra(ctx, &plan.to_delete).await?;
    report.downloaded = download_missing(ctx, &plan.to_download, &replacements_root).await?;

    if options.verify_hashes {
        ctx.emit(SyncStage::Verifying, "Verifying file hashes...");
        let mismatched = find_mismatched(ctx, &remote, rules)?;
        report.mismatched = mismatched.len();
        report.refreshed = refresh_mismatched(ctx, &mismatched).await?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ROOT: &str = "SLUS-21214/replacements";

    fn rules() -> ReconcileRules<'static> {
        ReconcileRules {
            user_customs: "user-customs",
            replacements_root: ROOT,
        }
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|p| format!("{}/{}", ROOT, p)).collect()
    }

    #[test]
    fn extra_and_missing() {
        let local = list(&["A.png", "B.png", "user-customs/C.png"]);
        let remote = list(&["A.png", "D.png"]);
        let plan = reconcile(&local, &remote, rules());
        assert_eq!(plan.to_delete, list(&["B.png"]));
        assert_eq!(plan.to_download, list(&["D.png"]));
    }

    #[test]
    fn disabled_files_are_kept_and_not_shadowed() {
        let local = list(&["ui/-menu.png", "ui/-gone.png"]);
        let remote = list(&["ui/menu.png", "ui/new.png"]);
        let plan = reconcile(&local, &remote, rules());
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.to_download, list(&["ui/new.png"]));
    }

    #[test]
    fn only_the_replacements_root_is_considered() {
        let local = vec![
            "SLUS-21214/textures.ini".to_string(),
            "SLUS-21214/replacements-old/x.png".to_string(),
        ];
        let remote = vec!["SLUS-21214/readme.txt".to_string()];
        assert_eq!(reconcile(&local, &remote, rules()), ReconcilePlan::default());
    }
}
