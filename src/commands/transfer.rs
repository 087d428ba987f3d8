use super::context::SyncContext;
use super::paths;
use crate::error::Result;
use std::fs;
use std::path::{Path, PathBuf};

/// Where a download lands relative to the requested path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// Write into the disabled sibling when one exists
    FollowDisabled,
    /// Write exactly the requested path
    Exact,
}

/// Resolve the file a download would write
pub fn resolve_target(dest: &Path, mode: Destination) -> PathBuf {
    match mode {
        Destination::FollowDisabled => paths::disabled_path(dest)
            .filter(|disabled| disabled.exists())
            .unwrap_or_else(|| dest.to_path_buf()),
        Destination::Exact => dest.to_path_buf(),
    }
}

/// Download a file and write it to disk.
///
/// Returns the number of bytes written, or `None` when the download was
/// reported and skipped. Only run-aborting errors are returned.
pub async fn download(
    ctx: &SyncContext,
    url: &str,
    dest: &Path,
    mode: Destination,
) -> Result<Option<u64>> {
    ctx.check_cancelled()?;
    let target = resolve_target(dest, mode);

    let bytes = match ctx.api.download(url).await {
        Ok(bytes) => bytes,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            ctx.record_error(format!("Failed to download {}: {}", target.display(), e));
            return Ok(None);
        }
    };

    if let Some(parent) = target.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            ctx.record_error(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ));
            return Ok(None);
        }
    }

    if let Err(e) = fs::write(&target, &bytes) {
        ctx.record_error(format!("Failed to write file {}: {}", target.display(), e));
        return Ok(None);
    }

    ctx.note_download();
    ctx.debug(format!("Wrote {} bytes to {}", bytes.len(), target.display()));
    Ok(Some(bytes.len() as u64))
}

/// Remove a file; an already-absent file is fine.
///
/// Returns whether something was deleted.
pub fn delete(ctx: &SyncContext, path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            ctx.note_delete();
            true
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
        Err(e) => {
            ctx.record_error(format!("Failed to delete {}: {}", path.display(), e));
            false
        }
    }
}

/// Move a file, creating the destination's directories as needed
pub fn rename(ctx: &SyncContext, from: &Path, to: &Path) -> bool {
    if let Some(parent) = to.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            ctx.record_error(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ));
            return false;
        }
    }
    match fs::rename(from, to) {
        Ok(()) => {
            ctx.note_rename();
            true
        }
        Err(e) => {
            ctx.record_error(format!(
                "Failed to rename {} to {}: {}",
                from.display(),
                to.display(),
                e
            ));
            false
        }
    }
}
