use super::progress::{emit, ProgressSink, SyncProgressPayload, SyncStage};
use std::fs;
use std::path::Path;

/// Check if a file is a hidden/junk file that shouldn't count as content
pub fn is_junk_file(name: &str) -> bool {
    // All hidden files (starting with .)
    if name.starts_with('.') {
        return true;
    }
    // Windows junk files
    name.eq_ignore_ascii_case("Thumbs.db")
        || name.eq_ignore_ascii_case("desktop.ini")
        || name.eq_ignore_ascii_case("ehthumbs.db")
}

fn report(sink: &dyn ProgressSink, message: String) {
    emit(sink, SyncProgressPayload::new(SyncStage::Cleanup, message));
}

/// One bottom-up pass; returns the number of directories removed
fn prune_pass(dir: &Path, is_root: bool, sink: &dyn ProgressSink) -> u32 {
    let mut removed = 0;

    let entries: Vec<_> = match fs::read_dir(dir) {
        Ok(rd) => rd.filter_map(|e| e.ok()).collect(),
        Err(e) => {
            report(sink, format!("Error reading dir {}: {}", dir.display(), e));
            return 0;
        }
    };

    // Children first so emptied parents are seen below
    for entry in &entries {
        let path = entry.path();
        if path.is_dir() && !entry.file_name().to_str().is_some_and(is_junk_file) {
            removed += prune_pass(&path, false, sink);
        }
    }

    // Don't remove the root directory itself
    if is_root {
        return removed;
    }

    let has_content = match fs::read_dir(dir) {
        Ok(rd) => rd
            .filter_map(|e| e.ok())
            .any(|e| !e.file_name().to_str().is_some_and(is_junk_file)),
        Err(_) => return removed,
    };

    if !has_content {
        match fs::remove_dir_all(dir) {
            Ok(()) => {
                tracing::debug!("removed empty folder {}", dir.display());
                removed += 1;
            }
            Err(e) => report(sink, format!("Failed to remove {}: {}", dir.display(), e)),
        }
    }

    removed
}

/// Remove folders holding nothing but hidden or junk entries, repeating until
/// a pass removes nothing. Best effort: failures are reported, never raised.
pub fn prune_empty_folders(root: &Path, sink: &dyn ProgressSink) -> u32 {
    if !root.is_dir() {
        return 0;
    }

    let mut total = 0;
    loop {
        let removed = prune_pass(root, true, sink);
        if removed == 0 {
            break;
        }
        total += removed;
    }

    if total > 0 {
        report(sink, format!("Empty directories pruned ({}).", total));
    }
    total
}
