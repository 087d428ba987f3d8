use super::paths::{self, is_hidden_name};
use std::path::Path;
use walkdir::{DirEntry, WalkDir};

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(is_hidden_name)
}

/// List files under `root` as sorted forward-slash paths relative to `root`.
///
/// With a restriction folder only `root/<restrict>` is walked. VCS and OS
/// metadata entries are pruned along with everything below them. Unreadable
/// entries are logged and skipped.
pub fn list_local(root: &Path, restrict: Option<&str>) -> Vec<String> {
    let start = match restrict {
        Some(folder) => paths::local_path(root, folder),
        None => root.to_path_buf(),
    };
    if !start.is_dir() {
        tracing::warn!("local folder {} not found", start.display());
        return Vec::new();
    }

    let mut files: Vec<String> = WalkDir::new(&start)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!("skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| paths::to_relative(root, entry.path()))
        .collect();

    files.sort();
    files
}
