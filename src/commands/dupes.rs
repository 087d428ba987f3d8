use super::paths;
use super::progress::{emit, ProgressSink, SyncProgressPayload, SyncStage};
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// A texture name that appears more than once, with every location found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateSet {
    pub name: String,
    pub paths: Vec<String>,
}

fn is_png(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".png")
}

/// Find PNG file names that occur more than once anywhere under `folder`
pub fn find_duplicates(folder: &Path) -> Vec<DuplicateSet> {
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for entry in WalkDir::new(folder)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let Some(name) = entry.file_name().to_str() else {
            continue;
        };
        if !is_png(name) {
            continue;
        }
        if let Some(relative) = paths::to_relative(folder, entry.path()) {
            seen.entry(name.to_string()).or_default().push(relative);
        }
    }

    seen.into_iter()
        .filter(|(_, found)| found.len() > 1)
        .map(|(name, mut found)| {
            found.sort();
            DuplicateSet { name, paths: found }
        })
        .collect()
}

/// Report duplicate texture names under the replacements folder
pub fn check_for_dupes(folder: &Path, sink: &dyn ProgressSink) -> Vec<DuplicateSet> {
    let say = |message: String| emit(sink, SyncProgressPayload::new(SyncStage::Verifying, message));

    say("Checking recursively in the replacements folder to ensure all filenames are unique...".to_string());
    let duplicates = find_duplicates(folder);

    if duplicates.is_empty() {
        say("No duplicate texture names found.".to_string());
        return duplicates;
    }

    say(format!(
        "WARNING: {} duplicate texture names found. Two files with the same name anywhere in replacements will cause issues. \
         They are not deleted automatically; alert the mod maker or remove the copy you know is wrong.",
        duplicates.len()
    ));
    for (idx, set) in duplicates.iter().enumerate() {
        say(format!("Duplicate set {}: {}", idx + 1, set.name));
        for path in &set.paths {
            say(format!("  - {}", path));
        }
    }
    duplicates
}
