use crate::config::HIDDEN_PREFIXES;
use std::path::{Path, PathBuf};

/// Prefix marking a file the user has disabled
const DISABLED_PREFIX: char = '-';

/// Check if a filename is a disabled (dash-prefixed) version
pub fn is_disabled_name(filename: &str) -> bool {
    filename.starts_with(DISABLED_PREFIX)
}

/// Get just the filename from a forward-slash path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Get the disabled version path for a file (`dir/a.png` -> `dir/-a.png`)
pub fn disabled_name_of(path: &str) -> String {
    match path.rfind('/') {
        Some(pos) => format!("{}{}{}", &path[..pos + 1], DISABLED_PREFIX, &path[pos + 1..]),
        None => format!("{}{}", DISABLED_PREFIX, path),
    }
}

/// Disabled sibling of an on-disk file (`dir/a.png` -> `dir/-a.png`)
pub fn disabled_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_str()?;
    Some(path.with_file_name(disabled_name_of(name)))
}

/// Whether a file or folder name belongs to VCS/OS metadata
pub fn is_hidden_name(name: &str) -> bool {
    HIDDEN_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

/// Whether a path lives in the user customizations folder
pub fn is_user_customs(path: &str, user_customs: &str) -> bool {
    path.contains(user_customs)
}

/// Join a forward-slash relative path onto a local root
pub fn local_path(root: &Path, relative: &str) -> PathBuf {
    relative
        .split('/')
        .filter(|part| !part.is_empty())
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

/// Relative path with forward slashes, regardless of platform
pub fn to_relative(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// A repository path resolved against the tracked subdirectory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoPath {
    /// Under the subdirectory; carries the path relative to it
    Inside(String),
    /// Outside; carries a `../`-prefixed key that never collides with tracked paths
    Outside(String),
}

impl RepoPath {
    pub fn resolve(repo_path: &str, subdirectory: &str) -> Self {
        let subdirectory = subdirectory.trim_matches('/');
        if subdirectory.is_empty() {
            return Self::Inside(repo_path.to_string());
        }
        match repo_path
            .strip_prefix(subdirectory)
            .and_then(|rest| rest.strip_prefix('/'))
        {
            Some(rest) if !rest.is_empty() => Self::Inside(rest.to_string()),
            _ => Self::Outside(format!("../{}", repo_path)),
        }
    }

    pub fn is_inside(&self) -> bool {
        matches!(self, Self::Inside(_))
    }

    /// Key used for the finished set and for log lines
    pub fn key(&self) -> &str {
        match self {
            Self::Inside(p) | Self::Outside(p) => p,
        }
    }
}
