//! Error types for the sync engine

use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// Result type for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;

/// Appended to tree fetch failures, which on large repositories almost always
/// coincide with an exhausted API budget.
pub const RATE_LIMIT_HINT: &str = "API rate limit probably exceeded. Try again later. \
The limit resets every hour; the exact reset time is shown at the beginning of the output.";

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Cannot run sync. Configuration variable '{field}' is missing or empty.")]
    MissingConfig { field: &'static str },

    #[error("Invalid value for configuration variable '{field}': {message}")]
    InvalidConfig { field: &'static str, message: String },

    #[error("Failed to access config file {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("GitHub API error: {status} for {url} - {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },

    #[error("Unable to fetch repository tree (status {status}): {message}. {hint}", hint = RATE_LIMIT_HINT)]
    TreeFetch { status: u16, message: String },

    #[error("GitHub API budget exhausted ({remaining} calls left); it resets at {reset}")]
    RateLimitExhausted {
        remaining: u32,
        reset: DateTime<Utc>,
    },

    #[error("Failed to parse {context}: {message}")]
    Parse {
        context: &'static str,
        message: String,
    },

    #[error("Folder {path} already exists. Rename or remove it, or use the post-install sync instead.")]
    TargetExists { path: PathBuf },

    #[error("Operation cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn parse(context: &'static str, message: impl ToString) -> Self {
        Self::Parse {
            context,
            message: message.to_string(),
        }
    }

    /// Whether this error must abort the current run.
    ///
    /// Everything else is a per-item failure that gets logged and skipped.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingConfig { .. }
                | Self::InvalidConfig { .. }
                | Self::ConfigIo { .. }
                | Self::TreeFetch { .. }
                | Self::RateLimitExhausted { .. }
                | Self::TargetExists { .. }
                | Self::Cancelled
        )
    }

    /// Status code carried by HTTP-level failures, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } | Self::TreeFetch { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_names_the_field() {
        let err = SyncError::MissingConfig {
            field: "github_token",
        };
        assert!(err.to_string().contains("'github_token'"));
        assert!(err.is_fatal());
    }

    #[test]
    fn tree_fetch_carries_rate_limit_hint() {
        let err = SyncError::TreeFetch {
            status: 403,
            message: "Forbidden".to_string(),
        };
        assert!(err.to_string().contains("rate limit"));
        assert_eq!(err.status(), Some(403));
    }

    #[test]
    fn per_item_errors_are_recoverable() {
        let err = SyncError::Status {
            status: 404,
            url: "https://example.invalid".to_string(),
            body: String::new(),
        };
        assert!(!err.is_fatal());
        let err = SyncError::io("a/b", std::io::Error::other("boom"));
        assert!(!err.is_fatal());
    }
}
