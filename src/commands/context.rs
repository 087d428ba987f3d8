use super::github::RemoteApi;
use super::paths;
use super::progress::{self, Confirmation, ProgressSink, SyncProgressPayload, SyncStage};
use crate::config::SyncSettings;
use crate::error::{Result, SyncError};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

/// Tallies for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounts {
    pub downloaded: u32,
    pub deleted: u32,
    pub renamed: u32,
}

impl RunCounts {
    pub fn since(&self, earlier: &RunCounts) -> RunCounts {
        RunCounts {
            downloaded: self.downloaded - earlier.downloaded,
            deleted: self.deleted - earlier.deleted,
            renamed: self.renamed - earlier.renamed,
        }
    }
}

/// Everything a single run needs, passed explicitly through each phase
pub struct SyncContext {
    pub api: Arc<dyn RemoteApi>,
    pub settings: SyncSettings,
    progress: Arc<dyn ProgressSink>,
    confirmation: Arc<dyn Confirmation>,
    cancel: CancellationToken,
    downloaded: AtomicU32,
    deleted: AtomicU32,
    renamed: AtomicU32,
    errors: Mutex<Vec<String>>,
}

impl SyncContext {
    pub fn new(
        api: Arc<dyn RemoteApi>,
        settings: SyncSettings,
        progress: Arc<dyn ProgressSink>,
        confirmation: Arc<dyn Confirmation>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            api,
            settings,
            progress,
            confirmation,
            cancel,
            downloaded: AtomicU32::new(0),
            deleted: AtomicU32::new(0),
            renamed: AtomicU32::new(0),
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn emit(&self, stage: SyncStage, message: impl Into<String>) {
        progress::emit(self.progress.as_ref(), SyncProgressPayload::new(stage, message));
    }

    pub fn emit_counted(&self, stage: SyncStage, message: impl Into<String>, current: u32, total: u32) {
        progress::emit(
            self.progress.as_ref(),
            SyncProgressPayload::counted(stage, message, current, total),
        );
    }

    pub fn sink(&self) -> &dyn ProgressSink {
        self.progress.as_ref()
    }

    /// Decision detail, surfaced to the sink only in debug mode
    pub fn debug(&self, message: impl Into<String>) {
        let message = message.into();
        if self.settings.debug_mode {
            self.emit(SyncStage::Syncing, message);
        } else {
            tracing::debug!("{}", message);
        }
    }

    /// Log a recoverable failure and keep it for the run result
    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("{}", message);
        progress::emit(
            self.progress.as_ref(),
            SyncProgressPayload::new(SyncStage::Syncing, format!("ERROR: {}", message)),
        );
        self.errors
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }

    pub async fn confirm(&self, prompt: &str) -> bool {
        self.confirmation.confirm(prompt).await
    }

    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// On-disk location of a forward-slash path relative to the local root
    pub fn local_path(&self, relative: &str) -> PathBuf {
        paths::local_path(&self.settings.local_root, relative)
    }

    pub fn note_download(&self) {
        self.downloaded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_delete(&self) {
        self.deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn note_rename(&self) {
        self.renamed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counts(&self) -> RunCounts {
        RunCounts {
            downloaded: self.downloaded.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            renamed: self.renamed.load(Ordering::Relaxed),
        }
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}
