use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use tokio::sync::{mpsc, oneshot};

/// Phase a progress line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Preparing,
    Fetching,
    Scanning,
    Comparing,
    Syncing,
    Downloading,
    Deleting,
    Verifying,
    Cleanup,
    Installing,
    Complete,
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Preparing => "preparing",
            Self::Fetching => "fetching",
            Self::Scanning => "scanning",
            Self::Comparing => "comparing",
            Self::Syncing => "syncing",
            Self::Downloading => "downloading",
            Self::Deleting => "deleting",
            Self::Verifying => "verifying",
            Self::Cleanup => "cleanup",
            Self::Installing => "installing",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Progress payload for sync events
#[derive(Debug, Clone, Serialize)]
pub struct SyncProgressPayload {
    pub stage: SyncStage,
    pub message: String,
    pub current: Option<u32>,
    pub total: Option<u32>,
}

impl SyncProgressPayload {
    pub fn new(stage: SyncStage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            current: None,
            total: None,
        }
    }

    pub fn counted(stage: SyncStage, message: impl Into<String>, current: u32, total: u32) -> Self {
        Self {
            stage,
            message: message.into(),
            current: Some(current),
            total: Some(total),
        }
    }

    /// Render as a single log line
    pub fn to_line(&self) -> String {
        match (self.current, self.total) {
            (Some(current), Some(total)) => format!("[{}/{}] {}", current, total, self.message),
            _ => self.message.clone(),
        }
    }
}

/// Append-only, line-oriented progress output
pub trait ProgressSink: Send + Sync {
    fn emit(&self, payload: SyncProgressPayload);
}

/// Yes/no round trip gating destructive operations
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Trace a payload, then hand it to the sink
pub fn emit(sink: &dyn ProgressSink, payload: SyncProgressPayload) {
    tracing::info!(stage = %payload.stage, "{}", payload.message);
    sink.emit(payload);
}

/// Sink forwarding rendered lines to another execution context
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn emit(&self, payload: SyncProgressPayload) {
        // Receiver gone means the front end quit; the run keeps going headless
        let _ = self.tx.send(payload.to_line());
    }
}

/// A pending yes/no question for the front end
#[derive(Debug)]
pub struct ConfirmRequest {
    pub prompt: String,
    pub reply: oneshot::Sender<bool>,
}

/// Confirmation answered asynchronously by whoever owns the receiver
#[derive(Clone)]
pub struct ChannelConfirm {
    tx: mpsc::Sender<ConfirmRequest>,
}

impl ChannelConfirm {
    pub fn new() -> (Self, mpsc::Receiver<ConfirmRequest>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Confirmation for ChannelConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        let (reply, answer) = oneshot::channel();
        let request = ConfirmRequest {
            prompt: prompt.to_string(),
            reply,
        };
        if self.tx.send(request).await.is_err() {
            return false;
        }
        answer.await.unwrap_or(false)
    }
}

/// Fixed answer for every prompt (`--yes`, `--dry-run`)
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm {
    answer: bool,
}

impl AutoConfirm {
    pub fn yes() -> Self {
        Self { answer: true }
    }

    pub fn dry_run() -> Self {
        Self { answer: false }
    }
}

#[async_trait]
impl Confirmation for AutoConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        tracing::debug!(answer = self.answer, "auto-answered prompt: {}", prompt);
        self.answer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counted_lines_carry_position() {
        let payload = SyncProgressPayload::counted(SyncStage::Downloading, "Downloading: a.png", 3, 10);
        assert_eq!(payload.to_line(), "[3/10] Downloading: a.png");
        let payload = SyncProgressPayload::new(SyncStage::Complete, "done");
        assert_eq!(payload.to_line(), "done");
    }

    #[tokio::test]
    async fn channel_confirm_round_trip() {
        let (confirm, mut requests) = ChannelConfirm::new();
        let answering = tokio::spawn(async move {
            let request = requests.recv().await.unwrap();
            assert!(request.prompt.contains("delete"));
            request.reply.send(true).unwrap();
        });
        assert!(confirm.confirm("Okay to delete 2 files?").await);
        answering.await.unwrap();
    }

    #[tokio::test]
    async fn closed_channel_declines() {
        let (confirm, requests) = ChannelConfirm::new();
        drop(requests);
        assert!(!confirm.confirm("Okay?").await);
    }

    #[tokio::test]
    async fn channel_sink_renders_lines() {
        let (sink, mut lines) = ChannelSink::new();
        emit(&sink, SyncProgressPayload::new(SyncStage::Fetching, "Fetching commits..."));
        assert_eq!(lines.recv().await.as_deref(), Some("Fetching commits..."));
    }
}
