pub mod app_info;
pub mod cleanup;
pub mod context;
pub mod dupes;
pub mod filesystem;
pub mod github;
pub mod hashing;
pub mod history;
pub mod install;
pub mod local_tree;
pub mod paths;
pub mod progress;
pub mod rate_limit;
pub mod reconcile;
pub mod remote_tree;
pub mod sync;
pub mod transfer;

pub use app_info::{compare_versions, fetch_manifest, Manifest, APP_VERSION};
pub use cleanup::prune_empty_folders;
pub use context::SyncContext;
pub use dupes::check_for_dupes;
pub use filesystem::*;
pub use github::{GitHubClient, RemoteApi, RetryPolicy};
pub use install::{plan_install, run_install, InstallOptions, InstallReport};
pub use progress::{AutoConfirm, ChannelConfirm, ChannelSink, Confirmation, ProgressSink, SyncStage};
pub use reconcile::{deep_validate, ValidateOptions};
pub use sync::*;
