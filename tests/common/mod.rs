#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use textures_sync_lib::commands::github::{
    CommitAuthor, CommitDetails, CommitFile, CommitSummary, ContentEntry, FileStatus, Page, RemoteApi, TreeEntry,
    TreeResponse,
};
use textures_sync_lib::commands::hashing::git_blob_sha;
use textures_sync_lib::commands::paths;
use textures_sync_lib::commands::progress::{AutoConfirm, ProgressSink, SyncProgressPayload};
use textures_sync_lib::commands::rate_limit::RateLimitSnapshot;
use textures_sync_lib::commands::sync::SyncCursor;
use textures_sync_lib::commands::SyncContext;
use textures_sync_lib::config::{RepositoryReference, SyncSettings};
use textures_sync_lib::{Result, SyncError};
use tokio_util::sync::CancellationToken;

pub const SUBDIRECTORY: &str = "textures";
pub const REPLACEMENTS: &str = "SLUS-21214/replacements";

pub fn reference() -> RepositoryReference {
    RepositoryReference {
        owner: "ncaanext".to_string(),
        repo: "ncaa-next-26".to_string(),
        branch: "main".to_string(),
        subdirectory: SUBDIRECTORY.to_string(),
    }
}

/// Raw URL of a full repository path
pub fn raw(repo_path: &str) -> String {
    format!("https://raw.githubusercontent.com/ncaanext/ncaa-next-26/main/{}", repo_path)
}

/// Repository path of a texture under the replacements folder
pub fn texture(name: &str) -> String {
    format!("{}/{}/{}", SUBDIRECTORY, REPLACEMENTS, name)
}

/// Local-relative path of a texture under the replacements folder
pub fn local(name: &str) -> String {
    format!("{}/{}", REPLACEMENTS, name)
}

fn not_found(what: &str) -> SyncError {
    SyncError::Status {
        status: 404,
        url: what.to_string(),
        body: "Not Found".to_string(),
    }
}

fn paginate<T: Clone>(items: &[T], page: Option<&str>, size: usize) -> Page<T> {
    let start: usize = page.and_then(|p| p.parse().ok()).unwrap_or(0);
    let end = (start + size).min(items.len());
    let next = (end < items.len()).then(|| end.to_string());
    Page {
        items: items[start.min(end)..end].to_vec(),
        next,
    }
}

/// In-memory GitHub: commits newest first, trees by ref, contents by path, blobs by URL
pub struct FakeRemote {
    commits: Vec<(CommitSummary, Vec<CommitFile>)>,
    trees: HashMap<(String, bool), TreeResponse>,
    contents: BTreeMap<String, Vec<ContentEntry>>,
    blobs: HashMap<String, Vec<u8>>,
    failing_commits: HashSet<String>,
    page_size: usize,
    downloads: AtomicU32,
    commit_file_requests: Mutex<Vec<String>>,
}

impl Default for FakeRemote {
    fn default() -> Self {
        Self {
            commits: Vec::new(),
            trees: HashMap::new(),
            contents: BTreeMap::new(),
            blobs: HashMap::new(),
            failing_commits: HashSet::new(),
            page_size: 100,
            downloads: AtomicU32::new(0),
            commit_file_requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeRemote {
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Append a commit; call from newest to oldest
    pub fn commit(&mut self, sha: &str, date: &str, files: Vec<CommitFile>) {
        let summary = CommitSummary {
            sha: sha.to_string(),
            commit: CommitDetails {
                author: Some(CommitAuthor {
                    date: date.to_string(),
                }),
                committer: None,
            },
        };
        self.commits.push((summary, files));
    }

    pub fn fail_commit(&mut self, sha: &str) {
        self.failing_commits.insert(sha.to_string());
    }

    fn change(&mut self, status: FileStatus, filename: &str, content: Option<&[u8]>, previous: Option<&str>) -> CommitFile {
        let url = raw(filename);
        if let Some(content) = content {
            self.blobs.insert(url.clone(), content.to_vec());
        }
        CommitFile {
            filename: filename.to_string(),
            status,
            sha: content.map(git_blob_sha),
            previous_filename: previous.map(str::to_string),
            raw_url: Some(url),
        }
    }

    pub fn added(&mut self, filename: &str, content: &[u8]) -> CommitFile {
        self.change(FileStatus::Added, filename, Some(content), None)
    }

    pub fn modified(&mut self, filename: &str, content: &[u8]) -> CommitFile {
        self.change(FileStatus::Modified, filename, Some(content), None)
    }

    pub fn removed(&mut self, filename: &str) -> CommitFile {
        self.change(FileStatus::Removed, filename, None, None)
    }

    pub fn renamed(&mut self, previous: &str, filename: &str, content: &[u8]) -> CommitFile {
        self.change(FileStatus::Renamed, filename, Some(content), Some(previous))
    }

    pub fn insert_tree(&mut self, tree_ref: &str, recursive: bool, entries: &[(&str, &str, &str)], truncated: bool) {
        let tree = entries
            .iter()
            .map(|(path, entry_type, sha)| TreeEntry {
                path: path.to_string(),
                entry_type: entry_type.to_string(),
                sha: sha.to_string(),
            })
            .collect();
        self.trees.insert(
            (tree_ref.to_string(), recursive),
            TreeResponse {
                sha: tree_ref.to_string(),
                tree,
                truncated,
            },
        );
    }

    /// Publish files at the branch head: trees, contents listings and raw blobs.
    ///
    /// `files` are repository paths under the tracked subdirectory.
    pub fn publish(&mut self, files: &[(&str, &str)]) {
        self.insert_tree("main", false, &[(SUBDIRECTORY, "tree", "tree-textures")], false);

        let prefix = format!("{}/", SUBDIRECTORY);
        let blobs: Vec<(String, String)> = files
            .iter()
            .map(|(path, content)| {
                let relative = path.strip_prefix(&prefix).unwrap_or(*path).to_string();
                (relative, git_blob_sha(content.as_bytes()))
            })
            .collect();
        let entries: Vec<(&str, &str, &str)> = blobs
            .iter()
            .map(|(path, sha)| (path.as_str(), "blob", sha.as_str()))
            .collect();
        self.insert_tree("tree-textures", true, &entries, false);

        for (path, content) in files {
            self.blobs.insert(raw(path), content.as_bytes().to_vec());
            self.add_content(path, "file", Some(raw(path)));
        }
    }

    /// Register a contents entry and every ancestor directory listing
    fn add_content(&mut self, path: &str, entry_type: &str, download_url: Option<String>) {
        let entry = ContentEntry {
            name: paths::file_name(path).to_string(),
            path: path.to_string(),
            sha: String::new(),
            entry_type: entry_type.to_string(),
            download_url,
        };
        if entry_type == "file" {
            self.contents.insert(path.to_string(), vec![entry.clone()]);
        }

        let Some((parent, _)) = path.rsplit_once('/') else {
            return;
        };
        let listing = self.contents.entry(parent.to_string()).or_default();
        if listing.iter().any(|e| e.path == entry.path) {
            return;
        }
        listing.push(entry);
        listing.sort_by(|a, b| a.path.cmp(&b.path));
        self.add_content(parent, "dir", None);
    }

    pub fn downloads(&self) -> u32 {
        self.downloads.load(Ordering::SeqCst)
    }

    pub fn commit_file_requests(&self) -> Vec<String> {
        self.commit_file_requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteApi for FakeRemote {
    async fn list_commits(&self, page: Option<&str>) -> Result<Page<CommitSummary>> {
        let summaries: Vec<CommitSummary> = self.commits.iter().map(|(c, _)| c.clone()).collect();
        Ok(paginate(&summaries, page, self.page_size))
    }

    async fn commit_files(&self, sha: &str, page: Option<&str>) -> Result<Page<CommitFile>> {
        self.commit_file_requests.lock().unwrap().push(sha.to_string());
        if self.failing_commits.contains(sha) {
            return Err(SyncError::Status {
                status: 502,
                url: format!("commits/{}", sha),
                body: "Bad Gateway".to_string(),
            });
        }
        let (_, files) = self
            .commits
            .iter()
            .find(|(c, _)| c.sha == sha)
            .ok_or_else(|| not_found(sha))?;
        Ok(paginate(files, page, self.page_size))
    }

    async fn fetch_tree(&self, tree_ref: &str, recursive: bool) -> Result<TreeResponse> {
        self.trees
            .get(&(tree_ref.to_string(), recursive))
            .cloned()
            .ok_or_else(|| not_found(tree_ref))
    }

    async fn contents(&self, path: &str, page: Option<&str>) -> Result<Page<ContentEntry>> {
        let listing = self.contents.get(path).ok_or_else(|| not_found(path))?;
        Ok(paginate(listing, page, self.page_size))
    }

    async fn latest_commit(&self) -> Result<CommitSummary> {
        self.commits
            .first()
            .map(|(c, _)| c.clone())
            .ok_or_else(|| not_found("commits"))
    }

    async fn rate_limit(&self) -> Result<RateLimitSnapshot> {
        Ok(RateLimitSnapshot {
            limit: 5000,
            used: 10,
            remaining: 4990,
            reset: DateTime::<Utc>::from_timestamp(1_900_000_000, 0).unwrap_or_default(),
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let content = self.blobs.get(url).cloned().ok_or_else(|| not_found(url))?;
        self.downloads.fetch_add(1, Ordering::SeqCst);
        Ok(content)
    }
}

/// Keeps every progress line
#[derive(Default)]
pub struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, payload: SyncProgressPayload) {
        self.lines.lock().unwrap().push(payload.to_line());
    }
}

/// Cursor held in memory
pub struct MemoryCursor {
    pub at: DateTime<Utc>,
    pub advanced: bool,
}

impl MemoryCursor {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at, advanced: false }
    }
}

impl SyncCursor for MemoryCursor {
    fn last_run(&self) -> DateTime<Utc> {
        self.at
    }

    fn advance(&mut self, to: DateTime<Utc>) -> Result<()> {
        self.at = to;
        self.advanced = true;
        Ok(())
    }
}

pub fn settings(root: &Path) -> SyncSettings {
    SyncSettings {
        reference: reference(),
        local_root: root.to_path_buf(),
        token: "ghp_test".to_string(),
        slus_folder: Some("SLUS-21214".to_string()),
        user_customs: "user-customs".to_string(),
        debug_mode: false,
    }
}

pub struct Harness {
    pub remote: Arc<FakeRemote>,
    pub sink: Arc<RecordingSink>,
    pub cancel: CancellationToken,
    pub ctx: SyncContext,
}

/// Context over `remote` rooted at `root`; `accept` answers every prompt
pub fn harness(remote: FakeRemote, root: &Path, accept: bool) -> Harness {
    let remote = Arc::new(remote);
    let sink = Arc::new(RecordingSink::default());
    let cancel = CancellationToken::new();
    let confirm = if accept {
        AutoConfirm::yes()
    } else {
        AutoConfirm::dry_run()
    };
    let ctx = SyncContext::new(
        remote.clone(),
        settings(root),
        sink.clone(),
        Arc::new(confirm),
        cancel.clone(),
    );
    Harness {
        remote,
        sink,
        cancel,
        ctx,
    }
}

pub fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = paths::local_path(root, relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

pub fn read(root: &Path, relative: &str) -> Option<Vec<u8>> {
    fs::read(paths::local_path(root, relative)).ok()
}

pub fn date(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}
