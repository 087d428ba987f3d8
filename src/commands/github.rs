use super::rate_limit::{ApiBudget, RateLimitSnapshot};
use crate::config::{RepositoryReference, RATE_LIMIT_RESERVE};
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use chrono::{DateTime, TimeZone, Utc};
use regex::Regex;
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;

const USER_AGENT: &str = "NCAA-NEXT-Textures-Sync";
const GITHUB_API: &str = "https://api.github.com";
const PER_PAGE: u32 = 100;

/// GitHub tree entry from API response
#[derive(Debug, Deserialize, Clone)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub sha: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.entry_type == "blob"
    }

    pub fn is_tree(&self) -> bool {
        self.entry_type == "tree"
    }
}

/// GitHub tree response
#[derive(Debug, Deserialize, Clone)]
pub struct TreeResponse {
    #[serde(default)]
    pub sha: String,
    pub tree: Vec<TreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

/// Commit as listed by the commits endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct CommitSummary {
    pub sha: String,
    pub commit: CommitDetails,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommitDetails {
    pub author: Option<CommitAuthor>,
    pub committer: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CommitAuthor {
    pub date: String,
}

impl CommitSummary {
    pub fn short_sha(&self) -> &str {
        &self.sha[..self.sha.len().min(7)]
    }

    /// Author date, falling back to the committer date
    pub fn author_date(&self) -> Result<DateTime<Utc>> {
        let raw = self
            .commit
            .author
            .as_ref()
            .or(self.commit.committer.as_ref())
            .map(|a| a.date.as_str())
            .ok_or_else(|| SyncError::parse("commit date", format!("commit {} has no date", self.sha)))?;
        DateTime::parse_from_rfc3339(raw)
            .map(|d| d.with_timezone(&Utc))
            .map_err(|e| SyncError::parse("commit date", e))
    }
}

/// How a commit touched a file
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    #[serde(other)]
    Other,
}

impl FileStatus {
    /// Bullet used in the per-file log line
    pub fn bullet(self) -> &'static str {
        match self {
            Self::Added => "[+]",
            Self::Modified => "[~]",
            Self::Renamed => "[=]",
            Self::Removed | Self::Other => "[-]",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
            Self::Other => "changed",
        }
    }
}

/// File entry in a commit's change list
#[derive(Debug, Deserialize, Clone)]
pub struct CommitFile {
    pub filename: String,
    pub status: FileStatus,
    pub sha: Option<String>,
    pub previous_filename: Option<String>,
    pub raw_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CommitFilesResponse {
    #[serde(default)]
    files: Vec<CommitFile>,
}

/// Entry of the contents endpoint
#[derive(Debug, Deserialize, Clone)]
pub struct ContentEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub sha: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub download_url: Option<String>,
}

impl ContentEntry {
    pub fn is_dir(&self) -> bool {
        self.entry_type == "dir"
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == "file"
    }
}

/// The contents endpoint answers with an object for files and an array for directories
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ContentsResponse {
    Many(Vec<ContentEntry>),
    One(ContentEntry),
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitCore,
}

#[derive(Debug, Deserialize)]
struct RateLimitCore {
    limit: u32,
    used: u32,
    remaining: u32,
    reset: i64,
}

/// One page of a paginated listing
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// URL of the next page, from the `Link` header
    pub next: Option<String>,
}

/// Remote repository operations the engine depends on.
///
/// `page` is `None` for the first page and the previous page's `next` afterwards.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn list_commits(&self, page: Option<&str>) -> Result<Page<CommitSummary>>;

    async fn commit_files(&self, sha: &str, page: Option<&str>) -> Result<Page<CommitFile>>;

    async fn fetch_tree(&self, tree_ref: &str, recursive: bool) -> Result<TreeResponse>;

    async fn contents(&self, path: &str, page: Option<&str>) -> Result<Page<ContentEntry>>;

    async fn latest_commit(&self) -> Result<CommitSummary>;

    async fn rate_limit(&self) -> Result<RateLimitSnapshot>;

    async fn download(&self, url: &str) -> Result<Vec<u8>>;
}

/// Bounded retry for transient network failures
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            initial_interval: Duration::from_millis(1),
            max_elapsed: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build()
    }
}

/// Extract the `rel="next"` URL from a `Link` header
pub fn next_page_url(link_header: &str) -> Option<String> {
    static NEXT_LINK: OnceLock<Option<Regex>> = OnceLock::new();
    let re = NEXT_LINK
        .get_or_init(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="next""#).ok())
        .as_ref()?;
    re.captures(link_header)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn header_next(headers: &HeaderMap) -> Option<String> {
    headers
        .get(reqwest::header::LINK)
        .and_then(|v| v.to_str().ok())
        .and_then(next_page_url)
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.parse().ok()
}

fn header_reset(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let secs: i64 = headers.get("x-ratelimit-reset")?.to_str().ok()?.parse().ok()?;
    Utc.timestamp_opt(secs, 0).single()
}

fn transient(e: reqwest::Error) -> backoff::Error<SyncError> {
    if e.is_timeout() || e.is_connect() {
        backoff::Error::transient(SyncError::Http(e))
    } else {
        backoff::Error::permanent(SyncError::Http(e))
    }
}

/// GitHub REST client scoped to one repository
pub struct GitHubClient {
    client: Client,
    reference: RepositoryReference,
    token: Option<String>,
    api_base: String,
    budget: ApiBudget,
    retry: RetryPolicy,
}

impl GitHubClient {
    pub fn new(reference: RepositoryReference, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            reference,
            token,
            api_base: GITHUB_API.to_string(),
            budget: ApiBudget::new(RATE_LIMIT_RESERVE),
            retry: RetryPolicy::default(),
        })
    }

    /// Point the client at a different API host (GitHub Enterprise, test servers)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn budget(&self) -> &ApiBudget {
        &self.budget
    }

    pub fn reference(&self) -> &RepositoryReference {
        &self.reference
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.api_base, self.reference.owner, self.reference.repo, tail
        )
    }

    /// Build request with optional auth token
    fn build_request(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json");

        if let Some(t) = &self.token {
            req = req.header("Authorization", format!("Bearer {}", t));
        }

        req
    }

    /// Send a GET, retrying transient failures; `charged` calls count against the API budget
    async fn send(&self, url: &str, charged: bool) -> Result<Response> {
        if charged {
            self.budget.consume()?;
        }

        let response = backoff::future::retry(self.retry.backoff(), move || async move {
            let response = self.build_request(url).send().await.map_err(transient)?;
            let status = response.status();
            if status.is_server_error() {
                tracing::debug!(%status, url, "transient server error, retrying");
                return Err(backoff::Error::transient(SyncError::Status {
                    status: status.as_u16(),
                    url: url.to_string(),
                    body: String::new(),
                }));
            }
            Ok(response)
        })
        .await?;

        let headers = response.headers();
        if let (Some(remaining), Some(reset)) = (
            header_u32(headers, "x-ratelimit-remaining"),
            header_reset(headers),
        ) {
            if charged {
                self.budget.observe(remaining, reset);
            }
            let status = response.status().as_u16();
            if remaining == 0 && (status == 403 || status == 429) {
                return Err(SyncError::RateLimitExhausted { remaining, reset });
            }
        }

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        context: &'static str,
    ) -> Result<(T, Option<String>)> {
        let response = self.send(url, true).await?;
        let next = header_next(response.headers());
        let body = response
            .json::<T>()
            .await
            .map_err(|e| SyncError::parse(context, e))?;
        Ok((body, next))
    }
}

#[async_trait]
impl RemoteApi for GitHubClient {
    async fn list_commits(&self, page: Option<&str>) -> Result<Page<CommitSummary>> {
        let url = match page {
            Some(next) => next.to_string(),
            None => self.repo_url(&format!(
                "commits?path={}&sha={}&per_page={}",
                self.reference.subdirectory, self.reference.branch, PER_PAGE
            )),
        };
        let (items, next) = self.get_json(&url, "commit list").await?;
        Ok(Page { items, next })
    }

    async fn commit_files(&self, sha: &str, page: Option<&str>) -> Result<Page<CommitFile>> {
        let url = match page {
            Some(next) => next.to_string(),
            None => self.repo_url(&format!("commits/{}?per_page={}", sha, PER_PAGE)),
        };
        let (body, next): (CommitFilesResponse, _) = self.get_json(&url, "commit files").await?;
        Ok(Page {
            items: body.files,
            next,
        })
    }

    async fn fetch_tree(&self, tree_ref: &str, recursive: bool) -> Result<TreeResponse> {
        let url = if recursive {
            self.repo_url(&format!("git/trees/{}?recursive=1", tree_ref))
        } else {
            self.repo_url(&format!("git/trees/{}", tree_ref))
        };
        let (tree, _) = self.get_json(&url, "tree response").await?;
        Ok(tree)
    }

    async fn contents(&self, path: &str, page: Option<&str>) -> Result<Page<ContentEntry>> {
        let url = match page {
            Some(next) => next.to_string(),
            None => self.repo_url(&format!(
                "contents/{}?ref={}",
                path.trim_matches('/'),
                self.reference.branch
            )),
        };
        let (body, next): (ContentsResponse, _) = self.get_json(&url, "contents response").await?;
        let items = match body {
            ContentsResponse::Many(entries) => entries,
            ContentsResponse::One(entry) => vec![entry],
        };
        Ok(Page { items, next })
    }

    async fn latest_commit(&self) -> Result<CommitSummary> {
        let url = self.repo_url(&format!("commits/{}", self.reference.branch));
        let (commit, _) = self.get_json(&url, "commit response").await?;
        Ok(commit)
    }

    async fn rate_limit(&self) -> Result<RateLimitSnapshot> {
        let url = format!("{}/rate_limit", self.api_base);
        let response = self.send(&url, false).await?;
        let body: RateLimitResponse = response
            .json()
            .await
            .map_err(|e| SyncError::parse("rate limit response", e))?;
        let core = body.resources.core;
        let reset = Utc
            .timestamp_opt(core.reset, 0)
            .single()
            .ok_or_else(|| SyncError::parse("rate limit reset", core.reset))?;
        self.budget.observe(core.remaining, reset);
        Ok(RateLimitSnapshot {
            limit: core.limit,
            used: core.used,
            remaining: core.remaining,
            reset,
        })
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.send(url, false).await?;
        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}
