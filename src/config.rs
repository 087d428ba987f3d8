// Configurable constants and the config.txt store for the textures sync tool
// Modify the defaults below to adapt this tool for other PS2 texture mod projects

use crate::error::{Result, SyncError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Application title
pub const APP_TITLE: &str = "NCAA NEXT Textures Sync";

/// Default repository owner (GitHub username or organization)
pub const REPO_OWNER: &str = "ncaanext";

/// Default name of the texture mod repository
pub const REPO_NAME: &str = "ncaa-next-26";

/// Default branch to follow
pub const BRANCH_NAME: &str = "main";

/// Path within the repo that maps onto the local textures folder
pub const SUBDIRECTORY: &str = "textures";

/// The target folder name (typically the PS2 game identifier like SLUS-XXXXX)
pub const SLUS_FOLDER: &str = "SLUS-21214";

/// Folder under the SLUS folder holding the replacement textures
pub const REPLACEMENTS_FOLDER: &str = "replacements";

/// Folder the user owns; never touched by sync
pub const USER_CUSTOMS_FOLDER: &str = "user-customs";

/// Name prefixes of VCS and OS metadata entries that are never synced
pub const HIDDEN_PREFIXES: &[&str] = &[".git", ".DS", "._"];

/// Default config file, relative to the working directory
pub const CONFIG_FILE: &str = "config.txt";

/// Number of directory groups the bulk installer fetches at once
pub const INSTALL_CONCURRENCY: usize = 2;

/// Attempts made to write a staged file before giving up on its group
pub const EXTRACT_ATTEMPTS: u32 = 3;

/// Fixed delay between extraction attempts, in seconds
pub const EXTRACT_RETRY_DELAY_SECS: u64 = 2;

/// API calls kept in reserve; the engine stops before dipping below this
pub const RATE_LIMIT_RESERVE: u32 = 10;

const LAST_RUN_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Cursor used when no valid last run date is stored
pub fn default_last_run() -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(2005, 7, 11)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Parse a stored `last_run_date` value (UTC, fractional seconds optional)
pub fn parse_last_run(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value.trim(), LAST_RUN_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

/// Format a cursor the way config.txt stores it (millisecond precision)
pub fn format_last_run(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M:%S%.3f").to_string()
}

/// Line-preserving `key: value` store backing config.txt
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    lines: Vec<String>,
}

impl ConfigStore {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let content = fs::read_to_string(&path).map_err(|source| SyncError::ConfigIo {
            path: path.clone(),
            source,
        })?;
        Ok(Self {
            path,
            lines: content.lines().map(str::to_string).collect(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Value for `key`, trimmed; the first colon separates key from value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.lines.iter().find_map(|line| {
            let (k, v) = line.split_once(':')?;
            (k.trim() == key).then(|| v.trim())
        })
    }

    /// Rewrite `key` in place, or append it when absent.
    pub fn set(&mut self, key: &str, value: &str) {
        let new_line = format!("{}: {}", key, value);
        let prefix = format!("{}:", key);
        match self.lines.iter_mut().find(|line| line.starts_with(&prefix)) {
            Some(line) => *line = new_line,
            None => self.lines.push(new_line),
        }
    }

    pub fn save(&self) -> Result<()> {
        let mut content = self.lines.join("\n");
        content.push('\n');
        fs::write(&self.path, content).map_err(|source| SyncError::ConfigIo {
            path: self.path.clone(),
            source,
        })
    }

    /// Persist the sync cursor.
    pub fn write_last_run(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.set("last_run_date", &format_last_run(at));
        self.save()
    }
}

/// Write a starter config seeded with the project defaults.
///
/// Returns false without touching anything when the file already exists.
pub fn write_default_config(path: &Path, local_directory: Option<&Path>) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    let local = local_directory
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let content = format!(
        "debug_mode: False\n\
         initial_setup_done: False\n\
         local_directory: {local}\n\
         github_token: \n\
         last_run_date: {last_run}\n\
         project_name: NCAA NEXT\n\
         owner: {owner}\n\
         repo: {repo}\n\
         branch_name: {branch}\n\
         subdirectory: {subdir}\n\
         slus_folder: {slus}\n\
         json_url: https://raw.githubusercontent.com/{owner}/{repo}/{branch}/installer-data.json\n",
        last_run = format_last_run(default_last_run()),
        owner = REPO_OWNER,
        repo = REPO_NAME,
        branch = BRANCH_NAME,
        subdir = SUBDIRECTORY,
        slus = SLUS_FOLDER,
    );
    fs::write(path, content).map_err(|source| SyncError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(true)
}

/// Typed view over the config store
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub debug_mode: bool,
    pub initial_setup_done: bool,
    pub local_directory: Option<PathBuf>,
    pub github_token: Option<String>,
    pub last_run_date: Option<DateTime<Utc>>,
    pub project_name: Option<String>,
    pub owner: Option<String>,
    pub repo: Option<String>,
    pub branch_name: Option<String>,
    pub subdirectory: Option<String>,
    pub slus_folder: Option<String>,
    pub json_url: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

fn as_bool(value: Option<&str>) -> bool {
    value.is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

impl AppConfig {
    pub fn from_store(store: &ConfigStore) -> Self {
        Self {
            debug_mode: as_bool(store.get("debug_mode")),
            initial_setup_done: as_bool(store.get("initial_setup_done")),
            local_directory: non_empty(store.get("local_directory")).map(PathBuf::from),
            github_token: non_empty(store.get("github_token")),
            last_run_date: store.get("last_run_date").and_then(parse_last_run),
            project_name: non_empty(store.get("project_name")),
            owner: non_empty(store.get("owner")),
            repo: non_empty(store.get("repo")),
            branch_name: non_empty(store.get("branch_name")),
            subdirectory: non_empty(store.get("subdirectory")),
            slus_folder: non_empty(store.get("slus_folder")),
            json_url: non_empty(store.get("json_url")),
        }
    }

    /// Sync cursor, falling back to the epoch of the mod when unset.
    pub fn sync_cursor(&self) -> DateTime<Utc> {
        self.last_run_date.unwrap_or_else(default_last_run)
    }
}

/// Identifies the remote corpus; immutable for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryReference {
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Path inside the repository, without leading or trailing slashes
    pub subdirectory: String,
}

impl RepositoryReference {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.repo)
    }
}

/// Validated settings the engine runs with
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub reference: RepositoryReference,
    pub local_root: PathBuf,
    pub token: String,
    /// Restriction folder; when set only paths under it are considered locally
    pub slus_folder: Option<String>,
    pub user_customs: String,
    pub debug_mode: bool,
}

impl SyncSettings {
    /// Validate the config before any network call.
    ///
    /// `token_override` wins over the stored token (CLI flag or environment).
    pub fn from_config(config: &AppConfig, token_override: Option<&str>) -> Result<Self> {
        let token = token_override
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .or_else(|| config.github_token.clone())
            .ok_or(SyncError::MissingConfig {
                field: "github_token",
            })?;
        let local_root = config
            .local_directory
            .clone()
            .ok_or(SyncError::MissingConfig {
                field: "local_directory",
            })?;
        let owner = required(&config.owner, "owner")?;
        let repo = required(&config.repo, "repo")?;
        let branch = required(&config.branch_name, "branch_name")?;
        let subdirectory = required(&config.subdirectory, "subdirectory")?
            .trim_matches('/')
            .to_string();

        Ok(Self {
            reference: RepositoryReference {
                owner,
                repo,
                branch,
                subdirectory,
            },
            local_root,
            token,
            slus_folder: config.slus_folder.clone(),
            user_customs: USER_CUSTOMS_FOLDER.to_string(),
            debug_mode: config.debug_mode,
        })
    }

    /// Local-relative root of the replacement textures, e.g. `SLUS-21214/replacements`
    pub fn replacements_root(&self) -> String {
        match &self.slus_folder {
            Some(slus) => format!("{}/{}", slus, REPLACEMENTS_FOLDER),
            None => REPLACEMENTS_FOLDER.to_string(),
        }
    }
}

fn required(value: &Option<String>, field: &'static str) -> Result<String> {
    value.clone().ok_or(SyncError::MissingConfig { field })
}
