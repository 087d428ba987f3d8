mod cli;

use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use textures_sync_lib::commands::progress::{ConfirmRequest, SyncProgressPayload};
use textures_sync_lib::commands::{
    check_for_dupes, check_sync_status, fetch_manifest, paths, prune_empty_folders, run_install, run_scan,
    run_sync, validate_directory, AutoConfirm, ChannelConfirm, ChannelSink, Confirmation, GitHubClient,
    InstallOptions, ProgressSink, SyncContext, SyncOptions, SyncResult, APP_VERSION,
};
use textures_sync_lib::config::{
    format_last_run, write_default_config, AppConfig, ConfigStore, SyncSettings, APP_TITLE, REPLACEMENTS_FOLDER,
};
use textures_sync_lib::{Result, SyncError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

enum Exit {
    Done,
    Cancelled,
}

/// Prints progress straight to stdout, for commands that never prompt
struct PrintSink;

impl ProgressSink for PrintSink {
    fn emit(&self, payload: SyncProgressPayload) {
        print_line(&payload.to_line());
    }
}

fn print_line(line: &str) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{}", line);
    let _ = stdout.flush();
}

fn init_tracing(verbose: bool) {
    // Progress events are already printed by the sink; only show them again when verbose
    let default = if verbose {
        "info,textures_sync_lib=debug"
    } else {
        "info,textures_sync_lib::commands::progress=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn ask(prompt: &str) -> bool {
    print!("{} (y/n): ", prompt);
    let _ = io::stdout().flush();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"),
    }
}

async fn answer(request: ConfirmRequest) {
    let prompt = request.prompt;
    let reply = tokio::task::spawn_blocking(move || ask(&prompt))
        .await
        .unwrap_or(false);
    let _ = request.reply.send(reply);
}

/// Pump progress lines and prompts until the engine task finishes
async fn drive<T>(
    mut engine: JoinHandle<Result<T>>,
    mut lines: mpsc::UnboundedReceiver<String>,
    mut requests: mpsc::Receiver<ConfirmRequest>,
    cancel: CancellationToken,
) -> Result<T> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            Some(line) = lines.recv() => print_line(&line),
            Some(request) = requests.recv() => answer(request).await,
            signal = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                if signal.is_ok() {
                    eprintln!("\nInterrupted, stopping after the current step...");
                    cancel.cancel();
                }
            }
            joined = &mut engine => {
                while let Ok(line) = lines.try_recv() {
                    print_line(&line);
                }
                return match joined {
                    Ok(result) => result,
                    Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                    Err(_) => Err(SyncError::Cancelled),
                };
            }
        }
    }
}

/// Collaborators for one engine run
struct Session {
    ctx: Arc<SyncContext>,
    lines: mpsc::UnboundedReceiver<String>,
    requests: mpsc::Receiver<ConfirmRequest>,
    cancel: CancellationToken,
}

impl Session {
    fn start(cli: &Cli, settings: SyncSettings) -> Result<Self> {
        let client = GitHubClient::new(settings.reference.clone(), Some(settings.token.clone()))?;
        let (sink, lines) = ChannelSink::new();
        let (channel_confirm, requests) = ChannelConfirm::new();
        let confirmation: Arc<dyn Confirmation> = if cli.yes {
            Arc::new(AutoConfirm::yes())
        } else if cli.dry_run {
            Arc::new(AutoConfirm::dry_run())
        } else {
            Arc::new(channel_confirm)
        };
        let cancel = CancellationToken::new();
        let ctx = SyncContext::new(
            Arc::new(client),
            settings,
            Arc::new(sink),
            confirmation,
            cancel.clone(),
        );
        Ok(Self {
            ctx: Arc::new(ctx),
            lines,
            requests,
            cancel,
        })
    }

    async fn run<T, F>(self, engine: impl FnOnce(Arc<SyncContext>) -> F) -> Result<T>
    where
        T: Send + 'static,
        F: std::future::Future<Output = Result<T>> + Send + 'static,
    {
        let handle = tokio::spawn(engine(Arc::clone(&self.ctx)));
        drive(handle, self.lines, self.requests, self.cancel).await
    }
}

fn load(cli: &Cli) -> Result<(ConfigStore, AppConfig)> {
    let store = ConfigStore::load(&cli.config)?;
    let config = AppConfig::from_store(&store);
    Ok((store, config))
}

fn local_directory(config: &AppConfig) -> Result<PathBuf> {
    config.local_directory.clone().ok_or(SyncError::MissingConfig {
        field: "local_directory",
    })
}

fn print_summary(result: &SyncResult) {
    println!(
        "Downloaded: {}  Deleted: {}  Renamed: {}  Folders pruned: {}",
        result.files_downloaded, result.files_deleted, result.files_renamed, result.folders_pruned
    );
    if !result.errors.is_empty() {
        println!("{} errors:", result.errors.len());
        for error in &result.errors {
            println!("  - {}", error);
        }
    }
}

fn exit_for(result: &SyncResult) -> Exit {
    print_summary(result);
    if result.cancelled {
        Exit::Cancelled
    } else {
        Exit::Done
    }
}

async fn run(cli: Cli) -> Result<Exit> {
    if cli.dry_run {
        println!("(dry run)");
    }

    match &cli.command {
        Commands::Init { local_directory } => {
            if write_default_config(&cli.config, local_directory.as_deref())? {
                println!("Wrote {}. Fill in local_directory and github_token.", cli.config.display());
            } else {
                println!("{} already exists; left untouched.", cli.config.display());
            }
            Ok(Exit::Done)
        }

        Commands::Sync {
            full,
            verify_hashes,
            skip_validation,
        } => {
            let (mut store, config) = load(&cli)?;
            let settings = SyncSettings::from_config(&config, cli.token.as_deref())?;
            validate_directory(&settings.local_root)?;
            let options = SyncOptions {
                full_scan: *full,
                verify_hashes: *verify_hashes,
                skip_validation: *skip_validation,
            };
            let result = Session::start(&cli, settings)?
                .run(move |ctx| async move { run_sync(&ctx, &mut store, options).await })
                .await?;
            Ok(exit_for(&result))
        }

        Commands::Scan { verify_hashes } => {
            let (_, config) = load(&cli)?;
            let settings = SyncSettings::from_config(&config, cli.token.as_deref())?;
            validate_directory(&settings.local_root)?;
            let verify_hashes = *verify_hashes;
            let result = Session::start(&cli, settings)?
                .run(move |ctx| async move { run_scan(&ctx, verify_hashes).await })
                .await?;
            Ok(exit_for(&result))
        }

        Commands::Status => {
            let (_, config) = load(&cli)?;
            let settings = SyncSettings::from_config(&config, cli.token.as_deref())?;
            let client = GitHubClient::new(settings.reference.clone(), Some(settings.token))?;
            let status = check_sync_status(&client, config.sync_cursor()).await?;

            println!("Repository:    {}", settings.reference.full_name());
            println!(
                "Latest commit: {} ({})",
                status.latest_commit_sha,
                format_last_run(status.latest_commit_date)
            );
            println!("Last sync:     {}", format_last_run(status.last_sync));
            if status.has_changes {
                println!("New changes are available. Run `textures-sync sync`.");
            } else {
                println!("Up to date.");
            }
            if let Some(limits) = status.rate_limit {
                println!("{}", limits.summary());
            }
            Ok(Exit::Done)
        }

        Commands::Manifest => {
            let (_, config) = load(&cli)?;
            let url = config.json_url.as_deref().ok_or(SyncError::MissingConfig { field: "json_url" })?;
            let manifest = fetch_manifest(url).await?;

            println!("{} {}", APP_TITLE, APP_VERSION);
            println!("Release:       {}", manifest.version.as_deref().unwrap_or("unknown"));
            if let Some(date) = &manifest.release_date {
                println!("Released:      {}", date);
            }
            if let Some(size) = &manifest.total_size {
                println!("Total size:    {}", size);
            }
            if let Some(size) = &manifest.temp_size {
                println!("Temp space:    {}", size);
            }
            println!("Groups:        {} complete, {} split", manifest.download_complete.len(), manifest.download_subdirectories.len());
            if manifest.is_compatible(APP_VERSION) {
                println!("This version is compatible.");
            } else {
                println!(
                    "Version {} or newer is required.{}",
                    manifest.min_downloader_app_version,
                    manifest
                        .downloader_app_url
                        .as_deref()
                        .map(|url| format!(" Download it from {}", url))
                        .unwrap_or_default()
                );
            }
            Ok(Exit::Done)
        }

        Commands::Install { backup_existing } => {
            let (mut store, config) = load(&cli)?;
            let settings = SyncSettings::from_config(&config, cli.token.as_deref())?;
            let url = config.json_url.as_deref().ok_or(SyncError::MissingConfig { field: "json_url" })?;
            let manifest = fetch_manifest(url).await?;
            if !manifest.is_compatible(APP_VERSION) {
                return Err(SyncError::InvalidConfig {
                    field: "min_downloader_app_version",
                    message: format!(
                        "this installer is {} but the texture pack needs {} or newer",
                        APP_VERSION, manifest.min_downloader_app_version
                    ),
                });
            }

            let options = InstallOptions {
                backup_existing: *backup_existing,
                ..Default::default()
            };
            let started = Utc::now();
            let report = match Session::start(&cli, settings)?
                .run(move |ctx| async move { run_install(ctx, &manifest, options).await })
                .await
            {
                Ok(report) => report,
                Err(SyncError::Cancelled) => return Ok(Exit::Cancelled),
                Err(e) => return Err(e),
            };

            println!(
                "{} groups, {} files written.",
                report.groups, report.files_written
            );
            if report.failed_groups.is_empty() {
                store.set("initial_setup_done", "True");
                store.write_last_run(started)?;
            } else {
                println!("Failed groups; rerun the install or run a full sync:");
                for group in &report.failed_groups {
                    println!("  - {}", group);
                }
            }
            Ok(Exit::Done)
        }

        Commands::Dupes => {
            let (_, config) = load(&cli)?;
            let root = local_directory(&config)?;
            let replacements = match &config.slus_folder {
                Some(slus) => format!("{}/{}", slus, REPLACEMENTS_FOLDER),
                None => REPLACEMENTS_FOLDER.to_string(),
            };
            check_for_dupes(&paths::local_path(&root, &replacements), &PrintSink);
            Ok(Exit::Done)
        }

        Commands::Prune => {
            let (_, config) = load(&cli)?;
            let root = local_directory(&config)?;
            validate_directory(&root)?;
            let pruned = prune_empty_folders(&root, &PrintSink);
            println!("{} empty folders removed.", pruned);
            Ok(Exit::Done)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(Exit::Done) => ExitCode::SUCCESS,
        Ok(Exit::Cancelled) => ExitCode::from(130),
        Err(SyncError::Cancelled) => ExitCode::from(130),
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
