use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// NCAA NEXT Textures Sync
///
/// Keep a local texture pack folder in sync with its GitHub repository
#[derive(Parser, Debug)]
#[command(name = "textures-sync")]
#[command(about, long_about = None, version)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to every confirmation prompt
    #[arg(long, global = true, conflicts_with = "dry_run")]
    pub yes: bool,

    /// Report what would be deleted or replaced without doing it
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Config file to read and update
    #[arg(long, global = true, value_name = "PATH", default_value = "config.txt")]
    pub config: PathBuf,

    /// GitHub token; overrides the one stored in the config file
    #[arg(long, global = true, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter config file if none exists
    Init {
        /// Local textures directory to store in the new config
        #[arg(long, value_name = "PATH")]
        local_directory: Option<PathBuf>,
    },

    /// Apply new commits since the last sync, then run the health check
    Sync {
        /// Review the entire commit history instead of stopping at the last sync date
        #[arg(long)]
        full: bool,

        /// Compare content hashes of files present on both sides
        #[arg(long)]
        verify_hashes: bool,

        /// Skip the health check after the commit walk
        #[arg(long)]
        skip_validation: bool,
    },

    /// Run the health check only
    Scan {
        /// Compare content hashes of files present on both sides
        #[arg(long)]
        verify_hashes: bool,
    },

    /// Show whether the repository changed since the last sync
    Status,

    /// Show the release manifest and whether this version is compatible
    Manifest,

    /// Bulk first-time install of the texture pack
    Install {
        /// Rename an existing target folder with a timestamp instead of refusing
        #[arg(long)]
        backup_existing: bool,
    },

    /// Report texture names that appear more than once
    Dupes,

    /// Remove empty folders below the local directory
    Prune,
}
