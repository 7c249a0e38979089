//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "dumpdeploy")]
#[command(about = "Deploy the dump runner to homebrew directories over FTP or on a local volume")]
#[command(version)]
pub struct Args {
    /// Console address (overrides the saved host)
    #[arg(long, global = true, value_name = "HOST")]
    pub host: Option<String>,

    /// FTP port (overrides the saved port)
    #[arg(short = 'p', long, global = true, value_name = "PORT")]
    pub port: Option<u32>,

    /// Login name (overrides the saved user)
    #[arg(short = 'u', long = "user", global = true, value_name = "USER")]
    pub user: Option<String>,

    /// Use active (PORT) data connections instead of passive
    #[arg(long, global = true)]
    pub active: bool,

    /// Handshake and command timeout in seconds (5-300)
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Work on a mounted volume (e.g. the console's USB drive) instead of FTP
    #[arg(long, global = true, value_name = "DIR", conflicts_with = "host")]
    pub local: Option<PathBuf>,

    /// Settings file path
    #[arg(long = "settings-file", global = true, value_name = "FILE")]
    pub settings_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Connect and list the discovered targets
    Scan,
    /// Upload the artifact pair to selected targets
    Deploy(DeployArgs),
    /// List mounted volumes usable with --local
    Volumes,
    /// Show or change the saved settings
    Settings {
        #[command(subcommand)]
        action: Option<SettingsAction>,
    },
}

#[derive(ClapArgs, Debug, Clone)]
pub struct DeployArgs {
    /// Local executable artifact
    #[arg(long, value_name = "FILE")]
    pub executable: PathBuf,

    /// Local config artifact
    #[arg(long, value_name = "FILE")]
    pub config: PathBuf,

    /// Version tag recorded for this pair
    #[arg(long, value_name = "TAG")]
    pub version: Option<String>,

    /// Target directory path (repeatable)
    #[arg(long = "target", value_name = "PATH", conflicts_with = "all")]
    pub targets: Vec<String>,

    /// Deploy to every discovered target
    #[arg(long)]
    pub all: bool,

    /// Also deploy to targets that already have the pair installed
    #[arg(long)]
    pub overwrite: bool,

    /// Bytes per upload write (overrides the saved chunk size)
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Print batch events and the report as JSON lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SettingsAction {
    /// Print the settings file path and contents
    Show,
    /// Restore the defaults
    Reset,
    /// Record a local pair as the official release used to classify installs
    Official {
        #[arg(long, value_name = "FILE")]
        executable: PathBuf,
        #[arg(long, value_name = "FILE")]
        config: PathBuf,
        #[arg(long, value_name = "TAG")]
        version: String,
    },
}
