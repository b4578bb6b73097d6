use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "genvault",
    about = "genvault -- generational metadata backups",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Repository directory (overrides the config file)
    #[arg(short, long, global = true)]
    pub repository: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Host name to record backups under
    #[arg(long, global = true)]
    pub client_name: Option<String>,

    /// Seconds to wait for a held repository lock
    #[arg(long, global = true)]
    pub lock_timeout: Option<u64>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create an empty repository
    Init,
    /// Record a new generation of a directory tree
    Backup(BackupArgs),
    /// List hosts with backups
    Hosts,
    /// List the generations of a host
    Generations(HostArgs),
    /// Print the directory tree of generations
    Show(ShowArgs),
    /// Check that every reference in the repository resolves
    Fsck(FsckArgs),
    /// Remove a generation from its host
    Forget(ForgetArgs),
    /// Remove a stale repository lock
    ForceLock,
}

#[derive(Args)]
pub struct BackupArgs {
    pub path: PathBuf,
}

#[derive(Args)]
pub struct HostArgs {
    /// Host to list; defaults to the client name
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Args)]
pub struct ShowArgs {
    /// `latest` or generation identifiers
    #[arg(default_value = "latest")]
    pub generations: Vec<String>,
    #[arg(long)]
    pub host: Option<String>,
}

#[derive(Args)]
pub struct FsckArgs {
    /// Check only this host
    #[arg(long)]
    pub host: Option<String>,
    /// Suppress progress lines
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ForgetArgs {
    /// `latest` or a generation identifier
    pub generation: String,
    #[arg(long)]
    pub host: Option<String>,
}
