//! CLI argument definitions

use crate::analyzer::BackendStatus;
use crate::config::{ConfigError, HostProfile, StewardConfig, DEFAULT_SSH_PORT};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Discover, analyze and safely edit nginx configurations over SSH
#[derive(Parser)]
#[command(name = "nginx-steward")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output
    #[arg(long, value_enum, default_value = "auto", global = true)]
    pub color: ColorChoice,

    /// Host profile file (default: <config dir>/nginx-steward/hosts.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch and analyze a host's configuration tree
    Analyze(AnalyzeArgs),

    /// Report structural problems in a host's configuration
    Validate(AnalyzeArgs),

    /// Create a new configuration file, checked and reloaded
    Create(MutateArgs),

    /// Replace an existing configuration file, rolled back on failure
    Update(MutateArgs),

    /// Mark an upstream backend up, down or backup, rolled back on failure
    SetBackend(BackendArgs),

    /// Probe whether nginx is running
    Status(TargetArgs),

    /// Parse a local file and print the directive report
    Parse(ParseArgs),
}

/// Which host to talk to
#[derive(clap::Args, Clone, Debug)]
pub struct TargetArgs {
    /// Profile name, or an address when --user is given
    pub host: String,

    /// Login user for an ad-hoc host
    #[arg(long)]
    pub user: Option<String>,

    /// SSH port for an ad-hoc host
    #[arg(long, default_value_t = DEFAULT_SSH_PORT)]
    pub port: u16,

    /// Password for an ad-hoc host
    #[arg(long, env = "NGINX_STEWARD_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Private key for an ad-hoc host
    #[arg(long)]
    pub key_file: Option<String>,

    /// nginx main configuration file (overrides the profile)
    #[arg(long)]
    pub main_config: Option<String>,
}

impl TargetArgs {
    /// Resolve to a host profile: ad-hoc when `--user` is set, otherwise
    /// looked up by name in the config file
    pub fn resolve(&self, config: &StewardConfig) -> Result<HostProfile, ConfigError> {
        let mut profile = match &self.user {
            Some(user) => {
                let profile = HostProfile {
                    name: self.host.clone(),
                    host: self.host.clone(),
                    port: self.port,
                    username: user.clone(),
                    password: self.password.clone(),
                    key_file: self.key_file.clone(),
                    ..Default::default()
                };
                profile.validate()?;
                profile
            }
            None => config.host(&self.host)?.clone(),
        };
        if let Some(main) = &self.main_config {
            profile.main_config = Some(main.clone());
        }
        Ok(profile)
    }
}

#[derive(clap::Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Read the tree from a local directory standing in for the remote root
    #[arg(long)]
    pub from_dir: Option<PathBuf>,

    /// Local mirror directory (overrides the config)
    #[arg(long)]
    pub mirror_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct MutateArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Remote file to write
    pub remote_path: String,

    /// Local file holding the new content
    #[arg(long = "from")]
    pub from: PathBuf,

    /// Output the outcome record as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(clap::Args)]
pub struct BackendArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Remote file holding the upstream
    pub remote_path: String,

    /// Backend address as written in its `server` line
    pub address: String,

    /// New state
    #[arg(long, value_enum)]
    pub status: BackendStatusArg,

    /// Output the outcome record as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendStatusArg {
    Up,
    Down,
    Backup,
}

impl From<BackendStatusArg> for BackendStatus {
    fn from(arg: BackendStatusArg) -> Self {
        match arg {
            BackendStatusArg::Up => Self::Up,
            BackendStatusArg::Down => Self::Down,
            BackendStatusArg::Backup => Self::Backup,
        }
    }
}

#[derive(clap::Args)]
pub struct ParseArgs {
    /// Input file
    #[arg(required = true)]
    pub input: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Default)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}
