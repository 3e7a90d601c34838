//! nginx steward
//!
//! Discover, analyze and safely modify nginx configurations on remote hosts
//! over SSH: walk the include tree, parse it into directives, extract virtual
//! hosts, upstreams and backends, and write files behind an `nginx -t`
//! check with rollback.

pub mod analyzer;
pub mod cli;
pub mod config;
pub mod fetch;
pub mod health;
pub mod parsers;
pub mod remote;
pub mod report;
pub mod workflow;

pub use analyzer::{analyze, validate_structure, AnalysisResult};
pub use fetch::ConfigFetcher;
pub use parsers::{Directive, ParseStatus, ParsedFile};
pub use remote::{CommandOutput, MemoryShell, RemoteShell, SshChannel, SshCredentials};
pub use workflow::{MutationError, MutationWorkflow, Outcome};

use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum StewardError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),

    #[error(transparent)]
    Remote(#[from] remote::RemoteError),

    #[error(transparent)]
    Fetch(#[from] fetch::FetchError),

    #[error("Could not connect to {0}")]
    Connection(String),
}

pub type Result<T> = std::result::Result<T, StewardError>;

/// Fetch the whole include tree below `main_config` and analyze it
pub fn analyze_remote<S: RemoteShell + ?Sized>(
    shell: &mut S,
    main_config: &str,
    mirror_dir: &Path,
) -> Result<AnalysisResult> {
    let files = ConfigFetcher::new(shell, mirror_dir)?.fetch(main_config);
    let result = analyze(main_config, &files);
    info!(
        main = main_config,
        files = result.config_files.len(),
        warnings = result.warnings.len(),
        "remote analysis finished"
    );
    Ok(result)
}

/// Open an authenticated SSH channel
pub fn connect(credentials: SshCredentials) -> Result<SshChannel> {
    let mut channel = SshChannel::new(credentials);
    if channel.connect() {
        Ok(channel)
    } else {
        let creds = channel.credentials();
        Err(StewardError::Connection(format!(
            "{}@{}:{}",
            creds.username, creds.host, creds.port
        )))
    }
}
