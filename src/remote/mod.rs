//! Remote shell access
//!
//! Everything above this layer talks to a host through [`RemoteShell`]:
//! run a command, move file content in or out. Command failures are data
//! (`CommandOutput { success: false, .. }`), never `Err`.

pub mod memory;
pub mod ssh;

pub use memory::MemoryShell;
pub use ssh::{SshChannel, SshCredentials};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Exit code reported when the transport itself failed
pub const TRANSPORT_FAILURE: i32 = -1;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("SSH error: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Authentication failed for {0}")]
    AuthFailed(String),

    #[error("No credentials configured for {0}")]
    NoCredentials(String),

    #[error("Not connected")]
    NotConnected,
}

/// Result of one remote command or transfer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub success: bool,
    pub output: String,
    pub error: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn from_exit(exit_code: i32, output: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: exit_code == 0,
            output: output.into(),
            error: error.into(),
            exit_code,
        }
    }

    pub fn ok(output: impl Into<String>) -> Self {
        Self::from_exit(0, output, "")
    }

    /// A failure that never reached the remote command
    pub fn transport_failure(error: impl std::fmt::Display) -> Self {
        Self::from_exit(TRANSPORT_FAILURE, "", error.to_string())
    }

    /// Best human-readable description of what went wrong
    pub fn diagnostic(&self) -> &str {
        if self.error.trim().is_empty() {
            self.output.trim()
        } else {
            self.error.trim()
        }
    }
}

/// A command/file-transfer session to one host
pub trait RemoteShell {
    /// Run a command to completion
    fn run(&mut self, command: &str) -> CommandOutput;

    /// Write `content` to `remote_path`, replacing any existing file
    fn upload(&mut self, content: &[u8], remote_path: &str) -> CommandOutput;

    /// Read a remote file. Mirrors `cat`: success follows the command's exit
    /// status, existence is not checked separately.
    fn download(&mut self, remote_path: &str) -> CommandOutput {
        self.run(&format!("cat {}", shell_quote(remote_path)))
    }

    /// Release the session. Safe to call more than once.
    fn close(&mut self);
}

/// nginx-specific commands every shell gets for free
pub trait NginxCommands: RemoteShell {
    /// `test -f`: exit 0 is present, exit 1 is absent. Anything else means
    /// the answer is unknown and comes back as `Err`.
    fn file_exists(&mut self, path: &str) -> Result<bool, CommandOutput> {
        let result = self.run(&format!("test -f {}", shell_quote(path)));
        match result.exit_code {
            0 => Ok(true),
            1 => Ok(false),
            _ => Err(result),
        }
    }

    /// List `*.conf` files below `dir`, in the order `find` reports them
    fn list_conf_files(&mut self, dir: &str) -> Result<Vec<String>, CommandOutput> {
        let result = self.run(&format!("find {} -name '*.conf' -type f", shell_quote(dir)));
        if !result.success {
            return Err(result);
        }
        Ok(result
            .output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    fn copy_file(&mut self, from: &str, to: &str) -> CommandOutput {
        self.run(&format!("cp {} {}", shell_quote(from), shell_quote(to)))
    }

    fn remove_file(&mut self, path: &str) -> CommandOutput {
        self.run(&format!("rm -f {}", shell_quote(path)))
    }

    fn make_dirs(&mut self, dir: &str) -> CommandOutput {
        self.run(&format!("mkdir -p {}", shell_quote(dir)))
    }

    fn check_syntax(&mut self, nginx_binary: &str, main_config: &str) -> CommandOutput {
        self.run(&format!("{} -t -c {}", nginx_binary, shell_quote(main_config)))
    }

    fn reload(&mut self, nginx_binary: &str) -> CommandOutput {
        self.run(&format!("{} -s reload", nginx_binary))
    }

    /// Service manager status, falling back to the process table
    fn service_status(&mut self) -> CommandOutput {
        self.run("systemctl status nginx 2>/dev/null || service nginx status 2>/dev/null || ps aux | grep nginx | grep -v grep")
    }
}

impl<T: RemoteShell + ?Sized> NginxCommands for T {}

/// Quote `value` for a POSIX shell. Plain paths pass through unchanged.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/._-+:=@,".contains(c));
    if plain {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}
