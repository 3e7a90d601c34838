//! Safe create/update of remote configuration files
//!
//! Every write is followed by `nginx -t`; a write that fails the check is
//! never left live. Update additionally keeps a `<path>.backup` copy until
//! the reload has gone through. Backend status changes are updates whose
//! content is derived from the live file.

use crate::analyzer::BackendStatus;
use crate::remote::{CommandOutput, NginxCommands, RemoteShell};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{error, info, warn};

pub const BACKUP_SUFFIX: &str = ".backup";

/// Steps of the create/update state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    Start,
    ExistenceChecked,
    BackedUp,
    Written,
    SyntaxChecked,
    Reloaded,
    RolledBack,
    Done,
    Failed,
}

impl std::fmt::Display for MutationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::ExistenceChecked => "existence_checked",
            Self::BackedUp => "backed_up",
            Self::Written => "written",
            Self::SyntaxChecked => "syntax_checked",
            Self::Reloaded => "reloaded",
            Self::RolledBack => "rolled_back",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MutationError {
    #[error("Could not connect to {host}: {message}")]
    ConnectionFailure { host: String, message: String },

    #[error("{path} does not exist")]
    NotFound { path: String },

    #[error("{path} already exists")]
    AlreadyExists { path: String },

    #[error("Could not back up {path}: {message}")]
    BackupFailed { path: String, message: String },

    #[error("nginx rejected {path}: {output}")]
    SyntaxError { path: String, output: String },

    #[error("nginx reload failed after writing {path}: {output}")]
    ReloadFailed {
        path: String,
        output: String,
        restored: bool,
    },

    #[error("Could not write {path}: {message}")]
    WriteFailed { path: String, message: String },

    #[error("No `server {address}` entry in {path}")]
    BackendNotFound { path: String, address: String },
}

impl MutationError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::SyntaxError { .. } => 400,
            Self::NotFound { .. } | Self::BackendNotFound { .. } => 404,
            Self::AlreadyExists { .. } => 409,
            Self::BackupFailed { .. } | Self::ReloadFailed { .. } | Self::WriteFailed { .. } => 500,
            Self::ConnectionFailure { .. } => 502,
        }
    }
}

/// Result record of one mutation, as handed to the persistence layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub success: bool,
    pub message: String,
    pub status_code: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<MutationError>,
    pub trace: Vec<MutationState>,
}

impl Outcome {
    /// Outcome for a mutation that never got a working channel
    pub fn connection_failure(host: impl Into<String>, message: impl Into<String>) -> Self {
        let error = MutationError::ConnectionFailure {
            host: host.into(),
            message: message.into(),
        };
        Self {
            success: false,
            message: error.to_string(),
            status_code: error.status_code(),
            error: Some(error),
            trace: vec![MutationState::Start, MutationState::Failed],
        }
    }

    /// Terminal state of the run
    pub fn final_state(&self) -> Option<MutationState> {
        self.trace.last().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowOptions {
    /// Reported in `ConnectionFailure` errors
    pub host: String,
    pub main_config: String,
    pub nginx_binary: String,
}

impl Default for WorkflowOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            main_config: "/etc/nginx/nginx.conf".to_string(),
            nginx_binary: "nginx".to_string(),
        }
    }
}

/// State transitions of a single run
struct Run<'p> {
    operation: &'static str,
    path: &'p str,
    trace: Vec<MutationState>,
}

impl<'p> Run<'p> {
    fn start(operation: &'static str, path: &'p str) -> Self {
        info!(operation, path, state = %MutationState::Start, "mutation started");
        Self {
            operation,
            path,
            trace: vec![MutationState::Start],
        }
    }

    fn advance(&mut self, state: MutationState) {
        info!(operation = self.operation, path = self.path, state = %state, "mutation state");
        self.trace.push(state);
    }

    fn done(mut self, status_code: u16, message: String) -> Outcome {
        self.advance(MutationState::Done);
        Outcome {
            success: true,
            message,
            status_code,
            error: None,
            trace: self.trace,
        }
    }

    fn fail(mut self, error: MutationError, note: Option<String>) -> Outcome {
        self.advance(MutationState::Failed);
        error!(operation = self.operation, path = self.path, status_code = error.status_code(), error = %error, "mutation failed");
        let message = match note {
            Some(note) => format!("{}; {}", error, note),
            None => error.to_string(),
        };
        Outcome {
            success: false,
            message,
            status_code: error.status_code(),
            error: Some(error),
            trace: self.trace,
        }
    }
}

/// Create and update files on one connected host
pub struct MutationWorkflow<'a, S: RemoteShell + ?Sized> {
    shell: &'a mut S,
    options: WorkflowOptions,
}

impl<'a, S: RemoteShell + ?Sized> MutationWorkflow<'a, S> {
    pub fn new(shell: &'a mut S, options: WorkflowOptions) -> Self {
        Self { shell, options }
    }

    /// Write a new file. On a failed syntax check the file is removed again;
    /// on a failed reload it is kept.
    pub fn create(&mut self, path: &str, content: &str) -> Outcome {
        let mut run = Run::start("create", path);

        match self.shell.file_exists(path) {
            Ok(false) => {}
            Ok(true) => {
                warn!(path, "create target already exists");
                return run.fail(MutationError::AlreadyExists { path: path.to_string() }, None);
            }
            Err(result) => return run.fail(self.connection_failure(&result), None),
        }
        run.advance(MutationState::ExistenceChecked);

        if let Some(parent) = Path::new(path).parent().and_then(Path::to_str).filter(|p| !p.is_empty()) {
            let made = self.shell.make_dirs(parent);
            if !made.success {
                return run.fail(write_failed(path, &made), None);
            }
        }
        let written = self.shell.upload(content.as_bytes(), path);
        if !written.success {
            return run.fail(write_failed(path, &written), None);
        }
        run.advance(MutationState::Written);

        let check = self.check_syntax();
        if !check.success {
            warn!(path, exit_code = check.exit_code, "syntax check failed, removing new file");
            let removed = self.shell.remove_file(path);
            let note = (!removed.success).then(|| format!("removing {} failed: {}", path, removed.diagnostic()));
            if let Some(note) = &note {
                error!(path, "{}", note);
            }
            run.advance(MutationState::RolledBack);
            let error = MutationError::SyntaxError {
                path: path.to_string(),
                output: checker_output(&check),
            };
            return run.fail(error, note);
        }
        run.advance(MutationState::SyntaxChecked);

        let reload = self.reload();
        if !reload.success {
            warn!(path, exit_code = reload.exit_code, "reload failed, keeping new file");
            let error = MutationError::ReloadFailed {
                path: path.to_string(),
                output: checker_output(&reload),
                restored: false,
            };
            return run.fail(error, None);
        }
        run.advance(MutationState::Reloaded);

        run.done(201, format!("{} created and nginx reloaded", path))
    }

    /// Replace an existing file. Any failure after the backup puts the
    /// previous content back; the backup is removed only on full success.
    pub fn update(&mut self, path: &str, content: &str) -> Outcome {
        let mut run = Run::start("update", path);

        if let Err(error) = self.require_existing(path) {
            return run.fail(error, None);
        }
        run.advance(MutationState::ExistenceChecked);

        self.replace(run, path, content, format!("{} updated and nginx reloaded", path))
    }

    /// Mark one upstream `server <address>` entry in `path` as up, down or
    /// backup, through the same backup/check/reload path as [`Self::update`]
    pub fn set_backend_status(&mut self, path: &str, address: &str, status: BackendStatus) -> Outcome {
        let mut run = Run::start("set_backend_status", path);

        if let Err(error) = self.require_existing(path) {
            return run.fail(error, None);
        }
        run.advance(MutationState::ExistenceChecked);

        let current = self.shell.download(path);
        if !current.success {
            let error = if current.exit_code == crate::remote::TRANSPORT_FAILURE {
                self.connection_failure(&current)
            } else {
                MutationError::NotFound { path: path.to_string() }
            };
            return run.fail(error, None);
        }

        let Some(rewritten) = rewrite_backend_status(&current.output, address, status) else {
            warn!(path, address, "backend entry not found");
            let error = MutationError::BackendNotFound {
                path: path.to_string(),
                address: address.to_string(),
            };
            return run.fail(error, None);
        };
        if rewritten == current.output {
            info!(path, address, status = %status, "backend already in requested state");
            return run.done(200, format!("{} in {} is already {}", address, path, status));
        }

        info!(path, address, status = %status, "rewriting backend entry");
        self.replace(run, path, &rewritten, format!("{} in {} set to {} and nginx reloaded", address, path, status))
    }

    /// `Ok` if `path` exists; `NotFound` if it does not; `ConnectionFailure`
    /// if the check itself did not run
    fn require_existing(&mut self, path: &str) -> Result<(), MutationError> {
        match self.shell.file_exists(path) {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!(path, "target does not exist");
                Err(MutationError::NotFound { path: path.to_string() })
            }
            Err(result) => Err(self.connection_failure(&result)),
        }
    }

    fn connection_failure(&self, result: &CommandOutput) -> MutationError {
        error!(host = %self.options.host, exit_code = result.exit_code, error = result.diagnostic(), "remote command did not run");
        MutationError::ConnectionFailure {
            host: self.options.host.clone(),
            message: result.diagnostic().to_string(),
        }
    }

    /// Backup, write, check, reload; restore the backup on any failure
    fn replace(&mut self, mut run: Run<'_>, path: &str, content: &str, message: String) -> Outcome {
        let backup = backup_path(path);
        let copied = self.shell.copy_file(path, &backup);
        if !copied.success {
            let error = MutationError::BackupFailed {
                path: path.to_string(),
                message: copied.diagnostic().to_string(),
            };
            return run.fail(error, None);
        }
        run.advance(MutationState::BackedUp);

        let written = self.shell.upload(content.as_bytes(), path);
        if !written.success {
            let note = self.restore(path, &backup);
            run.advance(MutationState::RolledBack);
            return run.fail(write_failed(path, &written), note.err());
        }
        run.advance(MutationState::Written);

        let check = self.check_syntax();
        if !check.success {
            warn!(path, exit_code = check.exit_code, "syntax check failed, restoring backup");
            let note = self.restore(path, &backup);
            run.advance(MutationState::RolledBack);
            let error = MutationError::SyntaxError {
                path: path.to_string(),
                output: checker_output(&check),
            };
            return run.fail(error, note.err());
        }
        run.advance(MutationState::SyntaxChecked);

        let reload = self.reload();
        if !reload.success {
            warn!(path, exit_code = reload.exit_code, "reload failed, restoring backup");
            let restored = self.restore(path, &backup);
            run.advance(MutationState::RolledBack);
            let error = MutationError::ReloadFailed {
                path: path.to_string(),
                output: checker_output(&reload),
                restored: restored.is_ok(),
            };
            return run.fail(error, restored.err());
        }
        run.advance(MutationState::Reloaded);

        let cleaned = self.shell.remove_file(&backup);
        if !cleaned.success {
            warn!(path, backup = %backup, error = cleaned.diagnostic(), "could not remove backup");
        }
        run.done(200, message)
    }

    fn check_syntax(&mut self) -> CommandOutput {
        let result = self.shell.check_syntax(&self.options.nginx_binary, &self.options.main_config);
        info!(main = %self.options.main_config, exit_code = result.exit_code, "syntax check");
        result
    }

    fn reload(&mut self) -> CommandOutput {
        let result = self.shell.reload(&self.options.nginx_binary);
        info!(exit_code = result.exit_code, "reload");
        result
    }

    /// Copy the backup over the live file. `Err` carries a note for the
    /// outcome message.
    fn restore(&mut self, path: &str, backup: &str) -> Result<(), String> {
        let restored = self.shell.copy_file(backup, path);
        if restored.success {
            info!(path, backup, "restored from backup");
            Ok(())
        } else {
            let note = format!("restoring {} from {} failed: {}", path, backup, restored.diagnostic());
            error!(path, backup, "{}", note);
            Err(note)
        }
    }
}

pub fn backup_path(path: &str) -> String {
    format!("{}{}", path, BACKUP_SUFFIX)
}

/// Rewrite every uncommented `server <address> ...;` entry so that its
/// `down`/`backup` flags match `status`. `None` if no entry names `address`.
pub fn rewrite_backend_status(content: &str, address: &str, status: BackendStatus) -> Option<String> {
    let pattern = Regex::new(&format!(r"\bserver\s+{}((?:\s+[^;\s#]+)*)\s*;", regex::escape(address))).ok()?;

    let mut out = String::with_capacity(content.len());
    let mut last = 0;
    let mut found = false;
    for caps in pattern.captures_iter(content) {
        let (Some(whole), Some(args)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let line_start = content[..whole.start()].rfind('\n').map_or(0, |i| i + 1);
        if content[line_start..whole.start()].contains('#') {
            continue;
        }
        found = true;

        let mut kept: Vec<&str> = args
            .as_str()
            .split_whitespace()
            .filter(|a| *a != "down" && *a != "backup")
            .collect();
        match status {
            BackendStatus::Up => {}
            BackendStatus::Down => kept.push("down"),
            BackendStatus::Backup => kept.push("backup"),
        }

        out.push_str(&content[last..whole.start()]);
        out.push_str("server ");
        out.push_str(address);
        for arg in kept {
            out.push(' ');
            out.push_str(arg);
        }
        out.push(';');
        last = whole.end();
    }

    if !found {
        return None;
    }
    out.push_str(&content[last..]);
    Some(out)
}

fn write_failed(path: &str, result: &CommandOutput) -> MutationError {
    MutationError::WriteFailed {
        path: path.to_string(),
        message: result.diagnostic().to_string(),
    }
}

/// stderr and stdout of a checker run, as nginx printed them
fn checker_output(result: &CommandOutput) -> String {
    [result.error.trim(), result.output.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryShell;

    const MAIN: &str = "/etc/nginx/nginx.conf";
    const SITE: &str = "/etc/nginx/conf.d/site.conf";
    const GOOD: &str = "server { listen 80; server_name site.test; }\n";
    const NEW: &str = "server { listen 8080; server_name site.test; }\n";
    const BROKEN: &str = "server { listen 80 }\n";

    fn host() -> MemoryShell {
        MemoryShell::new().with_file(MAIN, "events {}\nhttp { include /etc/nginx/conf.d/*.conf; }\n")
    }

    fn workflow(shell: &mut MemoryShell) -> MutationWorkflow<'_, MemoryShell> {
        MutationWorkflow::new(shell, WorkflowOptions::default())
    }

    #[test]
    fn create_then_create_again_is_already_exists() {
        let mut shell = host();
        let first = workflow(&mut shell).create(SITE, GOOD);
        assert!(first.success);
        assert_eq!(first.status_code, 201);

        let second = workflow(&mut shell).create(SITE, NEW);
        assert!(!second.success);
        assert_eq!(second.status_code, 409);
        assert_eq!(second.error, Some(MutationError::AlreadyExists { path: SITE.to_string() }));
        assert_eq!(shell.file(SITE), Some(GOOD));
    }

    #[test]
    fn create_with_bad_syntax_leaves_nothing_behind() {
        let mut shell = host();
        let outcome = workflow(&mut shell).create(SITE, BROKEN);

        assert_eq!(outcome.status_code, 400);
        assert!(matches!(&outcome.error, Some(MutationError::SyntaxError { output, .. }) if output.contains("test failed")));
        assert_eq!(shell.file(SITE), None);
        assert_eq!(
            outcome.trace,
            vec![
                MutationState::Start,
                MutationState::ExistenceChecked,
                MutationState::Written,
                MutationState::RolledBack,
                MutationState::Failed,
            ]
        );
    }

    #[test]
    fn create_keeps_file_when_reload_fails() {
        let mut shell = host().failing_reload();
        let outcome = workflow(&mut shell).create(SITE, GOOD);

        assert_eq!(outcome.status_code, 500);
        assert!(matches!(outcome.error, Some(MutationError::ReloadFailed { restored: false, .. })));
        assert_eq!(shell.file(SITE), Some(GOOD));
    }

    #[test]
    fn create_makes_parent_directories() {
        let mut shell = host();
        workflow(&mut shell).create("/etc/nginx/conf.d/new/site.conf", GOOD);
        assert!(shell.history().iter().any(|c| c == "mkdir -p /etc/nginx/conf.d/new"));
    }

    #[test]
    fn update_missing_file_is_not_found() {
        let mut shell = host();
        let outcome = workflow(&mut shell).update(SITE, NEW);
        assert_eq!(outcome.status_code, 404);
        assert_eq!(shell.file(SITE), None);
    }

    #[test]
    fn update_success_replaces_content_and_drops_backup() {
        let mut shell = host().with_file(SITE, GOOD);
        let outcome = workflow(&mut shell).update(SITE, NEW);

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.status_code, 200);
        assert_eq!(outcome.final_state(), Some(MutationState::Done));
        assert_eq!(shell.file(SITE), Some(NEW));
        assert_eq!(shell.file(&backup_path(SITE)), None);
    }

    #[test]
    fn update_with_bad_syntax_restores_previous_content() {
        let mut shell = host().with_file(SITE, GOOD);
        let outcome = workflow(&mut shell).update(SITE, BROKEN);

        assert_eq!(outcome.status_code, 400);
        assert_eq!(shell.file(SITE), Some(GOOD));
        assert_eq!(shell.file(&backup_path(SITE)), Some(GOOD));
    }

    #[test]
    fn update_restores_previous_content_when_reload_fails() {
        let mut shell = host().with_file(SITE, GOOD).failing_reload();
        let outcome = workflow(&mut shell).update(SITE, NEW);

        assert_eq!(outcome.status_code, 500);
        assert!(matches!(outcome.error, Some(MutationError::ReloadFailed { restored: true, .. })));
        assert_eq!(shell.file(SITE), Some(GOOD));
        assert!(outcome.trace.contains(&MutationState::SyntaxChecked));
        assert!(outcome.trace.contains(&MutationState::RolledBack));
    }

    #[test]
    fn failed_backup_changes_nothing() {
        let mut shell = host()
            .with_file(SITE, GOOD)
            .script("cp ", CommandOutput::from_exit(1, "", "cp: No space left on device"));
        let outcome = workflow(&mut shell).update(SITE, NEW);

        assert_eq!(outcome.status_code, 500);
        assert!(matches!(&outcome.error, Some(MutationError::BackupFailed { message, .. }) if message.contains("No space")));
        assert_eq!(shell.file(SITE), Some(GOOD));
        assert!(!shell.history().iter().any(|c| c.starts_with("upload")));
    }

    #[test]
    fn failed_upload_is_write_failed() {
        let mut shell = host().failing_uploads();
        let outcome = workflow(&mut shell).create(SITE, GOOD);
        assert_eq!(outcome.status_code, 500);
        assert!(matches!(outcome.error, Some(MutationError::WriteFailed { .. })));
    }

    #[test]
    fn create_with_unknown_existence_is_connection_failure() {
        let mut shell = host()
            .with_file(SITE, GOOD)
            .script("test -f", CommandOutput::transport_failure("channel closed"));
        let outcome = workflow(&mut shell).create(SITE, BROKEN);

        assert_eq!(outcome.status_code, 502);
        assert!(matches!(&outcome.error, Some(MutationError::ConnectionFailure { host, message })
            if host == "localhost" && message == "channel closed"));
        assert_eq!(shell.file(SITE), Some(GOOD));
        assert!(!shell.history().iter().any(|c| c.starts_with("upload") || c.starts_with("rm ")));
    }

    #[test]
    fn update_with_unknown_existence_is_connection_failure() {
        let mut shell = host()
            .with_file(SITE, GOOD)
            .script("test -f", CommandOutput::transport_failure("channel closed"));
        let options = WorkflowOptions {
            host: "10.0.0.5".to_string(),
            ..Default::default()
        };
        let outcome = MutationWorkflow::new(&mut shell, options).update(SITE, NEW);

        assert_eq!(outcome.status_code, 502);
        assert!(matches!(&outcome.error, Some(MutationError::ConnectionFailure { host, .. }) if host == "10.0.0.5"));
        assert_eq!(outcome.trace, vec![MutationState::Start, MutationState::Failed]);
        assert_eq!(shell.file(SITE), Some(GOOD));
        assert!(!shell.history().iter().any(|c| c.starts_with("cp ")));
    }

    const POOL: &str = "upstream app {\n    server 10.0.0.1:8080 max_fails=3;\n    server 10.0.0.2:8080 backup;\n    # server 10.0.0.3:8080;\n}\n";

    #[test]
    fn rewrite_marks_backend_down_and_keeps_other_args() {
        let rewritten = rewrite_backend_status(POOL, "10.0.0.1:8080", BackendStatus::Down).unwrap();
        assert!(rewritten.contains("    server 10.0.0.1:8080 max_fails=3 down;\n"));
        assert!(rewritten.contains("    server 10.0.0.2:8080 backup;\n"));
    }

    #[test]
    fn rewrite_to_up_drops_flags() {
        let rewritten = rewrite_backend_status(POOL, "10.0.0.2:8080", BackendStatus::Up).unwrap();
        assert!(rewritten.contains("    server 10.0.0.2:8080;\n"));
        assert_eq!(rewrite_backend_status(POOL, "10.0.0.1:8080", BackendStatus::Up).as_deref(), Some(POOL));
    }

    #[test]
    fn rewrite_ignores_commented_and_prefix_addresses() {
        assert_eq!(rewrite_backend_status(POOL, "10.0.0.3:8080", BackendStatus::Down), None);
        assert_eq!(rewrite_backend_status(POOL, "10.0.0.1:80", BackendStatus::Down), None);
    }

    #[test]
    fn set_backend_status_goes_through_update_path() {
        let mut shell = host().with_file(SITE, POOL);
        let outcome = workflow(&mut shell).set_backend_status(SITE, "10.0.0.1:8080", BackendStatus::Down);

        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(outcome.status_code, 200);
        assert!(outcome.trace.contains(&MutationState::BackedUp));
        assert!(outcome.trace.contains(&MutationState::Reloaded));
        assert!(shell.file(SITE).unwrap().contains("server 10.0.0.1:8080 max_fails=3 down;"));
        assert_eq!(shell.file(&backup_path(SITE)), None);
    }

    #[test]
    fn set_backend_status_unchanged_skips_reload() {
        let mut shell = host().with_file(SITE, POOL);
        let outcome = workflow(&mut shell).set_backend_status(SITE, "10.0.0.2:8080", BackendStatus::Backup);

        assert!(outcome.success);
        assert_eq!(outcome.trace, vec![MutationState::Start, MutationState::ExistenceChecked, MutationState::Done]);
        assert!(!shell.history().iter().any(|c| c.contains("reload")));
    }

    #[test]
    fn set_backend_status_unknown_address_is_not_found() {
        let mut shell = host().with_file(SITE, POOL);
        let outcome = workflow(&mut shell).set_backend_status(SITE, "10.9.9.9:80", BackendStatus::Down);

        assert_eq!(outcome.status_code, 404);
        assert!(matches!(outcome.error, Some(MutationError::BackendNotFound { .. })));
        assert_eq!(shell.file(SITE), Some(POOL));
    }

    #[test]
    fn set_backend_status_restores_on_reload_failure() {
        let mut shell = host().with_file(SITE, POOL).failing_reload();
        let outcome = workflow(&mut shell).set_backend_status(SITE, "10.0.0.1:8080", BackendStatus::Down);

        assert_eq!(outcome.status_code, 500);
        assert_eq!(shell.file(SITE), Some(POOL));
    }

    #[test]
    fn connection_failure_outcome() {
        let outcome = Outcome::connection_failure("10.0.0.5:22", "Authentication failed");
        assert_eq!(outcome.status_code, 502);
        assert!(!outcome.success);
        assert_eq!(outcome.final_state(), Some(MutationState::Failed));
    }

    #[test]
    fn outcome_serializes_with_tagged_error() {
        let mut shell = host();
        let outcome = workflow(&mut shell).update(SITE, NEW);
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status_code"], 404);
        assert_eq!(json["error"]["kind"], "not_found");
        assert_eq!(json["trace"], serde_json::json!(["start", "failed"]));
    }
}
