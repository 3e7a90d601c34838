//! In-process stand-in for a remote nginx host
//!
//! Holds a flat path -> content map and understands the small command
//! vocabulary the fetcher and the mutation workflow use (`test -f`, `cat`,
//! `find`, `cp`, `rm`, `mkdir -p`, `nginx -t`, `nginx -s reload`). The
//! syntax check runs the structured parser over every `*.conf` file.
//! Anything else can be scripted by command prefix.

use super::{CommandOutput, RemoteShell};
use crate::parsers::NginxParser;
use glob::Pattern;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

const NOT_FOUND: i32 = 127;

#[derive(Debug, Default)]
pub struct MemoryShell {
    files: BTreeMap<String, String>,
    scripted: Vec<(String, CommandOutput)>,
    fail_uploads: bool,
    history: Vec<String>,
    closed: bool,
}

impl MemoryShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or replace a remote file
    pub fn with_file(mut self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Seed from a local directory that stands in for the remote root:
    /// `<root>/etc/nginx/nginx.conf` becomes `/etc/nginx/nginx.conf`
    pub fn load_tree(root: &Path) -> io::Result<Self> {
        let pattern = format!("{}/**/*", root.display());
        let entries = glob::glob(&pattern).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

        let mut shell = Self::new();
        for entry in entries {
            let path = entry.map_err(glob::GlobError::into_error)?;
            if !path.is_file() {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let content = fs::read_to_string(&path)?;
            shell.files.insert(format!("/{}", relative.display()), content);
        }
        Ok(shell)
    }

    /// Answer every command starting with `prefix` with `output`
    pub fn script(mut self, prefix: impl Into<String>, output: CommandOutput) -> Self {
        self.scripted.push((prefix.into(), output));
        self
    }

    /// Make `nginx -s reload` fail
    pub fn failing_reload(self) -> Self {
        self.script(
            "nginx -s reload",
            CommandOutput::from_exit(1, "", "nginx: [error] invalid PID number \"\" in \"/run/nginx.pid\""),
        )
    }

    /// Make every upload fail
    pub fn failing_uploads(mut self) -> Self {
        self.fail_uploads = true;
        self
    }

    pub fn file(&self, path: &str) -> Option<&str> {
        self.files.get(path).map(String::as_str)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &str)> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Commands and uploads seen so far, in order
    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn execute(&mut self, command: &str) -> CommandOutput {
        if let Some((_, output)) = self.scripted.iter().find(|(prefix, _)| command.starts_with(prefix.as_str())) {
            return output.clone();
        }

        let words = split_words(command);
        let args: Vec<&str> = words.iter().map(String::as_str).collect();
        match args.as_slice() {
            ["test", "-f", path] => {
                CommandOutput::from_exit(if self.files.contains_key(*path) { 0 } else { 1 }, "", "")
            }
            ["cat", path] => match self.files.get(*path) {
                Some(content) => CommandOutput::ok(content.clone()),
                None => CommandOutput::from_exit(1, "", format!("cat: {}: No such file or directory", path)),
            },
            ["find", dir, "-name", pattern, "-type", "f"] => self.find(dir, pattern),
            ["cp", from, to] => match self.files.get(*from).cloned() {
                Some(content) => {
                    self.files.insert(to.to_string(), content);
                    CommandOutput::ok("")
                }
                None => CommandOutput::from_exit(
                    1,
                    "",
                    format!("cp: cannot stat '{}': No such file or directory", from),
                ),
            },
            ["rm", "-f", path] => {
                self.files.remove(*path);
                CommandOutput::ok("")
            }
            ["mkdir", "-p", _] => CommandOutput::ok(""),
            [bin, "-t", "-c", main] if bin.ends_with("nginx") => self.syntax_check(main),
            [bin, "-s", "reload"] if bin.ends_with("nginx") => CommandOutput::ok(""),
            _ => CommandOutput::from_exit(NOT_FOUND, "", format!("sh: {}: command not found", command)),
        }
    }

    fn find(&self, dir: &str, pattern: &str) -> CommandOutput {
        let pattern = match Pattern::new(pattern) {
            Ok(p) => p,
            Err(e) => return CommandOutput::from_exit(1, "", format!("find: {}", e)),
        };
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let listed: Vec<&str> = self
            .files
            .keys()
            .filter(|path| path.starts_with(&prefix))
            .filter(|path| {
                Path::new(path.as_str())
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|name| pattern.matches(name))
            })
            .map(String::as_str)
            .collect();

        if listed.is_empty() && !self.files.keys().any(|p| p.starts_with(&prefix)) {
            return CommandOutput::from_exit(1, "", format!("find: '{}': No such file or directory", dir));
        }
        CommandOutput::ok(listed.iter().map(|p| format!("{}\n", p)).collect::<String>())
    }

    fn syntax_check(&self, main: &str) -> CommandOutput {
        if !self.files.contains_key(main) {
            return CommandOutput::from_exit(
                1,
                "",
                format!("nginx: [emerg] open() \"{}\" failed (2: No such file or directory)", main),
            );
        }
        for (path, content) in &self.files {
            if path != main && !path.ends_with(".conf") {
                continue;
            }
            if let Err(e) = NginxParser::parse_str(content, Path::new(path)) {
                return CommandOutput::from_exit(
                    1,
                    "",
                    format!("nginx: [emerg] {}\nnginx: configuration file {} test failed\n", e, main),
                );
            }
        }
        CommandOutput::from_exit(
            0,
            "",
            format!(
                "nginx: the configuration file {main} syntax is ok\nnginx: configuration file {main} test is successful\n"
            ),
        )
    }
}

impl RemoteShell for MemoryShell {
    fn run(&mut self, command: &str) -> CommandOutput {
        self.history.push(command.to_string());
        if self.closed {
            return CommandOutput::transport_failure("session closed");
        }
        self.execute(command)
    }

    fn upload(&mut self, content: &[u8], remote_path: &str) -> CommandOutput {
        self.history.push(format!("upload {}", remote_path));
        if self.closed {
            return CommandOutput::transport_failure("session closed");
        }
        if self.fail_uploads {
            return CommandOutput::transport_failure(format!("upload to {} failed: permission denied", remote_path));
        }
        self.files
            .insert(remote_path.to_string(), String::from_utf8_lossy(content).into_owned());
        CommandOutput::ok(format!("uploaded {} bytes to {}", content.len(), remote_path))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Split a command line on whitespace, honouring single quotes (including
/// the `'\''` idiom produced by `shell_quote`)
fn split_words(command: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                quoted = !quoted;
                in_word = true;
            }
            '\\' if !quoted => {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            c => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{shell_quote, NginxCommands};

    #[test]
    fn split_words_undoes_shell_quote() {
        let path = "/etc/nginx/it's here.conf";
        let words = split_words(&format!("cat {}", shell_quote(path)));
        assert_eq!(words, vec!["cat".to_string(), path.to_string()]);
    }

    #[test]
    fn find_lists_recursively_in_path_order() {
        let mut shell = MemoryShell::new()
            .with_file("/etc/nginx/conf.d/b.conf", "")
            .with_file("/etc/nginx/conf.d/a.conf", "")
            .with_file("/etc/nginx/conf.d/sub/c.conf", "")
            .with_file("/etc/nginx/conf.d/readme.txt", "")
            .with_file("/etc/nginx/conf.dx/d.conf", "");

        let files = shell.list_conf_files("/etc/nginx/conf.d").unwrap();
        assert_eq!(
            files,
            vec![
                "/etc/nginx/conf.d/a.conf",
                "/etc/nginx/conf.d/b.conf",
                "/etc/nginx/conf.d/sub/c.conf",
            ]
        );
        assert!(shell.list_conf_files("/missing").is_err());
    }

    #[test]
    fn syntax_check_parses_conf_files() {
        let mut shell = MemoryShell::new()
            .with_file("/etc/nginx/nginx.conf", "events {}\nhttp { include /etc/nginx/conf.d/*.conf; }")
            .with_file("/etc/nginx/conf.d/ok.conf", "server { listen 80; }");
        assert!(shell.check_syntax("nginx", "/etc/nginx/nginx.conf").success);

        shell.upload(b"server { listen 80 }", "/etc/nginx/conf.d/bad.conf");
        let result = shell.check_syntax("nginx", "/etc/nginx/nginx.conf");
        assert!(!result.success);
        assert!(result.error.contains("test failed"));
    }

    #[test]
    fn scripted_prefix_wins_over_builtins() {
        let mut shell = MemoryShell::new().failing_reload();
        assert!(!shell.reload("nginx").success);
        assert_eq!(shell.run("uname -a").exit_code, NOT_FOUND);
    }

    #[test]
    fn load_tree_roots_paths_at_slash() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("etc/nginx/conf.d")).unwrap();
        fs::write(dir.path().join("etc/nginx/nginx.conf"), "events {}").unwrap();
        fs::write(dir.path().join("etc/nginx/conf.d/a.conf"), "server {}").unwrap();

        let shell = MemoryShell::load_tree(dir.path()).unwrap();
        let paths: Vec<_> = shell.files().map(|(p, _)| p).collect();
        assert_eq!(paths, vec!["/etc/nginx/conf.d/a.conf", "/etc/nginx/nginx.conf"]);
        assert_eq!(shell.file("/etc/nginx/nginx.conf"), Some("events {}"));
    }

    #[test]
    fn file_exists_distinguishes_absent_from_unknown() {
        let mut shell = MemoryShell::new()
            .with_file("/etc/nginx/nginx.conf", "events {}")
            .script("test -f /etc/nginx/locked.conf", CommandOutput::from_exit(2, "", "test: permission denied"));

        assert_eq!(shell.file_exists("/etc/nginx/nginx.conf"), Ok(true));
        assert_eq!(shell.file_exists("/etc/nginx/missing.conf"), Ok(false));
        assert!(shell.file_exists("/etc/nginx/locked.conf").is_err());

        shell.close();
        let err = shell.file_exists("/etc/nginx/nginx.conf").unwrap_err();
        assert_eq!(err.exit_code, crate::remote::TRANSPORT_FAILURE);
    }

    #[test]
    fn closed_shell_rejects_commands() {
        let mut shell = MemoryShell::new().with_file("/a", "x");
        shell.close();
        shell.close();
        assert!(shell.is_closed());
        assert!(!shell.download("/a").success);
    }
}
