//! Remote include walk
//!
//! Starting at the main configuration file, download each file, mirror it
//! locally, parse it, then follow `include <dir>/*.conf` directives found
//! inside the `http { }` block by listing `<dir>` on the remote host. Every
//! remote path is visited at most once, compared after normalization.

use crate::parsers::fallback::block_end;
use crate::parsers::{parse_with_fallback, ConfigParser, NginxParser, ParsedFile};
use crate::remote::{NginxCommands, RemoteShell};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Files never downloaded, parsed or scanned
pub const MIME_TYPES: &str = "mime.types";

const DIRECTORY_INCLUDE_SUFFIX: &str = "*.conf";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to prepare mirror directory {path}: {source}")]
    Mirror {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid include pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Walks the include graph of one host
pub struct ConfigFetcher<'a, S: RemoteShell + ?Sized> {
    shell: &'a mut S,
    parser: Box<dyn ConfigParser>,
    mirror_dir: PathBuf,
    visited: HashSet<String>,
    http_open: Regex,
    include: Regex,
}

impl<'a, S: RemoteShell + ?Sized> ConfigFetcher<'a, S> {
    pub fn new(shell: &'a mut S, mirror_dir: impl Into<PathBuf>) -> Result<Self, FetchError> {
        let mirror_dir = mirror_dir.into();
        fs::create_dir_all(&mirror_dir).map_err(|source| FetchError::Mirror {
            path: mirror_dir.clone(),
            source,
        })?;

        Ok(Self {
            shell,
            parser: Box::new(NginxParser::new()),
            mirror_dir,
            visited: HashSet::new(),
            http_open: Regex::new(r"\bhttp\s*\{")?,
            include: Regex::new(r"\binclude\s+([^;\n]+);")?,
        })
    }

    /// Substitute the structured parser
    pub fn with_parser(mut self, parser: Box<dyn ConfigParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Local copy location for a remote path
    pub fn mirror_path(&self, remote_path: &str) -> PathBuf {
        self.mirror_dir.join(remote_path.trim_start_matches('/'))
    }

    /// Fetch `main_path` and everything reachable from it, in discovery order
    pub fn fetch(&mut self, main_path: &str) -> Vec<ParsedFile> {
        let mut files = Vec::new();
        self.visit(main_path, &mut files);
        info!(main = main_path, files = files.len(), "fetch complete");
        files
    }

    fn visit(&mut self, path: &str, files: &mut Vec<ParsedFile>) {
        let path = normalize(path);
        let path = path.as_str();
        if !self.visited.insert(path.to_string()) {
            debug!(path, "already visited");
            return;
        }

        if path.contains(MIME_TYPES) {
            info!(path, "skipping mime types file");
            files.push(ParsedFile::skipped(path));
            return;
        }

        let download = self.shell.download(path);
        if !download.success {
            warn!(path, exit_code = download.exit_code, error = download.diagnostic(), "download failed");
            files.push(ParsedFile::failed(path, format!("download failed: {}", download.diagnostic())));
            return;
        }
        let raw_text = download.output;

        let include_dirs = self.include_dirs(path, &raw_text);

        // a stale mirror from an earlier run must not be parsed in place of this one
        let local = self.mirror_path(path);
        match self.write_mirror(&local, &raw_text) {
            Ok(()) => {
                let parsed = parse_with_fallback(self.parser.as_ref(), path, &local, raw_text);
                info!(path, status = %parsed.status, directives = parsed.directives.len(), "parsed");
                files.push(parsed);
            }
            Err(e) => {
                warn!(path, local = %local.display(), error = %e, "could not mirror file, not parsed");
                let mut failed = ParsedFile::failed(path, format!("could not mirror to {}: {}", local.display(), e));
                failed.raw_text = raw_text;
                files.push(failed);
            }
        }

        for dir in include_dirs {
            let listed = match self.shell.list_conf_files(&dir) {
                Ok(listed) => listed,
                Err(result) => {
                    warn!(path, dir = %dir, error = result.diagnostic(), "listing include directory failed");
                    continue;
                }
            };
            debug!(dir = %dir, count = listed.len(), "listed include directory");
            for file in listed.iter().map(|f| normalize(f)) {
                if self.visited.contains(&file) {
                    debug!(path = %file, "already visited");
                    continue;
                }
                self.visit(&file, files);
            }
        }
    }

    fn write_mirror(&self, local: &Path, content: &str) -> std::io::Result<()> {
        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(local, content)
    }

    /// Directories named by `include <dir>/*.conf` inside the `http` block.
    /// Relative directories resolve against the including file's directory.
    fn include_dirs(&self, path: &str, raw_text: &str) -> Vec<String> {
        let text = strip_comments(raw_text);
        let mut dirs: Vec<String> = Vec::new();

        let mut cursor = 0;
        for open in self.http_open.find_iter(&text) {
            if open.start() < cursor {
                continue;
            }
            let end = block_end(&text, open.end());
            cursor = end;

            for caps in self.include.captures_iter(&text[open.end()..end]) {
                let Some(arg) = caps.get(1) else { continue };
                let pattern = arg.as_str().trim().trim_matches(|c| c == '"' || c == '\'');

                if pattern.contains(MIME_TYPES) {
                    continue;
                }
                let Some(dir) = pattern.strip_suffix(DIRECTORY_INCLUDE_SUFFIX) else {
                    debug!(path, include = pattern, "include pattern not followed");
                    continue;
                };
                let dir = dir.trim_end_matches('/');
                let dir = if dir.starts_with('/') {
                    normalize(dir)
                } else {
                    let base = Path::new(path).parent().unwrap_or_else(|| Path::new("/"));
                    normalize(&base.join(dir).display().to_string())
                };
                if dir.is_empty() || dir == "/" {
                    continue;
                }
                if !dirs.contains(&dir) {
                    debug!(path, dir = %dir, "include directory");
                    dirs.push(dir);
                }
            }
        }

        dirs
    }
}

/// Lexical path cleanup: `.` and empty segments dropped, `..` pops
fn normalize(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    let joined = parts.join("/");
    if path.starts_with('/') {
        format!("/{}", joined)
    } else {
        joined
    }
}

/// Drop `#` comments, leaving quoted text alone
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        let mut quote: Option<char> = None;
        let mut end = line.len();
        for (idx, c) in line.char_indices() {
            match (quote, c) {
                (None, '#') => {
                    end = idx;
                    break;
                }
                (None, '"' | '\'') => quote = Some(c),
                (Some(q), c) if c == q => quote = None,
                _ => {}
            }
        }
        out.push_str(&line[..end]);
        out.push('\n');
    }
    out
}
