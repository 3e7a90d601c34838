//! Directive parsing: structured parser plus regex salvage path

pub mod fallback;
pub mod nginx;

pub use fallback::FallbackParser;
pub use nginx::{Directive, NginxParser};

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Directive names that make a degraded file still worth scanning
pub const DIRECTIVES_OF_INTEREST: &[&str] =
    &["server", "upstream", "location", "proxy_pass", "http", "events"];

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at {file}:{line}: {message}")]
    Syntax {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Invalid salvage pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Parse status of one configuration file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStatus {
    /// Structured parser accepted the file
    Ok,
    /// Structured parser rejected the file, or the download failed
    Error,
    /// Structure recovered by the regex salvage parser
    ManualOk,
    /// Never parsed on purpose (e.g. `mime.types`)
    Skipped,
    #[default]
    Unknown,
}

impl ParseStatus {
    /// Statuses whose files are dropped from scanning unless they still
    /// carry a directive of interest
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Error | Self::Skipped)
    }
}

impl std::fmt::Display for ParseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
            Self::ManualOk => write!(f, "manual_ok"),
            Self::Skipped => write!(f, "skipped"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// One file of the structured parser's output
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub file: String,
    pub status: ParseStatus,
    pub parsed: Vec<Directive>,
}

/// Structured parser output, in crossplane's shape:
/// `{status, errors, config: [{file, status, parsed}]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseReport {
    pub status: ParseStatus,
    pub errors: Vec<String>,
    pub config: Vec<ReportEntry>,
}

impl ParseReport {
    /// Report describing a single file
    pub fn single(path: &Path, status: ParseStatus, parsed: Vec<Directive>, errors: Vec<String>) -> Self {
        Self {
            status,
            errors,
            config: vec![ReportEntry {
                file: path.display().to_string(),
                status,
                parsed,
            }],
        }
    }
}

/// Seam for the structured parser. Input is a local file path; any
/// substitute integration must produce the same report shape.
pub trait ConfigParser: Send + Sync {
    fn parse(&self, path: &Path) -> ParseReport;
}

/// One configuration file discovered during a fetch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParsedFile {
    /// Remote path
    pub path: String,
    pub status: ParseStatus,
    pub directives: Vec<Directive>,
    #[serde(skip)]
    pub raw_text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ParsedFile {
    pub fn skipped(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ParseStatus::Skipped,
            ..Default::default()
        }
    }

    pub fn failed(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: ParseStatus::Error,
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    /// Whether any top-level directive is one the analyzer cares about
    pub fn has_directives_of_interest(&self) -> bool {
        self.directives
            .iter()
            .any(|d| DIRECTIVES_OF_INTEREST.contains(&d.name.as_str()))
    }

    /// Whether the analyzer should walk this file
    pub fn is_scannable(&self) -> bool {
        !(self.status.is_degraded() && !self.has_directives_of_interest())
    }
}

/// Parse a mirrored file, falling back to regex salvage when the structured
/// parser does not report `ok` and the mirror looks like it holds server or
/// upstream blocks.
pub fn parse_with_fallback(
    parser: &dyn ConfigParser,
    remote_path: &str,
    local_path: &Path,
    raw_text: String,
) -> ParsedFile {
    let report = parser.parse(local_path);
    let (status, directives) = match report.config.into_iter().next() {
        Some(entry) => (entry.status, entry.parsed),
        None => (report.status, Vec::new()),
    };

    let mut file = ParsedFile {
        path: remote_path.to_string(),
        status,
        directives,
        raw_text,
        errors: report.errors,
    };

    if file.status == ParseStatus::Ok {
        return file;
    }

    warn!(path = %remote_path, status = %file.status, errors = ?file.errors, "structured parse degraded");
    file.directives.clear();

    let mirrored = match fs::read_to_string(local_path) {
        Ok(content) => content,
        Err(e) => {
            info!(path = %remote_path, local = %local_path.display(), error = %e, "no local mirror, fallback not attempted");
            return file;
        }
    };
    if !(mirrored.contains("server {") || mirrored.contains("upstream ")) {
        debug!(path = %remote_path, "mirror has no server/upstream blocks, fallback not attempted");
        return file;
    }

    info!(path = %remote_path, "attempting regex fallback parse");
    match FallbackParser::new().map(|p| p.salvage(&mirrored)) {
        Ok(directives) if !directives.is_empty() => {
            info!(path = %remote_path, count = directives.len(), status = %ParseStatus::ManualOk, "fallback parse recovered directives");
            file.status = ParseStatus::ManualOk;
            file.directives = directives;
        }
        Ok(_) => warn!(path = %remote_path, "fallback parse recovered nothing"),
        Err(e) => warn!(path = %remote_path, error = %e, "fallback parse failed"),
    }

    file
}
