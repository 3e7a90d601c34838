//! Semantic analysis over the fetched directive trees
//!
//! Produces the virtual-host, upstream and backend-server registries. Names
//! of virtual hosts and upstreams are first-wins; backend addresses are
//! last-wins. Both policies are spelled out in [`registry::MergePolicy`].

pub mod registry;

pub use registry::{Merge, MergePolicy, Registry};

use crate::fetch::MIME_TYPES;
use crate::parsers::{Directive, ParseStatus, ParsedFile};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, trace, warn};

/// An nginx `server` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualHost {
    pub name: String,
    pub file_path: String,
    /// Location key -> proxy target with its scheme stripped. The key is the
    /// location's arguments joined with one space, so `location ~ \.php$`
    /// is stored as `~ \.php$`.
    pub location_to_upstream: BTreeMap<String, String>,
    pub proxy_targets: Vec<String>,
}

/// One `server` entry inside an upstream block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpstreamServer {
    pub address: String,
    pub args: Vec<String>,
}

/// An nginx `upstream` block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Upstream {
    pub name: String,
    pub file_path: String,
    pub backend_servers: Vec<UpstreamServer>,
}

/// Operational state of a backend, from its `server` arguments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Up,
    Down,
    Backup,
}

impl BackendStatus {
    /// `down` wins over `backup`; anything else is `up`
    pub fn from_args(args: &[String]) -> Self {
        if args.iter().any(|a| a == "down") {
            Self::Down
        } else if args.iter().any(|a| a == "backup") {
            Self::Backup
        } else {
            Self::Up
        }
    }
}

impl std::fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
            Self::Backup => write!(f, "backup"),
        }
    }
}

/// A backend address, keyed flat across all upstreams
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendServer {
    pub address: String,
    pub file_path: String,
    pub upstream: String,
    pub status: BackendStatus,
    pub args: Vec<String>,
}

/// Structural problems found in the configuration layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StructureWarning {
    /// `server`/`upstream` declared directly under `http`/`stream` in the main file
    BlockInMainFile {
        context: String,
        directive: String,
        line: usize,
    },
    /// A fetched file outside the main configuration directory
    OutsideMainDir { path: String, main_dir: String },
}

impl std::fmt::Display for StructureWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockInMainFile { context, directive, line } => write!(
                f,
                "`{}` block at line {} sits directly in the main file's `{}` block; move it to an included file",
                directive, line, context
            ),
            Self::OutsideMainDir { path, main_dir } => {
                write!(f, "{} is outside the main configuration directory {}", path, main_dir)
            }
        }
    }
}

/// Everything one analysis run found
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub main_config: String,
    pub virtual_hosts: Registry<VirtualHost>,
    pub upstreams: Registry<Upstream>,
    pub backend_servers: Registry<BackendServer>,
    /// Every fetched file, in discovery order (`mime.types` excluded)
    pub config_files: Vec<String>,
    pub pid_file: Option<String>,
    pub warnings: Vec<StructureWarning>,
    pub scanned_files: usize,
    pub skipped_files: Vec<String>,
}

/// Registries threaded through the directive walk
struct Accumulator {
    virtual_hosts: Registry<VirtualHost>,
    upstreams: Registry<Upstream>,
    backend_servers: Registry<BackendServer>,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            virtual_hosts: Registry::keep_first(),
            upstreams: Registry::keep_first(),
            backend_servers: Registry::overwrite(),
        }
    }

    fn walk(&mut self, directives: &[Directive], file_path: &str, depth: usize) {
        for directive in directives {
            trace!(file = file_path, directive = %directive.name, line = directive.line, depth, "visit");

            let descend = match directive.name.as_str() {
                "upstream" if directive.is_block() => self.upstream(directive, file_path),
                "server" if directive.is_block() => self.virtual_host(directive, file_path),
                _ => true,
            };

            if descend && !directive.children().is_empty() {
                self.walk(directive.children(), file_path, depth + 1);
            }
        }
    }

    /// Returns whether the block should be descended into
    fn upstream(&mut self, directive: &Directive, file_path: &str) -> bool {
        let name = directive.args.concat();
        if self.upstreams.contains(&name) {
            warn!(file = file_path, directive = "upstream", name = %name, line = directive.line, "duplicate upstream name, block skipped");
            return false;
        }

        let mut upstream = Upstream {
            name: name.clone(),
            file_path: file_path.to_string(),
            backend_servers: Vec::new(),
        };

        for entry in directive.find_all_directives("server") {
            let Some((address, args)) = entry.args.split_first() else {
                continue;
            };
            upstream.backend_servers.push(UpstreamServer {
                address: address.clone(),
                args: args.to_vec(),
            });

            let backend = BackendServer {
                address: address.clone(),
                file_path: file_path.to_string(),
                upstream: name.clone(),
                status: BackendStatus::from_args(args),
                args: args.to_vec(),
            };
            match self.backend_servers.insert(address.clone(), backend) {
                Merge::Replaced => {
                    warn!(file = file_path, address = %address, upstream = %name, "backend address seen before, later declaration wins")
                }
                _ => debug!(file = file_path, address = %address, upstream = %name, "backend server"),
            }
        }

        info!(file = file_path, name = %name, backends = upstream.backend_servers.len(), "upstream");
        self.upstreams.insert(name, upstream);
        true
    }

    /// Returns whether the block should be descended into
    fn virtual_host(&mut self, directive: &Directive, file_path: &str) -> bool {
        let declared = directive
            .find_directive("server_name")
            .map(|d| d.args.join(","))
            .filter(|name| !name.is_empty());
        let synthesized = declared.is_none();
        let name = declared.unwrap_or_else(|| format!("server_{}", self.virtual_hosts.len()));

        if self.virtual_hosts.contains(&name) {
            warn!(file = file_path, directive = "server", name = %name, synthesized, line = directive.line, "duplicate virtual host name, block skipped");
            return true;
        }

        let mut host = VirtualHost {
            name: name.clone(),
            file_path: file_path.to_string(),
            location_to_upstream: BTreeMap::new(),
            proxy_targets: Vec::new(),
        };

        for location in directive.find_all_directives("location") {
            let pattern = location.args.join(" ");
            let Some(proxy_pass) = location.find_directive("proxy_pass") else {
                continue;
            };
            if proxy_pass.args.is_empty() {
                continue;
            }
            let target = strip_scheme(&proxy_pass.args.concat()).to_string();
            debug!(file = file_path, host = %name, location = %pattern, target = %target, "proxy_pass");
            host.proxy_targets.push(target.clone());
            host.location_to_upstream.insert(pattern, target);
        }

        info!(file = file_path, name = %name, synthesized, locations = host.location_to_upstream.len(), "virtual host");
        self.virtual_hosts.insert(name, host);
        true
    }
}

/// `http://backend/api` -> `backend/api`
pub fn strip_scheme(target: &str) -> &str {
    target.split_once("://").map_or(target, |(_, rest)| rest)
}

/// `server`/`upstream` directly inside the main file's `http`/`stream` blocks
pub fn check_main_file(main: &ParsedFile) -> Vec<StructureWarning> {
    let mut warnings = Vec::new();
    for context in main.directives.iter().filter(|d| d.name == "http" || d.name == "stream") {
        for child in context.children() {
            if child.name == "server" || child.name == "upstream" {
                warnings.push(StructureWarning::BlockInMainFile {
                    context: context.name.clone(),
                    directive: child.name.clone(),
                    line: child.line,
                });
            }
        }
    }
    warnings
}

/// Fetched files that do not live under the main file's directory
pub fn check_paths_under_main_dir(main_config: &str, files: &[String]) -> Vec<StructureWarning> {
    let main_dir = Path::new(main_config).parent().unwrap_or_else(|| Path::new("/"));
    files
        .iter()
        .filter(|path| !Path::new(path.as_str()).starts_with(main_dir))
        .map(|path| StructureWarning::OutsideMainDir {
            path: path.clone(),
            main_dir: main_dir.display().to_string(),
        })
        .collect()
}

/// Every structural warning for a finished analysis: the main-file layout
/// check plus files living outside the main configuration directory
pub fn validate_structure(result: &AnalysisResult) -> Vec<StructureWarning> {
    let mut warnings = result.warnings.clone();
    warnings.extend(check_paths_under_main_dir(&result.main_config, &result.config_files));
    warnings
}

/// Analyze every fetched file. Structural problems are reported as
/// warnings; analysis always runs to completion.
pub fn analyze(main_config: &str, files: &[ParsedFile]) -> AnalysisResult {
    info!(main = main_config, files = files.len(), "analysis started");

    let main = files.iter().find(|f| f.path == main_config);
    let warnings = main.map(check_main_file).unwrap_or_default();
    for warning in &warnings {
        warn!(main = main_config, "{}; continuing in degraded mode", warning);
    }

    let pid_file = main.and_then(|f| {
        f.directives
            .iter()
            .find(|d| d.name == "pid")
            .and_then(|d| d.first_arg())
            .map(String::from)
    });

    let mut acc = Accumulator::new();
    let mut scanned_files = 0;
    let mut skipped_files = Vec::new();

    for file in files {
        if file.path.contains(MIME_TYPES) {
            debug!(path = %file.path, "mime types file not scanned");
            continue;
        }
        if !file.is_scannable() {
            info!(path = %file.path, status = %file.status, "file excluded from scanning");
            skipped_files.push(file.path.clone());
            continue;
        }
        if file.status == ParseStatus::ManualOk {
            info!(path = %file.path, status = %file.status, "scanning fallback-derived directives");
        }
        scanned_files += 1;
        acc.walk(&file.directives, &file.path, 0);
    }

    info!(
        scanned = scanned_files,
        virtual_hosts = acc.virtual_hosts.len(),
        upstreams = acc.upstreams.len(),
        backends = acc.backend_servers.len(),
        "analysis complete"
    );

    if acc.virtual_hosts.is_empty() && acc.upstreams.is_empty() {
        warn!(main = main_config, "no virtual hosts or upstreams found");
        for file in files {
            warn!(path = %file.path, status = %file.status, directives = file.directives.len(), "file summary");
        }
    }

    AnalysisResult {
        main_config: main_config.to_string(),
        virtual_hosts: acc.virtual_hosts,
        upstreams: acc.upstreams,
        backend_servers: acc.backend_servers,
        config_files: files
            .iter()
            .filter(|f| !f.path.contains(MIME_TYPES))
            .map(|f| f.path.clone())
            .collect(),
        pid_file,
        warnings,
        scanned_files,
        skipped_files,
    }
}
