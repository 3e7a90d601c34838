//! Host profiles
//!
//! Reads `hosts.toml`, by default from `<config_dir>/nginx-steward/`.

use crate::remote::SshCredentials;
use crate::workflow::WorkflowOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

const APP_DIR: &str = "nginx-steward";
const CONFIG_FILE: &str = "hosts.toml";
pub const DEFAULT_MAIN_CONFIG: &str = "/etc/nginx/nginx.conf";
pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid host profile: {0}")]
    Invalid(String),

    #[error("Unknown host: {0}")]
    UnknownHost(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub main_config: String,
    pub mirror_dir: Option<PathBuf>,
    pub nginx_binary: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            main_config: DEFAULT_MAIN_CONFIG.to_string(),
            mirror_dir: None,
            nginx_binary: "nginx".to_string(),
        }
    }
}

/// One managed host
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostProfile {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_passphrase: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_config: Option<String>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl HostProfile {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("name", &self.name), ("host", &self.host), ("username", &self.username)] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("host `{}` has an empty {}", self.name, field)));
            }
        }
        if self.password.is_none() && self.key_file.is_none() && self.key_content.is_none() {
            return Err(ConfigError::Invalid(format!(
                "host `{}` needs a password, key_file or key_content",
                self.name
            )));
        }
        Ok(())
    }

    pub fn credentials(&self) -> SshCredentials {
        SshCredentials {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            key_file: self.key_file.as_deref().map(expand_home),
            key_content: self.key_content.clone(),
            key_passphrase: self.key_passphrase.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StewardConfig {
    #[serde(default)]
    pub defaults: Defaults,
    #[serde(default)]
    pub hosts: Vec<HostProfile>,
}

impl StewardConfig {
    /// `<config_dir>/nginx-steward/hosts.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path`, or the default location if it exists, or an empty config
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::load(&path),
                None => Ok(Self::default()),
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for host in &self.hosts {
            host.validate()?;
            if !seen.insert(host.name.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate host name `{}`", host.name)));
            }
        }
        Ok(())
    }

    pub fn host(&self, name: &str) -> Result<&HostProfile, ConfigError> {
        self.hosts
            .iter()
            .find(|h| h.name == name)
            .ok_or_else(|| ConfigError::UnknownHost(name.to_string()))
    }

    /// Main config path for `host`, falling back to the defaults
    pub fn main_config_for<'a>(&'a self, host: &'a HostProfile) -> &'a str {
        host.main_config.as_deref().unwrap_or(&self.defaults.main_config)
    }

    /// Mirror directory, defaulting to `<cache_dir>/nginx-steward/mirror`
    pub fn mirror_dir(&self) -> PathBuf {
        self.defaults.mirror_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
                .join("mirror")
        })
    }

    pub fn workflow_options(&self, host: &HostProfile) -> WorkflowOptions {
        WorkflowOptions {
            host: host.host.clone(),
            main_config: self.main_config_for(host).to_string(),
            nginx_binary: self.defaults.nginx_binary.clone(),
        }
    }
}

/// `~/x` -> `<home>/x`
fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[defaults]
main_config = "/usr/local/nginx/conf/nginx.conf"
nginx_binary = "/usr/local/nginx/sbin/nginx"

[[hosts]]
name = "edge-1"
host = "10.0.0.5"
username = "root"
key_file = "/root/.ssh/id_ed25519"

[[hosts]]
name = "edge-2"
host = "10.0.0.6"
port = 2222
username = "deploy"
password = "secret"
main_config = "/etc/nginx/nginx.conf"
"#;

    #[test]
    fn parses_profiles_with_defaults() {
        let config: StewardConfig = toml::from_str(SAMPLE).unwrap();
        config.validate().unwrap();

        let edge1 = config.host("edge-1").unwrap();
        assert_eq!(edge1.port, DEFAULT_SSH_PORT);
        assert_eq!(config.main_config_for(edge1), "/usr/local/nginx/conf/nginx.conf");
        assert_eq!(edge1.credentials().auth_kind(), "key");

        let edge2 = config.host("edge-2").unwrap();
        assert_eq!(edge2.port, 2222);
        assert_eq!(config.main_config_for(edge2), DEFAULT_MAIN_CONFIG);
        assert_eq!(config.workflow_options(edge2).nginx_binary, "/usr/local/nginx/sbin/nginx");
        assert_eq!(config.workflow_options(edge2).host, "10.0.0.6");
    }

    #[test]
    fn empty_config_uses_builtin_defaults() {
        let config: StewardConfig = toml::from_str("").unwrap();
        assert_eq!(config.defaults, Defaults::default());
        assert!(config.hosts.is_empty());
    }

    #[test]
    fn host_without_credentials_is_rejected() {
        let host = HostProfile {
            name: "bare".to_string(),
            host: "10.0.0.7".to_string(),
            port: DEFAULT_SSH_PORT,
            username: "root".to_string(),
            ..Default::default()
        };
        assert!(matches!(host.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("password")));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut config: StewardConfig = toml::from_str(SAMPLE).unwrap();
        let mut dup = config.hosts[0].clone();
        dup.host = "10.0.0.9".to_string();
        config.hosts.push(dup);
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn unknown_host_is_an_error() {
        let config = StewardConfig::default();
        assert!(matches!(config.host("nope"), Err(ConfigError::UnknownHost(_))));
    }

    #[test]
    fn load_reports_file_and_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.toml");
        assert!(matches!(StewardConfig::load(&path), Err(ConfigError::Read { .. })));

        fs::write(&path, "[[hosts]]\nname = 1\n").unwrap();
        assert!(matches!(StewardConfig::load(&path), Err(ConfigError::Parse { .. })));

        fs::write(&path, SAMPLE).unwrap();
        assert_eq!(StewardConfig::load(&path).unwrap().hosts.len(), 2);
    }
}
