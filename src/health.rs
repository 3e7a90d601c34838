//! Remote nginx status probe

use crate::remote::{NginxCommands, RemoteShell};
use serde::Serialize;
use tracing::{debug, info};

const PROCESS_PROBE: &str = "ps aux | grep nginx | grep -v grep";
const LISTENERS_PROBE: &str = "ss -tlnp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub nginx_running: bool,
    pub port_80_open: bool,
    pub port_443_open: bool,
    pub service_active: bool,
    /// Raw `ps` lines for the nginx processes
    pub processes: Vec<String>,
    pub service_output: String,
}

/// Whether an `ss -tln` listing has a socket bound to `port`. Only the
/// local address column is read, so `:8080` never counts as `:80`.
fn listens_on(listing: &str, port: u16) -> bool {
    let port = port.to_string();
    listing
        .lines()
        .filter_map(|line| line.split_whitespace().nth(3))
        .filter_map(|local| local.rsplit_once(':'))
        .any(|(_, p)| p == port)
}

/// Probe a connected host. Healthy iff an nginx process is running.
pub fn probe<S: RemoteShell + ?Sized>(shell: &mut S) -> HealthReport {
    let processes = shell.run(PROCESS_PROBE);
    let processes: Vec<String> = if processes.success {
        processes
            .output
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect()
    } else {
        Vec::new()
    };
    let nginx_running = !processes.is_empty();

    let listeners = shell.run(LISTENERS_PROBE);
    debug!(exit_code = listeners.exit_code, "listening sockets");
    let listing = if listeners.success { listeners.output.as_str() } else { "" };
    let port_80_open = listens_on(listing, 80);
    let port_443_open = listens_on(listing, 443);

    let service = shell.service_status();
    let service_output = service.output.trim().to_string();
    let service_active = service_output.contains("active (running)");

    let status = if nginx_running {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    info!(status = %status, nginx_running, port_80_open, port_443_open, service_active, "health probe");

    HealthReport {
        status,
        nginx_running,
        port_80_open,
        port_443_open,
        service_active,
        processes,
        service_output,
    }
}
