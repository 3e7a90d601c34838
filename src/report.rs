//! Plain-text rendering for the CLI

use crate::analyzer::{AnalysisResult, StructureWarning};
use crate::health::HealthReport;
use crate::workflow::Outcome;

pub fn render_analysis(result: &AnalysisResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("Main config: {}\n", result.main_config));
    out.push_str(&format!("PID file: {}\n", result.pid_file.as_deref().unwrap_or("(none)")));
    out.push_str(&format!(
        "Files: {} fetched, {} scanned, {} skipped\n",
        result.config_files.len(),
        result.scanned_files,
        result.skipped_files.len()
    ));
    for path in &result.skipped_files {
        out.push_str(&format!("  skipped {}\n", path));
    }

    out.push_str(&format!("\nVirtual hosts ({}):\n", result.virtual_hosts.len()));
    for (name, host) in result.virtual_hosts.iter() {
        out.push_str(&format!("  {} ({})\n", name, host.file_path));
        for (pattern, target) in &host.location_to_upstream {
            out.push_str(&format!("    {} -> {}\n", pattern, target));
        }
    }

    out.push_str(&format!("\nUpstreams ({}):\n", result.upstreams.len()));
    for (name, upstream) in result.upstreams.iter() {
        out.push_str(&format!("  {} ({})\n", name, upstream.file_path));
        for server in &upstream.backend_servers {
            if server.args.is_empty() {
                out.push_str(&format!("    {}\n", server.address));
            } else {
                out.push_str(&format!("    {} {}\n", server.address, server.args.join(" ")));
            }
        }
    }

    out.push_str(&format!("\nBackend servers ({}):\n", result.backend_servers.len()));
    for (address, backend) in result.backend_servers.iter() {
        out.push_str(&format!("  {} [{}] upstream={}\n", address, backend.status, backend.upstream));
    }

    if !result.warnings.is_empty() {
        out.push_str(&render_warnings(&result.warnings));
    }
    out
}

pub fn render_warnings(warnings: &[StructureWarning]) -> String {
    let mut out = String::new();
    out.push_str(&format!("\nWarnings ({}):\n", warnings.len()));
    for warning in warnings {
        out.push_str(&format!("  - {}\n", warning));
    }
    out
}

pub fn render_outcome(outcome: &Outcome) -> String {
    let trace: Vec<String> = outcome.trace.iter().map(ToString::to_string).collect();
    format!("{} {}\ntrace: {}\n", outcome.status_code, outcome.message, trace.join(" -> "))
}

pub fn render_health(host: &str, report: &HealthReport) -> String {
    let yes_no = |b: bool| if b { "yes" } else { "no" };
    let mut out = String::new();
    out.push_str(&format!("{}: {}\n", host, report.status));
    out.push_str(&format!("  nginx running:  {}\n", yes_no(report.nginx_running)));
    out.push_str(&format!("  port 80 open:   {}\n", yes_no(report.port_80_open)));
    out.push_str(&format!("  port 443 open:  {}\n", yes_no(report.port_443_open)));
    out.push_str(&format!("  service active: {}\n", yes_no(report.service_active)));
    out
}
