//! Terminal rendering for phase reports and status queries.

use console::{style, Style};
use indicatif::{ProgressBar, ProgressStyle};
use std::fmt::Display;
use std::time::Duration;
use stevedore_core::{HostOutcome, PhaseReport, PhaseStatus};
use stevedore_deploy::{ClientStatus, Snapshot, StatusReport};

/// Spinner shown while a phase runs; hidden when stderr is not a terminal
pub fn spinner(msg: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(msg.into());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// One-word label for a host outcome
pub fn outcome_label(outcome: &HostOutcome) -> &'static str {
    match outcome {
        HostOutcome::Success => "ok",
        HostOutcome::Warning(_) => "warning",
        HostOutcome::Failed(_) => "failed",
    }
}

/// Detail column for a host outcome
pub fn outcome_detail(outcome: &HostOutcome) -> String {
    match outcome {
        HostOutcome::Success => String::new(),
        HostOutcome::Warning(warnings) => warnings
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
        HostOutcome::Failed(err) => err.to_string(),
    }
}

/// Health label for a client
pub fn client_label(status: &ClientStatus) -> &'static str {
    match (status.mounted, status.responsive) {
        (true, true) => "healthy",
        (true, false) => "unresponsive",
        (false, true) => "unmounted",
        (false, false) => "down",
    }
}

fn outcome_style(outcome: &HostOutcome) -> Style {
    match outcome {
        HostOutcome::Success => Style::new().green(),
        HostOutcome::Warning(_) => Style::new().yellow(),
        HostOutcome::Failed(_) => Style::new().red().bold(),
    }
}

fn status_style(status: PhaseStatus) -> Style {
    match status {
        PhaseStatus::Complete => Style::new().green().bold(),
        PhaseStatus::Degraded => Style::new().yellow().bold(),
        PhaseStatus::Failed => Style::new().red().bold(),
    }
}

fn width<'a>(names: impl Iterator<Item = &'a str>) -> usize {
    names.map(str::len).max().unwrap_or(0).max(4)
}

/// Print a key-value pair
pub fn print_kv(key: &str, value: impl Display) {
    println!("{}: {}", Style::new().cyan().bold().apply_to(key), value);
}

/// Print a per-host outcome table followed by the aggregate status
pub fn print_report(report: &PhaseReport) {
    let w = width(report.hosts.keys().map(|h| h.as_str()));
    println!(
        "{} {} ({})",
        style(report.phase).bold().underlined(),
        report.deployment,
        style(&report.run_id).dim()
    );
    for (host, outcome) in &report.hosts {
        let label = outcome_style(outcome).apply_to(format!("{:<8}", outcome_label(outcome)));
        println!("  {:<w$}  {label}  {}", host.as_str(), outcome_detail(outcome));
    }
    let status = report.status();
    println!(
        "{} {}/{} hosts succeeded",
        status_style(status).apply_to(status),
        report.succeeded_count(),
        report.hosts.len()
    );
}

/// Print client and server health
pub fn print_status(status: &StatusReport) {
    print_kv("deployment", &status.deployment);
    print_kv("lifecycle", status.lifecycle);
    print_kv("fingerprint", &status.fingerprint);

    let w = width(
        status
            .clients
            .keys()
            .chain(status.servers.keys())
            .map(|h| h.as_str()),
    );
    println!("{}", style("clients").bold().underlined());
    for (host, client) in &status.clients {
        let label = format!("{:<12}", client_label(client));
        let label = if client.healthy() {
            style(label).green()
        } else {
            style(label).red()
        };
        println!("  {:<w$}  {label}  {}", host.as_str(), client.detail.as_deref().unwrap_or(""));
    }
    println!("{}", style("servers").bold().underlined());
    for (host, up) in &status.servers {
        let label = if *up {
            style("running").green()
        } else {
            style("stopped").red()
        };
        println!("  {:<w$}  {label}", host.as_str());
    }
}

/// Print the persisted deployment record
pub fn print_snapshot(snapshot: &Snapshot) {
    let deployment = &snapshot.deployment;
    let partition = &deployment.partition;
    print_kv("deployment", &deployment.name);
    print_kv("lifecycle", snapshot.lifecycle.state);
    if let Some(phase) = snapshot.lifecycle.last_phase {
        print_kv("last phase", phase);
    }
    print_kv("updated", snapshot.lifecycle.updated_at.to_rfc3339());
    print_kv("configured", deployment.configured_at.to_rfc3339());
    print_kv("fingerprint", &deployment.fingerprint);
    print_kv("protocol", deployment.config.protocol);
    print_kv("metadata", partition.metadata_hosts.join(", "));
    print_kv("data", partition.data_hosts.join(", "));
    print_kv("clients", partition.client_hosts.join(", "));
    print_kv("config", deployment.config.paths.config_file.display());
    print_kv("mount", deployment.config.paths.mount_point.display());
    println!("{}", style("routes").bold().underlined());
    for route in &deployment.routes {
        println!("  {} -> {}", route.client, route.endpoint);
    }
}

/// Success message
pub fn success(msg: impl Display) {
    println!("{} {}", style("✓").green().bold(), msg);
}

/// Warning message
pub fn warning(msg: impl Display) {
    eprintln!("{} {}", style("⚠").yellow().bold(), msg);
}
