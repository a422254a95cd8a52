//! STEVEDORE CLI
//!
//! Configure, start, stop and clean a parallel filesystem across a host pool.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod output;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{bail, WrapErr};
use color_eyre::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stevedore_core::{HostSource, PhaseReport};
use stevedore_deploy::{ConfigureRequest, Orchestrator, OrchestratorOptions, Snapshot, StateStore};
use stevedore_remote::{SshConfig, SshRunner};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stevedore")]
#[command(about = "STEVEDORE - parallel filesystem deployment orchestrator", long_about = None)]
struct Cli {
    /// Directory holding deployment records
    #[arg(long, global = true, default_value = ".stevedore")]
    state_dir: PathBuf,

    /// Deployment name
    #[arg(short = 'n', long = "deployment", global = true, default_value = "default")]
    deployment: String,

    /// Remote login user
    #[arg(long, global = true)]
    ssh_user: Option<String>,

    /// Extra `ssh -o` option, repeatable
    #[arg(long = "ssh-option", global = true)]
    ssh_options: Vec<String>,

    /// Per-command timeout in seconds
    #[arg(long, global = true, default_value_t = 60)]
    timeout_secs: u64,

    /// Concurrent remote processes
    #[arg(long, global = true, default_value_t = 32)]
    max_parallel: usize,

    /// Treat failed verification as host failure
    #[arg(long, global = true)]
    strict_verification: bool,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Partition hosts, generate and distribute the cluster config
    Configure {
        /// Deployment file (JSON)
        #[arg(short, long)]
        file: PathBuf,
        /// Comma-separated hosts, overriding the file's host list
        #[arg(long, value_delimiter = ',', conflicts_with = "hostfile")]
        hosts: Vec<String>,
        /// Host file, overriding the file's host list
        #[arg(long)]
        hostfile: Option<PathBuf>,
    },
    /// Start servers and mount clients
    Start,
    /// Unmount clients and kill servers
    Stop,
    /// Remove storage, mount points and mount tables
    Clean,
    /// Report client and server health
    Status,
    /// Stop then start
    Restart,
    /// Show the persisted deployment record
    Show,
    /// List deployments in the state directory
    List,
}

fn init_tracing(verbose: u8, json: bool) {
    let default = match verbose {
        0 => "stevedore=info",
        1 => "stevedore=debug",
        _ => "stevedore=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_request(
    file: &Path,
    hosts: Vec<String>,
    hostfile: Option<PathBuf>,
) -> Result<ConfigureRequest> {
    let raw = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("reading deployment file {}", file.display()))?;
    let mut request: ConfigureRequest = serde_json::from_str(&raw)
        .wrap_err_with(|| format!("parsing deployment file {}", file.display()))?;
    if !hosts.is_empty() {
        request.hosts = HostSource::List(hosts);
    } else if let Some(path) = hostfile {
        request.hosts = HostSource::File(path);
    }
    Ok(request)
}

/// Print a phase report and fail if any host failed
fn finish(report: PhaseReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_report(&report);
    }
    report.into_result()?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let store = StateStore::new(&cli.state_dir);
    if let Commands::List = cli.command {
        for name in store.list()? {
            println!("{name}");
        }
        return Ok(());
    }

    let mut ssh = SshConfig::default()
        .with_timeout(Duration::from_secs(cli.timeout_secs))
        .with_max_parallel(cli.max_parallel);
    if let Some(user) = cli.ssh_user {
        ssh = ssh.with_user(user);
    }
    for option in cli.ssh_options {
        ssh = ssh.with_option(option);
    }
    let orchestrator = Orchestrator::new(&cli.deployment, store, Arc::new(SshRunner::new(ssh)))?
        .with_options(OrchestratorOptions::default().with_strict_verification(cli.strict_verification));

    let json = cli.json;
    match cli.command {
        Commands::Configure {
            file,
            hosts,
            hostfile,
        } => {
            let request = load_request(&file, hosts, hostfile)?;
            let spinner = output::spinner(format!("configuring {}", cli.deployment));
            let report = orchestrator.configure(&request).await;
            spinner.finish_and_clear();
            finish(report?, json)
        }
        Commands::Start => {
            let spinner = output::spinner(format!("starting {}", cli.deployment));
            let report = orchestrator.start().await;
            spinner.finish_and_clear();
            finish(report?, json)
        }
        Commands::Stop => {
            let spinner = output::spinner(format!("stopping {}", cli.deployment));
            let report = orchestrator.stop().await;
            spinner.finish_and_clear();
            finish(report?, json)
        }
        Commands::Clean => {
            let spinner = output::spinner(format!("cleaning {}", cli.deployment));
            let report = orchestrator.clean().await;
            spinner.finish_and_clear();
            finish(report?, json)
        }
        Commands::Restart => {
            let spinner = output::spinner(format!("restarting {}", cli.deployment));
            let report = orchestrator.restart().await;
            spinner.finish_and_clear();
            finish(report?, json)
        }
        Commands::Status => {
            let spinner = output::spinner(format!("checking {}", cli.deployment));
            let status = orchestrator.status().await;
            spinner.finish_and_clear();
            let status = status?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                output::print_status(&status);
            }
            if !status.healthy() {
                bail!("deployment {} is not healthy", cli.deployment);
            }
            output::success("all clients mounted and all servers running");
            Ok(())
        }
        Commands::Show => {
            let snapshot = orchestrator.show()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&snapshot)?);
            } else {
                output::print_snapshot(&snapshot);
            }
            if !routes_cover_clients(&snapshot) {
                output::warning("mount table routes do not cover every client");
            }
            Ok(())
        }
        Commands::List => Ok(()),
    }
}

/// Every client has exactly one route
fn routes_cover_clients(snapshot: &Snapshot) -> bool {
    let deployment = &snapshot.deployment;
    deployment.routes.len() == deployment.partition.client_hosts.len()
        && deployment
            .routes
            .iter()
            .all(|r| deployment.partition.client_hosts.contains(&r.client))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "stevedore",
            "start",
            "-n",
            "prod",
            "--ssh-option",
            "Port=2222",
            "-vv",
        ])
        .unwrap();
        assert_eq!(cli.deployment, "prod");
        assert_eq!(cli.ssh_options, vec!["Port=2222"]);
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.command, Commands::Start));
    }

    #[test]
    fn test_hosts_conflict_with_hostfile() {
        let result = Cli::try_parse_from([
            "stevedore", "configure", "-f", "d.json", "--hosts", "a,b", "--hostfile", "hosts",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_load_request_overrides_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("deploy.json");
        std::fs::write(
            &file,
            r#"{"hosts": ["x1"], "cluster": {"storage_root": "/mnt/nvme", "private_dir": "/tmp/ofs"}}"#,
        )
        .unwrap();

        let request = load_request(&file, vec!["h1".into(), "h2".into()], None).unwrap();
        assert_eq!(request.hosts, HostSource::List(vec!["h1".into(), "h2".into()]));

        let request = load_request(&file, Vec::new(), Some(PathBuf::from("/etc/hosts.txt"))).unwrap();
        assert_eq!(request.hosts, HostSource::File(PathBuf::from("/etc/hosts.txt")));

        let request = load_request(&file, Vec::new(), None).unwrap();
        assert_eq!(request.hosts, HostSource::List(vec!["x1".into()]));
    }

    #[test]
    fn test_load_request_reports_path() {
        let err = load_request(Path::new("/nonexistent/deploy.json"), Vec::new(), None).unwrap_err();
        assert!(format!("{err:?}").contains("/nonexistent/deploy.json"));
    }
}
