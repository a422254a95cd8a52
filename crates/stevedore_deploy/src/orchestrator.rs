//! Lifecycle orchestration.
//!
//! Every phase follows the same shape: check the lifecycle, issue one batch
//! of commands per role group in parallel, fold per-host results into a
//! [`PhaseReport`], then persist the new lifecycle state. Phases never
//! regenerate topology; they read the [`DeploymentState`] configure saved.

use crate::lifecycle::{LifecycleState, Operation};
use crate::readiness::{Probe, ReadinessPolicy};
use crate::state::{DeploymentState, LifecycleRecord, StateStore};
use backon::{ConstantBuilder, Retryable};
use chrono::Utc;
use futures::future::join_all;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stevedore_config::{generate, ClusterConfig, ClusterParams, RouteEntry};
use stevedore_core::{
    Command, DeployError, DeployResult, HostId, HostOutcome, HostSet, HostSource, PartitionSpec,
    Phase, PhaseReport, PhaseStatus, ResolvePolicy, Resolver, RolePartition, SystemResolver,
};
use stevedore_remote::{CommandOutput, RemoteCommandRunner, TransportError};
use tracing::{debug, info, warn};

/// Everything configure needs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureRequest {
    /// Host pool
    pub hosts: HostSource,
    /// Role sizes
    #[serde(default)]
    pub partition: PartitionSpec,
    /// Cluster parameters
    pub cluster: ClusterParams,
    /// Behaviour on name resolution failure
    #[serde(default)]
    pub resolve: ResolvePolicy,
}

/// Orchestrator tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorOptions {
    /// Readiness polling after server start
    pub readiness: ReadinessPolicy,
    /// Treat verification failures as host failures instead of warnings
    pub strict_verification: bool,
    /// Extra attempts for kernel module insertion
    pub module_retries: usize,
    /// Pause before retrying module insertion, in milliseconds
    pub module_retry_delay_ms: u64,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            readiness: ReadinessPolicy::default(),
            strict_verification: false,
            module_retries: 1,
            module_retry_delay_ms: 1_000,
        }
    }
}

impl OrchestratorOptions {
    /// Set readiness policy
    #[must_use]
    pub fn with_readiness(mut self, readiness: ReadinessPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Set strict verification
    #[must_use]
    pub fn with_strict_verification(mut self, strict: bool) -> Self {
        self.strict_verification = strict;
        self
    }

    /// Set module insertion retries
    #[must_use]
    pub fn with_module_retries(mut self, retries: usize) -> Self {
        self.module_retries = retries;
        self
    }

    /// Set module retry pause
    #[must_use]
    pub fn with_module_retry_delay(mut self, delay: Duration) -> Self {
        self.module_retry_delay_ms = delay.as_millis() as u64;
        self
    }
}

/// Health of one client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientStatus {
    /// Mount point is mounted
    pub mounted: bool,
    /// Filesystem answered a ping
    pub responsive: bool,
    /// Why the client is not healthy
    pub detail: Option<String>,
}

impl ClientStatus {
    fn unreachable(reason: String) -> Self {
        Self {
            mounted: false,
            responsive: false,
            detail: Some(reason),
        }
    }

    /// Mounted and responsive
    #[must_use]
    pub fn healthy(&self) -> bool {
        self.mounted && self.responsive
    }
}

/// Result of a status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Deployment name
    pub deployment: String,
    /// Persisted lifecycle state
    pub lifecycle: LifecycleState,
    /// Config fingerprint
    pub fingerprint: String,
    /// Per-client health, in client order
    pub clients: IndexMap<HostId, ClientStatus>,
    /// Whether a server process is running, per server host
    pub servers: IndexMap<HostId, bool>,
}

impl StatusReport {
    /// Every client is mounted and responsive and every server is running
    #[must_use]
    pub fn healthy(&self) -> bool {
        self.clients.values().all(ClientStatus::healthy) && self.servers.values().all(|up| *up)
    }
}

/// Persisted view of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// What configure decided
    pub deployment: DeploymentState,
    /// Where the lifecycle is
    pub lifecycle: LifecycleRecord,
}

/// Drives one named deployment through its lifecycle
///
/// The orchestrator holds no topology of its own. Configure writes a
/// [`DeploymentState`]; every other operation loads it.
pub struct Orchestrator {
    name: String,
    store: StateStore,
    runner: Arc<dyn RemoteCommandRunner>,
    resolver: Arc<dyn Resolver>,
    options: OrchestratorOptions,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("name", &self.name)
            .field("store", &self.store)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Create an orchestrator for deployment `name`
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `name` is not a valid deployment name.
    pub fn new(
        name: impl Into<String>,
        store: StateStore,
        runner: Arc<dyn RemoteCommandRunner>,
    ) -> DeployResult<Self> {
        let name = name.into();
        StateStore::validate_name(&name)?;
        Ok(Self {
            name,
            store,
            runner,
            resolver: Arc::new(SystemResolver),
            options: OrchestratorOptions::default(),
        })
    }

    /// Set the host name resolver
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Set tuning options
    #[must_use]
    pub fn with_options(mut self, options: OrchestratorOptions) -> Self {
        self.options = options;
        self
    }

    /// Deployment name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Partition hosts, generate and distribute the config, write mount tables
    ///
    /// Everything that can fail without touching a host (host parsing,
    /// partitioning, generation, name resolution) happens before the first
    /// remote command. The deployment record is saved as `Uninitialized`
    /// before remote work starts and promoted to `Configured` at the end.
    ///
    /// # Errors
    ///
    /// Returns configuration errors unchanged, `RemoteCommandFailure` if a
    /// directory cannot be created, `LocalCommandFailure` if the config file
    /// cannot be generated and `ConfigDistributionFailure` if any server
    /// misses the config.
    pub async fn configure(&self, request: &ConfigureRequest) -> DeployResult<PhaseReport> {
        let current = self.store.load_lifecycle(&self.name)?;
        current.state.check(Operation::Configure)?;

        let mut report = PhaseReport::new(&self.name, Phase::Configure);
        info!(deployment = %self.name, run_id = %report.run_id, "configuring deployment");

        let pool = HostSet::load(&request.hosts)?;
        let partition = RolePartition::derive(&pool, &request.partition)?;
        let config = generate(&partition, &request.cluster)?;
        let routes = self.build_routes(&partition, &config, request.resolve)?;
        let fingerprint = config.fingerprint()?;
        info!(
            deployment = %self.name,
            metadata = %partition.metadata_hosts.join(","),
            data = partition.data_hosts.len(),
            clients = partition.client_hosts.len(),
            fingerprint = %fingerprint,
            "partition derived"
        );

        let state = DeploymentState {
            name: self.name.clone(),
            partition,
            config,
            fingerprint,
            routes,
            configured_at: Utc::now(),
        };
        self.store.save_deployment(&state)?;
        self.transition(LifecycleState::Uninitialized, &report)?;

        self.create_directories(&state).await?;
        self.distribute_config(&state).await?;
        for host in &state.partition.server_hosts() {
            report.record_success(host);
        }
        self.write_mount_tables(&state, &mut report).await;

        self.transition(LifecycleState::Configured, &report)?;
        info!(deployment = %self.name, status = %report.status(), "configure finished");
        Ok(report)
    }

    /// Start servers, verify readiness and mount clients
    ///
    /// # Errors
    ///
    /// Returns `InvalidLifecycleTransition` unless the deployment is
    /// `Configured` or `Stopped`, and `AllHostsFailed` if no server started.
    pub async fn start(&self) -> DeployResult<PhaseReport> {
        let (state, _) = self.load(Operation::Start)?;
        self.run_start(&state).await
    }

    /// Unmount clients and kill servers
    ///
    /// Cleanup commands are expected to fail when there is nothing to clean
    /// up; only unreachable hosts are recorded as failures.
    ///
    /// # Errors
    ///
    /// Returns `InvalidLifecycleTransition` from `Uninitialized`, and
    /// `AllHostsFailed` if no host could be reached.
    pub async fn stop(&self) -> DeployResult<PhaseReport> {
        let (state, _) = self.load(Operation::Stop)?;
        self.run_stop(&state).await
    }

    /// Remove storage, mount points and mount tables
    ///
    /// # Errors
    ///
    /// Returns `InvalidLifecycleTransition` unless the deployment is
    /// `Stopped` or `Uninitialized`, and `AllHostsFailed` if nothing could
    /// be removed.
    pub async fn clean(&self) -> DeployResult<PhaseReport> {
        let (state, _) = self.load(Operation::Clean)?;
        let mut report = PhaseReport::new(&self.name, Phase::Clean);
        info!(deployment = %self.name, run_id = %report.run_id, "cleaning deployment");

        let jobs: Vec<(HostId, Command)> = state
            .partition
            .all_hosts()
            .iter()
            .map(|host| {
                let targets = clean_targets(&state, host);
                (host.clone(), Command::new("rm").arg("-rf").args(targets))
            })
            .collect();
        for (host, result) in self.run_each(&jobs).await {
            match require_success(Phase::Clean, &host, result) {
                Ok(_) => report.record_success(&host),
                Err(err) => self.record_failure(&mut report, &host, err),
            }
        }

        if report.status() == PhaseStatus::Failed {
            return Err(DeployError::AllHostsFailed { phase: Phase::Clean });
        }
        self.transition(LifecycleState::Uninitialized, &report)?;
        Ok(report)
    }

    /// Query client mounts, filesystem responsiveness and server processes
    ///
    /// Read-only: nothing persisted is touched.
    ///
    /// # Errors
    ///
    /// Returns `DeploymentNotFound` if the deployment was never configured.
    pub async fn status(&self) -> DeployResult<StatusReport> {
        let (state, lifecycle) = self.load(Operation::Status)?;
        let config = &state.config;
        let probe = Probe::client(config);
        let mounted = Command::new("mountpoint")
            .arg("-q")
            .arg_path(&config.paths.mount_point);
        let once = ReadinessPolicy::once();

        let checks = state.partition.client_hosts.iter().map(|host| {
            let (probe, mounted) = (&probe, &mounted);
            async move {
                let status = match self.runner.run_one(host, mounted).await {
                    Err(err) => ClientStatus::unreachable(err.to_string()),
                    Ok(output) => {
                        let ping = probe.wait(self.runner.as_ref(), host, &once).await;
                        let unmounted = (!output.success()).then(|| {
                            format!(
                                "{} not mounted ({})",
                                config.paths.mount_point.display(),
                                output.describe()
                            )
                        });
                        let detail = match (unmounted, ping.as_ref().err()) {
                            (Some(mount), Some(reason)) => Some(format!("{mount}; ping: {reason}")),
                            (Some(mount), None) => Some(mount),
                            (None, reason) => reason.cloned(),
                        };
                        ClientStatus {
                            mounted: output.success(),
                            responsive: ping.is_ok(),
                            detail,
                        }
                    }
                };
                (host.clone(), status)
            }
        });
        let clients: IndexMap<HostId, ClientStatus> = join_all(checks).await.into_iter().collect();

        let servers = self
            .runner
            .run_many(&state.partition.server_hosts(), &Probe::server().command)
            .await
            .into_iter()
            .map(|(host, result)| (host, result.is_ok_and(|out| out.success())))
            .collect();

        Ok(StatusReport {
            deployment: self.name.clone(),
            lifecycle: lifecycle.state,
            fingerprint: state.fingerprint,
            clients,
            servers,
        })
    }

    /// Stop then start against the same deployment record
    ///
    /// # Errors
    ///
    /// Returns `InvalidLifecycleTransition` unless the deployment is
    /// `Running`, `Stopped` or `Configured`, and any error stop or start
    /// returns.
    pub async fn restart(&self) -> DeployResult<PhaseReport> {
        let (state, _) = self.load(Operation::Restart)?;
        let mut report = PhaseReport::new(&self.name, Phase::Restart);
        info!(deployment = %self.name, run_id = %report.run_id, "restarting deployment");
        report.absorb(self.run_stop(&state).await?);
        report.absorb(self.run_start(&state).await?);
        Ok(report)
    }

    /// Persisted deployment and lifecycle records, without contacting hosts
    ///
    /// # Errors
    ///
    /// Returns `DeploymentNotFound` if the deployment was never configured.
    pub fn show(&self) -> DeployResult<Snapshot> {
        Ok(Snapshot {
            deployment: self.store.load_deployment(&self.name)?,
            lifecycle: self.store.load_lifecycle(&self.name)?,
        })
    }

    fn load(&self, op: Operation) -> DeployResult<(DeploymentState, LifecycleRecord)> {
        let state = self.store.load_deployment(&self.name)?;
        let lifecycle = self.store.load_lifecycle(&self.name)?;
        lifecycle.state.check(op)?;
        Ok((state, lifecycle))
    }

    fn transition(&self, next: LifecycleState, report: &PhaseReport) -> DeployResult<()> {
        let record = LifecycleRecord::new(next, report.phase, report.run_id.clone());
        self.store.save_lifecycle(&self.name, &record)?;
        debug!(deployment = %self.name, state = %next, phase = %report.phase, "lifecycle updated");
        Ok(())
    }

    fn record_failure(&self, report: &mut PhaseReport, host: &HostId, err: DeployError) {
        warn!(deployment = %self.name, phase = %report.phase, host = %host, error = %err, "host failed");
        report.record_error(host, err);
    }

    fn build_routes(
        &self,
        partition: &RolePartition,
        config: &ClusterConfig,
        policy: ResolvePolicy,
    ) -> DeployResult<Vec<RouteEntry>> {
        partition
            .routes()
            .assign(&partition.client_hosts)?
            .into_iter()
            .map(|(client, metadata)| {
                let address = match partition
                    .metadata_hosts
                    .resolve_ip(metadata, self.resolver.as_ref())
                {
                    Ok(ip) => ip.to_string(),
                    Err(err) if policy == ResolvePolicy::Tolerant => {
                        warn!(host = %metadata, error = %err, "using host name in mount table");
                        metadata.to_string()
                    }
                    Err(err) => return Err(err),
                };
                Ok(RouteEntry::new(client.clone(), metadata.clone(), &address, config))
            })
            .collect()
    }

    async fn run_each(
        &self,
        jobs: &[(HostId, Command)],
    ) -> Vec<(HostId, Result<CommandOutput, TransportError>)> {
        let runs = jobs.iter().map(|(host, command)| async move {
            debug!(host = %host, command = %command, "dispatching");
            (host.clone(), self.runner.run_one(host, command).await)
        });
        join_all(runs).await
    }

    async fn create_directories(&self, state: &DeploymentState) -> DeployResult<()> {
        let partition = &state.partition;
        let paths = &state.config.paths;
        let jobs: Vec<(HostId, Command)> = partition
            .all_hosts()
            .iter()
            .map(|host| {
                let mut mkdir = Command::new("mkdir").arg("-p").arg_path(&paths.private_dir);
                if partition.client_hosts.contains(host) {
                    mkdir = mkdir.arg_path(&paths.mount_point);
                }
                if partition.data_hosts.contains(host) {
                    mkdir = mkdir.arg_path(&paths.data_dir);
                }
                if partition.metadata_hosts.contains(host) {
                    mkdir = mkdir.arg_path(&paths.metadata_dir);
                }
                (host.clone(), mkdir)
            })
            .collect();

        for (host, result) in self.run_each(&jobs).await {
            require_success(Phase::Configure, &host, result)?;
        }
        Ok(())
    }

    async fn distribute_config(&self, state: &DeploymentState) -> DeployResult<()> {
        let paths = &state.config.paths;
        let local = [
            Command::new("mkdir").arg("-p").arg_path(&paths.private_dir),
            Command::new("rm").arg("-f").arg_path(&paths.config_file),
            state.config.materialize.clone(),
        ];
        for command in &local {
            let output = self
                .runner
                .run_local(command)
                .await
                .map_err(|err| DeployError::LocalCommandFailure {
                    command: command.to_string(),
                    reason: err.to_string(),
                })?;
            if !output.success() {
                return Err(DeployError::LocalCommandFailure {
                    command: command.to_string(),
                    reason: output.describe(),
                });
            }
        }

        let servers = state.partition.server_hosts();
        let copies = self
            .runner
            .copy_to(&servers, &paths.config_file, &paths.config_file)
            .await;
        for (host, result) in copies {
            if let Err(err) = result {
                return Err(DeployError::ConfigDistributionFailure {
                    host,
                    reason: err.to_string(),
                });
            }
        }
        info!(deployment = %self.name, servers = servers.len(), "config distributed");
        Ok(())
    }

    async fn write_mount_tables(&self, state: &DeploymentState, report: &mut PhaseReport) {
        let jobs: Vec<(HostId, Command)> = state
            .routes
            .iter()
            .map(|route| (route.client.clone(), route.write_command(&state.config)))
            .collect();
        for (host, result) in self.run_each(&jobs).await {
            match require_success(Phase::Configure, &host, result) {
                Ok(_) => report.record_success(&host),
                Err(err) => self.record_failure(report, &host, err),
            }
        }
    }

    async fn run_start(&self, state: &DeploymentState) -> DeployResult<PhaseReport> {
        let mut report = PhaseReport::new(&self.name, Phase::Start);
        info!(deployment = %self.name, run_id = %report.run_id, "starting deployment");
        let config = &state.config;

        let servers = state.partition.server_hosts();
        let launches = servers.iter().cloned().map(|host| async move {
            let server = config.binaries.server();
            let sequence = [
                Command::new(server.clone())
                    .arg_path(&config.paths.config_file)
                    .arg("-f")
                    .arg("-a")
                    .arg(host.as_str()),
                Command::new(server)
                    .arg_path(&config.paths.config_file)
                    .arg("-a")
                    .arg(host.as_str()),
            ];
            let outcome = self.runner.run_sequence(&host, &sequence).await;
            (host, outcome)
        });
        let mut started = Vec::new();
        for (host, outcome) in join_all(launches).await {
            match outcome.failure_reason() {
                None => {
                    report.record_success(&host);
                    started.push(host);
                }
                Some(reason) => {
                    let err = DeployError::RemoteCommandFailure {
                        host: host.clone(),
                        phase: Phase::Start,
                        reason,
                    };
                    self.record_failure(&mut report, &host, err);
                }
            }
        }
        if started.is_empty() {
            self.transition(LifecycleState::Failed, &report)?;
            return Err(DeployError::AllHostsFailed { phase: Phase::Start });
        }
        info!(deployment = %self.name, started = started.len(), "servers started");

        self.verify(&started, &Probe::server(), &mut report).await;
        let clients: Vec<HostId> = state.partition.client_hosts.iter().cloned().collect();
        self.verify(&clients, &Probe::client(config), &mut report).await;

        let mounts = state.routes.iter().map(|route| async move {
            (route.client.clone(), self.start_client(config, route).await)
        });
        for (host, result) in join_all(mounts).await {
            match result {
                Ok(()) => report.record_success(&host),
                Err(err) => self.record_failure(&mut report, &host, err),
            }
        }

        self.transition(LifecycleState::Running, &report)?;
        info!(deployment = %self.name, status = %report.status(), "start finished");
        Ok(report)
    }

    async fn verify(&self, hosts: &[HostId], probe: &Probe, report: &mut PhaseReport) {
        let policy = self.options.readiness;
        let checks = hosts.iter().map(|host| async move {
            (host, probe.wait(self.runner.as_ref(), host, &policy).await)
        });
        for (host, result) in join_all(checks).await {
            let Err(reason) = result else { continue };
            warn!(deployment = %self.name, host = %host, reason = %reason, "verification failed");
            let err = DeployError::VerificationFailure {
                host: host.clone(),
                reason,
            };
            if self.options.strict_verification {
                report.record(host, HostOutcome::Failed(err));
            } else {
                report.record_error(host, err);
            }
        }
    }

    async fn start_client(&self, config: &ClusterConfig, route: &RouteEntry) -> DeployResult<()> {
        let host = &route.client;

        let modprobe = Command::new("modprobe")
            .arg(config.binaries.module())
            .privileged();
        let backoff = ConstantBuilder::default()
            .with_delay(Duration::from_millis(self.options.module_retry_delay_ms))
            .with_max_times(self.options.module_retries);
        let modprobe = &modprobe;
        let insert = move || async move {
            let result = self.runner.run_one(host, modprobe).await;
            require_success(Phase::Start, host, result)
        };
        insert
            .retry(backoff)
            .notify(|err: &DeployError, _| debug!(host = %host, error = %err, "retrying module insertion"))
            .await?;

        let client = Command::new(config.binaries.client())
            .arg("-p")
            .arg(config.binaries.client_core())
            .privileged();
        require_success(Phase::Start, host, self.runner.run_one(host, &client).await)?;

        let mount = Command::new("mount")
            .arg("-t")
            .arg("pvfs2")
            .arg(route.endpoint.clone())
            .arg_path(&config.paths.mount_point)
            .privileged();
        require_success(Phase::Start, host, self.runner.run_one(host, &mount).await)?;
        Ok(())
    }

    async fn run_stop(&self, state: &DeploymentState) -> DeployResult<PhaseReport> {
        let mut report = PhaseReport::new(&self.name, Phase::Stop);
        info!(deployment = %self.name, run_id = %report.run_id, "stopping deployment");
        let mount = &state.config.paths.mount_point;

        let client_teardown = [
            Command::new("umount").arg("-l").arg_path(mount).privileged(),
            Command::new("umount").arg("-f").arg_path(mount).privileged(),
            Command::new("umount").arg_path(mount).privileged(),
            Command::new("killall").arg("-9").arg("pvfs2-client").privileged(),
            Command::new("killall").arg("-9").arg("pvfs2-client-core").privileged(),
            Command::new("rmmod")
                .arg(state.config.binaries.module())
                .privileged(),
        ];
        let teardowns = state.partition.client_hosts.iter().map(|host| {
            let commands = &client_teardown;
            async move {
                let mut result = Ok(());
                for command in commands {
                    if let Err(err) = self.runner.run_one(host, command).await {
                        result = Err(err);
                        break;
                    }
                }
                (host.clone(), result)
            }
        });
        for (host, result) in join_all(teardowns).await {
            self.record_reachability(&mut report, &host, result);
        }

        let servers = state.partition.server_hosts();
        let kill = Command::new("killall").arg("-9").arg("pvfs2-server");
        for (host, result) in self.runner.run_many(&servers, &kill).await {
            self.record_reachability(&mut report, &host, result.map(|_| ()));
        }

        let check = Command::new("pgrep").arg("-la").arg("pvfs2-server");
        let exits = servers.iter().map(|host| {
            let check = &check;
            async move { (host, self.await_exit(host, check).await) }
        });
        for (host, result) in join_all(exits).await {
            match result {
                Ok(()) => {}
                Err(ServerExit::Lingering(detail)) => {
                    let err = DeployError::LingeringProcess {
                        host: host.clone(),
                        detail,
                    };
                    self.record_failure(&mut report, host, err);
                }
                Err(ServerExit::Unreachable(err)) => {
                    self.record_reachability(&mut report, host, Err(err))
                }
            }
        }

        if report.status() == PhaseStatus::Failed {
            self.transition(LifecycleState::Failed, &report)?;
            return Err(DeployError::AllHostsFailed { phase: Phase::Stop });
        }
        self.transition(LifecycleState::Stopped, &report)?;
        info!(deployment = %self.name, status = %report.status(), "stop finished");
        Ok(report)
    }

    /// Poll `check` until it lists no server process on `host`
    async fn await_exit(&self, host: &HostId, check: &Command) -> Result<(), ServerExit> {
        let poll = move || async move {
            let output = self
                .runner
                .run_one(host, check)
                .await
                .map_err(ServerExit::Unreachable)?;
            let listed = output.stdout.trim();
            if listed.is_empty() {
                Ok::<(), ServerExit>(())
            } else {
                Err(ServerExit::Lingering(listed.to_string()))
            }
        };
        poll.retry(self.options.readiness.backoff())
            .when(|exit: &ServerExit| matches!(exit, ServerExit::Lingering(_)))
            .notify(|_, delay: Duration| {
                debug!(host = %host, delay_ms = delay.as_millis() as u64, "server still exiting");
            })
            .await
    }

    fn record_reachability(
        &self,
        report: &mut PhaseReport,
        host: &HostId,
        result: Result<(), TransportError>,
    ) {
        match result {
            Ok(()) => report.record_success(host),
            Err(err) => {
                let err = DeployError::RemoteCommandFailure {
                    host: host.clone(),
                    phase: report.phase,
                    reason: err.to_string(),
                };
                self.record_failure(report, host, err);
            }
        }
    }
}

enum ServerExit {
    Lingering(String),
    Unreachable(TransportError),
}

fn require_success(
    phase: Phase,
    host: &HostId,
    result: Result<CommandOutput, TransportError>,
) -> DeployResult<CommandOutput> {
    match result {
        Ok(output) if output.success() => Ok(output),
        Ok(output) => Err(DeployError::RemoteCommandFailure {
            host: host.clone(),
            phase,
            reason: output.describe(),
        }),
        Err(err) => Err(DeployError::RemoteCommandFailure {
            host: host.clone(),
            phase,
            reason: err.to_string(),
        }),
    }
}

/// Paths removed from `host` by clean, according to its roles
fn clean_targets(state: &DeploymentState, host: &HostId) -> Vec<String> {
    let partition = &state.partition;
    let paths = &state.config.paths;
    let mut targets = Vec::new();
    if partition.client_hosts.contains(host) {
        targets.push(&paths.mount_point);
        targets.push(&paths.mount_table);
    }
    if partition.data_hosts.contains(host) {
        targets.push(&paths.data_dir);
    }
    if partition.metadata_hosts.contains(host) {
        targets.push(&paths.metadata_dir);
    }
    if partition.data_hosts.contains(host) || partition.metadata_hosts.contains(host) {
        targets.push(&paths.log_file);
    }
    targets
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}
