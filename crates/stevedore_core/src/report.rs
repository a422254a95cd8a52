//! Per-host phase outcomes.

use crate::error::DeployError;
use crate::host::HostId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Partition, generate and distribute
    Configure,
    /// Start servers, verify, mount clients
    Start,
    /// Unmount clients and kill servers
    Stop,
    /// Remove storage and mount directories
    Clean,
    /// Read-only health query
    Status,
    /// Stop followed by start
    Restart,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Configure => "configure",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Clean => "clean",
            Self::Status => "status",
            Self::Restart => "restart",
        };
        f.write_str(name)
    }
}

/// What happened on one host during a phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum HostOutcome {
    /// Every step succeeded
    Success,
    /// Steps ran but raised non-fatal problems
    Warning(Vec<DeployError>),
    /// A step failed
    Failed(DeployError),
}

impl HostOutcome {
    /// Whether the host failed
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Whether the host succeeded without warnings
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Combine two outcomes for the same host; the worse one wins and
    /// warnings accumulate
    #[must_use]
    pub fn merge(self, other: HostOutcome) -> HostOutcome {
        match (self, other) {
            (failed @ Self::Failed(_), _) => failed,
            (_, failed @ Self::Failed(_)) => failed,
            (Self::Warning(mut a), Self::Warning(b)) => {
                a.extend(b);
                Self::Warning(a)
            }
            (warning @ Self::Warning(_), Self::Success)
            | (Self::Success, warning @ Self::Warning(_)) => warning,
            (Self::Success, Self::Success) => Self::Success,
        }
    }
}

impl From<DeployError> for HostOutcome {
    fn from(err: DeployError) -> Self {
        if err.is_fatal() {
            Self::Failed(err)
        } else {
            Self::Warning(vec![err])
        }
    }
}

/// Aggregate status of a phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    /// Every host succeeded
    Complete,
    /// Some hosts failed or warned; the rest succeeded
    Degraded,
    /// Every host failed
    Failed,
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Complete => "complete",
            Self::Degraded => "degraded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-host outcome table for one phase run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseReport {
    /// Run identifier, for correlating logs
    pub run_id: String,
    /// Deployment name
    pub deployment: String,
    /// Phase that ran
    pub phase: Phase,
    /// Outcomes in the order hosts were first recorded
    pub hosts: IndexMap<HostId, HostOutcome>,
}

impl PhaseReport {
    /// Create an empty report
    #[must_use]
    pub fn new(deployment: impl Into<String>, phase: Phase) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            deployment: deployment.into(),
            phase,
            hosts: IndexMap::new(),
        }
    }

    /// Record an outcome, merging with anything already recorded for `host`
    pub fn record(&mut self, host: &HostId, outcome: HostOutcome) {
        match self.hosts.get_mut(host) {
            Some(existing) => {
                let previous = std::mem::replace(existing, HostOutcome::Success);
                *existing = previous.merge(outcome);
            }
            None => {
                self.hosts.insert(host.clone(), outcome);
            }
        }
    }

    /// Record success for `host`
    pub fn record_success(&mut self, host: &HostId) {
        self.record(host, HostOutcome::Success);
    }

    /// Record an error for `host`; non-fatal errors become warnings
    pub fn record_error(&mut self, host: &HostId, err: DeployError) {
        self.record(host, err.into());
    }

    /// Outcome for `host`
    #[must_use]
    pub fn outcome(&self, host: &HostId) -> Option<&HostOutcome> {
        self.hosts.get(host)
    }

    /// Hosts that failed
    #[must_use]
    pub fn failed_hosts(&self) -> Vec<HostId> {
        self.hosts
            .iter()
            .filter(|(_, o)| o.is_failed())
            .map(|(h, _)| h.clone())
            .collect()
    }

    /// Number of hosts that succeeded, with or without warnings
    #[must_use]
    pub fn succeeded_count(&self) -> usize {
        self.hosts.values().filter(|o| !o.is_failed()).count()
    }

    /// Aggregate status
    #[must_use]
    pub fn status(&self) -> PhaseStatus {
        if self.hosts.is_empty() || self.hosts.values().all(HostOutcome::is_success) {
            PhaseStatus::Complete
        } else if self.hosts.values().all(HostOutcome::is_failed) {
            PhaseStatus::Failed
        } else {
            PhaseStatus::Degraded
        }
    }

    /// Fold another report's outcomes into this one
    pub fn absorb(&mut self, other: PhaseReport) {
        for (host, outcome) in other.hosts {
            self.record(&host, outcome);
        }
    }

    /// Convert into an error if any host failed
    ///
    /// # Errors
    ///
    /// Returns `AllHostsFailed` if nothing succeeded, `PartialClusterFailure`
    /// if some hosts failed.
    pub fn into_result(self) -> Result<PhaseReport, DeployError> {
        match self.status() {
            PhaseStatus::Failed => Err(DeployError::AllHostsFailed { phase: self.phase }),
            _ => {
                let failed = self.failed_hosts();
                if failed.is_empty() {
                    Ok(self)
                } else {
                    Err(DeployError::PartialClusterFailure {
                        phase: self.phase,
                        failed,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(name: &str) -> HostId {
        HostId::parse(name).unwrap()
    }

    fn failure(name: &str) -> DeployError {
        DeployError::RemoteCommandFailure {
            host: host(name),
            phase: Phase::Start,
            reason: "unreachable".to_string(),
        }
    }

    fn warning(name: &str) -> DeployError {
        DeployError::VerificationFailure {
            host: host(name),
            reason: "no reply".to_string(),
        }
    }

    #[test]
    fn test_merge_worst_wins() {
        let merged = HostOutcome::Success.merge(HostOutcome::Failed(failure("a")));
        assert!(merged.is_failed());

        let merged = HostOutcome::Warning(vec![warning("a")])
            .merge(HostOutcome::Warning(vec![warning("a")]));
        assert_eq!(merged, HostOutcome::Warning(vec![warning("a"), warning("a")]));

        let merged = HostOutcome::Failed(failure("a")).merge(HostOutcome::Success);
        assert!(merged.is_failed());
    }

    #[test]
    fn test_status_complete() {
        let mut report = PhaseReport::new("ofs", Phase::Start);
        report.record_success(&host("a"));
        report.record_success(&host("b"));
        assert_eq!(report.status(), PhaseStatus::Complete);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_status_degraded_with_warning_only() {
        let mut report = PhaseReport::new("ofs", Phase::Start);
        report.record_success(&host("a"));
        report.record_error(&host("b"), warning("b"));
        assert_eq!(report.status(), PhaseStatus::Degraded);
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn test_status_partial_failure() {
        let mut report = PhaseReport::new("ofs", Phase::Start);
        for name in ["a", "b", "c"] {
            report.record_success(&host(name));
        }
        report.record_error(&host("d"), failure("d"));
        assert_eq!(report.status(), PhaseStatus::Degraded);
        assert_eq!(report.succeeded_count(), 3);
        assert_eq!(
            report.into_result().unwrap_err(),
            DeployError::PartialClusterFailure {
                phase: Phase::Start,
                failed: vec![host("d")],
            }
        );
    }

    #[test]
    fn test_status_all_failed() {
        let mut report = PhaseReport::new("ofs", Phase::Stop);
        report.record_error(&host("a"), failure("a"));
        assert_eq!(report.status(), PhaseStatus::Failed);
        assert!(matches!(
            report.into_result(),
            Err(DeployError::AllHostsFailed { phase: Phase::Stop })
        ));
    }

    #[test]
    fn test_record_keeps_first_seen_order() {
        let mut report = PhaseReport::new("ofs", Phase::Clean);
        report.record_success(&host("z"));
        report.record_success(&host("a"));
        report.record_error(&host("z"), warning("z"));
        let order: Vec<&str> = report.hosts.keys().map(HostId::as_str).collect();
        assert_eq!(order, vec!["z", "a"]);
        assert!(matches!(report.outcome(&host("z")), Some(HostOutcome::Warning(_))));
    }

    #[test]
    fn test_absorb() {
        let mut first = PhaseReport::new("ofs", Phase::Restart);
        first.record_success(&host("a"));
        let mut second = PhaseReport::new("ofs", Phase::Start);
        second.record_error(&host("a"), failure("a"));
        first.absorb(second);
        assert!(first.outcome(&host("a")).unwrap().is_failed());
    }
}
