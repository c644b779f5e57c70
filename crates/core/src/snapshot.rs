use crate::controller::MonitorAggregateState;
use crate::recovery::AgentRecoveryState;
use crate::types::PerformanceSample;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// On-disk view of the monitor state. Field names are part of the file format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub total_checks: u64,
    pub total_restarts: u64,
    #[serde(default)]
    pub gateway_restarts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agents: BTreeMap<String, AgentSnapshot>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceSample>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub consecutive_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_healthy: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_restart: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub total_checks: u64,
    #[serde(default)]
    pub total_failures: u64,
    #[serde(default)]
    pub total_restarts: u64,
}

impl From<&AgentRecoveryState> for AgentSnapshot {
    fn from(agent: &AgentRecoveryState) -> Self {
        Self {
            consecutive_failures: agent.consecutive_failures,
            last_healthy: agent.last_healthy_at,
            last_restart: agent.last_restart_at,
            last_check: agent.last_check_at,
            last_error: agent.last_error.clone(),
            total_checks: agent.total_checks,
            total_failures: agent.total_failures,
            total_restarts: agent.total_restarts,
        }
    }
}

impl Snapshot {
    pub fn capture(state: &MonitorAggregateState, saved_at: DateTime<Utc>) -> Self {
        Self {
            saved_at,
            start_time: state.start_time,
            total_checks: state.total_checks,
            total_restarts: state.total_restarts,
            gateway_restarts: state.gateway_restarts,
            last_check: state.last_check_at,
            agents: state
                .agents
                .iter()
                .map(|(name, agent)| (name.clone(), AgentSnapshot::from(agent)))
                .collect(),
            performance: state.latest_sample.clone(),
        }
    }
}

/// What the previous run left behind, for a single startup log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviousRunSummary {
    pub saved_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
    pub total_checks: u64,
    pub total_restarts: u64,
    pub agents: usize,
}

/// Best-effort JSON snapshot at a fixed path, rewritten after every cycle.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the current state. Failures are logged and dropped.
    pub fn save(&self, state: &MonitorAggregateState) {
        if let Err(e) = self.save_at(state, Utc::now()) {
            warn!(path = %self.path.display(), "Failed to persist state snapshot: {}", e);
        }
    }

    /// Write through a sibling temp file so readers never see a partial file.
    pub fn save_at(
        &self,
        state: &MonitorAggregateState,
        saved_at: DateTime<Utc>,
    ) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| SnapshotError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let data = serde_json::to_string_pretty(&Snapshot::capture(state, saved_at))?;
        let tmp = self.tmp_path();
        fs::write(&tmp, data).map_err(|source| SnapshotError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), total_checks = state.total_checks, "State snapshot saved");
        Ok(())
    }

    pub fn read(&self) -> Result<Snapshot, SnapshotError> {
        let data = fs::read_to_string(&self.path).map_err(|source| SnapshotError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Summary of the last snapshot; a missing or unreadable file means no prior state.
    pub fn load(&self) -> Option<PreviousRunSummary> {
        match self.read() {
            Ok(snapshot) => Some(PreviousRunSummary {
                saved_at: snapshot.saved_at,
                start_time: snapshot.start_time,
                total_checks: snapshot.total_checks,
                total_restarts: snapshot.total_restarts,
                agents: snapshot.agents.len(),
            }),
            Err(SnapshotError::Io { source, .. })
                if source.kind() == std::io::ErrorKind::NotFound =>
            {
                None
            }
            Err(e) => {
                debug!(path = %self.path.display(), "Ignoring unreadable previous snapshot: {}", e);
                None
            }
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }
}
