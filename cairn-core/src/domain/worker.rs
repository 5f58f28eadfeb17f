//! Worker domain model
//!
//! Represents a fleet node hosting containers and volumes for builds.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A worker in the fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    /// Unique name of the worker
    pub name: String,

    /// Base URL of the worker's resource API (e.g., "http://10.0.0.5:7777")
    pub address: String,

    /// Current availability of the worker
    pub state: WorkerState,
}

impl Worker {
    /// Whether the worker currently accepts delete calls
    pub fn accepts_deletes(&self) -> bool {
        self.state.accepts_deletes()
    }
}

/// Availability state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Worker is healthy and serving requests
    Running,

    /// Worker missed its heartbeats
    Stalled,

    /// Worker is draining before a restart
    Landing,

    /// Worker finished draining
    Landed,

    /// Worker is leaving the fleet for good
    Retiring,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Running => "running",
            WorkerState::Stalled => "stalled",
            WorkerState::Landing => "landing",
            WorkerState::Landed => "landed",
            WorkerState::Retiring => "retiring",
        }
    }

    /// Only running and landing workers accept delete calls
    pub fn accepts_deletes(&self) -> bool {
        matches!(self, WorkerState::Running | WorkerState::Landing)
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(WorkerState::Running),
            "stalled" => Ok(WorkerState::Stalled),
            "landing" => Ok(WorkerState::Landing),
            "landed" => Ok(WorkerState::Landed),
            "retiring" => Ok(WorkerState::Retiring),
            other => Err(format!("unknown worker state: {}", other)),
        }
    }
}
