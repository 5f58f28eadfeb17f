//! Worker DTOs
//!
//! Data transfer objects for worker registration and fleet status.

use serde::{Deserialize, Serialize};

use crate::domain::worker::{Worker, WorkerState};

/// Request to register or update a worker in the fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterWorker {
    /// Unique name of the worker
    pub name: String,

    /// Base URL of the worker's resource API
    pub address: String,

    /// Availability reported by the worker
    pub state: WorkerState,
}

impl From<RegisterWorker> for Worker {
    fn from(req: RegisterWorker) -> Self {
        Worker {
            name: req.name,
            address: req.address,
            state: req.state,
        }
    }
}

/// Snapshot of a worker with its live resource counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSummary {
    pub name: String,

    pub address: String,

    pub state: WorkerState,

    /// Containers tracked on this worker that are not yet destroyed
    pub containers: u64,

    /// Volumes tracked on this worker that are not yet destroyed
    pub volumes: u64,
}

impl WorkerSummary {
    pub fn new(worker: Worker, containers: u64, volumes: u64) -> Self {
        WorkerSummary {
            name: worker.name,
            address: worker.address,
            state: worker.state,
            containers,
            volumes,
        }
    }
}
