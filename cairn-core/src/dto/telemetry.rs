//! Telemetry DTOs
//!
//! Samples pushed by the scheduler and build tracker. The orchestrator
//! turns each sample into a metric event; it never schedules anything itself.

use serde::{Deserialize, Serialize};

/// A duration sample from one scheduling pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchedulingSample {
    /// A full scheduling pass over a pipeline
    Full { pipeline: String, duration_ms: u64 },

    /// Loading the available versions for a pipeline
    LoadVersions { pipeline: String, duration_ms: u64 },

    /// Scheduling a single job
    Job {
        pipeline: String,
        job: String,
        duration_ms: u64,
    },
}

/// Build lifecycle notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildNotification {
    Started {
        pipeline: String,
        job: String,
        build_name: String,
        build_id: i64,
        team_name: String,
    },

    Finished {
        pipeline: String,
        job: String,
        build_name: String,
        build_id: i64,
        build_status: String,
        duration_ms: u64,
        team_name: String,
    },
}
