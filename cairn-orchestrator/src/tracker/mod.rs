//! Resource State Tracker
//!
//! Central bookkeeping of container and volume lifecycle state, independent
//! of any single worker. Collectors read candidates from here and move them
//! through compare-and-swap transitions; nothing else mutates lifecycle state.
//!
//! The tracker owns the reap policy, including the parent/child rule for
//! volumes: a volume with any child row is never offered as a candidate.

pub mod memory;
pub mod postgres;

pub use memory::MemoryResourceTracker;
pub use postgres::PgResourceTracker;

use async_trait::async_trait;
use cairn_core::domain::resource::{
    Attribution, Container, ResourceKind, ResourceRef, ResourceState, Volume,
};
use cairn_core::domain::worker::Worker;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("worker {0} is not registered")]
    UnknownWorker(String),

    #[error("parent volume {0} is not tracked")]
    UnknownParent(String),

    #[error("{kind} {handle} is already tracked")]
    Duplicate { kind: ResourceKind, handle: String },
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Knobs of the reap policy
#[derive(Debug, Clone, Copy)]
pub struct ReapPolicy {
    /// How long a resource may stay in `Creating` before it is considered abandoned
    pub creating_grace: Duration,
}

impl Default for ReapPolicy {
    fn default() -> Self {
        Self {
            creating_grace: Duration::from_secs(5 * 60),
        }
    }
}

impl ReapPolicy {
    pub(crate) fn creating_cutoff(&self) -> chrono::DateTime<chrono::Utc> {
        let grace = chrono::Duration::from_std(self.creating_grace)
            .unwrap_or_else(|_| chrono::Duration::zero());
        chrono::Utc::now() - grace
    }
}

/// Containers and volumes still tracked on one worker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveCounts {
    pub containers: u64,
    pub volumes: u64,
}

#[async_trait]
pub trait ResourceTracker: Send + Sync {
    /// Candidates of `kind` that are reapable under the policy for `state`
    async fn list_reapable(
        &self,
        kind: ResourceKind,
        state: ResourceState,
    ) -> Result<Vec<ResourceRef>>;

    /// Compare-and-swap a lifecycle transition
    ///
    /// Returns false, not an error, when the resource is no longer in `from`
    /// (another process moved it, or it is gone).
    async fn transition(
        &self,
        kind: ResourceKind,
        handle: &str,
        from: ResourceState,
        to: ResourceState,
    ) -> Result<bool>;

    /// Delete bookkeeping after the worker confirmed the resource is gone
    async fn remove(&self, kind: ResourceKind, handle: &str) -> Result<bool>;

    // Provisioning-path entry points

    async fn upsert_worker(&self, worker: Worker) -> Result<()>;

    async fn find_worker(&self, name: &str) -> Result<Option<Worker>>;

    async fn list_workers(&self) -> Result<Vec<Worker>>;

    async fn insert_container(&self, container: Container) -> Result<()>;

    async fn insert_volume(&self, volume: Volume) -> Result<()>;

    /// Mark the build, check or task an attribution points to as live or finished
    async fn set_owner_live(&self, owner: &Attribution, live: bool) -> Result<()>;

    async fn count_live(&self, worker_name: &str) -> Result<LiveCounts>;
}
