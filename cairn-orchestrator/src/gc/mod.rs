//! Garbage Collection Module
//!
//! Periodic sweeps that reclaim containers and volumes from the fleet.
//! [`Collector`] holds the sweep machinery shared by both kinds; a [`Reaper`]
//! supplies what differs: the lease scope, the worker call and how a failed
//! call is recorded.

pub mod collector;
pub mod container;
pub mod fleet;
pub mod volume;

pub use collector::{Collector, CollectorSettings, SweepOutcome, SweepReport};
pub use container::ContainerReaper;
pub use fleet::FleetReporter;
pub use volume::VolumeReaper;

use async_trait::async_trait;
use cairn_client::DeleteOutcome;
use cairn_core::domain::resource::ResourceKind;
use cairn_core::domain::worker::Worker;

use crate::metric::MeterKind;

/// Where a resource goes after a delete call that did not remove it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Park in `Failed`; the next sweep retries it
    MarkFailed,

    /// Stay in `Destroying`; the next sweep retries it
    KeepDestroying,
}

/// Kind-specific half of a collector
#[async_trait]
pub trait Reaper: Send + Sync + 'static {
    fn kind(&self) -> ResourceKind;

    /// Lease scope guarding sweeps of this kind
    fn scope_key(&self) -> &'static str;

    /// Ask the owning worker to delete the resource
    async fn delete(&self, worker: &Worker, handle: &str) -> DeleteOutcome;

    fn on_failure(&self, outcome: &DeleteOutcome) -> FailurePolicy;

    fn deleted_meter(&self) -> MeterKind;

    fn failed_meter(&self) -> MeterKind;
}
