//! Volume reaper
//!
//! A worker refusing a delete because the volume is still in use is not a
//! failure: the volume stays in `Destroying` and is retried next sweep.
//! Parents are never candidates while a child row exists, so a chain is
//! unwound leaf first, one level per sweep.

use async_trait::async_trait;
use cairn_client::{DeleteOutcome, WorkerApi};
use cairn_core::domain::lease::VOLUME_COLLECTOR_SCOPE;
use cairn_core::domain::resource::ResourceKind;
use cairn_core::domain::worker::Worker;
use std::sync::Arc;

use super::{FailurePolicy, Reaper};
use crate::metric::MeterKind;

pub struct VolumeReaper {
    workers: Arc<dyn WorkerApi>,
}

impl VolumeReaper {
    pub fn new(workers: Arc<dyn WorkerApi>) -> Self {
        Self { workers }
    }
}

#[async_trait]
impl Reaper for VolumeReaper {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Volume
    }

    fn scope_key(&self) -> &'static str {
        VOLUME_COLLECTOR_SCOPE
    }

    async fn delete(&self, worker: &Worker, handle: &str) -> DeleteOutcome {
        self.workers.delete_volume(worker, handle).await
    }

    fn on_failure(&self, outcome: &DeleteOutcome) -> FailurePolicy {
        match outcome {
            DeleteOutcome::InUse => FailurePolicy::KeepDestroying,
            _ => FailurePolicy::MarkFailed,
        }
    }

    fn deleted_meter(&self) -> MeterKind {
        MeterKind::VolumesDeleted
    }

    fn failed_meter(&self) -> MeterKind {
        MeterKind::FailedVolumes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::collector::tests::harness;
    use crate::gc::testing::ScriptedWorkers;
    use crate::tracker::ResourceTracker;
    use crate::tracker::memory::tests::volume;
    use cairn_core::domain::resource::ResourceState;

    #[test]
    fn test_in_use_keeps_destroying() {
        let reaper = VolumeReaper::new(Arc::new(ScriptedWorkers::new()));

        assert_eq!(reaper.on_failure(&DeleteOutcome::InUse), FailurePolicy::KeepDestroying);
        assert_eq!(reaper.on_failure(&DeleteOutcome::TimedOut), FailurePolicy::MarkFailed);
        assert_eq!(
            reaper.on_failure(&DeleteOutcome::Rejected {
                status: 500,
                message: "boom".to_string()
            }),
            FailurePolicy::MarkFailed
        );
        assert_eq!(reaper.scope_key(), "volume-collector");
    }

    #[tokio::test]
    async fn test_in_use_volume_stays_destroying_and_is_retried() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(VolumeReaper::new(workers.clone()), "atc-1").await;
        h.tracker
            .insert_volume(volume("v-1", ResourceState::Created, None))
            .await
            .unwrap();
        workers.answer("v-1", DeleteOutcome::InUse);

        let first = h.sweep().await.unwrap();
        assert_eq!(first.retained, 1);
        assert_eq!(first.failed, 0);
        assert_eq!(
            h.tracker.state_of(ResourceKind::Volume, "v-1"),
            Some(ResourceState::Destroying)
        );
        assert_eq!(h.telemetry.meters.get(MeterKind::FailedVolumes).total(), 0);

        workers.answer("v-1", DeleteOutcome::Deleted);
        let second = h.sweep().await.unwrap();

        let destroying = h.sink.named("destroying volumes to be garbage collected");
        assert_eq!(destroying.last().map(|e| e.value), Some(1.0));
        assert_eq!(second.deleted, 1);
        assert_eq!(h.tracker.state_of(ResourceKind::Volume, "v-1"), None);
    }

    #[tokio::test]
    async fn test_parent_reaped_on_sweep_after_child() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(VolumeReaper::new(workers.clone()), "atc-1").await;
        h.tracker
            .insert_volume(volume("parent", ResourceState::Created, None))
            .await
            .unwrap();
        h.tracker
            .insert_volume(volume("child", ResourceState::Created, Some("parent")))
            .await
            .unwrap();

        let first = h.sweep().await.unwrap();
        assert_eq!(first.deleted, 1);
        assert_eq!(workers.calls(), vec!["child"]);
        assert_eq!(
            h.tracker.state_of(ResourceKind::Volume, "parent"),
            Some(ResourceState::Created)
        );

        let second = h.sweep().await.unwrap();
        assert_eq!(second.deleted, 1);
        assert_eq!(workers.calls(), vec!["child", "parent"]);
        assert_eq!(h.tracker.state_of(ResourceKind::Volume, "parent"), None);
        assert_eq!(h.telemetry.meters.get(MeterKind::VolumesDeleted).total(), 2);
    }

    #[tokio::test]
    async fn test_parent_waits_while_child_is_in_use() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(VolumeReaper::new(workers.clone()), "atc-1").await;
        h.tracker
            .insert_volume(volume("parent", ResourceState::Created, None))
            .await
            .unwrap();
        h.tracker
            .insert_volume(volume("child", ResourceState::Created, Some("parent")))
            .await
            .unwrap();
        workers.answer("child", DeleteOutcome::InUse);

        h.sweep().await.unwrap();
        h.sweep().await.unwrap();

        assert_eq!(workers.calls(), vec!["child", "child"]);
        assert_eq!(
            h.tracker.state_of(ResourceKind::Volume, "parent"),
            Some(ResourceState::Created)
        );
    }

    #[tokio::test]
    async fn test_unreachable_worker_marks_volume_failed() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(VolumeReaper::new(workers.clone()), "atc-1").await;
        h.tracker
            .insert_volume(volume("v-1", ResourceState::Created, None))
            .await
            .unwrap();
        workers.answer("v-1", DeleteOutcome::Unreachable("no route to host".to_string()));

        let report = h.sweep().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(
            h.tracker.state_of(ResourceKind::Volume, "v-1"),
            Some(ResourceState::Failed)
        );
        assert_eq!(h.telemetry.meters.get(MeterKind::FailedVolumes).total(), 1);
    }
}
