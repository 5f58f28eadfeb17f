//! Container reaper
//!
//! Every unsuccessful container delete parks the container in `Failed`.

use async_trait::async_trait;
use cairn_client::{DeleteOutcome, WorkerApi};
use cairn_core::domain::lease::CONTAINER_COLLECTOR_SCOPE;
use cairn_core::domain::resource::ResourceKind;
use cairn_core::domain::worker::Worker;
use std::sync::Arc;

use super::{FailurePolicy, Reaper};
use crate::metric::MeterKind;

pub struct ContainerReaper {
    workers: Arc<dyn WorkerApi>,
}

impl ContainerReaper {
    pub fn new(workers: Arc<dyn WorkerApi>) -> Self {
        Self { workers }
    }
}

#[async_trait]
impl Reaper for ContainerReaper {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Container
    }

    fn scope_key(&self) -> &'static str {
        CONTAINER_COLLECTOR_SCOPE
    }

    async fn delete(&self, worker: &Worker, handle: &str) -> DeleteOutcome {
        self.workers.delete_container(worker, handle).await
    }

    fn on_failure(&self, _outcome: &DeleteOutcome) -> FailurePolicy {
        FailurePolicy::MarkFailed
    }

    fn deleted_meter(&self) -> MeterKind {
        MeterKind::ContainersDeleted
    }

    fn failed_meter(&self) -> MeterKind {
        MeterKind::FailedContainers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gc::collector::tests::harness;
    use crate::gc::testing::ScriptedWorkers;
    use crate::tracker::ResourceTracker;
    use crate::tracker::memory::tests::container;
    use cairn_core::domain::resource::{Attribution, OwnerKind, ResourceState};
    use cairn_core::domain::worker::WorkerState;
    use std::time::Duration;

    #[test]
    fn test_every_failure_marks_failed() {
        let reaper = ContainerReaper::new(Arc::new(ScriptedWorkers::new()));

        assert_eq!(reaper.on_failure(&DeleteOutcome::TimedOut), FailurePolicy::MarkFailed);
        assert_eq!(
            reaper.on_failure(&DeleteOutcome::Unreachable("refused".to_string())),
            FailurePolicy::MarkFailed
        );
        assert_eq!(reaper.scope_key(), "container-collector");
    }

    #[tokio::test]
    async fn test_stuck_creating_container_is_reported_then_removed() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(ContainerReaper::new(workers.clone()), "atc-1").await;
        h.tracker
            .insert_container(container("stuck", ResourceState::Creating, Duration::from_secs(600)))
            .await
            .unwrap();
        workers.answer("stuck", DeleteOutcome::NotFound);

        let report = h.sweep().await.expect("sweep should run");

        let backlog = h.sink.named("creating containers to be garbage collected");
        assert_eq!(backlog.len(), 1);
        assert_eq!(backlog[0].value, 1.0);
        assert_eq!(report.deleted, 1);
        assert_eq!(h.tracker.state_of(ResourceKind::Container, "stuck"), None);
        assert_eq!(h.sink.named("GC container collector duration (ms)").len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_identical_to_deleted() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(ContainerReaper::new(workers.clone()), "atc-1").await;
        h.tracker
            .insert_container(container("gone", ResourceState::Created, Duration::ZERO))
            .await
            .unwrap();
        h.tracker
            .insert_container(container("live", ResourceState::Created, Duration::ZERO))
            .await
            .unwrap();
        workers.answer("gone", DeleteOutcome::NotFound);

        let report = h.sweep().await.unwrap();

        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(h.tracker.state_of(ResourceKind::Container, "gone"), None);
        assert_eq!(h.tracker.state_of(ResourceKind::Container, "live"), None);
        assert_eq!(h.telemetry.meters.get(MeterKind::ContainersDeleted).total(), 2);
    }

    #[tokio::test]
    async fn test_container_of_unreported_owner_survives_sweep() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(ContainerReaper::new(workers.clone()), "atc-1").await;
        let mut owned = container("check-c", ResourceState::Created, Duration::ZERO);
        owned.owner = Some(Attribution::new(OwnerKind::Check, "7"));
        h.tracker.insert_container(owned).await.unwrap();

        let report = h.sweep().await.unwrap();

        assert_eq!(report.deleted, 0);
        assert!(workers.calls().is_empty());
        assert_eq!(
            h.tracker.state_of(ResourceKind::Container, "check-c"),
            Some(ResourceState::Created)
        );
    }

    #[tokio::test]
    async fn test_unreachable_worker_parks_in_failed_and_retries_next_sweep() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(ContainerReaper::new(workers.clone()), "atc-1").await;
        h.tracker
            .insert_container(container("c-1", ResourceState::Created, Duration::ZERO))
            .await
            .unwrap();
        workers.answer("c-1", DeleteOutcome::Unreachable("connection refused".to_string()));

        let first = h.sweep().await.unwrap();
        assert_eq!(first.failed, 1);
        assert_eq!(workers.calls(), vec!["c-1"]);
        assert_eq!(
            h.tracker.state_of(ResourceKind::Container, "c-1"),
            Some(ResourceState::Failed)
        );
        assert_eq!(h.telemetry.meters.get(MeterKind::FailedContainers).total(), 1);

        workers.answer("c-1", DeleteOutcome::Deleted);
        let second = h.sweep().await.unwrap();

        let failed_backlog = h.sink.named("failed containers to be garbage collected");
        assert_eq!(failed_backlog.last().map(|e| e.value), Some(1.0));
        assert_eq!(second.deleted, 1);
        assert_eq!(h.tracker.state_of(ResourceKind::Container, "c-1"), None);
    }

    #[tokio::test]
    async fn test_unavailable_worker_is_skipped_without_delete_call() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(ContainerReaper::new(workers.clone()), "atc-1").await;
        h.tracker
            .upsert_worker(crate::tracker::memory::tests::worker(
                "worker-1",
                WorkerState::Stalled,
            ))
            .await
            .unwrap();
        h.tracker
            .insert_container(container("c-1", ResourceState::Created, Duration::ZERO))
            .await
            .unwrap();

        let report = h.sweep().await.unwrap();

        assert!(workers.calls().is_empty());
        assert_eq!(report.failed, 1);
        assert_eq!(
            h.tracker.state_of(ResourceKind::Container, "c-1"),
            Some(ResourceState::Failed)
        );
    }

    #[tokio::test]
    async fn test_slow_worker_times_out() {
        let workers = Arc::new(ScriptedWorkers::with_delay(Duration::from_millis(200)));
        let mut h = harness(ContainerReaper::new(workers.clone()), "atc-1").await;
        h.settings.delete_timeout = Duration::from_millis(20);
        h.tracker
            .insert_container(container("c-1", ResourceState::Created, Duration::ZERO))
            .await
            .unwrap();

        let report = h.sweep().await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(
            h.tracker.state_of(ResourceKind::Container, "c-1"),
            Some(ResourceState::Failed)
        );
    }
}
