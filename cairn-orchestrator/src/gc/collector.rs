//! Collector sweep
//!
//! One sweep per tick: take the kind's lease, report the backlog for every
//! lifecycle state, then reap candidates on a bounded pool. Each candidate is
//! claimed with a compare-and-swap into `Destroying` before the worker is
//! called, so a candidate is acted on by at most one sweep even if a lease
//! lapses mid-sweep.

use cairn_client::DeleteOutcome;
use cairn_core::domain::lease::Lease;
use cairn_core::domain::resource::{ResourceKind, ResourceRef, ResourceState};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::{FailurePolicy, Reaper};
use crate::lease::LeaseManager;
use crate::metric::{Event, Meters, Telemetry};
use crate::tracker::ResourceTracker;

/// Where a collector is within one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepPhase {
    Idle,
    LeaseRequested,
    Skipped,
    Running,
    Reporting,
}

impl std::fmt::Display for SweepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let phase = match self {
            SweepPhase::Idle => "idle",
            SweepPhase::LeaseRequested => "lease-requested",
            SweepPhase::Skipped => "skipped",
            SweepPhase::Running => "running",
            SweepPhase::Reporting => "reporting",
        };
        f.write_str(phase)
    }
}

#[derive(Debug, Clone)]
pub struct CollectorSettings {
    pub interval: Duration,
    pub lease_ttl: Duration,
    /// Maximum concurrent worker delete calls
    pub pool_size: usize,
    pub delete_timeout: Duration,
    /// Identity of this orchestrator process, used as the lease holder
    pub holder_id: String,
}

/// Tally of one completed sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub backlog: Vec<(ResourceState, usize)>,
    pub deleted: usize,
    pub failed: usize,
    /// Still in use on the worker, left in `Destroying`
    pub retained: usize,
    /// Claimed by someone else between listing and the state swap
    pub contended: usize,
    /// Tracker errors; the resource is retried next sweep
    pub errored: usize,
    /// Not dispatched because shutdown was requested
    pub abandoned: usize,
    pub duration: Duration,
}

impl SweepReport {
    fn record(&mut self, reaped: Reaped) {
        match reaped {
            Reaped::Deleted => self.deleted += 1,
            Reaped::Failed => self.failed += 1,
            Reaped::Retained => self.retained += 1,
            Reaped::Contended => self.contended += 1,
            Reaped::Errored => self.errored += 1,
        }
    }
}

#[derive(Debug)]
pub enum SweepOutcome {
    /// Another process holds the lease
    Skipped,
    /// The lease store could not be reached
    Aborted,
    Completed(SweepReport),
}

impl SweepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SweepOutcome::Completed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reaped {
    Deleted,
    Failed,
    Retained,
    Contended,
    Errored,
}

/// Everything a spawned reap task needs
struct ReapContext<R: Reaper> {
    reaper: Arc<R>,
    tracker: Arc<dyn ResourceTracker>,
    meters: Arc<Meters>,
    delete_timeout: Duration,
}

impl<R: Reaper> ReapContext<R> {
    async fn reap(&self, from: ResourceState, candidate: ResourceRef) -> Reaped {
        let kind = self.reaper.kind();
        let handle = candidate.handle.as_str();

        match self
            .tracker
            .transition(kind, handle, from, ResourceState::Destroying)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!("{} {} left {} before it was claimed", kind, handle, from);
                return Reaped::Contended;
            }
            Err(e) => {
                warn!("Failed to claim {} {}: {}", kind, handle, e);
                return Reaped::Errored;
            }
        }

        let worker = match self.tracker.find_worker(&candidate.worker_name).await {
            Ok(Some(worker)) if worker.accepts_deletes() => worker,
            Ok(Some(worker)) => {
                warn!(
                    "Worker {} is {}, marking {} {} failed",
                    worker.name, worker.state, kind, handle
                );
                return self.mark_failed(kind, handle).await;
            }
            Ok(None) => {
                warn!(
                    "Worker {} is not registered, marking {} {} failed",
                    candidate.worker_name, kind, handle
                );
                return self.mark_failed(kind, handle).await;
            }
            Err(e) => {
                warn!("Failed to look up worker {}: {}", candidate.worker_name, e);
                return Reaped::Errored;
            }
        };

        let outcome = time::timeout(self.delete_timeout, self.reaper.delete(&worker, handle))
            .await
            .unwrap_or(DeleteOutcome::TimedOut);

        if outcome.is_gone() {
            return match self.tracker.remove(kind, handle).await {
                Ok(_) => {
                    self.meters.inc(self.reaper.deleted_meter());
                    debug!("Deleted {} {} from worker {}", kind, handle, worker.name);
                    Reaped::Deleted
                }
                Err(e) => {
                    warn!("Failed to forget deleted {} {}: {}", kind, handle, e);
                    Reaped::Errored
                }
            };
        }

        match self.reaper.on_failure(&outcome) {
            FailurePolicy::KeepDestroying => {
                debug!(
                    "{} {} is still in use on worker {}, retrying next sweep",
                    kind, handle, worker.name
                );
                Reaped::Retained
            }
            FailurePolicy::MarkFailed => {
                warn!(
                    "Failed to delete {} {} on worker {}: {:?}",
                    kind, handle, worker.name, outcome
                );
                self.mark_failed(kind, handle).await
            }
        }
    }

    async fn mark_failed(&self, kind: ResourceKind, handle: &str) -> Reaped {
        match self
            .tracker
            .transition(kind, handle, ResourceState::Destroying, ResourceState::Failed)
            .await
        {
            Ok(true) => {
                self.meters.inc(self.reaper.failed_meter());
                Reaped::Failed
            }
            Ok(false) => Reaped::Contended,
            Err(e) => {
                warn!("Failed to mark {} {} failed: {}", kind, handle, e);
                Reaped::Errored
            }
        }
    }
}

/// Periodic garbage collector for one resource kind
pub struct Collector<R: Reaper> {
    context: Arc<ReapContext<R>>,
    leases: Arc<dyn LeaseManager>,
    telemetry: Telemetry,
    settings: CollectorSettings,
    semaphore: Arc<Semaphore>,
}

impl<R: Reaper> Collector<R> {
    pub fn new(
        reaper: Arc<R>,
        tracker: Arc<dyn ResourceTracker>,
        leases: Arc<dyn LeaseManager>,
        telemetry: Telemetry,
        settings: CollectorSettings,
    ) -> Self {
        let context = Arc::new(ReapContext {
            reaper,
            tracker,
            meters: Arc::clone(&telemetry.meters),
            delete_timeout: settings.delete_timeout,
        });
        let semaphore = Arc::new(Semaphore::new(settings.pool_size.max(1)));

        Self {
            context,
            leases,
            telemetry,
            settings,
            semaphore,
        }
    }

    fn kind(&self) -> ResourceKind {
        self.context.reaper.kind()
    }

    /// Sweeps every interval until shutdown is signalled
    ///
    /// A sweep in progress when shutdown arrives stops dispatching new
    /// deletes, drains the in-flight ones and releases its lease.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Starting {} collector (interval: {:?}, pool: {})",
            self.kind(),
            self.settings.interval,
            self.settings.pool_size
        );

        let mut interval = time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }

            debug!(collector = %self.kind(), phase = %SweepPhase::Idle, "waiting for tick");

            tokio::select! {
                _ = interval.tick() => {
                    self.sweep(&shutdown).await;
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("{} collector stopped", self.kind());
    }

    /// Performs a single sweep
    pub async fn sweep(&self, shutdown: &watch::Receiver<bool>) -> SweepOutcome {
        let kind = self.kind();
        let scope = self.context.reaper.scope_key();

        debug!(collector = %kind, phase = %SweepPhase::LeaseRequested, "requesting lease");

        let lease = match self
            .leases
            .try_acquire(scope, &self.settings.holder_id, self.settings.lease_ttl)
            .await
        {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                debug!(collector = %kind, phase = %SweepPhase::Skipped, "lease held elsewhere");
                self.telemetry.emit(Event::CollectorJobDropped {
                    kind,
                    worker: self.settings.holder_id.clone(),
                });
                return SweepOutcome::Skipped;
            }
            Err(e) => {
                error!("Failed to request {} lease: {}", scope, e);
                return SweepOutcome::Aborted;
            }
        };

        let started = Instant::now();
        let renewal = self.start_renewal_loop(lease.clone());

        debug!(collector = %kind, phase = %SweepPhase::Running, "lease acquired");

        let mut report = SweepReport::default();
        let work = self.gather(&mut report).await;
        self.dispatch(work, shutdown, &mut report).await;

        debug!(collector = %kind, phase = %SweepPhase::Reporting, "sweep drained");

        renewal.abort();
        report.duration = started.elapsed();
        self.telemetry.emit(Event::CollectorSweepDuration {
            kind,
            duration: report.duration,
        });

        if let Err(e) = self.leases.release(&lease).await {
            warn!("Failed to release {} lease: {}", scope, e);
        }

        if report.deleted + report.failed > 0 {
            info!(
                "{} sweep: {} deleted, {} failed, {} retained in {:?}",
                kind, report.deleted, report.failed, report.retained, report.duration
            );
        }

        SweepOutcome::Completed(report)
    }

    /// Lists candidates for every lifecycle state and reports each backlog
    async fn gather(&self, report: &mut SweepReport) -> Vec<(ResourceState, ResourceRef)> {
        let kind = self.kind();
        let mut work = Vec::new();

        for state in ResourceState::ALL {
            match self.context.tracker.list_reapable(kind, state).await {
                Ok(refs) => {
                    self.telemetry.emit(Event::ToBeGarbageCollected {
                        kind,
                        state,
                        count: refs.len(),
                    });
                    report.backlog.push((state, refs.len()));
                    work.extend(refs.into_iter().map(|r| (state, r)));
                }
                Err(e) => {
                    error!("Failed to list {} {}s: {}", state, kind, e);
                }
            }
        }

        work
    }

    async fn dispatch(
        &self,
        work: Vec<(ResourceState, ResourceRef)>,
        shutdown: &watch::Receiver<bool>,
        report: &mut SweepReport,
    ) {
        let total = work.len();
        let mut handles = Vec::with_capacity(total);

        for (index, (state, candidate)) in work.into_iter().enumerate() {
            if *shutdown.borrow() {
                report.abandoned = total - index;
                info!(
                    "Shutdown requested, leaving {} {}(s) for the next sweep",
                    report.abandoned,
                    self.kind()
                );
                break;
            }

            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                report.abandoned = total - index;
                break;
            };

            let context = Arc::clone(&self.context);
            handles.push(tokio::spawn(async move {
                let reaped = context.reap(state, candidate).await;
                drop(permit);
                reaped
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(reaped) => report.record(reaped),
                Err(e) => {
                    warn!("Reap task panicked: {}", e);
                    report.errored += 1;
                }
            }
        }
    }

    /// Keeps the lease alive for as long as the sweep runs
    fn start_renewal_loop(&self, lease: Lease) -> JoinHandle<()> {
        let leases = Arc::clone(&self.leases);
        let ttl = self.settings.lease_ttl;
        let period = (ttl / 2).max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.tick().await;

            loop {
                interval.tick().await;

                match leases.renew(&lease, ttl).await {
                    Ok(true) => debug!("Renewed lease {}", lease.scope_key),
                    Ok(false) => {
                        warn!(
                            "Lost lease {}, remaining deletes rely on state swaps",
                            lease.scope_key
                        );
                        break;
                    }
                    Err(e) => warn!("Failed to renew lease {}: {}", lease.scope_key, e),
                }
            }
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::gc::ContainerReaper;
    use crate::gc::testing::ScriptedWorkers;
    use crate::lease::MemoryLeaseManager;
    use crate::metric::{Emitter, MemorySink};
    use crate::tracker::memory::tests::{container, worker};
    use crate::tracker::{MemoryResourceTracker, ReapPolicy};
    use cairn_core::domain::worker::WorkerState;

    pub(crate) struct Harness<R: Reaper> {
        pub(crate) reaper: Arc<R>,
        pub(crate) tracker: Arc<MemoryResourceTracker>,
        pub(crate) leases: Arc<MemoryLeaseManager>,
        pub(crate) telemetry: Telemetry,
        pub(crate) sink: Arc<MemorySink>,
        pub(crate) settings: CollectorSettings,
    }

    impl<R: Reaper> Harness<R> {
        pub(crate) fn collector(&self, holder_id: &str) -> Collector<R> {
            let tracker: Arc<dyn ResourceTracker> = self.tracker.clone();
            let leases: Arc<dyn LeaseManager> = self.leases.clone();
            let settings = CollectorSettings {
                holder_id: holder_id.to_string(),
                ..self.settings.clone()
            };

            Collector::new(
                Arc::clone(&self.reaper),
                tracker,
                leases,
                self.telemetry.clone(),
                settings,
            )
        }

        /// One sweep as the default holder; `None` unless it completed
        pub(crate) async fn sweep(&self) -> Option<SweepReport> {
            let (_tx, rx) = watch::channel(false);
            match self.collector(&self.settings.holder_id).sweep(&rx).await {
                SweepOutcome::Completed(report) => Some(report),
                _ => None,
            }
        }
    }

    pub(crate) async fn harness<R: Reaper>(reaper: R, holder_id: &str) -> Harness<R> {
        let sink = Arc::new(MemorySink::new(256));
        let telemetry = Telemetry::new(Emitter::new().with_sink(sink.clone()));
        let tracker = Arc::new(MemoryResourceTracker::new(
            ReapPolicy {
                creating_grace: Duration::from_secs(60),
            },
            Arc::clone(&telemetry.meters),
        ));
        tracker
            .upsert_worker(worker("worker-1", WorkerState::Running))
            .await
            .unwrap();

        Harness {
            reaper: Arc::new(reaper),
            tracker,
            leases: Arc::new(MemoryLeaseManager::new()),
            telemetry,
            sink,
            settings: CollectorSettings {
                interval: Duration::from_millis(20),
                lease_ttl: Duration::from_secs(30),
                pool_size: 2,
                delete_timeout: Duration::from_secs(1),
                holder_id: holder_id.to_string(),
            },
        }
    }

    async fn seed(h: &Harness<ContainerReaper>, handles: &[&str]) {
        for handle in handles {
            h.tracker
                .insert_container(container(handle, ResourceState::Created, Duration::ZERO))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_racing_collectors_only_one_sweeps() {
        let workers = Arc::new(ScriptedWorkers::with_delay(Duration::from_millis(50)));
        let h = harness(ContainerReaper::new(workers.clone()), "atc-1").await;
        seed(&h, &["c-1", "c-2", "c-3"]).await;

        let (_tx, rx) = watch::channel(false);
        let first = h.collector("atc-1");
        let second = h.collector("atc-2");
        let (a, b) = tokio::join!(first.sweep(&rx), second.sweep(&rx));

        assert!(matches!(a, SweepOutcome::Completed(_)));
        assert!(matches!(b, SweepOutcome::Skipped));

        let durations = h.sink.named("GC container collector duration (ms)");
        assert_eq!(durations.len(), 1);

        let dropped = h.sink.named("GC container collector job dropped");
        assert_eq!(dropped.len(), 1);
        assert_eq!(dropped[0].attribute("worker"), Some("atc-2"));

        // the loser reported no backlog and made no worker calls
        assert_eq!(
            h.sink.named("created containers to be garbage collected").len(),
            1
        );
        let mut calls = workers.calls();
        calls.sort();
        assert_eq!(calls, vec!["c-1", "c-2", "c-3"]);
    }

    #[tokio::test]
    async fn test_backlog_reported_for_every_state_before_deletes() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(ContainerReaper::new(workers), "atc-1").await;
        seed(&h, &["c-1", "c-2"]).await;

        let report = h.sweep().await.unwrap();

        assert_eq!(
            report.backlog,
            vec![
                (ResourceState::Creating, 0),
                (ResourceState::Created, 2),
                (ResourceState::Destroying, 0),
                (ResourceState::Failed, 0),
            ]
        );
        let names: Vec<String> = h.sink.events().into_iter().map(|e| e.name).collect();
        assert_eq!(
            &names[..4],
            &[
                "creating containers to be garbage collected",
                "created containers to be garbage collected",
                "destroying containers to be garbage collected",
                "failed containers to be garbage collected",
            ]
        );
        assert_eq!(
            names.last().map(String::as_str),
            Some("GC container collector duration (ms)")
        );
    }

    #[tokio::test]
    async fn test_lease_released_after_sweep() {
        let h = harness(ContainerReaper::new(Arc::new(ScriptedWorkers::new())), "atc-1").await;

        h.sweep().await.unwrap();

        assert_eq!(h.leases.holder("container-collector"), None);
        // a different process can take the next tick immediately
        assert!(h.collector("atc-2").sweep(&watch::channel(false).1).await.is_completed());
    }

    #[tokio::test]
    async fn test_shutdown_stops_dispatch() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(ContainerReaper::new(workers.clone()), "atc-1").await;
        seed(&h, &["c-1", "c-2"]).await;

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let SweepOutcome::Completed(report) = h.collector("atc-1").sweep(&rx).await else {
            panic!("sweep should complete");
        };

        assert_eq!(report.abandoned, 2);
        assert_eq!(report.deleted, 0);
        assert!(workers.calls().is_empty());
        assert_eq!(
            h.tracker.state_of(ResourceKind::Container, "c-1"),
            Some(ResourceState::Created)
        );
        assert_eq!(h.leases.holder("container-collector"), None);
    }

    #[tokio::test]
    async fn test_pool_bounds_concurrent_deletes() {
        let workers = Arc::new(ScriptedWorkers::with_delay(Duration::from_millis(30)));
        let mut h = harness(ContainerReaper::new(workers.clone()), "atc-1").await;
        h.settings.pool_size = 1;
        seed(&h, &["c-1", "c-2", "c-3"]).await;

        let report = h.sweep().await.unwrap();

        assert_eq!(report.deleted, 3);
        assert!(report.duration >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_run_loop_sweeps_until_shutdown() {
        let workers = Arc::new(ScriptedWorkers::new());
        let h = harness(ContainerReaper::new(workers.clone()), "atc-1").await;
        seed(&h, &["c-1"]).await;

        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(h.collector("atc-1").run(rx));

        time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        time::timeout(Duration::from_secs(1), task)
            .await
            .expect("collector should stop on shutdown")
            .unwrap();

        assert_eq!(h.tracker.state_of(ResourceKind::Container, "c-1"), None);
        assert!(!h.sink.named("GC container collector duration (ms)").is_empty());
    }
}
