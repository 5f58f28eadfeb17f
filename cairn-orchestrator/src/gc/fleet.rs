//! Fleet status reporter
//!
//! Emits per-worker container and volume gauges and the meter deltas
//! accumulated since the previous tick.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::metric::{Event, MeterKind, Telemetry};
use crate::tracker::ResourceTracker;

pub struct FleetReporter {
    tracker: Arc<dyn ResourceTracker>,
    telemetry: Telemetry,
    interval: Duration,
}

impl FleetReporter {
    pub fn new(
        tracker: Arc<dyn ResourceTracker>,
        telemetry: Telemetry,
        interval: Duration,
    ) -> Self {
        Self {
            tracker,
            telemetry,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Starting fleet reporter (interval: {:?})", self.interval);

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let workers = self.report_once().await;
                    debug!("Reported status for {} worker(s)", workers);
                }
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Emits one round of gauges; returns how many workers were reported
    pub async fn report_once(&self) -> usize {
        let mut reported = 0;

        match self.tracker.list_workers().await {
            Ok(workers) => {
                for worker in workers {
                    match self.tracker.count_live(&worker.name).await {
                        Ok(counts) => {
                            self.telemetry.emit(Event::WorkerContainers {
                                worker: worker.name.clone(),
                                containers: counts.containers,
                            });
                            self.telemetry.emit(Event::WorkerVolumes {
                                worker: worker.name,
                                volumes: counts.volumes,
                            });
                            reported += 1;
                        }
                        Err(e) => warn!("Failed to count resources on {}: {}", worker.name, e),
                    }
                }
            }
            Err(e) => warn!("Failed to list workers: {}", e),
        }

        for meter in MeterKind::ALL {
            let value = self.telemetry.meters.get(meter).take_delta();
            self.telemetry.emit(Event::MeterDelta { meter, value });
        }

        reported
    }
}
