//! Process-local counters
//!
//! Meters accumulate between fleet-status ticks; each tick reports the
//! delta since the previous report.

use std::sync::atomic::{AtomicU64, Ordering};

/// Which counter a meter tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterKind {
    DatabaseQueries,
    ContainersCreated,
    VolumesCreated,
    FailedContainers,
    FailedVolumes,
    ContainersDeleted,
    VolumesDeleted,
}

impl MeterKind {
    pub const ALL: [MeterKind; 7] = [
        MeterKind::DatabaseQueries,
        MeterKind::ContainersCreated,
        MeterKind::VolumesCreated,
        MeterKind::FailedContainers,
        MeterKind::FailedVolumes,
        MeterKind::ContainersDeleted,
        MeterKind::VolumesDeleted,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MeterKind::DatabaseQueries => "database queries",
            MeterKind::ContainersCreated => "containers created",
            MeterKind::VolumesCreated => "volumes created",
            MeterKind::FailedContainers => "failed containers",
            MeterKind::FailedVolumes => "failed volumes",
            MeterKind::ContainersDeleted => "containers deleted",
            MeterKind::VolumesDeleted => "volumes deleted",
        }
    }
}

#[derive(Debug, Default)]
pub struct Meter {
    total: AtomicU64,
    reported: AtomicU64,
}

impl Meter {
    pub fn inc(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    /// Amount accumulated since the last call
    pub fn take_delta(&self) -> u64 {
        let total = self.total.load(Ordering::Relaxed);
        let previous = self.reported.swap(total, Ordering::Relaxed);
        total.saturating_sub(previous)
    }
}

#[derive(Debug, Default)]
pub struct Meters {
    database_queries: Meter,
    containers_created: Meter,
    volumes_created: Meter,
    failed_containers: Meter,
    failed_volumes: Meter,
    containers_deleted: Meter,
    volumes_deleted: Meter,
}

impl Meters {
    pub fn get(&self, kind: MeterKind) -> &Meter {
        match kind {
            MeterKind::DatabaseQueries => &self.database_queries,
            MeterKind::ContainersCreated => &self.containers_created,
            MeterKind::VolumesCreated => &self.volumes_created,
            MeterKind::FailedContainers => &self.failed_containers,
            MeterKind::FailedVolumes => &self.failed_volumes,
            MeterKind::ContainersDeleted => &self.containers_deleted,
            MeterKind::VolumesDeleted => &self.volumes_deleted,
        }
    }

    pub fn inc(&self, kind: MeterKind) {
        self.get(kind).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_resets_after_report() {
        let meters = Meters::default();
        meters.inc(MeterKind::ContainersDeleted);
        meters.inc(MeterKind::ContainersDeleted);

        let meter = meters.get(MeterKind::ContainersDeleted);
        assert_eq!(meter.take_delta(), 2);
        assert_eq!(meter.take_delta(), 0);

        meter.inc();
        assert_eq!(meter.take_delta(), 1);
        assert_eq!(meter.total(), 3);
    }

    #[test]
    fn test_meters_are_independent() {
        let meters = Meters::default();
        meters.inc(MeterKind::FailedVolumes);

        assert_eq!(meters.get(MeterKind::FailedVolumes).total(), 1);
        assert_eq!(meters.get(MeterKind::VolumesDeleted).total(), 0);
    }
}
