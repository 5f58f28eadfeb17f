//! In-memory tracker
//!
//! Single-process bookkeeping used in development mode and tests. Volumes
//! store only their parent handle; the parent -> children index is derived
//! from the current rows on every query.

use async_trait::async_trait;
use cairn_core::domain::resource::{
    Attribution, Container, ResourceKind, ResourceRef, ResourceState, Volume,
};
use cairn_core::domain::worker::Worker;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use super::{LiveCounts, ReapPolicy, ResourceTracker, Result, TrackerError};
use crate::metric::{MeterKind, Meters};

#[derive(Default)]
struct Store {
    workers: HashMap<String, Worker>,
    containers: HashMap<String, Container>,
    volumes: HashMap<String, Volume>,
    owners: HashMap<Attribution, bool>,
}

impl Store {
    /// Unattributed resources have no owner to wait for; an owner that has
    /// never reported liveness is assumed to still be running.
    fn owner_is_live(&self, owner: &Option<Attribution>) -> bool {
        match owner {
            Some(o) => self.owners.get(o).copied().unwrap_or(true),
            None => false,
        }
    }

    fn parents_with_children(&self) -> HashSet<&str> {
        self.volumes
            .values()
            .filter_map(|v| v.parent_handle.as_deref())
            .collect()
    }
}

pub struct MemoryResourceTracker {
    store: Mutex<Store>,
    policy: ReapPolicy,
    meters: Arc<Meters>,
}

impl MemoryResourceTracker {
    pub fn new(policy: ReapPolicy, meters: Arc<Meters>) -> Self {
        Self {
            store: Mutex::new(Store::default()),
            policy,
            meters,
        }
    }

    /// Current state of a tracked resource, `None` once removed
    pub fn state_of(&self, kind: ResourceKind, handle: &str) -> Option<ResourceState> {
        let store = self.store.lock().unwrap();
        match kind {
            ResourceKind::Container => store.containers.get(handle).map(|c| c.state),
            ResourceKind::Volume => store.volumes.get(handle).map(|v| v.state),
        }
    }
}

#[async_trait]
impl ResourceTracker for MemoryResourceTracker {
    async fn list_reapable(
        &self,
        kind: ResourceKind,
        state: ResourceState,
    ) -> Result<Vec<ResourceRef>> {
        let cutoff = self.policy.creating_cutoff();
        let store = self.store.lock().unwrap();

        let mut candidates: Vec<(chrono::DateTime<chrono::Utc>, ResourceRef)> = match kind {
            ResourceKind::Container => store
                .containers
                .values()
                .filter(|c| c.state == state)
                .filter(|c| match state {
                    ResourceState::Creating => c.created_at < cutoff,
                    ResourceState::Created => !store.owner_is_live(&c.owner),
                    ResourceState::Destroying | ResourceState::Failed => true,
                })
                .map(|c| (c.created_at, ResourceRef::from(c)))
                .collect(),
            ResourceKind::Volume => {
                let parents = store.parents_with_children();
                store
                    .volumes
                    .values()
                    .filter(|v| v.state == state)
                    .filter(|v| !parents.contains(v.handle.as_str()))
                    .filter(|v| match state {
                        ResourceState::Creating => v.created_at < cutoff,
                        ResourceState::Created => {
                            !store.owner_is_live(&v.owner)
                                && v.container_handle
                                    .as_ref()
                                    .is_none_or(|h| !store.containers.contains_key(h))
                        }
                        ResourceState::Destroying | ResourceState::Failed => true,
                    })
                    .map(|v| (v.created_at, ResourceRef::from(v)))
                    .collect()
            }
        };

        candidates.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.handle.cmp(&b.1.handle)));
        Ok(candidates.into_iter().map(|(_, r)| r).collect())
    }

    async fn transition(
        &self,
        kind: ResourceKind,
        handle: &str,
        from: ResourceState,
        to: ResourceState,
    ) -> Result<bool> {
        let mut store = self.store.lock().unwrap();

        let current = match kind {
            ResourceKind::Container => store.containers.get_mut(handle).map(|c| &mut c.state),
            ResourceKind::Volume => store.volumes.get_mut(handle).map(|v| &mut v.state),
        };

        match current {
            Some(state) if *state == from => {
                *state = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn remove(&self, kind: ResourceKind, handle: &str) -> Result<bool> {
        let mut store = self.store.lock().unwrap();

        let removed = match kind {
            ResourceKind::Container => store.containers.remove(handle).is_some(),
            ResourceKind::Volume => store.volumes.remove(handle).is_some(),
        };

        Ok(removed)
    }

    async fn upsert_worker(&self, worker: Worker) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        store.workers.insert(worker.name.clone(), worker);
        Ok(())
    }

    async fn find_worker(&self, name: &str) -> Result<Option<Worker>> {
        let store = self.store.lock().unwrap();
        Ok(store.workers.get(name).cloned())
    }

    async fn list_workers(&self) -> Result<Vec<Worker>> {
        let store = self.store.lock().unwrap();
        let mut workers: Vec<Worker> = store.workers.values().cloned().collect();
        workers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(workers)
    }

    async fn insert_container(&self, container: Container) -> Result<()> {
        let mut store = self.store.lock().unwrap();

        if !store.workers.contains_key(&container.worker_name) {
            return Err(TrackerError::UnknownWorker(container.worker_name));
        }
        if store.containers.contains_key(&container.handle) {
            return Err(TrackerError::Duplicate {
                kind: ResourceKind::Container,
                handle: container.handle,
            });
        }

        store.containers.insert(container.handle.clone(), container);
        self.meters.inc(MeterKind::ContainersCreated);
        Ok(())
    }

    async fn insert_volume(&self, volume: Volume) -> Result<()> {
        let mut store = self.store.lock().unwrap();

        if !store.workers.contains_key(&volume.worker_name) {
            return Err(TrackerError::UnknownWorker(volume.worker_name));
        }
        if store.volumes.contains_key(&volume.handle) {
            return Err(TrackerError::Duplicate {
                kind: ResourceKind::Volume,
                handle: volume.handle,
            });
        }
        if let Some(parent) = &volume.parent_handle {
            if !store.volumes.contains_key(parent) {
                return Err(TrackerError::UnknownParent(parent.clone()));
            }
        }

        store.volumes.insert(volume.handle.clone(), volume);
        self.meters.inc(MeterKind::VolumesCreated);
        Ok(())
    }

    async fn set_owner_live(&self, owner: &Attribution, live: bool) -> Result<()> {
        let mut store = self.store.lock().unwrap();
        store.owners.insert(owner.clone(), live);
        Ok(())
    }

    async fn count_live(&self, worker_name: &str) -> Result<LiveCounts> {
        let store = self.store.lock().unwrap();

        Ok(LiveCounts {
            containers: store
                .containers
                .values()
                .filter(|c| c.worker_name == worker_name)
                .count() as u64,
            volumes: store
                .volumes
                .values()
                .filter(|v| v.worker_name == worker_name)
                .count() as u64,
        })
    }
}
