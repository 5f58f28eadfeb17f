//! Postgres-backed tracker
//!
//! Eligibility rules are expressed as query-time joins in the repositories,
//! so every orchestrator process sees the same candidate sets.

use async_trait::async_trait;
use cairn_core::domain::resource::{
    Attribution, Container, ResourceKind, ResourceRef, ResourceState, Volume,
};
use cairn_core::domain::worker::Worker;
use sqlx::PgPool;
use std::sync::Arc;

use super::{LiveCounts, ReapPolicy, ResourceTracker, Result, TrackerError};
use crate::metric::{MeterKind, Meters};
use crate::repository::{
    container_repository, owner_repository, volume_repository, worker_repository,
};

pub struct PgResourceTracker {
    pool: PgPool,
    policy: ReapPolicy,
    meters: Arc<Meters>,
}

impl PgResourceTracker {
    pub fn new(pool: PgPool, policy: ReapPolicy, meters: Arc<Meters>) -> Self {
        Self {
            pool,
            policy,
            meters,
        }
    }

    fn counted(&self) -> &PgPool {
        self.meters.inc(MeterKind::DatabaseQueries);
        &self.pool
    }
}

fn duplicate_or(err: sqlx::Error, kind: ResourceKind, handle: &str) -> TrackerError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => TrackerError::Duplicate {
            kind,
            handle: handle.to_string(),
        },
        _ => TrackerError::Database(err),
    }
}

#[async_trait]
impl ResourceTracker for PgResourceTracker {
    async fn list_reapable(
        &self,
        kind: ResourceKind,
        state: ResourceState,
    ) -> Result<Vec<ResourceRef>> {
        let pool = self.counted();

        let refs = match (kind, state) {
            (ResourceKind::Container, ResourceState::Creating) => {
                container_repository::find_stale_creating(pool, self.policy.creating_cutoff())
                    .await?
            }
            (ResourceKind::Container, ResourceState::Created) => {
                container_repository::find_unreferenced_created(pool).await?
            }
            (ResourceKind::Container, state) => {
                container_repository::find_by_state(pool, state).await?
            }
            (ResourceKind::Volume, ResourceState::Creating) => {
                volume_repository::find_stale_creating(pool, self.policy.creating_cutoff()).await?
            }
            (ResourceKind::Volume, ResourceState::Created) => {
                volume_repository::find_unreferenced_created(pool).await?
            }
            (ResourceKind::Volume, state) => volume_repository::find_by_state(pool, state).await?,
        };

        Ok(refs)
    }

    async fn transition(
        &self,
        kind: ResourceKind,
        handle: &str,
        from: ResourceState,
        to: ResourceState,
    ) -> Result<bool> {
        let pool = self.counted();

        let moved = match kind {
            ResourceKind::Container => {
                container_repository::transition(pool, handle, from, to).await?
            }
            ResourceKind::Volume => volume_repository::transition(pool, handle, from, to).await?,
        };

        Ok(moved)
    }

    async fn remove(&self, kind: ResourceKind, handle: &str) -> Result<bool> {
        let pool = self.counted();

        let removed = match kind {
            ResourceKind::Container => container_repository::delete(pool, handle).await?,
            ResourceKind::Volume => volume_repository::delete(pool, handle).await?,
        };

        Ok(removed)
    }

    async fn upsert_worker(&self, worker: Worker) -> Result<()> {
        worker_repository::upsert(self.counted(), &worker).await?;
        Ok(())
    }

    async fn find_worker(&self, name: &str) -> Result<Option<Worker>> {
        Ok(worker_repository::find_by_name(self.counted(), name).await?)
    }

    async fn list_workers(&self) -> Result<Vec<Worker>> {
        Ok(worker_repository::list_all(self.counted()).await?)
    }

    async fn insert_container(&self, container: Container) -> Result<()> {
        if self.find_worker(&container.worker_name).await?.is_none() {
            return Err(TrackerError::UnknownWorker(container.worker_name));
        }

        container_repository::insert(self.counted(), &container)
            .await
            .map_err(|e| duplicate_or(e, ResourceKind::Container, &container.handle))?;

        self.meters.inc(MeterKind::ContainersCreated);
        Ok(())
    }

    async fn insert_volume(&self, volume: Volume) -> Result<()> {
        if self.find_worker(&volume.worker_name).await?.is_none() {
            return Err(TrackerError::UnknownWorker(volume.worker_name));
        }

        if let Some(parent) = &volume.parent_handle {
            if !volume_repository::exists(self.counted(), parent).await? {
                return Err(TrackerError::UnknownParent(parent.clone()));
            }
        }

        volume_repository::insert(self.counted(), &volume)
            .await
            .map_err(|e| duplicate_or(e, ResourceKind::Volume, &volume.handle))?;

        self.meters.inc(MeterKind::VolumesCreated);
        Ok(())
    }

    async fn set_owner_live(&self, owner: &Attribution, live: bool) -> Result<()> {
        owner_repository::set_live(self.counted(), owner, live).await?;
        Ok(())
    }

    async fn count_live(&self, worker_name: &str) -> Result<LiveCounts> {
        let (containers, volumes) =
            worker_repository::count_resources(self.counted(), worker_name).await?;

        Ok(LiveCounts {
            containers: containers.max(0) as u64,
            volumes: volumes.max(0) as u64,
        })
    }
}
