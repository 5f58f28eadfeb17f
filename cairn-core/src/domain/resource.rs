//! Container and volume domain types
//!
//! Both resource kinds share one lifecycle:
//! `Creating -> Created -> Destroying -> {Destroyed | Failed}`.
//! `Destroyed` is terminal and has no representation here; the row is removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Kind of reclaimable resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Container,
    Volume,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Container => "container",
            ResourceKind::Volume => "volume",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a container or volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceState {
    Creating,
    Created,
    Destroying,
    Failed,
}

impl ResourceState {
    /// Order in which collectors walk the reapable categories
    pub const ALL: [ResourceState; 4] = [
        ResourceState::Creating,
        ResourceState::Created,
        ResourceState::Destroying,
        ResourceState::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceState::Creating => "creating",
            ResourceState::Created => "created",
            ResourceState::Destroying => "destroying",
            ResourceState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "creating" => Ok(ResourceState::Creating),
            "created" => Ok(ResourceState::Created),
            "destroying" => Ok(ResourceState::Destroying),
            "failed" => Ok(ResourceState::Failed),
            other => Err(format!("unknown resource state: {}", other)),
        }
    }
}

/// What kind of work created a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Build,
    Check,
    Task,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Build => "build",
            OwnerKind::Check => "check",
            OwnerKind::Task => "task",
        }
    }
}

/// Best-effort record of the build, check or task step that created a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribution {
    pub kind: OwnerKind,
    pub id: String,
}

impl Attribution {
    pub fn new(kind: OwnerKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

/// An ephemeral execution unit on a worker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    /// Opaque handle used by the worker API
    pub handle: String,

    /// Name of the worker hosting this container
    pub worker_name: String,

    pub state: ResourceState,

    pub created_at: DateTime<Utc>,

    pub owner: Option<Attribution>,
}

/// Persistent storage on a worker, optionally derived from a parent volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    /// Opaque handle used by the worker API
    pub handle: String,

    /// Name of the worker hosting this volume
    pub worker_name: String,

    pub state: ResourceState,

    pub created_at: DateTime<Utc>,

    pub owner: Option<Attribution>,

    /// Handle of the volume this one was derived from (cache/layer volumes)
    pub parent_handle: Option<String>,

    /// Handle of the container this volume is mounted into
    pub container_handle: Option<String>,
}

/// Reference to a reapable resource as returned by the tracker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub handle: String,
    pub worker_name: String,
}

impl From<&Container> for ResourceRef {
    fn from(container: &Container) -> Self {
        ResourceRef {
            kind: ResourceKind::Container,
            handle: container.handle.clone(),
            worker_name: container.worker_name.clone(),
        }
    }
}

impl From<&Volume> for ResourceRef {
    fn from(volume: &Volume) -> Self {
        ResourceRef {
            kind: ResourceKind::Volume,
            handle: volume.handle.clone(),
            worker_name: volume.worker_name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_round_trips_through_str() {
        for state in ResourceState::ALL {
            assert_eq!(state.as_str().parse::<ResourceState>(), Ok(state));
        }
        assert!("destroyed".parse::<ResourceState>().is_err());
    }

    #[test]
    fn test_categories_are_walked_in_lifecycle_order() {
        assert_eq!(ResourceState::ALL[0], ResourceState::Creating);
        assert_eq!(ResourceState::ALL[3], ResourceState::Failed);
    }
}
