//! Resource DTOs
//!
//! Payloads the provisioning path sends when it starts creating a container
//! or volume on a worker. Every new resource is tracked as `creating` until
//! the worker confirms it.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::domain::resource::{Attribution, Container, ResourceState, Volume};

/// Request to start tracking a container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterContainer {
    pub handle: String,

    /// Worker the container is being created on
    pub worker_name: String,

    #[serde(default)]
    pub owner: Option<Attribution>,
}

impl From<RegisterContainer> for Container {
    fn from(req: RegisterContainer) -> Self {
        Container {
            handle: req.handle,
            worker_name: req.worker_name,
            state: ResourceState::Creating,
            created_at: Utc::now(),
            owner: req.owner,
        }
    }
}

/// Request to start tracking a volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterVolume {
    pub handle: String,

    pub worker_name: String,

    #[serde(default)]
    pub owner: Option<Attribution>,

    /// Volume this one is derived from; must already be tracked
    #[serde(default)]
    pub parent_handle: Option<String>,

    #[serde(default)]
    pub container_handle: Option<String>,
}

impl From<RegisterVolume> for Volume {
    fn from(req: RegisterVolume) -> Self {
        Volume {
            handle: req.handle,
            worker_name: req.worker_name,
            state: ResourceState::Creating,
            created_at: Utc::now(),
            owner: req.owner,
            parent_handle: req.parent_handle,
            container_handle: req.container_handle,
        }
    }
}
