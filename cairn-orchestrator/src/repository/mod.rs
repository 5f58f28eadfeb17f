//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository handles database operations for a specific fleet entity.

pub mod container;
pub mod owner;
pub mod volume;
pub mod worker;

// Re-export for convenience
pub use container as container_repository;
pub use owner as owner_repository;
pub use volume as volume_repository;
pub use worker as worker_repository;

use cairn_core::domain::resource::{ResourceKind, ResourceRef};

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
pub(crate) struct ResourceRefRow {
    handle: String,
    worker_name: String,
}

impl ResourceRefRow {
    pub(crate) fn into_refs(rows: Vec<ResourceRefRow>, kind: ResourceKind) -> Vec<ResourceRef> {
        rows.into_iter()
            .map(|row| ResourceRef {
                kind,
                handle: row.handle,
                worker_name: row.worker_name,
            })
            .collect()
    }
}
