//! Container Repository
//!
//! Handles all database operations related to container bookkeeping.

use cairn_core::domain::resource::{Container, ResourceKind, ResourceRef, ResourceState};
use sqlx::PgPool;

use super::ResourceRefRow;

/// Insert a container row written by the provisioning path
pub async fn insert(pool: &PgPool, container: &Container) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO containers (handle, worker_name, state, created_at, owner_kind, owner_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(&container.handle)
    .bind(&container.worker_name)
    .bind(container.state.as_str())
    .bind(container.created_at)
    .bind(container.owner.as_ref().map(|o| o.kind.as_str()))
    .bind(container.owner.as_ref().map(|o| o.id.as_str()))
    .execute(pool)
    .await?;

    Ok(())
}

/// Containers in `Creating` that were created before `cutoff`
pub async fn find_stale_creating(
    pool: &PgPool,
    cutoff: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<ResourceRef>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ResourceRefRow>(
        r#"
        SELECT handle, worker_name
        FROM containers
        WHERE state = 'creating' AND created_at < $1
        ORDER BY created_at ASC, handle ASC
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(ResourceRefRow::into_refs(rows, ResourceKind::Container))
}

/// Containers in `Created` whose owner is missing, unknown or no longer live
pub async fn find_unreferenced_created(pool: &PgPool) -> Result<Vec<ResourceRef>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ResourceRefRow>(
        r#"
        SELECT c.handle, c.worker_name
        FROM containers c
        LEFT JOIN resource_owners o ON o.kind = c.owner_kind AND o.id = c.owner_id
        WHERE c.state = 'created' AND (c.owner_kind IS NULL OR o.live = FALSE)
        ORDER BY c.created_at ASC, c.handle ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ResourceRefRow::into_refs(rows, ResourceKind::Container))
}

/// All containers in the given state
pub async fn find_by_state(
    pool: &PgPool,
    state: ResourceState,
) -> Result<Vec<ResourceRef>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ResourceRefRow>(
        r#"
        SELECT handle, worker_name
        FROM containers
        WHERE state = $1
        ORDER BY created_at ASC, handle ASC
        "#,
    )
    .bind(state.as_str())
    .fetch_all(pool)
    .await?;

    Ok(ResourceRefRow::into_refs(rows, ResourceKind::Container))
}

/// Compare-and-swap the state of a container
pub async fn transition(
    pool: &PgPool,
    handle: &str,
    from: ResourceState,
    to: ResourceState,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE containers SET state = $1 WHERE handle = $2 AND state = $3")
        .bind(to.as_str())
        .bind(handle)
        .bind(from.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a container row
pub async fn delete(pool: &PgPool, handle: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM containers WHERE handle = $1")
        .bind(handle)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
