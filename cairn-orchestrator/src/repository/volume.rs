//! Volume Repository
//!
//! Handles all database operations related to volume bookkeeping.
//!
//! Every candidate query excludes volumes that still have a child row:
//! destroyed children are deleted, so any remaining child is non-terminal.

use cairn_core::domain::resource::{ResourceKind, ResourceRef, ResourceState, Volume};
use sqlx::PgPool;

use super::ResourceRefRow;

/// Insert a volume row written by the provisioning path
pub async fn insert(pool: &PgPool, volume: &Volume) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO volumes (
            handle, worker_name, state, created_at, owner_kind, owner_id,
            parent_handle, container_handle
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&volume.handle)
    .bind(&volume.worker_name)
    .bind(volume.state.as_str())
    .bind(volume.created_at)
    .bind(volume.owner.as_ref().map(|o| o.kind.as_str()))
    .bind(volume.owner.as_ref().map(|o| o.id.as_str()))
    .bind(&volume.parent_handle)
    .bind(&volume.container_handle)
    .execute(pool)
    .await?;

    Ok(())
}

/// Whether a volume row exists
pub async fn exists(pool: &PgPool, handle: &str) -> Result<bool, sqlx::Error> {
    let found: Option<(String,)> = sqlx::query_as("SELECT handle FROM volumes WHERE handle = $1")
        .bind(handle)
        .fetch_optional(pool)
        .await?;

    Ok(found.is_some())
}

/// Childless volumes in `Creating` that were created before `cutoff`
pub async fn find_stale_creating(
    pool: &PgPool,
    cutoff: chrono::DateTime<chrono::Utc>,
) -> Result<Vec<ResourceRef>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ResourceRefRow>(
        r#"
        SELECT v.handle, v.worker_name
        FROM volumes v
        WHERE v.state = 'creating' AND v.created_at < $1
        AND NOT EXISTS (SELECT 1 FROM volumes child WHERE child.parent_handle = v.handle)
        ORDER BY v.created_at ASC, v.handle ASC
        "#,
    )
    .bind(cutoff)
    .fetch_all(pool)
    .await?;

    Ok(ResourceRefRow::into_refs(rows, ResourceKind::Volume))
}

/// Childless volumes in `Created` with no live owner and no surviving container
pub async fn find_unreferenced_created(pool: &PgPool) -> Result<Vec<ResourceRef>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ResourceRefRow>(
        r#"
        SELECT v.handle, v.worker_name
        FROM volumes v
        LEFT JOIN resource_owners o ON o.kind = v.owner_kind AND o.id = v.owner_id
        WHERE v.state = 'created' AND (v.owner_kind IS NULL OR o.live = FALSE)
        AND (
            v.container_handle IS NULL
            OR NOT EXISTS (SELECT 1 FROM containers c WHERE c.handle = v.container_handle)
        )
        AND NOT EXISTS (SELECT 1 FROM volumes child WHERE child.parent_handle = v.handle)
        ORDER BY v.created_at ASC, v.handle ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(ResourceRefRow::into_refs(rows, ResourceKind::Volume))
}

/// Childless volumes in the given state
pub async fn find_by_state(
    pool: &PgPool,
    state: ResourceState,
) -> Result<Vec<ResourceRef>, sqlx::Error> {
    let rows = sqlx::query_as::<_, ResourceRefRow>(
        r#"
        SELECT v.handle, v.worker_name
        FROM volumes v
        WHERE v.state = $1
        AND NOT EXISTS (SELECT 1 FROM volumes child WHERE child.parent_handle = v.handle)
        ORDER BY v.created_at ASC, v.handle ASC
        "#,
    )
    .bind(state.as_str())
    .fetch_all(pool)
    .await?;

    Ok(ResourceRefRow::into_refs(rows, ResourceKind::Volume))
}

/// Compare-and-swap the state of a volume
pub async fn transition(
    pool: &PgPool,
    handle: &str,
    from: ResourceState,
    to: ResourceState,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE volumes SET state = $1 WHERE handle = $2 AND state = $3")
        .bind(to.as_str())
        .bind(handle)
        .bind(from.as_str())
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a volume row
///
/// Fails with a foreign key violation while child rows reference it.
pub async fn delete(pool: &PgPool, handle: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM volumes WHERE handle = $1")
        .bind(handle)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
