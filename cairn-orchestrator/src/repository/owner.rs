//! Owner Repository
//!
//! Liveness of the builds, checks and task steps that resources are
//! attributed to. Written by the scheduling path, joined by candidate queries.

use cairn_core::domain::resource::Attribution;
use sqlx::PgPool;

/// Record whether an owner is still live
pub async fn set_live(pool: &PgPool, owner: &Attribution, live: bool) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO resource_owners (kind, id, live, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (kind, id) DO UPDATE SET
            live = EXCLUDED.live,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(owner.kind.as_str())
    .bind(&owner.id)
    .bind(live)
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}
