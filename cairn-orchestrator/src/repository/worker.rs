//! Worker Repository
//!
//! Handles all database operations related to fleet workers.

use cairn_core::domain::worker::{Worker, WorkerState};
use sqlx::PgPool;

/// Create or update a worker in the database
pub async fn upsert(pool: &PgPool, worker: &Worker) -> Result<(), sqlx::Error> {
    let now = chrono::Utc::now();

    sqlx::query(
        r#"
        INSERT INTO workers (name, address, state, updated_at)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO UPDATE SET
            address = EXCLUDED.address,
            state = EXCLUDED.state,
            updated_at = EXCLUDED.updated_at
        "#,
    )
    .bind(&worker.name)
    .bind(&worker.address)
    .bind(worker.state.as_str())
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a worker by name
pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Worker>, sqlx::Error> {
    let row = sqlx::query_as::<_, WorkerRow>(
        r#"
        SELECT name, address, state
        FROM workers
        WHERE name = $1
        "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|r| r.into()))
}

/// List all workers
pub async fn list_all(pool: &PgPool) -> Result<Vec<Worker>, sqlx::Error> {
    let rows = sqlx::query_as::<_, WorkerRow>(
        r#"
        SELECT name, address, state
        FROM workers
        ORDER BY name ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|r| r.into()).collect())
}

/// Count the containers and volumes still tracked on a worker
pub async fn count_resources(pool: &PgPool, name: &str) -> Result<(i64, i64), sqlx::Error> {
    let counts: (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM containers WHERE worker_name = $1),
            (SELECT COUNT(*) FROM volumes WHERE worker_name = $1)
        "#,
    )
    .bind(name)
    .fetch_one(pool)
    .await?;

    Ok(counts)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct WorkerRow {
    name: String,
    address: String,
    state: String,
}

impl From<WorkerRow> for Worker {
    fn from(row: WorkerRow) -> Self {
        // Unknown states never receive deletes
        let state = row.state.parse().unwrap_or(WorkerState::Stalled);

        Worker {
            name: row.name,
            address: row.address,
            state,
        }
    }
}
