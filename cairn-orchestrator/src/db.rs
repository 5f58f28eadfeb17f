use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Create workers table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS workers (
            name VARCHAR(255) PRIMARY KEY,
            address TEXT NOT NULL,
            state VARCHAR(50) NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create owners table (builds, checks and task steps resources are attributed to)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS resource_owners (
            kind VARCHAR(20) NOT NULL,
            id VARCHAR(255) NOT NULL,
            live BOOLEAN NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (kind, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create containers table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS containers (
            handle VARCHAR(255) PRIMARY KEY,
            worker_name VARCHAR(255) NOT NULL REFERENCES workers(name),
            state VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            owner_kind VARCHAR(20),
            owner_id VARCHAR(255)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create volumes table; a parent row cannot be deleted while children reference it
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS volumes (
            handle VARCHAR(255) PRIMARY KEY,
            worker_name VARCHAR(255) NOT NULL REFERENCES workers(name),
            state VARCHAR(20) NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            owner_kind VARCHAR(20),
            owner_id VARCHAR(255),
            parent_handle VARCHAR(255) REFERENCES volumes(handle),
            container_handle VARCHAR(255)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create leases table
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS gc_leases (
            scope_key VARCHAR(255) PRIMARY KEY,
            holder_id VARCHAR(255) NOT NULL,
            expires_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for candidate queries
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_containers_state ON containers(state, created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_containers_worker ON containers(worker_name)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_volumes_state ON volumes(state, created_at)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_volumes_worker ON volumes(worker_name)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_volumes_parent ON volumes(parent_handle)")
        .execute(pool)
        .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
