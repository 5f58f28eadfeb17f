//! Postgres lease store
//!
//! A lease is a row in `gc_leases`. Acquisition is a single conditional
//! upsert, so the database arbitrates between racing processes. Expiry is
//! always computed and compared on the database clock; holders never
//! contribute their own notion of time.

use async_trait::async_trait;
use cairn_core::domain::lease::Lease;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Duration;

use super::{LeaseManager, Result, ttl_to_chrono};

pub struct PgLeaseManager {
    pool: PgPool,
}

impl PgLeaseManager {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseManager for PgLeaseManager {
    async fn try_acquire(
        &self,
        scope_key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<Option<Lease>> {
        let ttl = ttl_to_chrono(ttl)?;

        let granted: Option<(DateTime<Utc>,)> = sqlx::query_as(
            r#"
            INSERT INTO gc_leases (scope_key, holder_id, expires_at)
            VALUES ($1, $2, now() + $3::interval)
            ON CONFLICT (scope_key) DO UPDATE SET
                holder_id = EXCLUDED.holder_id,
                expires_at = EXCLUDED.expires_at
            WHERE gc_leases.expires_at <= now() OR gc_leases.holder_id = EXCLUDED.holder_id
            RETURNING expires_at
            "#,
        )
        .bind(scope_key)
        .bind(holder_id)
        .bind(ttl)
        .fetch_optional(&self.pool)
        .await?;

        Ok(granted.map(|(expires_at,)| Lease {
            scope_key: scope_key.to_string(),
            holder_id: holder_id.to_string(),
            expires_at,
        }))
    }

    async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<bool> {
        let ttl = ttl_to_chrono(ttl)?;

        let result = sqlx::query(
            r#"
            UPDATE gc_leases
            SET expires_at = now() + $1::interval
            WHERE scope_key = $2 AND holder_id = $3
            "#,
        )
        .bind(ttl)
        .bind(&lease.scope_key)
        .bind(&lease.holder_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, lease: &Lease) -> Result<()> {
        sqlx::query("DELETE FROM gc_leases WHERE scope_key = $1 AND holder_id = $2")
            .bind(&lease.scope_key)
            .bind(&lease.holder_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
