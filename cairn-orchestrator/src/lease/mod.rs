//! Lease Module
//!
//! Cross-process mutual exclusion for collector sweeps. Acquisition never
//! blocks: a caller either gets the lease now or learns that another holder
//! owns it. Leases lapse on expiry, which is how a crashed holder's scope
//! becomes available again.

pub mod memory;
pub mod postgres;

pub use memory::MemoryLeaseManager;
pub use postgres::PgLeaseManager;

use async_trait::async_trait;
use cairn_core::domain::lease::Lease;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error("lease store error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid lease ttl: {0:?}")]
    InvalidTtl(Duration),
}

pub type Result<T> = std::result::Result<T, LeaseError>;

/// Arbitration primitive for scoped, time-bound exclusive tokens
#[async_trait]
pub trait LeaseManager: Send + Sync {
    /// Attempts to acquire the lease for `scope_key`
    ///
    /// Returns `None` when another holder owns an unexpired lease.
    /// Re-acquiring a lease the caller already holds extends it.
    async fn try_acquire(
        &self,
        scope_key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<Option<Lease>>;

    /// Extends a held lease; returns false when ownership changed
    async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<bool>;

    /// Releases a held lease early using compare-and-delete semantics
    async fn release(&self, lease: &Lease) -> Result<()>;
}

pub(crate) fn ttl_to_chrono(ttl: Duration) -> Result<chrono::Duration> {
    if ttl.is_zero() {
        return Err(LeaseError::InvalidTtl(ttl));
    }
    chrono::Duration::from_std(ttl).map_err(|_| LeaseError::InvalidTtl(ttl))
}
