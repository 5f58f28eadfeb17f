//! In-memory lease store
//!
//! Single-process arbitration for development and tests. The map is guarded
//! by one mutex, so check-and-set is atomic across tasks.

use async_trait::async_trait;
use cairn_core::domain::lease::Lease;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::{LeaseManager, Result, ttl_to_chrono};

#[derive(Default)]
pub struct MemoryLeaseManager {
    leases: Mutex<HashMap<String, Lease>>,
}

impl MemoryLeaseManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current holder of a scope, if its lease has not expired
    pub fn holder(&self, scope_key: &str) -> Option<String> {
        let leases = self.leases.lock().unwrap();
        leases
            .get(scope_key)
            .filter(|lease| !lease.is_expired_at(Utc::now()))
            .map(|lease| lease.holder_id.clone())
    }
}

#[async_trait]
impl LeaseManager for MemoryLeaseManager {
    async fn try_acquire(
        &self,
        scope_key: &str,
        holder_id: &str,
        ttl: Duration,
    ) -> Result<Option<Lease>> {
        let ttl = ttl_to_chrono(ttl)?;
        let now = Utc::now();
        let mut leases = self.leases.lock().unwrap();

        if let Some(existing) = leases.get(scope_key) {
            if !existing.is_expired_at(now) && existing.holder_id != holder_id {
                return Ok(None);
            }
        }

        let lease = Lease {
            scope_key: scope_key.to_string(),
            holder_id: holder_id.to_string(),
            expires_at: now + ttl,
        };
        leases.insert(scope_key.to_string(), lease.clone());

        Ok(Some(lease))
    }

    async fn renew(&self, lease: &Lease, ttl: Duration) -> Result<bool> {
        let ttl = ttl_to_chrono(ttl)?;
        let mut leases = self.leases.lock().unwrap();

        match leases.get_mut(&lease.scope_key) {
            Some(current) if current.holder_id == lease.holder_id => {
                current.expires_at = Utc::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, lease: &Lease) -> Result<()> {
        let mut leases = self.leases.lock().unwrap();

        if leases
            .get(&lease.scope_key)
            .is_some_and(|current| current.holder_id == lease.holder_id)
        {
            leases.remove(&lease.scope_key);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lease::LeaseError;
    use std::sync::Arc;

    const TTL: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_second_holder_is_refused_until_expiry() {
        let manager = MemoryLeaseManager::new();

        let first = manager.try_acquire("container-collector", "atc-1", TTL).await.unwrap();
        assert!(first.is_some());

        let second = manager.try_acquire("container-collector", "atc-2", TTL).await.unwrap();
        assert!(second.is_none());
        assert_eq!(manager.holder("container-collector").as_deref(), Some("atc-1"));
    }

    #[tokio::test]
    async fn test_scopes_are_independent() {
        let manager = MemoryLeaseManager::new();

        let containers = manager
            .try_acquire("container-collector", "atc-1", TTL)
            .await
            .unwrap();
        let volumes = manager
            .try_acquire("volume-collector", "atc-2", TTL)
            .await
            .unwrap();

        assert!(containers.is_some());
        assert!(volumes.is_some());
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let manager = MemoryLeaseManager::new();

        manager
            .try_acquire("volume-collector", "atc-1", Duration::from_millis(20))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let lease = manager.try_acquire("volume-collector", "atc-2", TTL).await.unwrap();
        assert_eq!(lease.map(|l| l.holder_id).as_deref(), Some("atc-2"));
    }

    #[tokio::test]
    async fn test_renew_fails_after_takeover() {
        let manager = MemoryLeaseManager::new();

        let stale = manager
            .try_acquire("volume-collector", "atc-1", Duration::from_millis(20))
            .await
            .unwrap()
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.try_acquire("volume-collector", "atc-2", TTL).await.unwrap();

        assert!(!manager.renew(&stale, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_only_by_holder() {
        let manager = MemoryLeaseManager::new();
        let lease = manager
            .try_acquire("container-collector", "atc-1", TTL)
            .await
            .unwrap()
            .unwrap();

        let impostor = Lease {
            holder_id: "atc-2".to_string(),
            ..lease.clone()
        };
        manager.release(&impostor).await.unwrap();
        assert_eq!(manager.holder("container-collector").as_deref(), Some("atc-1"));

        manager.release(&lease).await.unwrap();
        assert!(manager.holder("container-collector").is_none());
    }

    #[tokio::test]
    async fn test_concurrent_acquire_has_one_winner() {
        let manager = Arc::new(MemoryLeaseManager::new());

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let manager = Arc::clone(&manager);
                tokio::spawn(async move {
                    manager
                        .try_acquire("container-collector", &format!("atc-{}", i), TTL)
                        .await
                        .unwrap()
                        .is_some()
                })
            })
            .collect();

        let mut granted = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn test_zero_ttl_is_rejected() {
        let manager = MemoryLeaseManager::new();
        let result = manager.try_acquire("container-collector", "atc-1", Duration::ZERO).await;
        assert!(matches!(result, Err(LeaseError::InvalidTtl(_))));
    }
}
