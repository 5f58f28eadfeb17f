//! Lease domain model
//!
//! A lease is a named, time-bound exclusive token. At most one holder
//! owns a scope key at any instant; an expired lease may be taken over.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope key guarding container collector sweeps
pub const CONTAINER_COLLECTOR_SCOPE: &str = "container-collector";

/// Scope key guarding volume collector sweeps
pub const VOLUME_COLLECTOR_SCOPE: &str = "volume-collector";

/// A granted lease
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    pub scope_key: String,
    pub holder_id: String,
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}
