//! Data Transfer Objects
//!
//! Payloads exchanged over HTTP between the orchestrator, workers and
//! the scheduling collaborators that feed telemetry into it.

pub mod resource;
pub mod telemetry;
pub mod worker;
