//! Core domain types
//!
//! This module contains the fleet entities that the collectors reason about.
//! Rows for these types are created by the provisioning paths and are only
//! read and moved toward deletion by the collectors.

pub mod lease;
pub mod resource;
pub mod worker;
