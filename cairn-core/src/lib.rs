//! Cairn Core
//!
//! Core types shared by the Cairn garbage collector and its collaborators.
//!
//! This crate contains:
//! - Domain types: Workers, containers, volumes, leases and their lifecycle states
//! - DTOs: Payloads exchanged with workers, the scheduler and operators

pub mod domain;
pub mod dto;
