//! Persistence layer for the CRM webhook delivery backend.
//!
//! This crate contains:
//! - Database connection management
//! - Entity definitions (database row mappings)
//! - Postgres repositories implementing the domain store traits
//! - In-memory stores with the same semantics
//! - Database query metrics

pub mod db;
pub mod entities;
pub mod memory;
pub mod metrics;
pub mod repositories;

pub use memory::{InMemoryDeliveryStore, InMemoryEndpointStore};
