//! Domain layer for the CRM webhook delivery backend.
//!
//! This crate contains:
//! - Domain models (endpoints, deliveries, event vocabulary)
//! - The retry policy that drives the delivery state machine
//! - Storage and transport traits the services are written against

pub mod models;
pub mod services;
