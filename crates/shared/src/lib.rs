//! Shared utilities for the CRM webhook delivery backend.
//!
//! This crate provides common functionality used across all other crates:
//! - Webhook payload signing and verification (HMAC-SHA256)
//! - Webhook secret generation
//! - Common validation logic

pub mod crypto;
pub mod validation;
