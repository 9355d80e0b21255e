//! HTTP route handlers.

pub mod health;
pub mod webhook_deliveries;
pub mod webhook_events;
pub mod webhooks;
