//! Custom Axum extractors.

pub mod owner;

pub use owner::{OwnerId, OWNER_ID_HEADER};
