//! Core types for poststack
//!
//! This crate provides the error taxonomy and request identifiers shared
//! across the poststack crates.

pub mod error;
pub mod request_id;

pub use error::{ApiError, ErrorCode};
pub use request_id::RequestId;
