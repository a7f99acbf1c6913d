//! Shared utilities and types for feature modules
//!
//! - **pagination**: Common pagination types and helpers

pub mod pagination;

pub use pagination::{PaginationMetadata, PaginationParams};
