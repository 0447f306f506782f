//! dashgate — background access validation for multi-platform dashboards.

pub mod arbiter;
pub mod cache;
pub mod config;
pub mod error;
pub mod guard;
pub mod platform;
pub mod status;
pub mod sync;
