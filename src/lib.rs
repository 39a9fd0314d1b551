//! Splitgate Library
//!
//! Standalone A/B split-testing engine with a REST control surface.
//!
//! # Key Features
//! - Deterministic variant assignment (same visitor always gets same variant)
//! - Weighted variants with exact 100% weight-sum enforcement
//! - Wilson-score confidence intervals and significance testing
//! - Automatic test completion when a variant is significantly better
//! - Per-visitor assignment records for idempotent conversion attribution
//! - RocksDB embedded storage (no external database)

pub mod assignment;
pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod manager;
pub mod metrics;
pub mod middleware;
pub mod split_test;
pub mod stats;
pub mod store;
pub mod validation;

// Re-export dependencies to ensure tests use the same version
pub use chrono;
pub use parking_lot;
pub use uuid;
