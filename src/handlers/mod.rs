//! HTTP API Handlers - Modular organization of the REST API
//!
//! Each submodule handles a specific domain of functionality.

pub mod health;
pub mod router;

// Re-export commonly used items
pub use router::{build_protected_routes, build_public_routes, build_router, AppState};
