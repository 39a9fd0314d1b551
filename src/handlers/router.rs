//! Router Configuration - Centralized route definitions
//!
//! Routes are split into public (no auth) and protected (auth required).
//! The visit and conversion endpoints are public: they are hit by visitor
//! traffic, not by dashboard operators.

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;

use super::{health, split_tests};
use crate::manager::SplitTestManager;

/// Application state type alias
pub type AppState = Arc<SplitTestManager>;

/// Build the public routes (no authentication required)
///
/// These routes must always be accessible for:
/// - Health checks (Kubernetes probes)
/// - Metrics (Prometheus scraping)
/// - Visitor traffic recording (visits and conversions carry no API key)
pub fn build_public_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // HEALTH & KUBERNETES PROBES
        // =================================================================
        .route("/health", get(health::health))
        .route("/health/live", get(health::health_live))
        .route("/health/ready", get(health::health_ready))
        // =================================================================
        // METRICS (PROMETHEUS)
        // =================================================================
        .route("/metrics", get(health::metrics_endpoint))
        // =================================================================
        // VISITOR TRAFFIC
        // =================================================================
        .route(
            "/api/split-tests/{test_id}/visit",
            post(split_tests::record_visit),
        )
        .route(
            "/api/split-tests/{test_id}/conversion",
            post(split_tests::record_conversion),
        )
        // =================================================================
        // STATE
        // =================================================================
        .with_state(state)
}

/// Build the protected API routes (authentication required)
///
/// These routes require API key authentication and are rate-limited.
/// The auth middleware and rate limiter should be applied by the caller.
pub fn build_protected_routes(state: AppState) -> Router {
    Router::new()
        // =================================================================
        // TEST MANAGEMENT (PER PROJECT)
        // =================================================================
        .route(
            "/api/split-tests/project/{project_id}",
            get(split_tests::list_project_tests),
        )
        .route(
            "/api/split-tests/project/{project_id}",
            post(split_tests::create_test),
        )
        // =================================================================
        // TEST CRUD
        // =================================================================
        .route("/api/split-tests/{test_id}", get(split_tests::get_test))
        .route("/api/split-tests/{test_id}", put(split_tests::update_test))
        .route(
            "/api/split-tests/{test_id}",
            delete(split_tests::delete_test),
        )
        // =================================================================
        // TRAFFIC ALLOCATION
        // =================================================================
        .route(
            "/api/split-tests/{test_id}/variants/{variant_name}",
            patch(split_tests::update_variant_weight),
        )
        // =================================================================
        // METRICS VIEW
        // =================================================================
        .route(
            "/api/split-tests/{test_id}/metrics",
            get(split_tests::get_metrics),
        )
        // =================================================================
        // STATE
        // =================================================================
        .with_state(state)
}

/// Build the complete router with both public and protected routes
///
/// Note: This function does NOT apply auth middleware or rate limiting.
/// The caller (main.rs) should apply those layers as needed.
pub fn build_router(state: AppState) -> Router {
    let public = build_public_routes(state.clone());
    let protected = build_protected_routes(state);

    Router::new().merge(public).merge(protected)
}
