//! HTTP request tracking middleware for observability

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::time::Instant;

/// Middleware to track HTTP request latency and counts
pub async fn track_metrics(req: Request, next: Next) -> Result<Response, StatusCode> {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();

    // Process request
    let response = next.run(req).await;

    // Record metrics
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    // Normalize path to avoid high cardinality (group dynamic IDs)
    let normalized_path = normalize_path(&path);

    crate::metrics::HTTP_REQUEST_DURATION
        .with_label_values(&[&method, &normalized_path, &status])
        .observe(duration);

    crate::metrics::HTTP_REQUESTS_TOTAL
        .with_label_values(&[&method, &normalized_path, &status])
        .inc();

    Ok(response)
}

/// Normalize path to prevent metric cardinality explosion
/// /api/split-tests/550e8400-.../visit -> /api/split-tests/{id}/visit
fn normalize_path(path: &str) -> String {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    let mut normalized: Vec<&str> = Vec::with_capacity(parts.len());
    let mut prev = "";

    for part in parts {
        if prev == "variants" {
            // Variant names are caller-chosen; never emit them as labels
            normalized.push("{variant}");
        } else if is_id(part) {
            normalized.push("{id}");
        } else {
            normalized.push(part);
        }
        prev = part;
    }

    format!("/{}", normalized.join("/"))
}

/// Check if a path segment looks like an ID (UUID, numeric, project slug)
fn is_id(segment: &str) -> bool {
    // UUID pattern
    if segment.contains('-') && segment.len() >= 32 {
        return true;
    }

    // Numeric ID
    if !segment.is_empty() && segment.chars().all(|c| c.is_numeric()) {
        return true;
    }

    // Looks like a hash or long alphanumeric slug
    if segment.len() > 20 {
        return true;
    }

    // Project ID pattern (alphanumeric with digits, like "acme42" or "shop_001")
    let has_digit = segment.chars().any(|c| c.is_numeric());
    let is_alphanumeric = segment.chars().all(|c| c.is_alphanumeric() || c == '_');
    if has_digit && is_alphanumeric && segment.len() >= 4 {
        return true;
    }

    false
}
