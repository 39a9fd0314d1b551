//! Input validation for the HTTP surface
//!
//! Length and charset checks on caller-supplied identifiers. The weight-sum
//! invariant lives with the test model; this module only guards the opaque
//! strings that arrive over the wire.

use anyhow::{anyhow, Result};

/// Maximum lengths for caller-supplied identifiers
pub const MAX_VISITOR_ID_LENGTH: usize = 128;
pub const MAX_PROJECT_ID_LENGTH: usize = 128;
pub const MAX_TEST_NAME_LENGTH: usize = 256;
pub const MAX_DESCRIPTION_LENGTH: usize = 2_000;
pub const MAX_VARIANTS_PER_TEST: usize = 20;
pub const MAX_VARIANT_NAME_LENGTH: usize = 128;
pub const MAX_VARIANT_PATH_LENGTH: usize = 1_024;

fn validate_identifier(value: &str, what: &str, max_len: usize) -> Result<()> {
    if value.is_empty() {
        return Err(anyhow!("{what} cannot be empty"));
    }

    if value.len() > max_len {
        return Err(anyhow!(
            "{what} too long: {} chars (max: {max_len})",
            value.len()
        ));
    }

    // Only allow alphanumeric, dash, underscore, dot
    if !value
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(anyhow!(
            "{what} contains invalid characters (allowed: alphanumeric, -, _, .)"
        ));
    }

    Ok(())
}

/// Validate an opaque visitor identifier
pub fn validate_visitor_id(visitor_id: &str) -> Result<()> {
    validate_identifier(visitor_id, "visitor_id", MAX_VISITOR_ID_LENGTH)
}

/// Validate a project identifier
pub fn validate_project_id(project_id: &str) -> Result<()> {
    validate_identifier(project_id, "project_id", MAX_PROJECT_ID_LENGTH)
}

/// Validate a test name (free text, just bounded)
pub fn validate_test_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(anyhow!("test name cannot be empty"));
    }
    if name.len() > MAX_TEST_NAME_LENGTH {
        return Err(anyhow!(
            "test name too long: {} chars (max: {MAX_TEST_NAME_LENGTH})",
            name.len()
        ));
    }
    Ok(())
}

/// Validate an optional description
pub fn validate_description(description: &str) -> Result<()> {
    if description.len() > MAX_DESCRIPTION_LENGTH {
        return Err(anyhow!(
            "description too long: {} chars (max: {MAX_DESCRIPTION_LENGTH})",
            description.len()
        ));
    }
    Ok(())
}

/// Bound the variant list shape before the model validates weights
pub fn validate_variant_shape(count: usize, names: &[&str], paths: &[&str]) -> Result<()> {
    if count > MAX_VARIANTS_PER_TEST {
        return Err(anyhow!(
            "too many variants: {count} (max: {MAX_VARIANTS_PER_TEST})"
        ));
    }
    for name in names {
        if name.len() > MAX_VARIANT_NAME_LENGTH {
            return Err(anyhow!(
                "variant name too long: {} chars (max: {MAX_VARIANT_NAME_LENGTH})",
                name.len()
            ));
        }
    }
    for path in paths {
        if path.len() > MAX_VARIANT_PATH_LENGTH {
            return Err(anyhow!(
                "variant path too long: {} chars (max: {MAX_VARIANT_PATH_LENGTH})",
                path.len()
            ));
        }
    }
    Ok(())
}
