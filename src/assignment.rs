//! Deterministic variant assignment
//!
//! Buckets a visitor identifier into one of the test's weighted variants.
//! The same `(test, visitor_id)` pair always yields the same variant, so
//! visitors get a consistent experience without any per-visitor state being
//! required at assignment time (assignment records exist for conversion
//! attribution, not for routing).

use md5::{Digest, Md5};

use crate::split_test::{SplitTest, Variant};

/// Normalize a visitor id into [0, 1).
///
/// MD5 is used purely for uniform distribution of the hash space, not for
/// any security property; the first 4 digest bytes are read as a big-endian
/// u32 and divided by 2^32.
pub fn bucket(visitor_id: &str) -> f64 {
    let digest = Md5::digest(visitor_id.as_bytes());
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    f64::from(value) / (u64::from(u32::MAX) + 1) as f64
}

/// Select the variant a visitor falls into.
///
/// Walks the ordered variant list accumulating `weight/100` until the
/// cumulative weight exceeds the visitor's bucket value. Because this is a
/// cumulative walk over an ordered list, reordering variants remaps visitors;
/// assignment is stable per order, not per variant identity. That ordering
/// dependence is intentional and must be preserved.
///
/// Falls back to the first variant if floating-point rounding leaves the
/// cumulative sum short of the bucket value (guards against weights summing
/// to slightly less than 1.0).
pub fn select_variant<'a>(test: &'a SplitTest, visitor_id: &str) -> &'a Variant {
    let point = bucket(visitor_id);

    let mut cumulative = 0.0;
    for variant in &test.variants {
        cumulative += variant.weight / 100.0;
        if point < cumulative {
            return variant;
        }
    }

    // Rounding shortfall: weights validated to sum to 100 can still
    // accumulate to fractionally less than 1.0
    &test.variants[0]
}
