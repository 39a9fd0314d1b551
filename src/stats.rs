//! Statistical primitives for split-test analysis
//!
//! Wilson-score confidence intervals and non-overlap significance testing
//! between two binomial proportions. All functions here are pure and
//! deterministic; the aggregation layer decides when to call them.

use serde::{Deserialize, Serialize};

/// Default confidence level for interval and significance computations
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Z-score lookup for supported confidence levels.
///
/// This is a deliberate approximation: unlisted levels fall back to the
/// 95% z-score rather than computing a precise inverse-normal. Bucketing
/// decisions do not need more resolution than this.
const Z_SCORES: &[(f64, f64)] = &[
    (0.80, 1.28),
    (0.85, 1.44),
    (0.90, 1.65),
    (0.95, 1.96),
    (0.99, 2.58),
    (0.999, 3.29),
];

const DEFAULT_Z: f64 = 1.96;

/// Map a confidence level to its z-score via the fixed lookup table
fn z_score(confidence: f64) -> f64 {
    Z_SCORES
        .iter()
        .find(|(level, _)| (level - confidence).abs() < 1e-9)
        .map(|(_, z)| *z)
        .unwrap_or(DEFAULT_Z)
}

/// A two-sided confidence interval over a proportion
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub upper: f64,
}

impl ConfidenceInterval {
    /// Two intervals are distinguishable when they do not overlap
    pub fn overlaps(&self, other: &ConfidenceInterval) -> bool {
        !(self.upper < other.lower || self.lower > other.upper)
    }
}

/// Observed counts for one side of a two-proportion comparison
#[derive(Debug, Clone, Copy)]
pub struct Proportion {
    pub conversions: u64,
    pub visitors: u64,
}

impl Proportion {
    pub fn rate(&self) -> f64 {
        if self.visitors == 0 {
            0.0
        } else {
            self.conversions as f64 / self.visitors as f64
        }
    }
}

/// Outcome of a control-vs-variant significance test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Significance {
    /// True exactly when the two confidence intervals do not overlap
    pub is_significant: bool,
    /// Relative conversion-rate change of the variant over the control,
    /// as a percentage. `None` when the control has zero conversions
    /// (the ratio is undefined, not infinite).
    pub improvement: Option<f64>,
    pub control_interval: ConfidenceInterval,
    pub variant_interval: ConfidenceInterval,
}

/// Wilson score interval for a binomial proportion.
///
/// Unlike the normal approximation, the Wilson interval stays inside [0, 1]
/// for well-formed inputs and never claims full certainty: even at a 100%
/// observed rate the lower bound stays below 1.
///
/// `visitors == 0` returns a degenerate `{0, 0}` interval rather than
/// dividing by zero.
pub fn wilson_interval(conversions: u64, visitors: u64, confidence: f64) -> ConfidenceInterval {
    if visitors == 0 {
        return ConfidenceInterval {
            lower: 0.0,
            upper: 0.0,
        };
    }

    let z = z_score(confidence);
    let n = visitors as f64;
    let p = conversions as f64 / n;

    let z2 = z * z;
    let denominator = 1.0 + z2 / n;
    let centre = p + z2 / (2.0 * n);
    let adjustment = z * ((p * (1.0 - p) + z2 / (4.0 * n)) / n).sqrt();

    ConfidenceInterval {
        lower: (centre - adjustment) / denominator,
        upper: (centre + adjustment) / denominator,
    }
}

/// Significance test between a control and a variant proportion.
///
/// Declares significance when the two Wilson intervals do not overlap.
/// This is conservative relative to a z-test for difference of proportions,
/// which is the right bias for an auto-completing test: a completed test
/// stops collecting data, so false positives are costlier than waiting.
pub fn significance(control: Proportion, variant: Proportion, confidence: f64) -> Significance {
    let control_interval = wilson_interval(control.conversions, control.visitors, confidence);
    let variant_interval = wilson_interval(variant.conversions, variant.visitors, confidence);

    let is_significant = !control_interval.overlaps(&variant_interval);

    let improvement = if control.conversions == 0 {
        None
    } else {
        Some((variant.rate() / control.rate() - 1.0) * 100.0)
    };

    Significance {
        is_significant,
        improvement,
        control_interval,
        variant_interval,
    }
}
