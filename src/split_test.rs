//! Split-test model, lifecycle, and metric aggregation
//!
//! A test owns both its configuration (ordered weighted variants) and its
//! accumulated counters; no separate event log is kept. Visit and conversion
//! events are absorbed into counters immediately and every mutation runs the
//! completion check, so auto-completion is a side effect of recording, not a
//! scheduled job.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::stats::{self, Proportion};

/// Default minimum visitors per variant before significance is consulted
pub const DEFAULT_MIN_VISITORS: u64 = 100;

/// Default minimum conversions per variant before significance is consulted
pub const DEFAULT_MIN_CONVERSIONS: u64 = 10;

/// Tolerance for the weight-sum invariant. Weights are percentages and the
/// sum must be 100; the epsilon only absorbs float representation error
/// (e.g. 33.33 + 33.33 + 33.34), not sloppy input.
pub const WEIGHT_SUM_EPSILON: f64 = 1e-6;

/// Status of a split test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    /// Collecting traffic and mutating metrics
    Active,
    /// Manual hold: no assignment, no metric mutation
    Paused,
    /// Concluded, automatically or manually; counters are frozen
    Completed,
}

impl TestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestStatus::Active => "active",
            TestStatus::Paused => "paused",
            TestStatus::Completed => "completed",
        }
    }
}

/// One arm of a split test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variant {
    pub name: String,
    /// Redirect path served to visitors assigned to this variant
    pub path: String,
    /// Percentage of traffic, 0-100. Weights across a test sum to 100.
    pub weight: f64,
}

/// Optional targeting metadata. Purely descriptive: consumed by external
/// callers deciding whether to enroll a visitor, never evaluated here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetingConditions {
    #[serde(default)]
    pub target_url: Option<String>,
    #[serde(default)]
    pub device_types: Vec<String>,
    #[serde(default)]
    pub user_segments: Vec<String>,
}

/// Completion policy, configurable per test at creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionPolicy {
    /// Minimum visitors every variant needs before significance is consulted
    pub min_visitors: u64,
    /// Minimum conversions every variant needs before significance is consulted
    pub min_conversions: u64,
    /// Confidence level for interval and significance computations
    pub confidence: f64,
    /// Optional duration cap: an undecided test past this age completes
    /// without a winner
    #[serde(default)]
    pub max_duration_hours: Option<u64>,
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self {
            min_visitors: DEFAULT_MIN_VISITORS,
            min_conversions: DEFAULT_MIN_CONVERSIONS,
            confidence: stats::DEFAULT_CONFIDENCE,
            max_duration_hours: None,
        }
    }
}

/// Live counters for one variant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantMetrics {
    pub variant_name: String,
    pub visitors: u64,
    pub conversions: u64,
    /// Percentage 0-100, two decimal places, recomputed on every event
    pub conversion_rate: f64,
}

impl VariantMetrics {
    fn zeroed(variant_name: &str) -> Self {
        Self {
            variant_name: variant_name.to_string(),
            visitors: 0,
            conversions: 0,
            conversion_rate: 0.0,
        }
    }

    fn recompute_rate(&mut self) {
        self.conversion_rate = if self.visitors == 0 {
            0.0
        } else {
            round2(self.conversions as f64 / self.visitors as f64 * 100.0)
        };
    }

    fn proportion(&self) -> Proportion {
        Proportion {
            conversions: self.conversions,
            visitors: self.visitors,
        }
    }
}

/// Aggregated counters for a test
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestMetrics {
    pub total_visitors: u64,
    /// 1:1 with `variants` by name, in variant order
    pub variant_metrics: Vec<VariantMetrics>,
}

impl TestMetrics {
    fn get_mut(&mut self, variant_name: &str) -> Option<&mut VariantMetrics> {
        self.variant_metrics
            .iter_mut()
            .find(|m| m.variant_name == variant_name)
    }

    pub fn get(&self, variant_name: &str) -> Option<&VariantMetrics> {
        self.variant_metrics
            .iter()
            .find(|m| m.variant_name == variant_name)
    }
}

/// Fields a caller may change on an existing test
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub variants: Option<Vec<Variant>>,
    pub conditions: Option<TargetingConditions>,
    /// Manual lifecycle transition (pause, resume, complete)
    pub status: Option<TestStatus>,
}

/// A split test: sole source of truth for both configuration and metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitTest {
    pub id: Uuid,
    pub project_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Ordered: the first variant is the control, and assignment walks this
    /// order cumulatively (reordering remaps visitors)
    pub variants: Vec<Variant>,
    pub status: TestStatus,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    pub metrics: TestMetrics,
    #[serde(default)]
    pub conditions: Option<TargetingConditions>,
    pub policy: CompletionPolicy,
    /// Variant that triggered auto-completion, if any
    #[serde(default)]
    pub winner: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SplitTest {
    /// Create a new test. Validates variants and initializes zeroed counters.
    pub fn create(
        project_id: String,
        name: String,
        description: Option<String>,
        variants: Vec<Variant>,
        conditions: Option<TargetingConditions>,
        policy: CompletionPolicy,
    ) -> Result<Self, SplitTestError> {
        validate_variants(&variants)?;

        let now = Utc::now();
        let metrics = TestMetrics {
            total_visitors: 0,
            variant_metrics: variants
                .iter()
                .map(|v| VariantMetrics::zeroed(&v.name))
                .collect(),
        };

        Ok(Self {
            id: Uuid::new_v4(),
            project_id,
            name,
            description,
            variants,
            status: TestStatus::Active,
            start_date: now,
            end_date: None,
            metrics,
            conditions,
            policy,
            winner: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// The designated control for significance comparisons
    pub fn control(&self) -> &Variant {
        &self.variants[0]
    }

    pub fn variant(&self, name: &str) -> Option<&Variant> {
        self.variants.iter().find(|v| v.name == name)
    }

    /// Apply a partial update.
    ///
    /// When variants change, counters are preserved for variants whose name
    /// is unchanged; new or renamed variants start from zero. Renaming a
    /// variant therefore resets its counters.
    pub fn apply_update(&mut self, update: TestUpdate) -> Result<(), SplitTestError> {
        if let Some(variants) = update.variants {
            validate_variants(&variants)?;

            let old_metrics = std::mem::take(&mut self.metrics.variant_metrics);
            self.metrics.variant_metrics = variants
                .iter()
                .map(|v| {
                    old_metrics
                        .iter()
                        .find(|m| m.variant_name == v.name)
                        .cloned()
                        .unwrap_or_else(|| VariantMetrics::zeroed(&v.name))
                })
                .collect();
            self.variants = variants;
        }

        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(description) = update.description {
            self.description = Some(description);
        }
        if let Some(conditions) = update.conditions {
            self.conditions = Some(conditions);
        }
        if let Some(status) = update.status {
            self.transition(status);
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    /// Manual lifecycle transition. Completing sets the end date; moving a
    /// completed test back to active clears it (re-opening a test is allowed
    /// but the frozen counters carry over).
    fn transition(&mut self, status: TestStatus) {
        if self.status == status {
            return;
        }
        self.status = status;
        match status {
            TestStatus::Completed => self.end_date = Some(Utc::now()),
            TestStatus::Active | TestStatus::Paused => self.end_date = None,
        }
    }

    /// Set one variant's weight and redistribute the delta across the other
    /// variants, proportionally to their current share of the non-target
    /// weight pool. After clamping at zero the others are renormalized so the
    /// total is exactly 100 again.
    pub fn rebalance_weight(
        &mut self,
        variant_name: &str,
        new_weight: f64,
    ) -> Result<(), SplitTestError> {
        if !(0.0..=100.0).contains(&new_weight) {
            return Err(SplitTestError::InvalidWeights(format!(
                "weight must be between 0 and 100, got {new_weight}"
            )));
        }

        let target_idx = self
            .variants
            .iter()
            .position(|v| v.name == variant_name)
            .ok_or_else(|| SplitTestError::VariantNotFound {
                test_id: self.id,
                variant: variant_name.to_string(),
            })?;

        let old_weight = self.variants[target_idx].weight;
        let delta = new_weight - old_weight;
        let other_total: f64 = self
            .variants
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target_idx)
            .map(|(_, v)| v.weight)
            .sum();

        self.variants[target_idx].weight = new_weight;

        if self.variants.len() == 1 {
            // Single-variant test: weight must stay 100
            self.variants[target_idx].weight = 100.0;
            return Ok(());
        }

        if other_total > 0.0 {
            for (i, v) in self.variants.iter_mut().enumerate() {
                if i != target_idx {
                    v.weight = (v.weight - delta * (v.weight / other_total)).max(0.0);
                }
            }
        }

        // Renormalize the others so the invariant holds even after clamping
        // (or when the pool was already all-zero)
        let remainder = 100.0 - new_weight;
        let clamped_total: f64 = self
            .variants
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != target_idx)
            .map(|(_, v)| v.weight)
            .sum();

        if clamped_total > 0.0 {
            let scale = remainder / clamped_total;
            for (i, v) in self.variants.iter_mut().enumerate() {
                if i != target_idx {
                    v.weight *= scale;
                }
            }
        } else {
            // Everything else is at zero: split the remainder evenly
            let others = (self.variants.len() - 1) as f64;
            for (i, v) in self.variants.iter_mut().enumerate() {
                if i != target_idx {
                    v.weight = remainder / others;
                }
            }
        }

        self.updated_at = Utc::now();
        Ok(())
    }

    fn require_active(&self) -> Result<(), SplitTestError> {
        if self.status != TestStatus::Active {
            return Err(SplitTestError::TestNotActive {
                test_id: self.id,
                status: self.status,
            });
        }
        Ok(())
    }

    /// Record one visit against a variant. Fails unless the test is active.
    /// Runs the completion check as a side effect.
    pub fn record_visit(&mut self, variant_name: &str) -> Result<(), SplitTestError> {
        self.require_active()?;

        let id = self.id;
        let entry = self
            .metrics
            .get_mut(variant_name)
            .ok_or_else(|| SplitTestError::VariantNotFound {
                test_id: id,
                variant: variant_name.to_string(),
            })?;

        entry.visitors += 1;
        entry.recompute_rate();
        self.metrics.total_visitors += 1;
        self.updated_at = Utc::now();

        self.check_completion();
        Ok(())
    }

    /// Record one conversion against a variant. A conversion is assumed to
    /// follow a prior visit, so no visitor counter moves here. Fails unless
    /// the test is active. Runs the completion check as a side effect.
    pub fn record_conversion(&mut self, variant_name: &str) -> Result<(), SplitTestError> {
        self.require_active()?;

        let id = self.id;
        let entry = self
            .metrics
            .get_mut(variant_name)
            .ok_or_else(|| SplitTestError::VariantNotFound {
                test_id: id,
                variant: variant_name.to_string(),
            })?;

        entry.conversions += 1;
        entry.recompute_rate();
        self.updated_at = Utc::now();

        self.check_completion();
        Ok(())
    }

    /// Auto-complete when every variant has met the policy thresholds and
    /// some non-control variant is both significantly different from the
    /// control and strictly better. Records the winning variant.
    fn check_completion(&mut self) {
        let thresholds_met = self.metrics.variant_metrics.iter().all(|m| {
            m.visitors >= self.policy.min_visitors && m.conversions >= self.policy.min_conversions
        });
        if !thresholds_met {
            return;
        }

        let control = match self.metrics.get(&self.control().name.clone()) {
            Some(m) => m.clone(),
            None => return,
        };

        let mut winner = None;
        for m in self.metrics.variant_metrics.iter().skip(1) {
            let result =
                stats::significance(control.proportion(), m.proportion(), self.policy.confidence);
            if result.is_significant && m.conversion_rate > control.conversion_rate {
                winner = Some(m.variant_name.clone());
                break;
            }
        }

        if let Some(name) = winner {
            self.winner = Some(name);
            self.status = TestStatus::Completed;
            self.end_date = Some(Utc::now());
        }
    }

    /// True when the policy's duration cap has elapsed on an active test
    pub fn is_expired(&self) -> bool {
        match self.policy.max_duration_hours {
            Some(hours) if self.status == TestStatus::Active => {
                Utc::now().signed_duration_since(self.start_date) > Duration::hours(hours as i64)
            }
            _ => false,
        }
    }

    /// Complete an expired test without declaring a winner
    pub fn expire(&mut self) {
        if self.status == TestStatus::Active {
            self.status = TestStatus::Completed;
            self.end_date = Some(Utc::now());
            self.updated_at = Utc::now();
        }
    }

    /// Computed read-only metrics view: static config joined with live
    /// counters, fresh Wilson intervals, and significance vs the control for
    /// every non-control variant. No caching, no side effects.
    pub fn metrics_report(&self) -> MetricsReport {
        let control_name = &self.control().name;
        let control_counts = self
            .metrics
            .get(control_name)
            .map(|m| m.proportion())
            .unwrap_or(Proportion {
                conversions: 0,
                visitors: 0,
            });

        let variants = self
            .variants
            .iter()
            .map(|v| {
                let counters = self
                    .metrics
                    .get(&v.name)
                    .cloned()
                    .unwrap_or_else(|| VariantMetrics::zeroed(&v.name));
                let is_control = v.name == *control_name;
                let significance = if is_control {
                    None
                } else {
                    Some(stats::significance(
                        control_counts,
                        counters.proportion(),
                        self.policy.confidence,
                    ))
                };

                VariantReport {
                    name: v.name.clone(),
                    path: v.path.clone(),
                    weight: v.weight,
                    is_control,
                    visitors: counters.visitors,
                    conversions: counters.conversions,
                    conversion_rate: counters.conversion_rate,
                    confidence_interval: stats::wilson_interval(
                        counters.conversions,
                        counters.visitors,
                        self.policy.confidence,
                    ),
                    significance,
                }
            })
            .collect();

        MetricsReport {
            test_id: self.id,
            name: self.name.clone(),
            status: self.status,
            total_visitors: self.metrics.total_visitors,
            start_date: self.start_date,
            end_date: self.end_date,
            winner: self.winner.clone(),
            confidence: self.policy.confidence,
            variants,
        }
    }
}

/// Per-variant slice of the computed metrics view
#[derive(Debug, Clone, Serialize)]
pub struct VariantReport {
    pub name: String,
    pub path: String,
    pub weight: f64,
    pub is_control: bool,
    pub visitors: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
    pub confidence_interval: stats::ConfidenceInterval,
    /// Significance vs the control; absent on the control itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub significance: Option<stats::Significance>,
}

/// Computed metrics view for a whole test
#[derive(Debug, Clone, Serialize)]
pub struct MetricsReport {
    pub test_id: Uuid,
    pub name: String,
    pub status: TestStatus,
    pub total_visitors: u64,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    pub winner: Option<String>,
    pub confidence: f64,
    pub variants: Vec<VariantReport>,
}

/// Validate a variant list: non-empty, unique names, weights in range and
/// summing to exactly 100 (within float-representation tolerance)
pub fn validate_variants(variants: &[Variant]) -> Result<(), SplitTestError> {
    if variants.is_empty() {
        return Err(SplitTestError::InvalidWeights(
            "a test needs at least one variant".to_string(),
        ));
    }

    for v in variants {
        if v.name.trim().is_empty() {
            return Err(SplitTestError::InvalidWeights(
                "variant names cannot be empty".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&v.weight) || !v.weight.is_finite() {
            return Err(SplitTestError::InvalidWeights(format!(
                "variant '{}' weight {} is outside 0-100",
                v.name, v.weight
            )));
        }
    }

    for (i, v) in variants.iter().enumerate() {
        if variants[..i].iter().any(|other| other.name == v.name) {
            return Err(SplitTestError::InvalidWeights(format!(
                "duplicate variant name '{}'",
                v.name
            )));
        }
    }

    let sum: f64 = variants.iter().map(|v| v.weight).sum();
    if (sum - 100.0).abs() > WEIGHT_SUM_EPSILON {
        return Err(SplitTestError::InvalidWeights(format!(
            "variant weights must sum to 100, got {sum}"
        )));
    }

    Ok(())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors from split-test operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SplitTestError {
    #[error("Test not found: {0}")]
    TestNotFound(Uuid),

    #[error("Test {test_id} is {}, not active", status.as_str())]
    TestNotActive { test_id: Uuid, status: TestStatus },

    #[error("Test {test_id} has no variant named '{variant}'")]
    VariantNotFound { test_id: Uuid, variant: String },

    #[error("Invalid variant weights: {0}")]
    InvalidWeights(String),

    #[error("No recorded visit for visitor '{visitor_id}' in test {test_id}")]
    NoAssignment { test_id: Uuid, visitor_id: String },

    #[error(
        "Visitor '{visitor_id}' was assigned '{assigned}' but a conversion \
         was reported for '{claimed}'"
    )]
    VariantMismatch {
        visitor_id: String,
        assigned: String,
        claimed: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variants(weights: &[(&str, f64)]) -> Vec<Variant> {
        weights
            .iter()
            .map(|(name, weight)| Variant {
                name: (*name).to_string(),
                path: format!("/{name}"),
                weight: *weight,
            })
            .collect()
    }

    fn make_test(weights: &[(&str, f64)]) -> SplitTest {
        SplitTest::create(
            "proj".into(),
            "checkout-flow".into(),
            None,
            variants(weights),
            None,
            CompletionPolicy::default(),
        )
        .expect("valid test")
    }

    #[test]
    fn create_validates_weight_sum() {
        let err = SplitTest::create(
            "proj".into(),
            "bad".into(),
            None,
            variants(&[("control", 60.0), ("b", 50.0)]),
            None,
            CompletionPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SplitTestError::InvalidWeights(_)));
    }

    #[test]
    fn create_rejects_duplicate_names() {
        let err = SplitTest::create(
            "proj".into(),
            "bad".into(),
            None,
            variants(&[("control", 50.0), ("control", 50.0)]),
            None,
            CompletionPolicy::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SplitTestError::InvalidWeights(_)));
    }

    #[test]
    fn create_accepts_float_representation_drift() {
        let test = make_test(&[("a", 33.33), ("b", 33.33), ("c", 33.34)]);
        assert_eq!(test.variants.len(), 3);
        assert_eq!(test.status, TestStatus::Active);
        assert_eq!(test.metrics.variant_metrics.len(), 3);
        assert!(test
            .metrics
            .variant_metrics
            .iter()
            .all(|m| m.visitors == 0 && m.conversions == 0));
    }

    #[test]
    fn visits_and_conversions_update_counters_and_rate() {
        let mut test = make_test(&[("control", 50.0), ("b", 50.0)]);

        for _ in 0..3 {
            test.record_visit("b").unwrap();
        }
        test.record_conversion("b").unwrap();

        let m = test.metrics.get("b").unwrap();
        assert_eq!(m.visitors, 3);
        assert_eq!(m.conversions, 1);
        assert_eq!(m.conversion_rate, 33.33);
        assert_eq!(test.metrics.total_visitors, 3);
    }

    #[test]
    fn recording_fails_when_paused() {
        let mut test = make_test(&[("control", 50.0), ("b", 50.0)]);
        test.apply_update(TestUpdate {
            status: Some(TestStatus::Paused),
            ..Default::default()
        })
        .unwrap();

        let err = test.record_visit("b").unwrap_err();
        assert!(matches!(err, SplitTestError::TestNotActive { .. }));
    }

    #[test]
    fn recording_unknown_variant_fails() {
        let mut test = make_test(&[("control", 50.0), ("b", 50.0)]);
        let err = test.record_visit("nope").unwrap_err();
        assert!(matches!(err, SplitTestError::VariantNotFound { .. }));
    }

    #[test]
    fn update_preserves_metrics_by_name_and_resets_renamed() {
        let mut test = make_test(&[("control", 50.0), ("b", 50.0)]);
        test.record_visit("control").unwrap();
        test.record_visit("b").unwrap();
        test.record_conversion("b").unwrap();

        // Rename "b" to "challenger": its counters reset, control's survive
        test.apply_update(TestUpdate {
            variants: Some(variants(&[("control", 30.0), ("challenger", 70.0)])),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(test.metrics.get("control").unwrap().visitors, 1);
        let renamed = test.metrics.get("challenger").unwrap();
        assert_eq!(renamed.visitors, 0);
        assert_eq!(renamed.conversions, 0);
        assert!(test.metrics.get("b").is_none());
    }

    #[test]
    fn update_revalidates_weights() {
        let mut test = make_test(&[("control", 50.0), ("b", 50.0)]);
        let err = test
            .apply_update(TestUpdate {
                variants: Some(variants(&[("control", 10.0), ("b", 10.0)])),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SplitTestError::InvalidWeights(_)));
    }

    #[test]
    fn rebalance_redistributes_proportionally() {
        let mut test = make_test(&[("a", 50.0), ("b", 30.0), ("c", 20.0)]);
        test.rebalance_weight("a", 60.0).unwrap();

        // Delta of 10 taken from b and c in a 3:2 ratio
        assert_eq!(test.variant("a").unwrap().weight, 60.0);
        assert!((test.variant("b").unwrap().weight - 24.0).abs() < 1e-9);
        assert!((test.variant("c").unwrap().weight - 16.0).abs() < 1e-9);

        let sum: f64 = test.variants.iter().map(|v| v.weight).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rebalance_conserves_sum_after_clamping() {
        // Pushing one variant to 100 while the pool is tiny used to leave
        // the sum short; renormalization keeps the invariant
        let mut test = make_test(&[("a", 98.0), ("b", 1.0), ("c", 1.0)]);
        test.rebalance_weight("a", 100.0).unwrap();

        let sum: f64 = test.variants.iter().map(|v| v.weight).sum();
        assert!((sum - 100.0).abs() < 1e-9);
        assert_eq!(test.variant("b").unwrap().weight, 0.0);
        assert_eq!(test.variant("c").unwrap().weight, 0.0);
    }

    #[test]
    fn rebalance_from_all_zero_pool_splits_evenly() {
        let mut test = make_test(&[("a", 100.0), ("b", 0.0), ("c", 0.0)]);
        test.rebalance_weight("a", 40.0).unwrap();

        assert!((test.variant("b").unwrap().weight - 30.0).abs() < 1e-9);
        assert!((test.variant("c").unwrap().weight - 30.0).abs() < 1e-9);
        let sum: f64 = test.variants.iter().map(|v| v.weight).sum();
        assert!((sum - 100.0).abs() < 1e-9);
    }

    #[test]
    fn rebalance_rejects_out_of_range_weight() {
        let mut test = make_test(&[("a", 50.0), ("b", 50.0)]);
        assert!(test.rebalance_weight("a", 120.0).is_err());
        assert!(test.rebalance_weight("a", -1.0).is_err());
    }

    #[test]
    fn auto_completes_when_variant_significantly_better() {
        // 150 visits each, 20 vs 40 conversions: intervals separate
        // exactly at the 40th conversion
        let mut test = make_test(&[("control", 50.0), ("b", 50.0)]);
        for _ in 0..150 {
            test.record_visit("control").unwrap();
            test.record_visit("b").unwrap();
        }
        for _ in 0..20 {
            test.record_conversion("control").unwrap();
        }
        for _ in 0..39 {
            test.record_conversion("b").unwrap();
        }
        assert_eq!(test.status, TestStatus::Active);

        // The 40th conversion tips significance
        test.record_conversion("b").unwrap();
        assert_eq!(test.status, TestStatus::Completed);
        assert_eq!(test.winner.as_deref(), Some("b"));
        assert!(test.end_date.is_some());

        assert_eq!(test.metrics.get("control").unwrap().conversion_rate, 13.33);
        assert_eq!(test.metrics.get("b").unwrap().conversion_rate, 26.67);

        // Counters are frozen after completion
        assert!(test.record_visit("b").is_err());
    }

    #[test]
    fn no_completion_below_thresholds() {
        // Identical 2x separation, but under the 100-visitor floor
        let mut test = make_test(&[("control", 50.0), ("b", 50.0)]);
        for _ in 0..50 {
            test.record_visit("control").unwrap();
            test.record_visit("b").unwrap();
        }
        for _ in 0..10 {
            test.record_conversion("control").unwrap();
        }
        for _ in 0..20 {
            test.record_conversion("b").unwrap();
        }
        assert_eq!(test.status, TestStatus::Active);
        assert!(test.winner.is_none());
    }

    #[test]
    fn no_completion_when_variant_worse() {
        // Significant difference but the challenger is worse than control
        let mut test = make_test(&[("control", 50.0), ("b", 50.0)]);
        for _ in 0..150 {
            test.record_visit("control").unwrap();
            test.record_visit("b").unwrap();
        }
        for _ in 0..40 {
            test.record_conversion("control").unwrap();
        }
        for _ in 0..10 {
            test.record_conversion("b").unwrap();
        }
        assert_eq!(test.status, TestStatus::Active);
        assert!(test.winner.is_none());
    }

    #[test]
    fn custom_policy_thresholds_apply() {
        let mut test = SplitTest::create(
            "proj".into(),
            "fast-test".into(),
            None,
            variants(&[("control", 50.0), ("b", 50.0)]),
            None,
            CompletionPolicy {
                min_visitors: 20,
                min_conversions: 2,
                confidence: 0.95,
                max_duration_hours: None,
            },
        )
        .unwrap();

        for _ in 0..20 {
            test.record_visit("control").unwrap();
            test.record_visit("b").unwrap();
        }
        for _ in 0..2 {
            test.record_conversion("control").unwrap();
        }
        // Record until auto-completion freezes the counters
        let mut recorded = 0;
        while test.status == TestStatus::Active && recorded < 20 {
            test.record_conversion("b").unwrap();
            recorded += 1;
        }
        assert_eq!(test.status, TestStatus::Completed);
        assert_eq!(test.winner.as_deref(), Some("b"));
        assert!(recorded < 20, "should complete well before 20 conversions");
    }

    #[test]
    fn expiry_completes_without_winner() {
        let mut test = SplitTest::create(
            "proj".into(),
            "short-lived".into(),
            None,
            variants(&[("control", 50.0), ("b", 50.0)]),
            None,
            CompletionPolicy {
                max_duration_hours: Some(1),
                ..Default::default()
            },
        )
        .unwrap();

        assert!(!test.is_expired());
        test.start_date = Utc::now() - Duration::hours(2);
        assert!(test.is_expired());

        test.expire();
        assert_eq!(test.status, TestStatus::Completed);
        assert!(test.winner.is_none());
    }

    #[test]
    fn metrics_report_joins_config_and_counters() {
        let mut test = make_test(&[("control", 50.0), ("b", 50.0)]);
        for _ in 0..10 {
            test.record_visit("control").unwrap();
            test.record_visit("b").unwrap();
        }
        test.record_conversion("b").unwrap();

        let report = test.metrics_report();
        assert_eq!(report.total_visitors, 20);
        assert_eq!(report.variants.len(), 2);

        let control = &report.variants[0];
        assert!(control.is_control);
        assert!(control.significance.is_none());
        assert_eq!(control.path, "/control");

        let b = &report.variants[1];
        assert!(!b.is_control);
        assert_eq!(b.conversions, 1);
        let sig = b.significance.as_ref().unwrap();
        assert!(!sig.is_significant);
        // Control has zero conversions: improvement is undefined, not Inf
        assert!(sig.improvement.is_none());
        assert!(b.confidence_interval.lower <= b.confidence_interval.upper);
    }
}
