//! Split-test manager
//!
//! Orchestrates the store, the assignment function, and the test model into
//! the operations the HTTP surface exposes. All counter mutation funnels
//! through `SplitTestStore::with_test`, so the manager never does an
//! unguarded read-modify-write.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::assignment;
use crate::metrics;
use crate::split_test::{
    CompletionPolicy, MetricsReport, SplitTest, SplitTestError, TargetingConditions, TestStatus,
    TestUpdate, Variant,
};
use crate::store::{AssignmentRecord, SplitTestStore};

/// Outcome of handling a visit: the variant the visitor belongs to and
/// whether this was a repeat visit (counted once, served consistently)
#[derive(Debug, Clone)]
pub struct VisitOutcome {
    pub test_id: Uuid,
    pub variant: String,
    /// Redirect path for the assigned variant
    pub path: String,
    pub deduped: bool,
}

/// Outcome of recording a conversion
#[derive(Debug, Clone)]
pub struct ConversionOutcome {
    pub test_id: Uuid,
    pub variant: String,
    pub deduped: bool,
}

/// Per-status test counts, used by the health endpoint
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ManagerSummary {
    pub total: usize,
    pub active: usize,
    pub paused: usize,
    pub completed: usize,
}

pub struct SplitTestManager {
    store: SplitTestStore,
}

impl SplitTestManager {
    pub fn new(store: SplitTestStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &SplitTestStore {
        &self.store
    }

    /// Create a test for a project. Weight validation happens in the model.
    /// An explicit `start_date` backdates or schedules the test; the default
    /// is now.
    pub fn create_test(
        &self,
        project_id: String,
        name: String,
        description: Option<String>,
        variants: Vec<Variant>,
        conditions: Option<TargetingConditions>,
        policy: CompletionPolicy,
        start_date: Option<DateTime<Utc>>,
    ) -> Result<SplitTest, SplitTestError> {
        let mut test =
            SplitTest::create(project_id, name, description, variants, conditions, policy)?;
        if let Some(start) = start_date {
            test.start_date = start;
        }
        info!(test_id = %test.id, project = %test.project_id, name = %test.name, "split test created");
        self.store.insert(test.clone())?;
        Ok(test)
    }

    pub fn list_project_tests(&self, project_id: &str) -> Vec<SplitTest> {
        self.store.list_project(project_id)
    }

    pub fn get_test(&self, id: Uuid) -> Result<SplitTest, SplitTestError> {
        self.store.snapshot(id)
    }

    pub fn update_test(&self, id: Uuid, update: TestUpdate) -> Result<SplitTest, SplitTestError> {
        self.store.with_test(id, |test| {
            let was = test.status;
            test.apply_update(update)?;
            if was != TestStatus::Completed && test.status == TestStatus::Completed {
                metrics::TESTS_COMPLETED_TOTAL
                    .with_label_values(&["manual"])
                    .inc();
            }
            Ok(test.clone())
        })
    }

    pub fn delete_test(&self, id: Uuid) -> Result<(), SplitTestError> {
        self.store.delete(id)?;
        info!(test_id = %id, "split test deleted");
        Ok(())
    }

    /// Rebalance one variant's weight; the others absorb the delta
    /// proportionally and the total stays exactly 100
    pub fn update_variant_weight(
        &self,
        id: Uuid,
        variant_name: &str,
        new_weight: f64,
    ) -> Result<SplitTest, SplitTestError> {
        self.store.with_test(id, |test| {
            test.rebalance_weight(variant_name, new_weight)?;
            Ok(test.clone())
        })
    }

    /// Computed metrics view; read-only, recomputed fresh on every call
    pub fn metrics_report(&self, id: Uuid) -> Result<MetricsReport, SplitTestError> {
        Ok(self.store.snapshot(id)?.metrics_report())
    }

    /// Complete an active test whose duration cap has elapsed. Returns true
    /// if the test was expired by this call.
    fn expire_if_due(&self, id: Uuid) -> Result<bool, SplitTestError> {
        if !self.store.snapshot(id)?.is_expired() {
            return Ok(false);
        }
        self.store.with_test(id, |test| {
            // Re-check under the lock: another request may have expired it
            if test.is_expired() {
                test.expire();
                metrics::TESTS_COMPLETED_TOTAL
                    .with_label_values(&["expired"])
                    .inc();
                info!(test_id = %test.id, "split test expired without a winner");
            }
            Ok(())
        })?;
        Ok(true)
    }

    /// Handle a visit: deterministically assign the visitor to a variant,
    /// count it once, and persist the assignment record.
    ///
    /// A repeat visit from the same visitor returns the same variant without
    /// touching the counters. This is what makes visit recording idempotent
    /// and conversions attributable.
    pub fn record_visit(
        &self,
        test_id: Uuid,
        visitor_id: &str,
    ) -> Result<VisitOutcome, SplitTestError> {
        self.expire_if_due(test_id)?;

        self.store.with_test(test_id, |test| {
            if test.status != TestStatus::Active {
                return Err(SplitTestError::TestNotActive {
                    test_id,
                    status: test.status,
                });
            }

            // Read the assignment record under the test's write lock:
            // two concurrent first visits from the same visitor serialize
            // here, and the second one sees the record the first wrote
            let existing = self.store.assignment(test_id, visitor_id)?;

            // Honor an existing assignment as long as its variant still
            // exists; a variant removed by an update forces reassignment
            if let Some(record) = &existing {
                if let Some(variant) = test.variant(&record.variant) {
                    debug!(test_id = %test_id, visitor = visitor_id, variant = %variant.name, "repeat visit");
                    return Ok(VisitOutcome {
                        test_id,
                        variant: variant.name.clone(),
                        path: variant.path.clone(),
                        deduped: true,
                    });
                }
            }

            let variant = assignment::select_variant(test, visitor_id).clone();
            test.record_visit(&variant.name)?;

            self.store.put_assignment(&AssignmentRecord {
                test_id,
                visitor_id: visitor_id.to_string(),
                variant: variant.name.clone(),
                assigned_at: Utc::now(),
                converted: false,
            })?;

            Ok(VisitOutcome {
                test_id,
                variant: variant.name,
                path: variant.path,
                deduped: false,
            })
        })
    }

    /// Record a conversion for a visitor.
    ///
    /// The conversion is attributed to the variant the visitor was actually
    /// assigned; a caller-supplied variant name is cross-checked rather than
    /// trusted, and a visitor with no recorded visit cannot convert. A second
    /// conversion from the same visitor is a deduplicated no-op.
    pub fn record_conversion(
        &self,
        test_id: Uuid,
        visitor_id: &str,
        claimed_variant: Option<&str>,
    ) -> Result<ConversionOutcome, SplitTestError> {
        self.expire_if_due(test_id)?;

        self.store.with_test(test_id, |test| {
            // The record read and the `converted` check happen under the
            // test's write lock, so two concurrent conversions from the
            // same visitor serialize and the second one dedups
            let record = self
                .store
                .assignment(test_id, visitor_id)?
                .ok_or_else(|| SplitTestError::NoAssignment {
                    test_id,
                    visitor_id: visitor_id.to_string(),
                })?;

            if let Some(claimed) = claimed_variant {
                if claimed != record.variant {
                    return Err(SplitTestError::VariantMismatch {
                        visitor_id: visitor_id.to_string(),
                        assigned: record.variant,
                        claimed: claimed.to_string(),
                    });
                }
            }

            if record.converted {
                return Ok(ConversionOutcome {
                    test_id,
                    variant: record.variant,
                    deduped: true,
                });
            }

            test.record_conversion(&record.variant)?;
            self.store.put_assignment(&AssignmentRecord {
                converted: true,
                ..record.clone()
            })?;

            if test.status == TestStatus::Completed {
                metrics::TESTS_COMPLETED_TOTAL
                    .with_label_values(&["winner"])
                    .inc();
                info!(
                    test_id = %test.id,
                    winner = test.winner.as_deref().unwrap_or("-"),
                    "split test auto-completed"
                );
            }

            Ok(ConversionOutcome {
                test_id,
                variant: record.variant.clone(),
                deduped: false,
            })
        })
    }

    /// Per-status counts across all tests
    pub fn summary(&self) -> ManagerSummary {
        let mut summary = ManagerSummary::default();
        for test in self.store.list_all() {
            summary.total += 1;
            match test.status {
                TestStatus::Active => summary.active += 1,
                TestStatus::Paused => summary.paused += 1,
                TestStatus::Completed => summary.completed += 1,
            }
        }
        summary
    }

    /// Flush storage; called on graceful shutdown
    pub fn flush(&self) -> Result<(), SplitTestError> {
        self.store.flush()
    }
}
