//! Persisted test store
//!
//! RocksDB-backed storage with an in-memory working set. Every test lives
//! behind its own `RwLock` inside a `DashMap`; all mutation happens under the
//! write lock and the updated record is written to RocksDB before the lock is
//! released. That enforced single-writer cycle per test is what makes
//! concurrent visit/conversion recording lose no increments (the source
//! system's read-modify-write race).
//!
//! Per-visitor assignment records are persisted alongside the tests so
//! conversions can be validated against the variant a visitor was actually
//! assigned, and duplicate events can be deduplicated.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use rocksdb::{Options, DB};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::split_test::{SplitTest, SplitTestError};

const TEST_PREFIX: &str = "test:";
const ASSIGN_PREFIX: &str = "assign:";

/// Durable record of which variant a visitor was assigned
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub test_id: Uuid,
    pub visitor_id: String,
    pub variant: String,
    pub assigned_at: DateTime<Utc>,
    /// Set once the visitor's conversion has been counted; repeat
    /// conversions are dropped
    pub converted: bool,
}

pub struct SplitTestStore {
    db: Arc<DB>,
    tests: DashMap<Uuid, Arc<RwLock<SplitTest>>>,
}

impl SplitTestStore {
    /// Open the store, loading all persisted tests into the working set
    pub fn open(path: &Path) -> Result<Self, SplitTestError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = Arc::new(DB::open(&opts, path).map_err(storage_err)?);
        let tests = DashMap::new();

        let mut loaded = 0usize;
        for entry in db.prefix_iterator(TEST_PREFIX.as_bytes()) {
            let (key, value) = entry.map_err(storage_err)?;
            if !key.starts_with(TEST_PREFIX.as_bytes()) {
                break;
            }
            let (test, _): (SplitTest, _) =
                bincode::serde::decode_from_slice(&value, bincode::config::standard())
                    .map_err(storage_err)?;
            tests.insert(test.id, Arc::new(RwLock::new(test)));
            loaded += 1;
        }

        info!(tests = loaded, path = %path.display(), "split-test store opened");
        Ok(Self { db, tests })
    }

    fn test_key(id: Uuid) -> Vec<u8> {
        format!("{TEST_PREFIX}{id}").into_bytes()
    }

    fn assign_key(test_id: Uuid, visitor_id: &str) -> Vec<u8> {
        format!("{ASSIGN_PREFIX}{test_id}:{visitor_id}").into_bytes()
    }

    fn persist(&self, test: &SplitTest) -> Result<(), SplitTestError> {
        let bytes = bincode::serde::encode_to_vec(test, bincode::config::standard())
            .map_err(storage_err)?;
        self.db
            .put(Self::test_key(test.id), bytes)
            .map_err(storage_err)
    }

    /// Insert a new test. The id is freshly generated at creation so a
    /// collision means a caller bug, not a race.
    pub fn insert(&self, test: SplitTest) -> Result<(), SplitTestError> {
        self.persist(&test)?;
        self.tests.insert(test.id, Arc::new(RwLock::new(test)));
        Ok(())
    }

    /// Clone the current state of a test
    pub fn snapshot(&self, id: Uuid) -> Result<SplitTest, SplitTestError> {
        self.tests
            .get(&id)
            .map(|entry| entry.read().clone())
            .ok_or(SplitTestError::TestNotFound(id))
    }

    /// Run a mutation under the test's write lock, persisting the result
    /// before the lock is released. The closure's error aborts the write.
    pub fn with_test<R>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut SplitTest) -> Result<R, SplitTestError>,
    ) -> Result<R, SplitTestError> {
        let entry = self
            .tests
            .get(&id)
            .map(|e| Arc::clone(e.value()))
            .ok_or(SplitTestError::TestNotFound(id))?;

        let mut test = entry.write();
        let result = f(&mut test)?;
        self.persist(&test)?;
        Ok(result)
    }

    /// All tests belonging to a project, newest first
    pub fn list_project(&self, project_id: &str) -> Vec<SplitTest> {
        let mut tests: Vec<SplitTest> = self
            .tests
            .iter()
            .map(|entry| entry.value().read().clone())
            .filter(|t| t.project_id == project_id)
            .collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        tests
    }

    /// All tests, regardless of project
    pub fn list_all(&self) -> Vec<SplitTest> {
        self.tests
            .iter()
            .map(|entry| entry.value().read().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Delete a test and all of its assignment records
    pub fn delete(&self, id: Uuid) -> Result<(), SplitTestError> {
        self.tests
            .remove(&id)
            .ok_or(SplitTestError::TestNotFound(id))?;
        self.db.delete(Self::test_key(id)).map_err(storage_err)?;

        // Sweep this test's assignment records
        let prefix = format!("{ASSIGN_PREFIX}{id}:");
        let mut batch = rocksdb::WriteBatch::default();
        for entry in self.db.prefix_iterator(prefix.as_bytes()) {
            let (key, _) = entry.map_err(storage_err)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            batch.delete(key);
        }
        self.db.write(batch).map_err(storage_err)
    }

    pub fn assignment(
        &self,
        test_id: Uuid,
        visitor_id: &str,
    ) -> Result<Option<AssignmentRecord>, SplitTestError> {
        let value = self
            .db
            .get(Self::assign_key(test_id, visitor_id))
            .map_err(storage_err)?;
        match value {
            Some(bytes) => {
                let (record, _) =
                    bincode::serde::decode_from_slice(&bytes, bincode::config::standard())
                        .map_err(storage_err)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn put_assignment(&self, record: &AssignmentRecord) -> Result<(), SplitTestError> {
        let bytes = bincode::serde::encode_to_vec(record, bincode::config::standard())
            .map_err(storage_err)?;
        self.db
            .put(Self::assign_key(record.test_id, &record.visitor_id), bytes)
            .map_err(storage_err)
    }

    /// Flush RocksDB WAL and memtables; called on graceful shutdown
    pub fn flush(&self) -> Result<(), SplitTestError> {
        self.db.flush().map_err(storage_err)
    }

    /// Count of assignment records for a test (used by the metrics view
    /// consumers and tests; full scans are fine at this scale)
    pub fn assignment_count(&self, test_id: Uuid) -> Result<usize, SplitTestError> {
        let prefix = format!("{ASSIGN_PREFIX}{test_id}:");
        let mut count = 0;
        for entry in self.db.prefix_iterator(prefix.as_bytes()) {
            let (key, _) = entry.map_err(storage_err)?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }
}

fn storage_err(err: impl std::fmt::Display) -> SplitTestError {
    SplitTestError::Storage(err.to_string())
}
