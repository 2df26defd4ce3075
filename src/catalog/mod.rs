//! The datarange catalog (C1): transactional metadata over datasets,
//! dataranges, datapoints and the deferred-deletion queue (spec §3, §4.1).
//!
//! `Catalog` is a trait rather than a concrete struct so a second backend
//! (postgres, for multi-node deployments) can be added later without
//! touching callers. [`sqlite::SqliteCatalog`] is the only implementation
//! today.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::Result;

/// One datapoint to be inserted alongside a new datarange.
#[derive(Debug, Clone, Copy)]
pub struct DatapointInsert {
    pub key: u64,
    pub begin_offset: i64,
    pub end_offset: i64,
}

/// Aggregate row backing `GET /api/v1/datas3t` and `GET /api/v1/datas3t/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSummary {
    pub name: String,
    pub datarange_count: i64,
    pub total_size_bytes: i64,
}

/// A datarange row as stored (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatarangeRow {
    pub id: i64,
    pub object_key: String,
    pub min_key: u64,
    pub max_key: u64,
    pub size_bytes: i64,
}

/// One row of `get_sections_of_dataranges` (spec §4.1, feeds C4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRow {
    pub id: i64,
    pub object_key: String,
    pub size_bytes: i64,
    pub min_key: u64,
    pub max_key: u64,
    pub first_offset: i64,
    pub last_offset: i64,
}

/// A due row of the deletion queue (spec §3, §4.7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionQueueRow {
    pub id: String,
    pub object_key: String,
    pub delete_at: DateTime<Utc>,
}

/// A datarange the restore procedure (C8) decided to keep, with its
/// rehydrated datapoint offsets.
#[derive(Debug, Clone)]
pub struct RestoreKeptRange {
    pub object_key: String,
    pub min_key: u64,
    pub max_key: u64,
    pub size_bytes: i64,
    pub datapoints: Vec<DatapointInsert>,
}

/// The reconstruction plan for one dataset, produced by restore's overlap
/// resolution (spec §4.8 step 2) and applied atomically by
/// [`Catalog::restore`] (spec §4.8 step 3).
#[derive(Debug, Clone)]
pub struct RestoreDatasetPlan {
    pub name: String,
    pub kept: Vec<RestoreKeptRange>,
    /// `(object_key, sidecar_key)` pairs discarded by overlap resolution.
    pub discarded_keys: Vec<(String, String)>,
}

/// Transactional interface over datasets/dataranges/datapoints/deletion
/// queue (spec §4.1). Every method that touches more than one table commits
/// or rolls back as a unit.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn create_dataset(&self, name: &str) -> Result<()>;

    /// Cascades to dataranges/datapoints and enqueues their S3 objects (tar
    /// + sidecar) for immediate deletion, all in one transaction.
    async fn delete_dataset(&self, name: &str) -> Result<()>;

    async fn list_datasets(&self) -> Result<Vec<DatasetSummary>>;

    async fn get_dataset(&self, name: &str) -> Result<Option<DatasetSummary>>;

    /// `existing.min <= max AND existing.max >= min` for any existing
    /// datarange of `dataset`.
    async fn check_overlap(&self, dataset: &str, min: u64, max: u64) -> Result<bool>;

    /// Inserts a datarange and its datapoints as one transaction (spec §4.3
    /// step 8). Returns [`crate::error::Error::RangeOverlap`] without
    /// mutating anything if a concurrent writer raced us; the caller is then
    /// responsible for enqueueing the already-uploaded blob/sidecar for
    /// deletion (the catalog doesn't assume a sidecar key naming scheme).
    async fn insert_ingested_datarange(
        &self,
        dataset: &str,
        object_key: &str,
        min: u64,
        max: u64,
        size_bytes: i64,
        datapoints: &[DatapointInsert],
    ) -> Result<i64>;

    /// All dataranges of `dataset`, ordered by `min_key`.
    async fn get_dataranges(&self, dataset: &str) -> Result<Vec<DatarangeRow>>;

    /// Rows feeding the range planner (C4): dataranges overlapping
    /// `[start, end]`, each carrying the clipped first/last byte offsets
    /// (spec §4.1).
    async fn get_sections_of_dataranges(
        &self,
        dataset: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<SectionRow>>;

    async fn get_first_and_last_datapoint(&self, dataset: &str) -> Result<Option<(u64, u64)>>;

    /// Largest datapoint key per dataset name, `None` for datasets with no
    /// datapoints yet (feeds the `wait-datasets` endpoint).
    async fn get_largest_datapoint_for_datasets(
        &self,
        names: &[String],
    ) -> Result<HashMap<String, Option<u64>>>;

    async fn enqueue_deletion(&self, object_key: &str, delete_at: DateTime<Utc>) -> Result<()>;

    async fn enqueue_deletion_immediate(&self, object_key: &str) -> Result<()>;

    async fn get_due_deletions(&self, limit: i64) -> Result<Vec<DeletionQueueRow>>;

    async fn delete_queue_row(&self, id: &str) -> Result<()>;

    /// Compaction's atomic swap (spec §4.5 step 4): delete `old_ids`, enqueue
    /// their object/sidecar keys for deletion at `delete_at`, insert the new
    /// datarange and its datapoints. Returns the new datarange id.
    #[allow(clippy::too_many_arguments)]
    async fn replace_dataranges(
        &self,
        dataset: &str,
        old_ids: &[i64],
        new_object_key: &str,
        new_min: u64,
        new_max: u64,
        new_size_bytes: i64,
        new_datapoints: &[DatapointInsert],
        deleted_keys: &[(String, String)],
        delete_at: DateTime<Utc>,
    ) -> Result<i64>;

    /// Applies a full restore plan (spec §4.8 step 3) as one transaction:
    /// creates each dataset, inserts kept ranges and their datapoints,
    /// enqueues discarded ranges for immediate deletion.
    async fn restore(&self, plans: Vec<RestoreDatasetPlan>) -> Result<()>;

    /// True once any dataset has been created; restore (C8) only runs when
    /// this is false at startup.
    async fn has_any_dataset(&self) -> Result<bool>;
}
