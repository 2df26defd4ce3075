//! Wire shapes for the HTTP surface (spec §6). Kept separate from the
//! catalog's own row types so a column rename in the store never leaks into
//! the API contract.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::{DatarangeRow, DatasetSummary};
use crate::range_planner::PlannedRange;

#[derive(Debug, Serialize)]
pub struct DatasetDto {
    pub id: String,
    pub datarange_count: i64,
    pub total_size_bytes: i64,
}

impl From<DatasetSummary> for DatasetDto {
    fn from(s: DatasetSummary) -> Self {
        Self { id: s.name, datarange_count: s.datarange_count, total_size_bytes: s.total_size_bytes }
    }
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub dataset_id: String,
    pub num_data_points: usize,
}

#[derive(Debug, Serialize)]
pub struct DatarangeDto {
    pub object_key: String,
    pub min_datapoint_key: u64,
    pub max_datapoint_key: u64,
    pub size_bytes: i64,
}

impl From<DatarangeRow> for DatarangeDto {
    fn from(r: DatarangeRow) -> Self {
        Self { object_key: r.object_key, min_datapoint_key: r.min_key, max_datapoint_key: r.max_key, size_bytes: r.size_bytes }
    }
}

#[derive(Debug, Serialize)]
pub struct PlannedRangeDto {
    pub get_url: String,
    pub start: i64,
    pub end: i64,
}

impl From<PlannedRange> for PlannedRangeDto {
    fn from(r: PlannedRange) -> Self {
        Self { get_url: r.get_url, start: r.start, end: r.end }
    }
}

#[derive(Debug, Serialize)]
pub struct AggregateResponse {
    pub ranges_replaced: usize,
    pub new_object_key: String,
}

#[derive(Debug, Serialize)]
pub struct MissingRange {
    pub start: u64,
    pub end: u64,
}

#[derive(Debug, Serialize)]
pub struct MissingRangesResponse {
    pub first_datapoint: Option<u64>,
    pub last_datapoint: Option<u64>,
    pub missing_ranges: Vec<MissingRange>,
}

#[derive(Debug, Serialize)]
pub struct UploadInitiateResponse {
    pub upload_id: Uuid,
    pub dataset_id: String,
}

#[derive(Debug, Serialize)]
pub struct UploadPartResponse {
    pub part_id: u32,
}

#[derive(Debug, Deserialize)]
pub struct CompletePartsRequest {
    pub part_ids: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub status: &'static str,
    pub upload_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct MultipartUploadStatusDto {
    pub upload_id: Uuid,
    pub dataset_id: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub part_numbers: Vec<u32>,
}

#[derive(Debug, Deserialize)]
pub struct WaitRequest {
    pub datasets: HashMap<String, u64>,
}

#[derive(Debug, Serialize)]
pub struct WaitResponse {
    pub datasets: HashMap<String, u64>,
}
