//! `{id}`-scoped datarange endpoints: tar upload, listing, download
//! planning, compaction, and gap reporting (C3/C4/C5, spec §4.3–§4.5).

use axum::extract::{Path, Request, State};
use axum::Json;
use serde::Deserialize;

use crate::api::dto::{
    AggregateResponse, DatarangeDto, IngestResponse, MissingRange, MissingRangesResponse,
    PlannedRangeDto,
};
use crate::api::extractors::DatasetName;
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::{compaction, ingest, range_planner};

pub async fn upload_tar(
    State(state): State<AppState>,
    DatasetName(id): DatasetName,
    request: Request,
) -> Result<Json<IngestResponse>> {
    state
        .catalog
        .get_dataset(&id)
        .await?
        .ok_or_else(|| Error::NotFound(id.clone()))?;

    let stream = request.into_body().into_data_stream();
    let staged = ingest::stage_body(&state.uploads_dir, stream).await?;
    let outcome = ingest::ingest_staged_file(&*state.catalog, &state.s3, &id, staged.path()).await?;
    Ok(Json(IngestResponse { dataset_id: outcome.dataset, num_data_points: outcome.num_data_points }))
}

pub async fn list_dataranges(
    State(state): State<AppState>,
    DatasetName(id): DatasetName,
) -> Result<Json<Vec<DatarangeDto>>> {
    state
        .catalog
        .get_dataset(&id)
        .await?
        .ok_or_else(|| Error::NotFound(id.clone()))?;
    let rows = state.catalog.get_dataranges(&id).await?;
    Ok(Json(rows.into_iter().map(DatarangeDto::from).collect()))
}

#[derive(Debug, Deserialize)]
pub struct RangeParams {
    id: String,
    start: u64,
    end: u64,
}

pub async fn plan_download(
    State(state): State<AppState>,
    Path(params): Path<RangeParams>,
) -> Result<Json<Vec<PlannedRangeDto>>> {
    if params.start > params.end {
        return Err(Error::InvalidName(format!("start {} > end {}", params.start, params.end)));
    }
    state
        .catalog
        .get_dataset(&params.id)
        .await?
        .ok_or_else(|| Error::NotFound(params.id.clone()))?;
    let plans = range_planner::plan(&*state.catalog, &state.s3, &params.id, params.start, params.end).await?;
    Ok(Json(plans.into_iter().map(PlannedRangeDto::from).collect()))
}

pub async fn aggregate(
    State(state): State<AppState>,
    Path(params): Path<RangeParams>,
) -> Result<Json<AggregateResponse>> {
    if params.start > params.end {
        return Err(Error::InvalidName(format!("start {} > end {}", params.start, params.end)));
    }
    state
        .catalog
        .get_dataset(&params.id)
        .await?
        .ok_or_else(|| Error::NotFound(params.id.clone()))?;
    let outcome = compaction::compact(
        &*state.catalog,
        &state.s3,
        &state.uploads_dir,
        state.compaction_grace,
        &params.id,
        params.start,
        params.end,
    )
    .await?;
    Ok(Json(AggregateResponse {
        ranges_replaced: outcome.ranges_replaced,
        new_object_key: outcome.new_object_key,
    }))
}

pub async fn missing_ranges(
    State(state): State<AppState>,
    DatasetName(id): DatasetName,
) -> Result<Json<MissingRangesResponse>> {
    state
        .catalog
        .get_dataset(&id)
        .await?
        .ok_or_else(|| Error::NotFound(id.clone()))?;

    let dataranges = state.catalog.get_dataranges(&id).await?;
    let first_last = state.catalog.get_first_and_last_datapoint(&id).await?;

    let mut missing = Vec::new();
    for pair in dataranges.windows(2) {
        let prev_max = pair[0].max_key;
        let next_min = pair[1].min_key;
        if next_min > prev_max + 1 {
            missing.push(MissingRange { start: prev_max + 1, end: next_min - 1 });
        }
    }

    let (first_datapoint, last_datapoint) = match first_last {
        Some((first, last)) => (Some(first), Some(last)),
        None => (None, None),
    };

    Ok(Json(MissingRangesResponse { first_datapoint, last_datapoint, missing_ranges: missing }))
}
