//! `{id}/upload[...]` endpoints: the multipart coordinator's HTTP face (C6,
//! spec §4.6).

use axum::extract::{Path, Request, State};
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::dto::{
    CancelResponse, CompletePartsRequest, IngestResponse, MultipartUploadStatusDto,
    UploadInitiateResponse, UploadPartResponse,
};
use crate::api::extractors::DatasetName;
use crate::error::{Error, Result};
use crate::state::AppState;

pub async fn initiate(
    State(state): State<AppState>,
    DatasetName(id): DatasetName,
) -> Result<Json<UploadInitiateResponse>> {
    state
        .catalog
        .get_dataset(&id)
        .await?
        .ok_or_else(|| Error::NotFound(id.clone()))?;
    let upload_id = state.multipart.initiate(&id);
    Ok(Json(UploadInitiateResponse { upload_id, dataset_id: id }))
}

#[derive(Debug, Deserialize)]
pub struct PartParams {
    upload_id: Uuid,
    part_number: u32,
}

pub async fn upload_part(
    State(state): State<AppState>,
    Path(params): Path<PartParams>,
    request: Request,
) -> Result<Json<UploadPartResponse>> {
    if params.part_number == 0 {
        return Err(Error::InvalidName("part_number must be positive".to_string()));
    }
    let body = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| Error::Internal(format!("request body error: {e}")))?;
    state.multipart.upload_part(params.upload_id, params.part_number, body).await?;
    Ok(Json(UploadPartResponse { part_id: params.part_number }))
}

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    upload_id: Uuid,
}

pub async fn complete(
    State(state): State<AppState>,
    Path(params): Path<UploadParams>,
    Json(body): Json<CompletePartsRequest>,
) -> Result<Json<IngestResponse>> {
    if body.part_ids.is_empty() {
        return Err(Error::InvalidName("part_ids must not be empty".to_string()));
    }
    match state.multipart.complete(params.upload_id, &body.part_ids, &*state.catalog, &state.s3).await {
        Ok(outcome) => Ok(Json(IngestResponse { dataset_id: outcome.dataset, num_data_points: outcome.num_data_points })),
        Err(e @ (Error::InvalidName(_)
        | Error::EmptyArchive
        | Error::GapDetected(_)
        | Error::RangeOverlap
        | Error::SplitsBoundary)) => {
            // The staged concatenation is unrecoverable without re-uploading
            // parts, so discard the entry instead of leaving it around for a
            // retry that would hit the same validation error.
            state.multipart.cancel(params.upload_id)?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}

pub async fn cancel(
    State(state): State<AppState>,
    Path(params): Path<UploadParams>,
) -> Result<Json<CancelResponse>> {
    state.multipart.cancel(params.upload_id)?;
    Ok(Json(CancelResponse { status: "cancelled", upload_id: params.upload_id }))
}

pub async fn status(
    State(state): State<AppState>,
    Path(params): Path<UploadParams>,
) -> Result<Json<MultipartUploadStatusDto>> {
    let status = state.multipart.status(params.upload_id)?;
    Ok(Json(MultipartUploadStatusDto {
        upload_id: status.upload_id,
        dataset_id: status.dataset,
        created_at: status.created_at,
        last_updated_at: status.last_updated_at,
        part_numbers: status.part_numbers,
    }))
}
