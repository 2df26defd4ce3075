//! `GET/PUT/DELETE /api/v1/datas3t[/{id}]` — dataset lifecycle.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::dto::DatasetDto;
use crate::api::extractors::DatasetName;
use crate::error::{Error, Result};
use crate::state::AppState;

pub async fn list_datasets(State(state): State<AppState>) -> Result<Json<Vec<DatasetDto>>> {
    let datasets = state.catalog.list_datasets().await?;
    Ok(Json(datasets.into_iter().map(DatasetDto::from).collect()))
}

pub async fn create_dataset(
    State(state): State<AppState>,
    DatasetName(id): DatasetName,
) -> Result<StatusCode> {
    state.catalog.create_dataset(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_dataset(
    State(state): State<AppState>,
    DatasetName(id): DatasetName,
) -> Result<Json<DatasetDto>> {
    let dataset = state
        .catalog
        .get_dataset(&id)
        .await?
        .ok_or_else(|| Error::NotFound(id.clone()))?;
    Ok(Json(DatasetDto::from(dataset)))
}

pub async fn delete_dataset(
    State(state): State<AppState>,
    DatasetName(id): DatasetName,
) -> Result<StatusCode> {
    state.catalog.delete_dataset(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
