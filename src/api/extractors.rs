//! A `Path<String>` extractor that validates the dataset name pattern at the
//! boundary, so handlers never see a malformed name (spec §3).

use axum::async_trait;
use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;
use serde::Deserialize;

use crate::error::Error;
use crate::types::validate_dataset_name;

/// Extracts just the `{id}` path segment regardless of how many other
/// captures the route has (routes name their segment `id` throughout).
#[derive(Debug, Deserialize)]
struct IdParam {
    id: String,
}

pub struct DatasetName(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for DatasetName
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(IdParam { id }) = Path::<IdParam>::from_request_parts(parts, state)
            .await
            .map_err(|e| Error::InvalidName(e.to_string()))?;
        validate_dataset_name(&id).map_err(|e| Error::InvalidName(e.to_string()))?;
        Ok(DatasetName(id))
    }
}
