//! `POST /api/v1/datas3t/wait` — block (up to an internal deadline) until
//! every named dataset's max datapoint key reaches the requested floor (spec
//! §5, §6). Polls the catalog every 500ms; returns 202 with the current
//! snapshot if the 20s deadline elapses first.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use crate::api::dto::{WaitRequest, WaitResponse};
use crate::error::{Error, Result};
use crate::state::AppState;

const WAIT_DEADLINE: Duration = Duration::from_secs(20);
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn wait_datasets(
    State(state): State<AppState>,
    Json(req): Json<WaitRequest>,
) -> Result<(StatusCode, Json<WaitResponse>)> {
    if req.datasets.is_empty() {
        return Err(Error::InvalidName("datasets must not be empty".to_string()));
    }
    let names: Vec<String> = req.datasets.keys().cloned().collect();

    for name in &names {
        if state.catalog.get_dataset(name).await?.is_none() {
            return Err(Error::InvalidName(format!("unknown dataset {name}")));
        }
    }

    let deadline = tokio::time::Instant::now() + WAIT_DEADLINE;
    loop {
        let maxima = state.catalog.get_largest_datapoint_for_datasets(&names).await?;
        if satisfied(&req.datasets, &maxima) {
            return Ok((StatusCode::OK, Json(WaitResponse { datasets: snapshot(&maxima) })));
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok((StatusCode::ACCEPTED, Json(WaitResponse { datasets: snapshot(&maxima) })));
        }
        tokio::time::sleep(WAIT_POLL_INTERVAL).await;
    }
}

fn satisfied(wanted: &HashMap<String, u64>, maxima: &HashMap<String, Option<u64>>) -> bool {
    wanted.iter().all(|(name, floor)| maxima.get(name).copied().flatten().is_some_and(|max| max >= *floor))
}

fn snapshot(maxima: &HashMap<String, Option<u64>>) -> HashMap<String, u64> {
    maxima.iter().map(|(name, max)| (name.clone(), max.unwrap_or(0))).collect()
}
