//! `GET /healthy` — liveness probe. Reports whether restore (C8) has run and
//! whether the deletion worker (C7) is still alive, as tracing fields on the
//! check's own span; returns 503 once the deletion worker has died, since a
//! stalled deletion queue means the service is no longer doing its job even
//! though it can still answer requests.

use std::sync::atomic::Ordering;

use axum::extract::State;
use axum::http::StatusCode;
use tracing::{info_span, Instrument};

use crate::state::AppState;

pub async fn healthy(State(state): State<AppState>) -> (StatusCode, &'static str) {
    async {
        tracing::info!(
            restore_completed = state.restore_completed.load(Ordering::Relaxed),
            deletion_worker_alive = state.deletion_worker_alive.load(Ordering::Relaxed),
            active_multipart_uploads = state.multipart.active_upload_count(),
            "health check"
        );
        if state.is_healthy() {
            (StatusCode::OK, "OK")
        } else {
            (StatusCode::SERVICE_UNAVAILABLE, "deletion worker not running")
        }
    }
    .instrument(info_span!("healthy"))
    .await
}
