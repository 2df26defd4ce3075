//! The HTTP surface (C9, spec §4.9, §6): route table, request/response DTOs,
//! and the `DatasetName` path extractor. A thin re-export module, with the
//! router itself assembled here rather than in `main.rs` so integration
//! tests can build it directly.

pub mod dto;
pub mod extractors;
pub mod handlers;

use axum::routing::{get, post, put};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Builds the full `/api/v1/datas3t...` + `/healthy` route table (spec §6).
/// Static segments (`wait`, `upload`, `complete`, `dataranges`,
/// `missing-ranges`) take precedence over the sibling `:id` param route at
/// the same path depth, so `/api/v1/datas3t/wait` and `/api/v1/datas3t/:id`
/// coexist without conflict.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthy", get(handlers::health::healthy))
        .route(
            "/api/v1/datas3t",
            get(handlers::datasets::list_datasets),
        )
        .route("/api/v1/datas3t/wait", post(handlers::wait::wait_datasets))
        .route(
            "/api/v1/datas3t/:id",
            put(handlers::datasets::create_dataset)
                .get(handlers::datasets::get_dataset)
                .delete(handlers::datasets::delete_dataset)
                .post(handlers::ingest::upload_tar),
        )
        .route(
            "/api/v1/datas3t/:id/dataranges",
            get(handlers::ingest::list_dataranges),
        )
        .route(
            "/api/v1/datas3t/:id/datarange/:start/:end",
            get(handlers::ingest::plan_download),
        )
        .route(
            "/api/v1/datas3t/:id/aggregate/:start/:end",
            post(handlers::ingest::aggregate),
        )
        .route(
            "/api/v1/datas3t/:id/missing-ranges",
            get(handlers::ingest::missing_ranges),
        )
        .route(
            "/api/v1/datas3t/:id/upload",
            post(handlers::multipart::initiate),
        )
        .route(
            "/api/v1/datas3t/:id/upload/:upload_id",
            get(handlers::multipart::status).delete(handlers::multipart::cancel),
        )
        .route(
            "/api/v1/datas3t/:id/upload/:upload_id/:part_number",
            put(handlers::multipart::upload_part),
        )
        .route(
            "/api/v1/datas3t/:id/upload/:upload_id/complete",
            post(handlers::multipart::complete),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
