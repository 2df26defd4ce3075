//! Domain error kinds and their HTTP mapping: one enum, one `#[error(...)]`
//! message per variant, a `status_code()` method, and an `IntoResponse` impl
//! that serializes a small JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Domain-level error kinds (spec §7). Not an HTTP status — handlers map
/// these to status codes at the boundary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("empty archive")]
    EmptyArchive,

    #[error("gap detected at key {0}")]
    GapDetected(u64),

    #[error("range overlap")]
    RangeOverlap,

    #[error("compaction window splits a datarange boundary")]
    SplitsBoundary,

    #[error("restore found overlapping dataranges without containment")]
    PartialOverlap,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyExists(_) => StatusCode::CONFLICT,
            Error::InvalidName(_)
            | Error::EmptyArchive
            | Error::GapDetected(_)
            | Error::RangeOverlap
            | Error::SplitsBoundary => StatusCode::BAD_REQUEST,
            Error::PartialOverlap => StatusCode::INTERNAL_SERVER_ERROR,
            Error::StorageUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // 499 (nginx convention for client-closed-request) — spec allows
            // "499 or the client's choice".
            Error::Cancelled => StatusCode::from_u16(499).unwrap(),
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NotFound",
            Error::AlreadyExists(_) => "AlreadyExists",
            Error::InvalidName(_) => "InvalidName",
            Error::EmptyArchive => "EmptyArchive",
            Error::GapDetected(_) => "GapDetected",
            Error::RangeOverlap => "RangeOverlap",
            Error::SplitsBoundary => "SplitsBoundary",
            Error::PartialOverlap => "PartialOverlap",
            Error::StorageUnavailable(_) => "StorageUnavailable",
            Error::Cancelled => "Cancelled",
            Error::Internal(_) => "Internal",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Error::NotFound("no matching row".to_string()),
            other => Error::Internal(format!("catalog error: {other}")),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for Error {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Error::Internal(format!("migration error: {err}"))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(format!("io error: {err}"))
    }
}

impl<E, R> From<aws_sdk_s3::error::SdkError<E, R>> for Error
where
    E: std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug + Send + Sync + 'static,
{
    fn from(err: aws_sdk_s3::error::SdkError<E, R>) -> Self {
        Error::StorageUnavailable(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
