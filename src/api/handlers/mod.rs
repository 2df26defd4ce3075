//! HTTP handlers (C9), grouped by resource rather than by HTTP verb.

pub mod datasets;
pub mod health;
pub mod ingest;
pub mod multipart;
pub mod wait;
