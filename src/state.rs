//! Shared application state handed to every HTTP handler (C9).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::Catalog;
use crate::multipart::MultipartCoordinator;
use crate::s3_client::S3Client;

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn Catalog>,
    pub s3: Arc<S3Client>,
    pub multipart: Arc<MultipartCoordinator>,
    pub uploads_dir: PathBuf,
    pub compaction_grace: Duration,
    pub restore_completed: Arc<AtomicBool>,
    pub deletion_worker_alive: Arc<AtomicBool>,
}

impl AppState {
    pub fn is_healthy(&self) -> bool {
        self.deletion_worker_alive.load(Ordering::Relaxed)
    }
}
