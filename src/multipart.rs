//! Multipart upload coordinator (C6, spec §4.6): process-local registry of
//! in-flight upload ids and their staged part files. One explicit owning
//! struct rather than module-level state (spec §9's redesign note).

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::ingest::{self, IngestOutcome};
use crate::s3_client::S3Client;

pub struct UploadStatus {
    pub upload_id: Uuid,
    pub dataset: String,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
    pub part_numbers: Vec<u32>,
}

struct UploadEntry {
    dataset: String,
    created_at: DateTime<Utc>,
    last_updated_at: RwLock<DateTime<Utc>>,
    parts: RwLock<BTreeMap<u32, PathBuf>>,
}

pub struct MultipartCoordinator {
    uploads_dir: PathBuf,
    ttl: Duration,
    registry: RwLock<std::collections::HashMap<Uuid, Arc<UploadEntry>>>,
}

impl MultipartCoordinator {
    pub fn new(uploads_dir: PathBuf, ttl: Duration) -> Self {
        Self { uploads_dir, ttl, registry: RwLock::new(std::collections::HashMap::new()) }
    }

    pub fn initiate(&self, dataset: &str) -> Uuid {
        let upload_id = Uuid::new_v4();
        let now = Utc::now();
        let entry = Arc::new(UploadEntry {
            dataset: dataset.to_string(),
            created_at: now,
            last_updated_at: RwLock::new(now),
            parts: RwLock::new(BTreeMap::new()),
        });
        self.registry.write().insert(upload_id, entry);
        upload_id
    }

    fn get(&self, upload_id: Uuid) -> Result<Arc<UploadEntry>> {
        self.registry
            .read()
            .get(&upload_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("upload {upload_id}")))
    }

    pub async fn upload_part(&self, upload_id: Uuid, part_number: u32, body: bytes::Bytes) -> Result<()> {
        let entry = self.get(upload_id)?;

        std::fs::create_dir_all(&self.uploads_dir)?;
        let file = tempfile::NamedTempFile::new_in(&self.uploads_dir)?;
        let mut tokio_file = tokio::fs::File::from_std(file.reopen()?);
        tokio_file.write_all(&body).await?;
        tokio_file.flush().await?;
        tokio_file.sync_all().await?;
        let (_, path) = file.keep().map_err(|e| Error::Internal(e.to_string()))?;

        let previous = {
            let mut parts = entry.parts.write();
            parts.insert(part_number, path)
        };
        if let Some(old_path) = previous {
            let _ = std::fs::remove_file(old_path);
        }
        *entry.last_updated_at.write() = Utc::now();
        Ok(())
    }

    /// Concatenates parts in `ordered_part_ids` order and runs ingest steps
    /// 2–8 (spec §4.6 `complete`, §4.3). On success the entry and its part
    /// files are removed; on failure the entry survives for retry unless the
    /// caller subsequently cancels it.
    pub async fn complete(
        &self,
        upload_id: Uuid,
        ordered_part_ids: &[u32],
        catalog: &dyn Catalog,
        s3: &S3Client,
    ) -> Result<IngestOutcome> {
        let entry = self.get(upload_id)?;

        let ordered_paths: Vec<PathBuf> = {
            let parts = entry.parts.read();
            ordered_part_ids
                .iter()
                .map(|n| {
                    parts
                        .get(n)
                        .cloned()
                        .ok_or_else(|| Error::InvalidName(format!("unknown part number {n}")))
                })
                .collect::<Result<_>>()?
        };

        let concat_file = ingest::concatenate_parts(&self.uploads_dir, &ordered_paths).await?;
        let outcome = ingest::ingest_staged_file(catalog, s3, &entry.dataset, concat_file.path()).await?;

        let parts: Vec<PathBuf> = entry.parts.write().drain().map(|(_, path)| path).collect();
        for path in parts {
            let _ = std::fs::remove_file(path);
        }
        self.registry.write().remove(&upload_id);

        Ok(outcome)
    }

    pub fn cancel(&self, upload_id: Uuid) -> Result<()> {
        let entry = self.get(upload_id)?;
        let parts: Vec<PathBuf> = entry.parts.write().drain().map(|(_, path)| path).collect();
        for path in parts {
            let _ = std::fs::remove_file(path);
        }
        self.registry.write().remove(&upload_id);
        Ok(())
    }

    pub fn status(&self, upload_id: Uuid) -> Result<UploadStatus> {
        let entry = self.get(upload_id)?;
        Ok(UploadStatus {
            upload_id,
            dataset: entry.dataset.clone(),
            created_at: entry.created_at,
            last_updated_at: *entry.last_updated_at.read(),
            part_numbers: entry.parts.read().keys().copied().collect(),
        })
    }

    /// Number of in-flight uploads, for the health check's tracing fields.
    pub fn active_upload_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Periodic staleness sweep (spec §4.6): removes uploads untouched for
    /// longer than `ttl` and unlinks their part files.
    pub fn sweep_stale(&self) {
        let now = Utc::now();
        let stale_ids: Vec<Uuid> = self
            .registry
            .read()
            .iter()
            .filter_map(|(id, entry)| {
                let idle = now.signed_duration_since(*entry.last_updated_at.read());
                let ttl = chrono::Duration::from_std(self.ttl).unwrap_or_else(|_| chrono::Duration::zero());
                (idle > ttl).then_some(*id)
            })
            .collect();

        for id in stale_ids {
            if let Some(entry) = self.registry.write().remove(&id) {
                for (_, path) in entry.parts.write().drain() {
                    let _ = std::fs::remove_file(path);
                }
            }
        }
    }
}
