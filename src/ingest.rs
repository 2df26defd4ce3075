//! Ingest pipeline (C3, spec §4.3): scan a staged tar, validate the key
//! sequence, reject gaps/overlaps, upload blob + sidecar, insert catalog
//! rows atomically.

use std::collections::BTreeMap;
use std::path::Path;

use memmap2::Mmap;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;

use crate::catalog::{Catalog, DatapointInsert};
use crate::error::{Error, Result};
use crate::s3_client::S3Client;
use crate::sidecar::{self, SidecarEntry};
use crate::tar_scanner::{self, Section};
use crate::types;

pub struct IngestOutcome {
    pub dataset: String,
    pub num_data_points: usize,
}

/// Step 1: stream `body` to a uniquely named temp file under
/// `uploads_dir`, fsync, and hand back the staged path. The caller is
/// responsible for removing the file on every exit path (we return a
/// [`tempfile::NamedTempFile`] so the usual drop-cleanup applies).
pub async fn stage_body<S, E>(uploads_dir: &Path, mut body: S) -> Result<tempfile::NamedTempFile>
where
    S: futures::Stream<Item = std::result::Result<bytes::Bytes, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    std::fs::create_dir_all(uploads_dir)?;
    let file = tempfile::NamedTempFile::new_in(uploads_dir)?;
    let mut tokio_file = tokio::fs::File::from_std(file.reopen()?);

    use futures::StreamExt;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| Error::Internal(format!("request body error: {e}")))?;
        tokio_file.write_all(&chunk).await?;
    }
    tokio_file.flush().await?;
    tokio_file.sync_all().await?;

    Ok(file)
}

/// Concatenates multipart part files, in `ordered_parts` order, into one
/// new temp file under `uploads_dir` (C6 `complete`, spec §4.6).
pub async fn concatenate_parts(uploads_dir: &Path, ordered_parts: &[std::path::PathBuf]) -> Result<tempfile::NamedTempFile> {
    std::fs::create_dir_all(uploads_dir)?;
    let file = tempfile::NamedTempFile::new_in(uploads_dir)?;
    let mut tokio_file = tokio::fs::File::from_std(file.reopen()?);

    for part_path in ordered_parts {
        let bytes = tokio::fs::read(part_path).await?;
        tokio_file.write_all(&bytes).await?;
    }
    tokio_file.flush().await?;
    tokio_file.sync_all().await?;

    Ok(file)
}

/// Steps 2–8 of the ingest pipeline, shared by the single-shot upload
/// handler and the multipart `complete` handler.
pub async fn ingest_staged_file(
    catalog: &dyn Catalog,
    s3: &S3Client,
    dataset: &str,
    path: &Path,
) -> Result<IngestOutcome> {
    let sections = tar_scanner::scan(path)?;
    if sections.is_empty() {
        return Err(Error::EmptyArchive);
    }

    let mut offsets: BTreeMap<u64, (i64, i64)> = BTreeMap::new();
    for section in &sections {
        let key = types::parse_entry_key(&section.name)
            .ok_or_else(|| Error::InvalidName(section.name.clone()))?;
        offsets.insert(key, (section.header_offset as i64, section.end_of_data_offset as i64));
    }

    let keys: Vec<u64> = offsets.keys().copied().collect();
    for pair in keys.windows(2) {
        if pair[1] - pair[0] > 1 {
            return Err(Error::GapDetected(pair[0] + 1));
        }
    }
    let min = *keys.first().expect("non-empty: checked above");
    let max = *keys.last().expect("non-empty: checked above");

    if catalog.check_overlap(dataset, min, max).await? {
        return Err(Error::RangeOverlap);
    }

    let object_key = types::datarange_object_key(dataset, min, max);
    let sidecar_object_key = types::sidecar_key(&object_key);

    let sidecar_bytes = build_sidecar(path, &sections, &offsets)?;

    s3.put_object_file(&object_key, path).await?;

    if let Err(e) = s3.put_object(&sidecar_object_key, sidecar_bytes.into()).await {
        catalog.enqueue_deletion_immediate(&object_key).await.ok();
        return Err(e);
    }

    let size_bytes = std::fs::metadata(path)?.len() as i64;
    let datapoints: Vec<DatapointInsert> = offsets
        .into_iter()
        .map(|(key, (begin_offset, end_offset))| DatapointInsert { key, begin_offset, end_offset })
        .collect();

    match catalog
        .insert_ingested_datarange(dataset, &object_key, min, max, size_bytes, &datapoints)
        .await
    {
        Ok(_) => Ok(IngestOutcome {
            dataset: dataset.to_string(),
            num_data_points: datapoints.len(),
        }),
        Err(e) => {
            catalog.enqueue_deletion_immediate(&object_key).await.ok();
            catalog.enqueue_deletion_immediate(&sidecar_object_key).await.ok();
            Err(e)
        }
    }
}

pub(crate) fn build_sidecar(
    path: &Path,
    sections: &[Section],
    offsets: &BTreeMap<u64, (i64, i64)>,
) -> Result<Vec<u8>> {
    let file = std::fs::File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };

    let mut entries = Vec::with_capacity(sections.len());
    for section in sections {
        let key = types::parse_entry_key(&section.name).expect("validated in ingest_staged_file");
        let (begin_offset, end_offset) = offsets[&key];
        let data = &mmap[section.data_offset as usize..section.end_of_data_offset as usize];
        let hash = Sha256::digest(data);

        entries.push(SidecarEntry {
            id: key.to_string(),
            begin_offset: begin_offset.to_string(),
            end_offset: end_offset.to_string(),
            data_hash: hex::encode(hash),
        });
    }

    sidecar::encode(&entries)
}
