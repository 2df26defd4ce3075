//! Compaction engine (C5, spec §4.5): merges a contiguous set of dataranges
//! covering exactly `[start, end]` into one larger datarange, scheduling the
//! old objects for deletion after a grace period.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use tokio::io::AsyncWriteExt;

use crate::catalog::{Catalog, DatapointInsert};
use crate::error::{Error, Result};
use crate::ingest;
use crate::range_planner::{align_down, align_up};
use crate::s3_client::S3Client;
use crate::tar_scanner;
use crate::types;

pub struct CompactionOutcome {
    pub ranges_replaced: usize,
    pub new_object_key: String,
}

pub async fn compact(
    catalog: &dyn Catalog,
    s3: &S3Client,
    uploads_dir: &Path,
    grace_period: Duration,
    dataset: &str,
    start: u64,
    end: u64,
) -> Result<CompactionOutcome> {
    let sections = catalog.get_sections_of_dataranges(dataset, start, end).await?;
    if sections.is_empty() {
        return Err(Error::SplitsBoundary);
    }

    let first = sections.first().expect("checked non-empty above");
    let last = sections.last().expect("checked non-empty above");
    if first.first_offset != 0 {
        return Err(Error::SplitsBoundary);
    }
    if last.last_offset != last.size_bytes - 1024 {
        return Err(Error::SplitsBoundary);
    }
    for pair in sections.windows(2) {
        if pair[1].min_key != pair[0].max_key + 1 {
            return Err(Error::GapDetected(pair[0].max_key + 1));
        }
    }

    std::fs::create_dir_all(uploads_dir)?;
    let concat_file = tempfile::NamedTempFile::new_in(uploads_dir)?;
    {
        let mut tokio_file = tokio::fs::File::from_std(concat_file.reopen()?);
        for section in &sections {
            let byte_start = align_down(section.first_offset);
            let byte_end = align_up(section.last_offset) - 1;
            let bytes = s3.get_object_range(&section.object_key, byte_start, byte_end).await?;
            tokio_file.write_all(&bytes).await?;
        }
        tokio_file.flush().await?;
        tokio_file.sync_all().await?;
    }

    let new_sections = tar_scanner::scan(concat_file.path())?;
    if new_sections.is_empty() {
        return Err(Error::Internal("compacted archive is empty".to_string()));
    }

    let mut offsets: BTreeMap<u64, (i64, i64)> = BTreeMap::new();
    for section in &new_sections {
        let key = types::parse_entry_key(&section.name).ok_or_else(|| {
            Error::Internal(format!("unexpected entry name {:?} in compacted archive", section.name))
        })?;
        offsets.insert(key, (section.header_offset as i64, section.end_of_data_offset as i64));
    }
    let new_min = *offsets.keys().next().expect("checked non-empty above");
    let new_max = *offsets.keys().next_back().expect("checked non-empty above");

    let new_object_key = types::datarange_object_key(dataset, new_min, new_max);
    let new_sidecar_key = types::sidecar_key(&new_object_key);
    let sidecar_bytes = ingest::build_sidecar(concat_file.path(), &new_sections, &offsets)?;

    s3.put_object_file(&new_object_key, concat_file.path()).await?;
    if let Err(e) = s3.put_object(&new_sidecar_key, sidecar_bytes.into()).await {
        catalog.enqueue_deletion_immediate(&new_object_key).await.ok();
        return Err(e);
    }

    let new_size_bytes = std::fs::metadata(concat_file.path())?.len() as i64;
    let new_datapoints: Vec<DatapointInsert> = offsets
        .into_iter()
        .map(|(key, (begin_offset, end_offset))| DatapointInsert { key, begin_offset, end_offset })
        .collect();

    let old_ids: Vec<i64> = sections.iter().map(|s| s.id).collect();
    let deleted_keys: Vec<(String, String)> = sections
        .iter()
        .map(|s| (s.object_key.clone(), format!("{}.metadata", s.object_key)))
        .collect();
    let delete_at = Utc::now()
        + chrono::Duration::from_std(grace_period).unwrap_or_else(|_| chrono::Duration::zero());

    let ranges_replaced = sections.len();
    catalog
        .replace_dataranges(
            dataset,
            &old_ids,
            &new_object_key,
            new_min,
            new_max,
            new_size_bytes,
            &new_datapoints,
            &deleted_keys,
            delete_at,
        )
        .await?;

    Ok(CompactionOutcome { ranges_replaced, new_object_key })
}
