//! Restore procedure (C8, spec §4.8): on an empty catalog at startup,
//! reconstructs it from S3 object keys and sidecars.

use std::collections::HashMap;

use crate::catalog::{Catalog, DatapointInsert, RestoreDatasetPlan, RestoreKeptRange};
use crate::error::{Error, Result};
use crate::s3_client::S3Client;
use crate::sidecar;

/// Runs [`restore`] only if the catalog currently has zero datasets.
/// Returns whether a restore actually ran.
pub async fn restore_if_empty(catalog: &dyn Catalog, s3: &S3Client) -> Result<bool> {
    if catalog.has_any_dataset().await? {
        return Ok(false);
    }
    restore(catalog, s3).await?;
    Ok(true)
}

pub async fn restore(catalog: &dyn Catalog, s3: &S3Client) -> Result<()> {
    let mut by_dataset: HashMap<String, Vec<(u64, u64, String)>> = HashMap::new();
    let mut token = None;

    loop {
        let page = s3.list_objects("dataset/", token).await?;
        for key in &page.keys {
            if let Some((dataset, min, max)) = parse_sidecar_key(key) {
                let tar_key = key.trim_end_matches(".metadata").to_string();
                by_dataset.entry(dataset).or_default().push((min, max, tar_key));
            }
        }
        token = page.continuation_token;
        if token.is_none() {
            break;
        }
    }

    let mut plans = Vec::with_capacity(by_dataset.len());
    for (dataset, ranges) in by_dataset {
        plans.push(resolve_dataset(s3, dataset, ranges).await?);
    }

    catalog.restore(plans).await
}

async fn resolve_dataset(
    s3: &S3Client,
    dataset: String,
    mut ranges: Vec<(u64, u64, String)>,
) -> Result<RestoreDatasetPlan> {
    for i in 0..ranges.len() {
        for j in (i + 1)..ranges.len() {
            let (a_min, a_max, _) = ranges[i];
            let (b_min, b_max, _) = ranges[j];
            if a_min <= b_max && b_min <= a_max {
                let a_contains_b = a_min <= b_min && a_max >= b_max;
                let b_contains_a = b_min <= a_min && b_max >= a_max;
                if !a_contains_b && !b_contains_a {
                    return Err(Error::PartialOverlap);
                }
            }
        }
    }

    // Span descending, then min ascending for determinism (spec §4.8 step 2).
    ranges.sort_by(|a, b| {
        let span_a = a.1 - a.0;
        let span_b = b.1 - b.0;
        span_b.cmp(&span_a).then(a.0.cmp(&b.0))
    });

    let mut kept: Vec<(u64, u64, String)> = Vec::new();
    let mut discarded: Vec<String> = Vec::new();
    'ranges: for r in ranges {
        for k in &kept {
            if k.0 <= r.0 && k.1 >= r.1 {
                discarded.push(r.2);
                continue 'ranges;
            }
        }
        kept.push(r);
    }

    let mut kept_ranges = Vec::with_capacity(kept.len());
    for (min_key, max_key, tar_key) in kept {
        let size_bytes = s3
            .head_object_size(&tar_key)
            .await?
            .ok_or_else(|| Error::Internal(format!("restore: missing tar object {tar_key}")))?;
        let sidecar_key = format!("{tar_key}.metadata");
        let sidecar_bytes = s3.get_object(&sidecar_key).await?;
        let datapoints = sidecar::decode(&sidecar_bytes)?
            .into_iter()
            .map(|d| DatapointInsert { key: d.key, begin_offset: d.begin_offset, end_offset: d.end_offset })
            .collect();

        kept_ranges.push(RestoreKeptRange { object_key: tar_key, min_key, max_key, size_bytes, datapoints });
    }

    let discarded_keys = discarded
        .into_iter()
        .map(|tar_key| {
            let sidecar_key = format!("{tar_key}.metadata");
            (tar_key, sidecar_key)
        })
        .collect();

    Ok(RestoreDatasetPlan { name: dataset, kept: kept_ranges, discarded_keys })
}

/// Matches `^dataset/([^/]+)/datapoints/(\d+)-(\d+)\.tar\.metadata$`.
fn parse_sidecar_key(key: &str) -> Option<(String, u64, u64)> {
    let rest = key.strip_prefix("dataset/")?;
    let (dataset, rest) = rest.split_once("/datapoints/")?;
    if dataset.is_empty() || dataset.contains('/') {
        return None;
    }
    let rest = rest.strip_suffix(".tar.metadata")?;
    let (min_s, max_s) = rest.split_once('-')?;
    if min_s.len() != 20 || max_s.len() != 20 {
        return None;
    }
    let min = min_s.parse::<u64>().ok()?;
    let max = max_s.parse::<u64>().ok()?;
    Some((dataset.to_string(), min, max))
}
