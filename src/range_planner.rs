//! Range download planner (C4, spec §4.4): turns a requested key interval
//! into an ordered list of presigned byte-range GETs, respecting tar block
//! alignment so the concatenation of ranges is itself a valid tar stream.

use crate::catalog::Catalog;
use crate::error::Result;
use crate::s3_client::S3Client;
use crate::tar_scanner::BLOCK_SIZE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedRange {
    pub get_url: String,
    pub start: i64,
    pub end: i64,
}

/// `(dataset, start, end)` → presigned byte ranges, one per overlapping
/// datarange, in `min_key` order. Empty input yields an empty plan.
pub async fn plan(
    catalog: &dyn Catalog,
    s3: &S3Client,
    dataset: &str,
    start: u64,
    end: u64,
) -> Result<Vec<PlannedRange>> {
    let sections = catalog.get_sections_of_dataranges(dataset, start, end).await?;

    let mut plans = Vec::with_capacity(sections.len());
    for section in sections {
        let byte_start = align_down(section.first_offset);
        let byte_end = align_up(section.last_offset) - 1;
        let get_url = s3.presign_get(&section.object_key, Some((byte_start, byte_end))).await?;
        plans.push(PlannedRange { get_url, start: byte_start, end: byte_end });
    }
    Ok(plans)
}

pub(crate) fn align_down(offset: i64) -> i64 {
    (offset / BLOCK_SIZE as i64) * BLOCK_SIZE as i64
}

pub(crate) fn align_up(offset: i64) -> i64 {
    ((offset + BLOCK_SIZE as i64 - 1) / BLOCK_SIZE as i64) * BLOCK_SIZE as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment_rounds_to_block_boundaries() {
        assert_eq!(align_down(0), 0);
        assert_eq!(align_down(511), 0);
        assert_eq!(align_down(512), 512);
        assert_eq!(align_up(1), 512);
        assert_eq!(align_up(512), 512);
        assert_eq!(align_up(513), 1024);
    }

    #[test]
    fn byte_end_is_inclusive_and_block_aligned() {
        // first_offset=100, last_offset=900 -> start=0, end=1023
        let byte_start = align_down(100);
        let byte_end = align_up(900) - 1;
        assert_eq!(byte_start, 0);
        assert_eq!(byte_end, 1023);
        assert_eq!((byte_end + 1) % BLOCK_SIZE as i64, 0);
    }
}
