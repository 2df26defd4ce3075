//! Tar scanner (C2, spec §4.2): enumerates USTAR entries in a file on disk
//! without reading its contents into memory — the file is memory-mapped.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use crate::error::{Error, Result};

pub const BLOCK_SIZE: u64 = 512;

/// One tar entry: byte offsets of its header, its data, and the end of its
/// data (spec §4.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub header_offset: u64,
    pub data_offset: u64,
    pub end_of_data_offset: u64,
}

/// Scans `path` as a USTAR (or compatible) archive, returning one [`Section`]
/// per entry in on-disk order. Does not validate entry names against the
/// `^\d{20}\..+$` pattern — that's the ingest pipeline's job (spec §4.3).
pub fn scan(path: &Path) -> Result<Vec<Section>> {
    let file = File::open(path)?;
    let mmap = unsafe { Mmap::map(&file)? };
    scan_bytes(&mmap)
}

fn scan_bytes(data: &[u8]) -> Result<Vec<Section>> {
    let mut sections = Vec::new();
    let mut offset: u64 = 0;

    while (offset as usize) + 512 <= data.len() {
        let header = &data[offset as usize..offset as usize + 512];

        if header.iter().all(|&b| b == 0) {
            break;
        }

        let name = parse_name(header)?;
        let size = parse_octal(&header[124..136])?;
        let header_block_count = 1;
        let data_offset = offset + header_block_count * BLOCK_SIZE;
        let end_of_data_offset = data_offset + size;

        sections.push(Section {
            name,
            header_offset: offset,
            data_offset,
            end_of_data_offset,
        });

        let padded_size = size.div_ceil(BLOCK_SIZE) * BLOCK_SIZE;
        offset = data_offset + padded_size;
    }

    Ok(sections)
}

fn parse_name(header: &[u8]) -> Result<String> {
    let name_field = &header[0..100];
    let prefix_field = &header[345..500];

    let name = cstr(name_field);
    let prefix = cstr(prefix_field);

    let full = if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    };

    String::from_utf8(full.into_bytes())
        .map_err(|e| Error::Internal(format!("non-utf8 tar entry name: {e}")))
}

fn cstr(field: &[u8]) -> &str {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    std::str::from_utf8(&field[..end]).unwrap_or("").trim_end()
}

fn parse_octal(field: &[u8]) -> Result<u64> {
    let s = cstr(field).trim();
    if s.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(s, 8)
        .map_err(|e| Error::Internal(format!("malformed tar size field {s:?}: {e}")))
}
