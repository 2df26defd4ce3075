//! The per-datarange metadata sidecar (spec §6): a Zstandard-compressed JSON
//! array mapping each datapoint key to its byte offsets inside the tar, plus
//! an optional content digest.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidecarEntry {
    pub id: String,
    pub begin_offset: String,
    pub end_offset: String,
    pub data_hash: String,
}

/// One rehydrated datapoint, offsets parsed back into integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedDatapoint {
    pub key: u64,
    pub begin_offset: i64,
    pub end_offset: i64,
}

pub fn encode(entries: &[SidecarEntry]) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(entries).map_err(|e| Error::Internal(e.to_string()))?;
    zstd::stream::encode_all(&json[..], 0).map_err(Error::from)
}

pub fn decode(compressed: &[u8]) -> Result<Vec<DecodedDatapoint>> {
    let json = zstd::stream::decode_all(compressed)
        .map_err(|e| Error::Internal(format!("sidecar decompression failed: {e}")))?;
    let entries: Vec<SidecarEntry> =
        serde_json::from_slice(&json).map_err(|e| Error::Internal(format!("malformed sidecar json: {e}")))?;

    entries
        .into_iter()
        .map(|e| {
            let key = e
                .id
                .parse::<u64>()
                .map_err(|_| Error::Internal(format!("malformed sidecar datapoint id {:?}", e.id)))?;
            let begin_offset = e
                .begin_offset
                .parse::<i64>()
                .map_err(|_| Error::Internal("malformed sidecar begin_offset".to_string()))?;
            let end_offset = e
                .end_offset
                .parse::<i64>()
                .map_err(|_| Error::Internal("malformed sidecar end_offset".to_string()))?;
            Ok(DecodedDatapoint { key, begin_offset, end_offset })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let entries = vec![
            SidecarEntry {
                id: "1".to_string(),
                begin_offset: "0".to_string(),
                end_offset: "100".to_string(),
                data_hash: "abc123".to_string(),
            },
            SidecarEntry {
                id: "2".to_string(),
                begin_offset: "100".to_string(),
                end_offset: "200".to_string(),
                data_hash: String::new(),
            },
        ];

        let compressed = encode(&entries).unwrap();
        let decoded = decode(&compressed).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0], DecodedDatapoint { key: 1, begin_offset: 0, end_offset: 100 });
        assert_eq!(decoded[1], DecodedDatapoint { key: 2, begin_offset: 100, end_offset: 200 });
    }

    #[test]
    fn rejects_malformed_id() {
        let entries = vec![SidecarEntry {
            id: "not-a-number".to_string(),
            begin_offset: "0".to_string(),
            end_offset: "1".to_string(),
            data_hash: String::new(),
        }];
        let compressed = encode(&entries).unwrap();
        assert!(decode(&compressed).is_err());
    }
}
