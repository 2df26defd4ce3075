//! Core domain types: dataset name validation and the S3 key layout (spec §6).

use std::fmt;

/// Errors validating a user-provided dataset name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameError(String);

impl fmt::Display for NameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for NameError {}

/// Validate a dataset name against `[A-Za-z][A-Za-z0-9_-]{0,127}[A-Za-z0-9]`
/// (spec §3). The trailing class is mandatory, not optional, so the shortest
/// valid name is two characters.
pub fn validate_dataset_name(name: &str) -> Result<(), NameError> {
    let bytes = name.as_bytes();
    if bytes.len() < 2 {
        return Err(NameError(
            "dataset name must be at least 2 characters".to_string(),
        ));
    }
    if name.len() > 130 {
        return Err(NameError("dataset name is too long".to_string()));
    }

    let first = bytes[0];
    if !first.is_ascii_alphabetic() {
        return Err(NameError(
            "dataset name must start with a letter".to_string(),
        ));
    }

    let last = bytes[bytes.len() - 1];
    if !last.is_ascii_alphanumeric() {
        return Err(NameError(
            "dataset name must end with a letter or digit".to_string(),
        ));
    }

    for &b in &bytes[1..bytes.len() - 1] {
        if !(b.is_ascii_alphanumeric() || b == b'_' || b == b'-') {
            return Err(NameError(format!(
                "dataset name contains invalid character {:?}",
                b as char
            )));
        }
    }

    Ok(())
}

/// S3 key layout for a datarange tar object (spec §6, bit-exact).
pub fn datarange_object_key(dataset: &str, min_key: u64, max_key: u64) -> String {
    format!("dataset/{dataset}/datapoints/{min_key:020}-{max_key:020}.tar")
}

/// The sidecar metadata key for a given tar object key.
pub fn sidecar_key(object_key: &str) -> String {
    format!("{object_key}.metadata")
}

/// Tar entry names carry the datapoint key as a 20-digit zero-padded prefix:
/// `^\d{20}\..+$` (spec §4.2). Parses the key or returns `None`.
pub fn parse_entry_key(name: &str) -> Option<u64> {
    let bytes = name.as_bytes();
    if bytes.len() < 22 {
        return None;
    }
    let (digits, rest) = name.split_at(20);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !rest.starts_with('.') || rest.len() < 2 {
        return None;
    }
    digits.parse::<u64>().ok()
}
