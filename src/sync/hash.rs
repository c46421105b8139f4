//! Content hashing for change detection.
//!
//! Rows are hashed as the SHA256 of their JSON serialization, so two rows
//! hash equal exactly when their serialized cells are identical.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::host::{Cell, Row};

/// Compute a SHA256 hash of a serializable value.
///
/// The value is first serialized to JSON, then hashed. A value that fails
/// to serialize hashes as the empty string.
#[must_use]
pub fn content_hash<T: Serialize>(value: &T) -> String {
    let json = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash a sheet row after normalizing it to `width` cells.
///
/// Short rows are padded with nulls and long rows truncated, so a row read
/// back from storage without its trailing empty cells still matches.
#[must_use]
pub fn row_hash(row: &[Cell], width: usize) -> String {
    let mut normalized: Row = row.iter().take(width).cloned().collect();
    normalized.resize(width, Cell::Null);
    content_hash(&normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_content_hash_deterministic() {
        let row = vec![json!("G-123"), json!(42), json!(true)];

        let hash1 = content_hash(&row);
        let hash2 = content_hash(&row.clone());

        assert_eq!(hash1, hash2);
        assert_eq!(hash1.len(), 64); // SHA256 produces 64 hex chars
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let row1 = vec![json!("G-123"), json!(42)];
        let row2 = vec![json!("G-123"), json!(43)];
        assert_ne!(content_hash(&row1), content_hash(&row2));
    }

    #[test]
    fn test_row_hash_ignores_trailing_padding() {
        let short = vec![json!("a"), json!(1)];
        let padded = vec![json!("a"), json!(1), Cell::Null];
        assert_eq!(row_hash(&short, 3), row_hash(&padded, 3));
        assert_ne!(row_hash(&short, 3), row_hash(&[json!("a"), json!(2)], 3));
    }
}
