//! Input validation for the public contract.
//!
//! Content hashes become staging directory names and node names are shown
//! to users, so both are checked before anything touches disk or database.

use crate::error::{FileManagerError, Result};
use uuid::Uuid;

const MAX_HASH_LEN: usize = 128;
const MAX_NAME_LEN: usize = 255;

/// Content hashes are opaque to us but must be safe as a single path segment
pub fn validate_content_hash(hash: &str) -> Result<()> {
    if hash.is_empty() {
        return Err(FileManagerError::InvalidInput("content hash cannot be empty".into()));
    }
    if hash.len() > MAX_HASH_LEN {
        return Err(FileManagerError::InvalidInput(format!(
            "content hash is longer than {} characters",
            MAX_HASH_LEN
        )));
    }
    if !hash.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
        return Err(FileManagerError::InvalidInput(
            "content hash may only contain letters, digits, '-' and '_'".into(),
        ));
    }
    Ok(())
}

/// Validate a folder or file name and return it trimmed
pub fn validate_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(FileManagerError::InvalidInput("name cannot be blank".into()));
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(FileManagerError::InvalidInput(format!(
            "name is longer than {} characters",
            MAX_NAME_LEN
        )));
    }
    if trimmed == "." || trimmed == ".." {
        return Err(FileManagerError::InvalidInput("name cannot be '.' or '..'".into()));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(FileManagerError::InvalidInput("name cannot contain path separators".into()));
    }
    if trimmed.chars().any(|c| c.is_control()) {
        return Err(FileManagerError::InvalidInput("name contains control characters".into()));
    }
    Ok(trimmed.to_string())
}

/// Chunk indices arrive as signed integers from the wire
pub fn validate_chunk_index(index: i64) -> Result<u32> {
    u32::try_from(index)
        .map_err(|_| FileManagerError::InvalidInput(format!("chunk index {} is out of range", index)))
}

/// Parse a node id
pub fn parse_node_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| FileManagerError::InvalidInput(format!("malformed node id: {}", raw)))
}

/// Parse a parent id. Absent, blank, `0` and `null` all mean the root.
pub fn parse_parent_id(raw: Option<&str>) -> Result<Option<Uuid>> {
    match raw.map(str::trim) {
        None | Some("") | Some("0") | Some("null") => Ok(None),
        Some(id) => parse_node_id(id).map(Some),
    }
}
