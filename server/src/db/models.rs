//! Database models for the file tree
//!
//! Folders and files are both `Node`s. Files additionally carry the opaque
//! storage path of their assembled object and the caller-supplied content hash.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

// =============================================================================
// Node
// =============================================================================

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize)]
pub struct Node {
    pub id: Uuid,
    /// NULL = root
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub is_folder: bool,
    /// Always 0 for folders
    pub size_bytes: i64,
    /// Object path relative to the objects root (files only, never exposed)
    #[serde(skip_serializing)]
    pub storage_path: Option<String>,
    /// Caller-supplied content digest (files only)
    pub content_hash: Option<String>,
    pub mime_type: Option<String>,
    /// Lowercase, without the leading dot
    pub extension: Option<String>,
    pub sort_order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Logical delete flag
    pub deleted: bool,
}

impl Node {
    pub fn folder(new_folder: NewFolder, now: DateTime<Utc>) -> Self {
        Node {
            id: Uuid::new_v4(),
            parent_id: new_folder.parent_id,
            name: new_folder.name,
            is_folder: true,
            size_bytes: 0,
            storage_path: None,
            content_hash: None,
            mime_type: None,
            extension: None,
            sort_order: new_folder.sort_order,
            created_at: now,
            updated_at: now,
            deleted: false,
        }
    }

    pub fn file(new_file: NewFile, now: DateTime<Utc>) -> Self {
        Node {
            id: Uuid::new_v4(),
            parent_id: new_file.parent_id,
            name: new_file.name,
            is_folder: false,
            size_bytes: new_file.size_bytes,
            storage_path: Some(new_file.storage_path),
            content_hash: Some(new_file.content_hash),
            mime_type: new_file.mime_type,
            extension: new_file.extension,
            sort_order: 0,
            created_at: now,
            updated_at: now,
            deleted: false,
        }
    }
}

/// Input for creating a folder
#[derive(Debug, Clone)]
pub struct NewFolder {
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub sort_order: i32,
}

/// Input for registering an assembled file
#[derive(Debug, Clone)]
pub struct NewFile {
    pub parent_id: Option<Uuid>,
    pub name: String,
    pub size_bytes: i64,
    pub storage_path: String,
    pub content_hash: String,
    pub mime_type: Option<String>,
    pub extension: Option<String>,
}

/// A node id with just enough information to drive a cascading delete
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NodeRef {
    pub id: Uuid,
    pub is_folder: bool,
    pub storage_path: Option<String>,
}
