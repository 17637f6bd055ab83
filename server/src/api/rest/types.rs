//! Request and response bodies for the REST binding

use crate::db::Node;
use crate::index::ProbeResult;
use crate::storage::ChunkOutcome;
use crate::tree::{DeleteReport, Page};
use serde::{Deserialize, Serialize};

// ============================================================================
// NODE SUMMARIES
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct NodeSummary {
    pub id: String,
    pub name: String,
    /// `folder` or `file`
    #[serde(rename = "type")]
    pub kind: String,
    /// Human readable, `-` for folders
    pub size: String,
    pub size_bytes: i64,
    pub updated_at: String,
    pub parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extension: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub content_hash: Option<String>,
    pub sort_order: i32,
}

impl From<Node> for NodeSummary {
    fn from(node: Node) -> Self {
        let size = if node.is_folder {
            "-".to_string()
        } else {
            format_size(node.size_bytes)
        };
        NodeSummary {
            id: node.id.to_string(),
            name: node.name,
            kind: if node.is_folder { "folder" } else { "file" }.to_string(),
            size,
            size_bytes: node.size_bytes,
            updated_at: node.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            parent_id: node.parent_id.map(|id| id.to_string()),
            extension: node.extension,
            mime_type: node.mime_type,
            content_hash: node.content_hash,
            sort_order: node.sort_order,
        }
    }
}

/// Bytes to a short human readable size: `512 B`, `2.5 MB`
pub fn format_size(bytes: i64) -> String {
    const UNITS: [&str; 6] = ["KB", "MB", "GB", "TB", "PB", "EB"];

    if bytes < 1024 {
        return format!("{} B", bytes.max(0));
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodePage {
    pub records: Vec<NodeSummary>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl From<Page<Node>> for NodePage {
    fn from(page: Page<Node>) -> Self {
        NodePage {
            records: page.records.into_iter().map(NodeSummary::from).collect(),
            total: page.total,
            limit: page.limit,
            offset: page.offset,
        }
    }
}

// ============================================================================
// UPLOADS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ProbeQuery {
    pub hash: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub needs_upload: bool,
    pub uploaded_chunks: Vec<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub node: Option<NodeSummary>,
}

impl From<ProbeResult> for ProbeResponse {
    fn from(result: ProbeResult) -> Self {
        match result {
            ProbeResult::AlreadyStored(node) => ProbeResponse {
                needs_upload: false,
                uploaded_chunks: vec![],
                node: Some(node.into()),
            },
            ProbeResult::NeedsUpload(uploaded_chunks) => ProbeResponse {
                needs_upload: true,
                uploaded_chunks,
                node: None,
            },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkResponse {
    pub status: ChunkOutcome,
}

#[derive(Debug, Deserialize)]
pub struct MergeBody {
    pub hash: String,
    pub file_name: String,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub total_chunks: Option<u32>,
    #[serde(default)]
    pub size_bytes: Option<u64>,
}

// ============================================================================
// TREE
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ListQueryParams {
    pub parent_id: Option<String>,
    pub search: Option<String>,
    pub is_folder: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderBody {
    #[serde(default)]
    pub parent_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
}

#[derive(Debug, Deserialize)]
pub struct RenameBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MoveBody {
    #[serde(default)]
    pub parent_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MoveResponse {
    /// False when the node already sat in the target folder
    pub moved: bool,
    pub node: NodeSummary,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub nodes_deleted: u64,
    pub objects_removed: usize,
    pub objects_failed: usize,
}

impl From<DeleteReport> for DeleteResponse {
    fn from(report: DeleteReport) -> Self {
        DeleteResponse {
            nodes_deleted: report.nodes_deleted,
            objects_removed: report.objects_removed,
            objects_failed: report.objects_failed,
        }
    }
}
