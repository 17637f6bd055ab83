//! Content index: instant completion for content the tree already holds

use crate::db::{content_index, DbPool, Node};
use crate::error::Result;
use crate::storage::chunk_store::ChunkStore;
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use std::sync::Arc;
use uuid::Uuid;

/// Answer to "do I need to upload this content into this folder?"
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeResult {
    /// A live node with this content already sits in the folder
    AlreadyStored(Node),
    /// Upload is needed; these chunk indices are already staged
    NeedsUpload(Vec<u32>),
}

#[derive(Clone)]
pub struct ContentIndex {
    db: DbPool,
    chunks: Arc<ChunkStore>,
}

impl ContentIndex {
    pub fn new(db: DbPool, chunks: Arc<ChunkStore>) -> Self {
        Self { db, chunks }
    }

    /// The live node committed for (hash, folder), if any
    pub async fn lookup(&self, content_hash: &str, folder_id: Option<Uuid>) -> Result<Option<Node>> {
        Ok(content_index::find_live_node(&self.db, content_hash, folder_id).await?)
    }

    pub async fn probe(&self, content_hash: &str, folder_id: Option<Uuid>) -> Result<ProbeResult> {
        if let Some(node) = self.lookup(content_hash, folder_id).await? {
            tracing::debug!("probe hit for {} -> node {}", content_hash, node.id);
            return Ok(ProbeResult::AlreadyStored(node));
        }

        let present = self.chunks.list_present_indices(content_hash).await?;
        Ok(ProbeResult::NeedsUpload(present))
    }

    /// Claim (hash, folder) for `node_id`. Runs inside the transaction that
    /// creates the node; a unique violation means another merge won.
    pub async fn register(
        conn: &mut SqliteConnection,
        content_hash: &str,
        folder_id: Option<Uuid>,
        node_id: Uuid,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        content_index::insert_entry(conn, content_hash, folder_id, node_id, now).await
    }
}
