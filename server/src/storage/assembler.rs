//! Turns a staged upload into a committed file node
//!
//! A merge runs under the per-hash merge lock and goes:
//!
//! 1. dedup re-check against the content index
//! 2. destination and name checks
//! 3. completeness check over the staged indices
//! 4. streaming concatenation into a fresh object, in numeric index order
//! 5. size and extension checks
//! 6. node + content index registration (under the tree lock)
//! 7. staging cleanup
//!
//! Any failure after the object is written removes the object, so nothing
//! half-assembled ever becomes visible.

use super::chunk_store::{ChunkStore, StagedChunk};
use super::extension::{extension_of, ExtensionCheck, ExtensionPolicy};
use super::locks::KeyedLocks;
use super::objects::ObjectStore;
use crate::db::{NewFile, Node};
use crate::error::{FileManagerError, Result};
use crate::index::ContentIndex;
use crate::tree::{Registration, TreeStore};
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use uuid::Uuid;

/// Everything needed to complete an upload
#[derive(Debug, Clone)]
pub struct MergeRequest {
    pub content_hash: String,
    pub file_name: String,
    pub parent_id: Option<Uuid>,
    /// When given, staged indices must be exactly `0..total_chunks`
    pub total_chunks: Option<u32>,
    /// When given, the assembled object must be exactly this long
    pub size_bytes: Option<u64>,
}

pub struct Assembler {
    objects: ObjectStore,
    chunks: Arc<ChunkStore>,
    policy: ExtensionPolicy,
    tree: TreeStore,
    index: ContentIndex,
    merge_locks: KeyedLocks,
}

impl Assembler {
    pub fn new(
        objects: ObjectStore,
        chunks: Arc<ChunkStore>,
        policy: ExtensionPolicy,
        tree: TreeStore,
        index: ContentIndex,
    ) -> Self {
        Self {
            objects,
            chunks,
            policy,
            tree,
            index,
            merge_locks: KeyedLocks::new(),
        }
    }

    pub async fn merge(&self, request: &MergeRequest) -> Result<Node> {
        let hash = request.content_hash.as_str();
        let parent_id = request.parent_id;

        let _merge_guard = self.merge_locks.lock(hash).await;

        // A concurrent merge may have committed while we waited
        if let Some(existing) = self.index.lookup(hash, parent_id).await? {
            tracing::info!("merge of {} satisfied by existing node {}", hash, existing.id);
            return Ok(existing);
        }

        self.tree.ensure_folder(parent_id).await?;
        self.tree.ensure_name_free(parent_id, &request.file_name, None).await?;

        let staged = self.chunks.present_chunks(hash).await?;
        if staged.is_empty() {
            return Err(FileManagerError::IncompleteUpload(format!(
                "no chunks have been uploaded for {}",
                hash
            )));
        }
        check_complete(&staged, request.total_chunks)?;

        let extension = extension_of(&request.file_name);
        let slot = self.objects.allocate(extension.as_deref()).await?;

        let written = match concatenate(&staged, &slot.path).await {
            Ok(written) => written,
            Err(e) => {
                self.objects.remove_quietly(&slot.relative).await;
                return Err(e.into());
            }
        };

        if let Some(expected) = request.size_bytes {
            if written != expected {
                self.objects.remove_quietly(&slot.relative).await;
                return Err(FileManagerError::IncompleteUpload(format!(
                    "assembled {} bytes but {} were expected",
                    written, expected
                )));
            }
        }

        let check = extension
            .as_deref()
            .map(|ext| self.policy.check(ext))
            .unwrap_or(ExtensionCheck::Rejected);
        if check == ExtensionCheck::Rejected {
            self.objects.remove_quietly(&slot.relative).await;
            self.chunks.discard(hash).await;
            tracing::warn!("rejected upload '{}': extension not allowed", request.file_name);
            return Err(FileManagerError::DisallowedExtension(extension.unwrap_or_default()));
        }

        let mime_type = mime_guess::from_path(&request.file_name)
            .first()
            .map(|mime| mime.to_string());

        let size_bytes = match i64::try_from(written) {
            Ok(size) => size,
            Err(_) => {
                self.objects.remove_quietly(&slot.relative).await;
                return Err(FileManagerError::InvalidInput(format!(
                    "assembled size {} is out of range",
                    written
                )));
            }
        };

        let registration = self
            .tree
            .register_file(NewFile {
                parent_id,
                name: request.file_name.clone(),
                size_bytes,
                storage_path: slot.relative.clone(),
                content_hash: hash.to_string(),
                mime_type,
                extension,
            })
            .await;

        let node = match registration {
            Ok(Registration::Created(node)) => node,
            Ok(Registration::AlreadyCommitted(existing)) => {
                self.objects.remove_quietly(&slot.relative).await;
                tracing::info!("merge of {} lost to node {}", hash, existing.id);
                return Ok(existing);
            }
            Err(e) => {
                self.objects.remove_quietly(&slot.relative).await;
                return Err(e);
            }
        };

        self.chunks.discard(hash).await;

        tracing::info!(
            "merged {} chunks of {} into '{}' ({} bytes, node {})",
            staged.len(),
            hash,
            node.name,
            node.size_bytes,
            node.id
        );
        Ok(node)
    }
}

/// Staged indices must run from 0 without gaps, and match `total_chunks`
/// exactly when the client declared it. Gaps are found between adjacent
/// staged indices, so the cost follows the number of staged chunks.
fn check_complete(staged: &[StagedChunk], total_chunks: Option<u32>) -> Result<()> {
    let expected = match total_chunks {
        Some(total) => u64::from(total),
        None => staged.last().map(|c| u64::from(c.index) + 1).unwrap_or(0),
    };

    let mut missing = IndexList::default();
    let mut unexpected = IndexList::default();
    let mut next = 0u64;
    for chunk in staged {
        let index = u64::from(chunk.index);
        if index >= expected {
            unexpected.push(index);
            continue;
        }
        missing.push_range(next, index);
        next = index + 1;
    }
    missing.push_range(next, expected);

    if missing.count == 0 && unexpected.count == 0 {
        return Ok(());
    }

    let mut detail = Vec::new();
    if missing.count > 0 {
        detail.push(format!("missing chunks {}", missing));
    }
    if unexpected.count > 0 {
        detail.push(format!(
            "chunks {} exceed the declared total of {}",
            unexpected, expected
        ));
    }
    Err(FileManagerError::IncompleteUpload(detail.join("; ")))
}

/// Index list for error messages; keeps the first few and counts the rest
#[derive(Default)]
struct IndexList {
    shown: Vec<u64>,
    count: u64,
}

impl IndexList {
    const SHOWN: usize = 20;

    fn push(&mut self, index: u64) {
        if self.shown.len() < Self::SHOWN {
            self.shown.push(index);
        }
        self.count += 1;
    }

    /// Record `start..end`, listing at most `SHOWN` entries in total
    fn push_range(&mut self, start: u64, end: u64) {
        if end <= start {
            return;
        }
        let room = (Self::SHOWN - self.shown.len()) as u64;
        self.shown.extend(start..end.min(start + room));
        self.count += end - start;
    }
}

impl std::fmt::Display for IndexList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let listed: Vec<String> = self.shown.iter().map(u64::to_string).collect();
        write!(f, "{}", listed.join(", "))?;
        if self.count > self.shown.len() as u64 {
            write!(f, ", ... ({} total)", self.count)?;
        }
        Ok(())
    }
}

/// Stream the chunks into `target` in the given order. Returns the byte count.
async fn concatenate(staged: &[StagedChunk], target: &Path) -> std::io::Result<u64> {
    let file = fs::File::create(target).await?;
    let mut writer = BufWriter::new(file);
    let mut written = 0u64;

    for chunk in staged {
        let mut reader = fs::File::open(&chunk.path).await?;
        written += tokio::io::copy(&mut reader, &mut writer).await?;
    }

    writer.flush().await?;
    writer.get_ref().sync_all().await?;
    Ok(written)
}
