//! The file manager's public contract
//!
//! Upload flow is probe -> upload chunks (any order, resumable) -> complete.
//! Tree operations sit beside it. Every entry point validates its input
//! before delegating to the stores.

use crate::config::Config;
use crate::db::{DbPool, Node};
use crate::error::{FileManagerError, Result};
use crate::index::{ContentIndex, ProbeResult};
use crate::storage::{Assembler, ChunkOutcome, ChunkStore, ExtensionPolicy, MergeRequest, ObjectStore, SweepReport};
use crate::tree::{DeleteReport, ListQuery, MoveOutcome, Page, TreeStore};
use crate::validation::{validate_chunk_index, validate_content_hash, validate_name};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[derive(Clone)]
pub struct FileManagerService {
    chunks: Arc<ChunkStore>,
    index: ContentIndex,
    tree: TreeStore,
    assembler: Arc<Assembler>,
    max_chunk_bytes: usize,
}

impl FileManagerService {
    pub fn new(db: DbPool, config: &Config) -> Result<Self> {
        let objects = ObjectStore::new(config.objects_root())?;
        let chunks = Arc::new(ChunkStore::new(config.staging_root())?);

        let policy = ExtensionPolicy::from_allow_list(&config.allowed_extensions);
        if policy.is_empty() {
            tracing::warn!("extension allow-list is empty; every merge will be rejected");
        } else {
            tracing::info!("{} file extensions allowed", policy.len());
        }

        let tree = TreeStore::new(db.clone(), objects.clone());
        let index = ContentIndex::new(db, chunks.clone());
        let assembler = Assembler::new(objects, chunks.clone(), policy, tree.clone(), index.clone());

        Ok(Self {
            chunks,
            index,
            tree,
            assembler: Arc::new(assembler),
            max_chunk_bytes: config.max_chunk_bytes,
        })
    }

    // =========================================================================
    // Uploads
    // =========================================================================

    /// Is this content already in the folder? If not, which chunks are staged?
    pub async fn probe_upload(&self, content_hash: &str, parent_id: Option<Uuid>) -> Result<ProbeResult> {
        validate_content_hash(content_hash)?;
        self.tree.ensure_folder(parent_id).await?;
        self.index.probe(content_hash, parent_id).await
    }

    pub async fn upload_chunk(&self, content_hash: &str, index: i64, data: &[u8]) -> Result<ChunkOutcome> {
        validate_content_hash(content_hash)?;
        let index = validate_chunk_index(index)?;
        if data.len() > self.max_chunk_bytes {
            return Err(FileManagerError::InvalidInput(format!(
                "chunk of {} bytes exceeds the {} byte limit",
                data.len(),
                self.max_chunk_bytes
            )));
        }

        self.chunks.put_chunk(content_hash, index, data).await
    }

    /// Drop every staged chunk of an upload
    pub async fn abandon_upload(&self, content_hash: &str) -> Result<()> {
        validate_content_hash(content_hash)?;
        self.chunks.discard(content_hash).await;
        tracing::info!("abandoned upload {}", content_hash);
        Ok(())
    }

    pub async fn complete_upload(&self, request: MergeRequest) -> Result<Node> {
        validate_content_hash(&request.content_hash)?;
        let file_name = validate_name(&request.file_name)?;
        if request.total_chunks == Some(0) {
            return Err(FileManagerError::InvalidInput("total_chunks must be at least 1".into()));
        }

        self.assembler
            .merge(&MergeRequest { file_name, ..request })
            .await
    }

    /// Remove staging areas untouched for `max_age`
    pub async fn sweep_staging(&self, max_age: Duration) -> Result<SweepReport> {
        let chunks = self.chunks.clone();
        tokio::task::spawn_blocking(move || chunks.sweep_stale(max_age))
            .await
            .map_err(|e| FileManagerError::StorageWrite(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }

    // =========================================================================
    // Tree
    // =========================================================================

    pub async fn create_folder(&self, parent_id: Option<Uuid>, name: &str, sort_order: i32) -> Result<Node> {
        let name = validate_name(name)?;
        self.tree.create_folder(parent_id, &name, sort_order).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Node> {
        self.tree.get(id).await
    }

    pub async fn list(&self, query: ListQuery) -> Result<Page<Node>> {
        if matches!(query.limit, Some(limit) if limit < 1) {
            return Err(FileManagerError::InvalidInput("limit must be positive".into()));
        }
        if matches!(query.offset, Some(offset) if offset < 0) {
            return Err(FileManagerError::InvalidInput("offset cannot be negative".into()));
        }
        self.tree.list(query).await
    }

    pub async fn rename(&self, id: Uuid, new_name: &str) -> Result<Node> {
        let new_name = validate_name(new_name)?;
        self.tree.rename(id, &new_name).await
    }

    pub async fn move_node(&self, id: Uuid, new_parent_id: Option<Uuid>) -> Result<MoveOutcome> {
        self.tree.move_node(id, new_parent_id).await
    }

    pub async fn delete(&self, id: Uuid) -> Result<DeleteReport> {
        self.tree.delete(id).await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::test_service;
    use super::*;
    use std::path::Path;
    use walkdir::WalkDir;

    const HASH: &str = "9e107d9d372bb6826bd81d3542a419d6";

    fn object_count(root: &Path) -> usize {
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count()
    }

    fn merge(hash: &str, name: &str, parent_id: Option<Uuid>) -> MergeRequest {
        MergeRequest {
            content_hash: hash.to_string(),
            file_name: name.to_string(),
            parent_id,
            total_chunks: None,
            size_bytes: None,
        }
    }

    #[tokio::test]
    async fn test_resumable_upload_flow() {
        let (service, _config, _d, _s) = test_service("txt").await;

        assert_eq!(service.probe_upload(HASH, None).await.unwrap(), ProbeResult::NeedsUpload(vec![]));

        service.upload_chunk(HASH, 0, b"hello ").await.unwrap();
        assert_eq!(service.probe_upload(HASH, None).await.unwrap(), ProbeResult::NeedsUpload(vec![0]));

        // Retried chunk is recognised
        assert_eq!(service.upload_chunk(HASH, 0, b"hello ").await.unwrap(), ChunkOutcome::AlreadyPresent);
        service.upload_chunk(HASH, 1, b"world").await.unwrap();

        let node = service.complete_upload(merge(HASH, "  greeting.txt ", None)).await.unwrap();
        assert_eq!(node.name, "greeting.txt");
        assert_eq!(node.size_bytes, 11);
        assert_eq!(node.content_hash.as_deref(), Some(HASH));

        match service.probe_upload(HASH, None).await.unwrap() {
            ProbeResult::AlreadyStored(found) => assert_eq!(found.id, node.id),
            other => panic!("expected instant completion, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dedup_short_circuit_writes_no_new_object() {
        let (service, config, _d, _s) = test_service("txt").await;
        service.upload_chunk(HASH, 0, b"abc").await.unwrap();
        let first = service.complete_upload(merge(HASH, "a.txt", None)).await.unwrap();
        assert_eq!(object_count(&config.objects_root()), 1);

        // Same content, same folder: completes without any chunk upload
        let second = service.complete_upload(merge(HASH, "a.txt", None)).await.unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(object_count(&config.objects_root()), 1);
    }

    #[tokio::test]
    async fn test_dedup_is_scoped_to_folder() {
        let (service, _config, _d, _s) = test_service("txt").await;
        let folder = service.create_folder(None, "Inbox", 0).await.unwrap();
        service.upload_chunk(HASH, 0, b"abc").await.unwrap();
        service.complete_upload(merge(HASH, "a.txt", None)).await.unwrap();

        assert_eq!(
            service.probe_upload(HASH, Some(folder.id)).await.unwrap(),
            ProbeResult::NeedsUpload(vec![])
        );
    }

    #[tokio::test]
    async fn test_dedup_holds_after_moving_a_copy_and_deleting_the_original() {
        let (service, _config, _d, _s) = test_service("txt").await;
        let folder = service.create_folder(None, "F", 0).await.unwrap();
        service.upload_chunk(HASH, 0, b"abc").await.unwrap();
        let x = service.complete_upload(merge(HASH, "x.txt", None)).await.unwrap();
        service.upload_chunk(HASH, 0, b"abc").await.unwrap();
        let y = service.complete_upload(merge(HASH, "y.txt", Some(folder.id))).await.unwrap();

        service.move_node(x.id, Some(folder.id)).await.unwrap();
        service.delete(y.id).await.unwrap();

        match service.probe_upload(HASH, Some(folder.id)).await.unwrap() {
            ProbeResult::AlreadyStored(found) => assert_eq!(found.id, x.id),
            other => panic!("expected the moved copy, got {:?}", other),
        }
        let z = service.complete_upload(merge(HASH, "z.txt", Some(folder.id))).await.unwrap();
        assert_eq!(z.id, x.id);

        let page = service
            .list(ListQuery {
                parent_id: Some(folder.id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_input_validation() {
        let (service, _config, _d, _s) = test_service("txt").await;

        let err = service.upload_chunk("../x", 0, b"a").await.unwrap_err();
        assert!(matches!(err, FileManagerError::InvalidInput(_)));
        let err = service.upload_chunk(HASH, -1, b"a").await.unwrap_err();
        assert!(matches!(err, FileManagerError::InvalidInput(_)));
        let err = service.upload_chunk(HASH, 0, &[0u8; 2048]).await.unwrap_err();
        assert!(matches!(err, FileManagerError::InvalidInput(_)));
        let err = service.create_folder(None, "  ", 0).await.unwrap_err();
        assert!(matches!(err, FileManagerError::InvalidInput(_)));
        let err = service.complete_upload(merge(HASH, "a/b.txt", None)).await.unwrap_err();
        assert!(matches!(err, FileManagerError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_duplicate_names_on_create_and_rename() {
        let (service, _config, _d, _s) = test_service("txt").await;
        service.create_folder(None, "Reports", 0).await.unwrap();
        let other = service.create_folder(None, "Drafts", 0).await.unwrap();

        assert!(matches!(
            service.create_folder(None, "Reports", 0).await.unwrap_err(),
            FileManagerError::DuplicateName(_)
        ));
        assert!(matches!(
            service.rename(other.id, "Reports").await.unwrap_err(),
            FileManagerError::DuplicateName(_)
        ));
    }

    #[tokio::test]
    async fn test_cascading_delete_reclaims_objects() {
        let (service, config, _d, _s) = test_service("txt").await;
        let a = service.create_folder(None, "A", 0).await.unwrap();
        let b = service.create_folder(Some(a.id), "B", 0).await.unwrap();
        service.upload_chunk(HASH, 0, b"abc").await.unwrap();
        let file = service.complete_upload(merge(HASH, "f.txt", Some(b.id))).await.unwrap();
        assert_eq!(object_count(&config.objects_root()), 1);

        let report = service.delete(a.id).await.unwrap();
        assert_eq!(report.nodes_deleted, 3);
        assert_eq!(object_count(&config.objects_root()), 0);
        assert!(matches!(service.get(file.id).await.unwrap_err(), FileManagerError::NodeNotFound(_)));

        let page = service.list(ListQuery::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_abandon_clears_staging() {
        let (service, _config, _d, _s) = test_service("txt").await;
        service.upload_chunk(HASH, 0, b"abc").await.unwrap();
        service.abandon_upload(HASH).await.unwrap();

        assert_eq!(service.probe_upload(HASH, None).await.unwrap(), ProbeResult::NeedsUpload(vec![]));
        assert!(matches!(
            service.complete_upload(merge(HASH, "a.txt", None)).await.unwrap_err(),
            FileManagerError::IncompleteUpload(_)
        ));
    }

    #[tokio::test]
    async fn test_sweep_leaves_fresh_sessions() {
        let (service, _config, _d, _s) = test_service("txt").await;
        service.upload_chunk(HASH, 0, b"abc").await.unwrap();

        let report = service.sweep_staging(Duration::from_secs(3600)).await.unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(service.probe_upload(HASH, None).await.unwrap(), ProbeResult::NeedsUpload(vec![0]));
    }
}
