//! The folder/file namespace
//!
//! `TreeStore` is the only writer of nodes. Every mutation runs under one
//! async tree lock, held around metadata reads and writes only. Physical
//! objects are reaped after the lock is released.

use crate::db::nodes::{self, ListFilter};
use crate::db::{self, content_index, DbPool, NewFile, NewFolder, Node};
use crate::error::{FileManagerError, Result};
use crate::index::ContentIndex;
use crate::storage::objects::ObjectStore;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Child queries and bulk updates are issued in batches of this many ids
const ID_BATCH: usize = 500;

pub const DEFAULT_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE_SIZE: i64 = 500;

#[derive(Debug, Clone, PartialEq)]
pub enum MoveOutcome {
    Moved(Node),
    /// Target parent is the current parent; nothing changed
    AlreadyInPlace(Node),
}

impl MoveOutcome {
    pub fn node(&self) -> &Node {
        match self {
            MoveOutcome::Moved(node) | MoveOutcome::AlreadyInPlace(node) => node,
        }
    }
}

/// Result of registering an assembled file
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Created(Node),
    /// A concurrent merge already committed this (hash, folder)
    AlreadyCommitted(Node),
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct DeleteReport {
    pub nodes_deleted: u64,
    pub objects_removed: usize,
    pub objects_failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub parent_id: Option<Uuid>,
    pub keyword: Option<String>,
    pub is_folder: Option<bool>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Clone)]
pub struct TreeStore {
    db: DbPool,
    objects: ObjectStore,
    lock: Arc<Mutex<()>>,
}

impl TreeStore {
    pub fn new(db: DbPool, objects: ObjectStore) -> Self {
        Self {
            db,
            objects,
            lock: Arc::new(Mutex::new(())),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// A live node
    pub async fn get(&self, id: Uuid) -> Result<Node> {
        nodes::get_node(&self.db, id)
            .await?
            .ok_or(FileManagerError::NodeNotFound(id))
    }

    /// Fail unless `folder_id` is the root or a live folder
    pub async fn ensure_folder(&self, folder_id: Option<Uuid>) -> Result<()> {
        let Some(id) = folder_id else {
            return Ok(());
        };
        let node = self.get(id).await?;
        if !node.is_folder {
            return Err(FileManagerError::NotAFolder(id));
        }
        Ok(())
    }

    /// Fail if a live sibling other than `except` is already called `name`
    pub async fn ensure_name_free(
        &self,
        parent_id: Option<Uuid>,
        name: &str,
        except: Option<Uuid>,
    ) -> Result<()> {
        match nodes::find_live_sibling(&self.db, parent_id, name).await? {
            Some(existing) if Some(existing) != except => {
                Err(FileManagerError::DuplicateName(name.to_string()))
            }
            _ => Ok(()),
        }
    }

    pub async fn list(&self, query: ListQuery) -> Result<Page<Node>> {
        let keyword = query
            .keyword
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        // A keyword search is global; otherwise the parent must be listable
        if keyword.is_none() {
            self.ensure_folder(query.parent_id).await?;
        }

        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0).max(0);

        let filter = ListFilter {
            parent_id: query.parent_id,
            keyword,
            is_folder: query.is_folder,
            limit,
            offset,
        };
        let (records, total) = nodes::list_nodes(&self.db, &filter).await?;

        Ok(Page {
            records,
            total,
            limit,
            offset,
        })
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    pub async fn create_folder(&self, parent_id: Option<Uuid>, name: &str, sort_order: i32) -> Result<Node> {
        let _guard = self.lock.lock().await;

        self.ensure_folder(parent_id).await?;
        self.ensure_name_free(parent_id, name, None).await?;

        let node = Node::folder(
            NewFolder {
                parent_id,
                name: name.to_string(),
                sort_order,
            },
            Utc::now(),
        );
        nodes::insert_node(&self.db, &node)
            .await
            .map_err(|e| map_insert_error(e, name))?;

        tracing::info!("created folder '{}' ({})", node.name, node.id);
        Ok(node)
    }

    pub async fn rename(&self, id: Uuid, new_name: &str) -> Result<Node> {
        let _guard = self.lock.lock().await;

        let node = self.get(id).await?;
        if node.name == new_name {
            return Ok(node);
        }
        self.ensure_name_free(node.parent_id, new_name, Some(id)).await?;

        nodes::rename_node(&self.db, id, new_name, Utc::now())
            .await
            .map_err(|e| map_insert_error(e, new_name))?;

        tracing::info!("renamed {} '{}' -> '{}'", id, node.name, new_name);
        self.get(id).await
    }

    pub async fn move_node(&self, id: Uuid, new_parent_id: Option<Uuid>) -> Result<MoveOutcome> {
        if new_parent_id == Some(id) {
            return Err(FileManagerError::CyclicMove);
        }

        let _guard = self.lock.lock().await;

        let node = self.get(id).await?;
        self.ensure_folder(new_parent_id).await?;

        if node.is_folder {
            self.ensure_not_ancestor(id, new_parent_id).await?;
        }

        if node.parent_id == new_parent_id {
            tracing::warn!("move of {} is a no-op: already in target folder", id);
            return Ok(MoveOutcome::AlreadyInPlace(node));
        }

        self.ensure_name_free(new_parent_id, &node.name, Some(id)).await?;

        let mut tx = self.db.begin().await?;
        nodes::set_parent(&mut *tx, id, new_parent_id, Utc::now())
            .await
            .map_err(|e| map_insert_error(e, &node.name))?;
        if !node.is_folder {
            content_index::rekey_for_move(&mut *tx, id, new_parent_id).await?;
        }
        tx.commit().await?;

        tracing::info!("moved {} from {:?} to {:?}", id, node.parent_id, new_parent_id);
        Ok(MoveOutcome::Moved(self.get(id).await?))
    }

    /// Walk upward from `start` and fail if `id` is on the way to the root
    async fn ensure_not_ancestor(&self, id: Uuid, start: Option<Uuid>) -> Result<()> {
        let mut visited = HashSet::new();
        let mut cursor = start;

        while let Some(current) = cursor {
            if current == id {
                return Err(FileManagerError::CyclicMove);
            }
            if !visited.insert(current) {
                return Err(FileManagerError::Database(anyhow::anyhow!(
                    "parent chain loops at node {}",
                    current
                )));
            }
            cursor = nodes::get_parent_id(&self.db, current).await?.flatten();
        }

        Ok(())
    }

    /// Delete a node and, for folders, everything below it. Metadata is
    /// marked deleted in one transaction; objects are reaped afterwards and
    /// a failed removal is logged, never rolled back.
    pub async fn delete(&self, id: Uuid) -> Result<DeleteReport> {
        let guard = self.lock.lock().await;

        let root = self.get(id).await?;
        let mut ids = vec![root.id];
        let mut object_paths: Vec<String> = root.storage_path.clone().into_iter().collect();

        let mut frontier = if root.is_folder { vec![root.id] } else { vec![] };
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for batch in frontier.chunks(ID_BATCH) {
                for child in nodes::get_children_of(&self.db, batch).await? {
                    ids.push(child.id);
                    if child.is_folder {
                        next.push(child.id);
                    } else if let Some(path) = child.storage_path {
                        object_paths.push(path);
                    }
                }
            }
            frontier = next;
        }

        let now = Utc::now();
        let mut nodes_deleted = 0;
        let mut tx = self.db.begin().await?;
        for batch in ids.chunks(ID_BATCH) {
            nodes_deleted += nodes::mark_deleted(&mut *tx, batch, now).await?;
            content_index::remove_for_nodes(&mut *tx, batch).await?;
        }
        tx.commit().await?;
        drop(guard);

        tracing::info!("deleted '{}' ({}) and {} descendants", root.name, id, ids.len() - 1);

        let mut report = DeleteReport {
            nodes_deleted,
            ..Default::default()
        };
        for path in &object_paths {
            match self.objects.remove(path).await {
                Ok(()) => report.objects_removed += 1,
                Err(e) => {
                    tracing::warn!("failed to reclaim object {} of deleted node: {}", path, e);
                    report.objects_failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Create the node for an assembled file and claim its content index
    /// entry in one transaction. Parent and name are re-checked under the
    /// tree lock.
    pub async fn register_file(&self, new_file: NewFile) -> Result<Registration> {
        let _guard = self.lock.lock().await;

        let parent_id = new_file.parent_id;
        let content_hash = new_file.content_hash.clone();
        let name = new_file.name.clone();

        self.ensure_folder(parent_id).await?;
        if let Some(existing) = content_index::find_live_node(&self.db, &content_hash, parent_id).await? {
            return Ok(Registration::AlreadyCommitted(existing));
        }
        self.ensure_name_free(parent_id, &name, None).await?;

        let now = Utc::now();
        let node = Node::file(new_file, now);

        let mut tx = self.db.begin().await?;
        nodes::insert_node(&mut *tx, &node)
            .await
            .map_err(|e| map_insert_error(e, &name))?;

        if let Err(e) = ContentIndex::register(&mut *tx, &content_hash, parent_id, node.id, now).await {
            if !db::is_unique_violation(&e) {
                return Err(e.into());
            }
            tx.rollback().await?;
            return match content_index::find_live_node(&self.db, &content_hash, parent_id).await? {
                Some(existing) => Ok(Registration::AlreadyCommitted(existing)),
                None => Err(FileManagerError::Database(anyhow::anyhow!(
                    "content index entry for {} has no live node",
                    content_hash
                ))),
            };
        }
        tx.commit().await?;

        Ok(Registration::Created(node))
    }
}

/// A unique violation on insert or update is a sibling name collision
fn map_insert_error(err: anyhow::Error, name: &str) -> FileManagerError {
    if db::is_unique_violation(&err) {
        FileManagerError::DuplicateName(name.to_string())
    } else {
        FileManagerError::Database(err)
    }
}
