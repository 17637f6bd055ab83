//! Database operations for tree nodes
//!
//! Single-statement helpers take any `SqliteExecutor`, so they run equally on
//! the pool or inside a transaction (`&mut *tx`).

use super::models::{Node, NodeRef};
use super::DbPool;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteExecutor};
use uuid::Uuid;

const NODE_COLUMNS: &str = "id, parent_id, name, is_folder, size_bytes, storage_path, content_hash, \
     mime_type, extension, sort_order, created_at, updated_at, deleted";

/// Insert a node record
pub async fn insert_node<'e>(exec: impl SqliteExecutor<'e>, node: &Node) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO nodes (id, parent_id, name, is_folder, size_bytes, storage_path, content_hash,
                           mime_type, extension, sort_order, created_at, updated_at, deleted)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(node.id)
    .bind(node.parent_id)
    .bind(&node.name)
    .bind(node.is_folder)
    .bind(node.size_bytes)
    .bind(&node.storage_path)
    .bind(&node.content_hash)
    .bind(&node.mime_type)
    .bind(&node.extension)
    .bind(node.sort_order)
    .bind(node.created_at)
    .bind(node.updated_at)
    .bind(node.deleted)
    .execute(exec)
    .await?;

    Ok(())
}

/// Get a live node by ID
pub async fn get_node<'e>(exec: impl SqliteExecutor<'e>, id: Uuid) -> anyhow::Result<Option<Node>> {
    let node = sqlx::query_as::<_, Node>(&format!(
        "SELECT {} FROM nodes WHERE id = $1 AND deleted = 0",
        NODE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(exec)
    .await?;

    Ok(node)
}

/// Find the live sibling named `name` under `parent_id` (NULL = root)
pub async fn find_live_sibling<'e>(
    exec: impl SqliteExecutor<'e>,
    parent_id: Option<Uuid>,
    name: &str,
) -> anyhow::Result<Option<Uuid>> {
    let id: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM nodes
        WHERE parent_id IS $1 AND name = $2 AND deleted = 0
        LIMIT 1
        "#,
    )
    .bind(parent_id)
    .bind(name)
    .fetch_optional(exec)
    .await?;

    Ok(id.map(|(id,)| id))
}

/// Parent of a live node. `None` if the node is missing or deleted,
/// `Some(None)` if it sits at the root.
pub async fn get_parent_id<'e>(
    exec: impl SqliteExecutor<'e>,
    id: Uuid,
) -> anyhow::Result<Option<Option<Uuid>>> {
    let row: Option<(Option<Uuid>,)> =
        sqlx::query_as("SELECT parent_id FROM nodes WHERE id = $1 AND deleted = 0")
            .bind(id)
            .fetch_optional(exec)
            .await?;

    Ok(row.map(|(parent,)| parent))
}

/// Rename a node. Does not touch the parent, content or storage path.
pub async fn rename_node<'e>(
    exec: impl SqliteExecutor<'e>,
    id: Uuid,
    name: &str,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE nodes SET name = $2, updated_at = $3 WHERE id = $1 AND deleted = 0")
        .bind(id)
        .bind(name)
        .bind(now)
        .execute(exec)
        .await?;

    Ok(())
}

/// Re-parent a node. Does not touch the name, content or storage path.
pub async fn set_parent<'e>(
    exec: impl SqliteExecutor<'e>,
    id: Uuid,
    parent_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query("UPDATE nodes SET parent_id = $2, updated_at = $3 WHERE id = $1 AND deleted = 0")
        .bind(id)
        .bind(parent_id)
        .bind(now)
        .execute(exec)
        .await?;

    Ok(())
}

/// Live children of every node in `parent_ids`, fetched in one round-trip
pub async fn get_children_of<'e>(
    exec: impl SqliteExecutor<'e>,
    parent_ids: &[Uuid],
) -> anyhow::Result<Vec<NodeRef>> {
    if parent_ids.is_empty() {
        return Ok(vec![]);
    }

    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT id, is_folder, storage_path FROM nodes WHERE deleted = 0 AND parent_id IN (");
    let mut separated = qb.separated(", ");
    for id in parent_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let children = qb.build_query_as::<NodeRef>().fetch_all(exec).await?;
    Ok(children)
}

/// Logically delete every node in `ids`
pub async fn mark_deleted<'e>(
    exec: impl SqliteExecutor<'e>,
    ids: &[Uuid],
    now: DateTime<Utc>,
) -> anyhow::Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("UPDATE nodes SET deleted = 1, updated_at = ");
    qb.push_bind(now);
    qb.push(" WHERE deleted = 0 AND id IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let result = qb.build().execute(exec).await?;
    Ok(result.rows_affected())
}

// =============================================================================
// Listing
// =============================================================================

/// Filter for `list_nodes`. A keyword switches to a global name search and
/// ignores `parent_id`.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub parent_id: Option<Uuid>,
    pub keyword: Option<String>,
    pub is_folder: Option<bool>,
    pub limit: i64,
    pub offset: i64,
}

fn push_list_conditions(qb: &mut QueryBuilder<'_, Sqlite>, filter: &ListFilter) {
    qb.push(" WHERE deleted = 0");
    match filter.keyword.as_deref() {
        Some(keyword) => {
            qb.push(" AND name LIKE ");
            qb.push_bind(format!("%{}%", escape_like(keyword)));
            qb.push(" ESCAPE '\\'");
        }
        None => {
            qb.push(" AND parent_id IS ");
            qb.push_bind(filter.parent_id);
        }
    }
    if let Some(is_folder) = filter.is_folder {
        qb.push(" AND is_folder = ");
        qb.push_bind(is_folder);
    }
}

/// List live nodes: folders first, then `sort_order` ascending, then most
/// recently updated first. Returns the page and the total match count.
pub async fn list_nodes(pool: &DbPool, filter: &ListFilter) -> anyhow::Result<(Vec<Node>, i64)> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!("SELECT {} FROM nodes", NODE_COLUMNS));
    push_list_conditions(&mut qb, filter);
    qb.push(" ORDER BY is_folder DESC, sort_order ASC, updated_at DESC, name ASC LIMIT ");
    qb.push_bind(filter.limit);
    qb.push(" OFFSET ");
    qb.push_bind(filter.offset);

    let nodes = qb.build_query_as::<Node>().fetch_all(pool).await?;

    let mut count_qb: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT COUNT(*) FROM nodes");
    push_list_conditions(&mut count_qb, filter);
    let (total,): (i64,) = count_qb.build_query_as().fetch_one(pool).await?;

    Ok((nodes, total))
}

/// Escape LIKE wildcards so a keyword is matched literally
fn escape_like(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::NewFolder;
    use crate::db::testing::test_pool;

    fn folder(parent_id: Option<Uuid>, name: &str) -> Node {
        Node::folder(
            NewFolder {
                parent_id,
                name: name.to_string(),
                sort_order: 0,
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[tokio::test]
    async fn test_unique_index_rejects_live_sibling_duplicates() {
        let (pool, _dir) = test_pool().await;
        insert_node(&pool, &folder(None, "Docs")).await.unwrap();

        let err = insert_node(&pool, &folder(None, "Docs")).await.unwrap_err();
        assert!(crate::db::is_unique_violation(&err));
    }

    #[tokio::test]
    async fn test_deleted_rows_free_the_name() {
        let (pool, _dir) = test_pool().await;
        let first = folder(None, "Docs");
        insert_node(&pool, &first).await.unwrap();
        mark_deleted(&pool, &[first.id], Utc::now()).await.unwrap();

        insert_node(&pool, &folder(None, "Docs")).await.unwrap();
        assert!(get_node(&pool, first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_live_sibling_distinguishes_root_from_folders() {
        let (pool, _dir) = test_pool().await;
        let parent = folder(None, "Parent");
        insert_node(&pool, &parent).await.unwrap();
        let child = folder(Some(parent.id), "Child");
        insert_node(&pool, &child).await.unwrap();

        assert_eq!(find_live_sibling(&pool, Some(parent.id), "Child").await.unwrap(), Some(child.id));
        assert_eq!(find_live_sibling(&pool, None, "Child").await.unwrap(), None);
        assert_eq!(find_live_sibling(&pool, None, "Parent").await.unwrap(), Some(parent.id));
    }

    #[tokio::test]
    async fn test_children_are_batched_across_parents() {
        let (pool, _dir) = test_pool().await;
        let a = folder(None, "A");
        let b = folder(None, "B");
        insert_node(&pool, &a).await.unwrap();
        insert_node(&pool, &b).await.unwrap();
        insert_node(&pool, &folder(Some(a.id), "a1")).await.unwrap();
        insert_node(&pool, &folder(Some(b.id), "b1")).await.unwrap();
        insert_node(&pool, &folder(Some(b.id), "b2")).await.unwrap();

        let children = get_children_of(&pool, &[a.id, b.id]).await.unwrap();
        assert_eq!(children.len(), 3);
        assert!(get_children_of(&pool, &[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_keyword_search_is_global_and_literal() {
        let (pool, _dir) = test_pool().await;
        let a = folder(None, "A");
        insert_node(&pool, &a).await.unwrap();
        insert_node(&pool, &folder(Some(a.id), "Quarterly Report")).await.unwrap();
        insert_node(&pool, &folder(None, "report_2024")).await.unwrap();
        insert_node(&pool, &folder(None, "reportX2024")).await.unwrap();

        let filter = ListFilter {
            keyword: Some("REPORT".to_string()),
            limit: 50,
            ..Default::default()
        };
        let (_, total) = list_nodes(&pool, &filter).await.unwrap();
        assert_eq!(total, 3);

        let filter = ListFilter {
            keyword: Some("report_".to_string()),
            limit: 50,
            ..Default::default()
        };
        let (nodes, total) = list_nodes(&pool, &filter).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(nodes[0].name, "report_2024");
    }
}
