//! Database operations for the dedup content index
//!
//! One row per (content hash, destination folder). The primary key doubles
//! as the durable claim that keeps concurrent merges from committing two
//! nodes for the same pair.

use super::models::Node;
use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqliteExecutor};
use uuid::Uuid;

const ROOT_FOLDER_KEY: &str = "root";

/// Key under which a destination folder is indexed
pub fn folder_key(folder_id: Option<Uuid>) -> String {
    match folder_id {
        Some(id) => id.hyphenated().to_string(),
        None => ROOT_FOLDER_KEY.to_string(),
    }
}

/// Insert an index entry. Fails with a unique violation if the pair is taken.
pub async fn insert_entry<'e>(
    exec: impl SqliteExecutor<'e>,
    content_hash: &str,
    folder_id: Option<Uuid>,
    node_id: Uuid,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO content_index (content_hash, folder_key, node_id, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(content_hash)
    .bind(folder_key(folder_id))
    .bind(node_id)
    .bind(now)
    .execute(exec)
    .await?;

    Ok(())
}

/// The oldest live file with this content under `folder_id` (NULL = root).
/// Reads the tree itself, so it holds even where a claim was dropped.
pub async fn find_live_node<'e>(
    exec: impl SqliteExecutor<'e>,
    content_hash: &str,
    folder_id: Option<Uuid>,
) -> anyhow::Result<Option<Node>> {
    let node = sqlx::query_as::<_, Node>(
        r#"
        SELECT id, parent_id, name, is_folder, size_bytes, storage_path, content_hash,
               mime_type, extension, sort_order, created_at, updated_at, deleted
        FROM nodes
        WHERE content_hash = $1 AND parent_id IS $2 AND is_folder = 0 AND deleted = 0
        ORDER BY created_at, id
        LIMIT 1
        "#,
    )
    .bind(content_hash)
    .bind(folder_id)
    .fetch_optional(exec)
    .await?;

    Ok(node)
}

/// Node currently holding the claim on (hash, folder)
pub async fn claimed_node<'e>(
    exec: impl SqliteExecutor<'e>,
    content_hash: &str,
    folder_id: Option<Uuid>,
) -> anyhow::Result<Option<Uuid>> {
    let row: Option<(Uuid,)> =
        sqlx::query_as("SELECT node_id FROM content_index WHERE content_hash = $1 AND folder_key = $2")
            .bind(content_hash)
            .bind(folder_key(folder_id))
            .fetch_optional(exec)
            .await?;

    Ok(row.map(|(id,)| id))
}

/// Re-key a node's entry after a move. If the destination already indexes
/// the same content, the moved node's entry is dropped instead.
pub async fn rekey_for_move(
    conn: &mut SqliteConnection,
    node_id: Uuid,
    new_folder_id: Option<Uuid>,
) -> anyhow::Result<()> {
    let key = folder_key(new_folder_id);

    sqlx::query("UPDATE OR IGNORE content_index SET folder_key = $2 WHERE node_id = $1")
        .bind(node_id)
        .bind(&key)
        .execute(&mut *conn)
        .await?;

    sqlx::query("DELETE FROM content_index WHERE node_id = $1 AND folder_key != $2")
        .bind(node_id)
        .bind(&key)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Drop the entries of every node in `node_ids`
pub async fn remove_for_nodes<'e>(
    exec: impl SqliteExecutor<'e>,
    node_ids: &[Uuid],
) -> anyhow::Result<u64> {
    if node_ids.is_empty() {
        return Ok(0);
    }

    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new("DELETE FROM content_index WHERE node_id IN (");
    let mut separated = qb.separated(", ");
    for id in node_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(")");

    let result = qb.build().execute(exec).await?;
    Ok(result.rows_affected())
}
