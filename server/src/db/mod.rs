pub mod content_index;
pub mod models;
pub mod nodes;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

pub type DbPool = Pool<Sqlite>;

// Re-export commonly used types
pub use models::{NewFile, NewFolder, Node, NodeRef};

/// Create a database connection pool
pub async fn create_pool(database_url: &str) -> anyhow::Result<DbPool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10));

    // SQLite will not create missing parent directories for the database file
    let filename = options.clone().get_filename();
    if let Some(parent) = filename.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Run database migrations using SQLx's built-in migration tracking.
/// Migrations are tracked in the `_sqlx_migrations` table and only run once.
pub async fn run_migrations(pool: &DbPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// True when the error came from a UNIQUE/PRIMARY KEY constraint.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .map(|e| e.is_unique_violation())
        .unwrap_or(false)
}

/// Tree statistics, reported by `stowd serve` at startup
pub struct Stats {
    pub total_folders: i64,
    pub total_files: i64,
    pub total_file_bytes: i64,
}

pub async fn get_stats(pool: &DbPool) -> anyhow::Result<Stats> {
    let (total_folders, total_files, total_file_bytes): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(CASE WHEN is_folder = 1 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN is_folder = 0 THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(size_bytes), 0)
        FROM nodes
        WHERE deleted = 0
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(Stats {
        total_folders,
        total_files,
        total_file_bytes,
    })
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use tempfile::TempDir;

    /// A migrated database in a throwaway directory. Keep the `TempDir`
    /// alive for as long as the pool is used.
    pub async fn test_pool() -> (DbPool, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("test.db").display());
        let pool = create_pool(&url).await.unwrap();
        run_migrations(&pool).await.unwrap();
        (pool, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_pool_makes_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deeper").join("stow.db");
        let pool = create_pool(&format!("sqlite://{}", path.display())).await.unwrap();
        run_migrations(&pool).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let (pool, _dir) = testing::test_pool().await;
        run_migrations(&pool).await.unwrap();

        let stats = get_stats(&pool).await.unwrap();
        assert_eq!(stats.total_folders, 0);
        assert_eq!(stats.total_files, 0);
        assert_eq!(stats.total_file_bytes, 0);
    }
}
