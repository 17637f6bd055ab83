//! Staging areas for in-flight chunked uploads
//!
//! Each upload session is a directory named after its content hash; each
//! chunk is a file named after its decimal index:
//!
//! ```text
//! staging/
//!   <content_hash>/
//!     0
//!     1
//!     10
//!     .11.<uuid>.part   <- in-flight write, ignored until renamed
//! ```
//!
//! A chunk file is written under a unique temporary name and renamed into
//! place, so it is immutable once visible and concurrent writers of the same
//! index cannot tear it.

use crate::error::Result;
use crate::validation::validate_content_hash;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;
use walkdir::WalkDir;

/// Result of storing a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkOutcome {
    Stored,
    AlreadyPresent,
}

/// A staged chunk file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedChunk {
    pub index: u32,
    pub path: PathBuf,
}

/// Result of a staging sweep
#[derive(Debug, Default)]
pub struct SweepReport {
    pub removed: Vec<String>,
    pub kept: usize,
}

pub struct ChunkStore {
    staging_root: PathBuf,
}

impl ChunkStore {
    pub fn new(staging_root: impl AsRef<Path>) -> Result<Self> {
        let staging_root = staging_root.as_ref().to_path_buf();
        std::fs::create_dir_all(&staging_root)?;
        Ok(Self { staging_root })
    }

    /// Staging directory for a content hash
    pub fn staging_dir(&self, content_hash: &str) -> Result<PathBuf> {
        validate_content_hash(content_hash)?;
        Ok(self.staging_root.join(content_hash))
    }

    /// Persist one chunk. A chunk already on disk with the same length is
    /// left alone and reported as `AlreadyPresent`.
    pub async fn put_chunk(&self, content_hash: &str, index: u32, data: &[u8]) -> Result<ChunkOutcome> {
        let dir = self.staging_dir(content_hash)?;
        let path = dir.join(index.to_string());

        if let Ok(meta) = fs::metadata(&path).await {
            if meta.is_file() && meta.len() == data.len() as u64 {
                tracing::debug!("chunk {} of {} already present", index, content_hash);
                return Ok(ChunkOutcome::AlreadyPresent);
            }
        }

        fs::create_dir_all(&dir).await?;

        let temp_path = dir.join(format!(".{}.{}.part", index, Uuid::new_v4().simple()));
        if let Err(e) = write_file(&temp_path, data).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp_path, &path).await {
            let _ = fs::remove_file(&temp_path).await;
            return Err(e.into());
        }

        tracing::debug!("stored chunk {} of {} ({} bytes)", index, content_hash, data.len());
        Ok(ChunkOutcome::Stored)
    }

    /// Completed chunks for a content hash, sorted numerically by index.
    /// A missing staging directory is an empty session.
    pub async fn present_chunks(&self, content_hash: &str) -> Result<Vec<StagedChunk>> {
        let dir = self.staging_dir(content_hash)?;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(e.into()),
        };

        let mut chunks = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(parse_chunk_name) {
                chunks.push(StagedChunk {
                    index,
                    path: entry.path(),
                });
            }
        }

        // Numeric, not lexicographic: chunk 2 must come before chunk 10
        chunks.sort_by_key(|c| c.index);
        Ok(chunks)
    }

    /// Indices already received, ascending. Used by probe to resume uploads.
    pub async fn list_present_indices(&self, content_hash: &str) -> Result<Vec<u32>> {
        Ok(self
            .present_chunks(content_hash)
            .await?
            .into_iter()
            .map(|c| c.index)
            .collect())
    }

    /// Remove a staging directory. Never fails the caller.
    pub async fn discard(&self, content_hash: &str) {
        let dir = match self.staging_dir(content_hash) {
            Ok(dir) => dir,
            Err(e) => {
                tracing::warn!("refusing to discard staging for {}: {}", content_hash, e);
                return;
            }
        };

        match fs::remove_dir_all(&dir).await {
            Ok(()) => tracing::debug!("discarded staging for {}", content_hash),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!("staging for {} already gone", content_hash)
            }
            Err(e) => tracing::warn!("failed to discard staging {}: {}", dir.display(), e),
        }
    }

    /// Remove staging directories whose newest entry is older than `max_age`.
    /// Blocking; run it off the async runtime.
    pub fn sweep_stale(&self, max_age: Duration) -> Result<SweepReport> {
        let now = SystemTime::now();
        let mut report = SweepReport::default();

        for entry in std::fs::read_dir(&self.staging_root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let dir = entry.path();

            let newest = WalkDir::new(&dir)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter_map(|e| e.metadata().ok())
                .filter_map(|m| m.modified().ok())
                .max();

            let is_stale = match newest {
                Some(modified) => now.duration_since(modified).unwrap_or_default() >= max_age,
                None => true,
            };

            if !is_stale {
                report.kept += 1;
                continue;
            }

            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {
                    tracing::info!("swept stale staging {}", dir.display());
                    report.removed.push(entry.file_name().to_string_lossy().into_owned());
                }
                Err(e) => tracing::warn!("failed to sweep {}: {}", dir.display(), e),
            }
        }

        Ok(report)
    }
}

async fn write_file(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path).await?;
    file.write_all(data).await?;
    file.sync_all().await?;
    Ok(())
}

/// Only canonical decimal names are chunks; temp files and strays are not
fn parse_chunk_name(name: &str) -> Option<u32> {
    let index = name.parse::<u32>().ok()?;
    (index.to_string() == name).then_some(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::tempdir;

    const HASH: &str = "5d41402abc4b2a76b9719d911017c592";

    #[test]
    fn test_parse_chunk_name() {
        assert_eq!(parse_chunk_name("0"), Some(0));
        assert_eq!(parse_chunk_name("10"), Some(10));
        assert_eq!(parse_chunk_name("010"), None);
        assert_eq!(parse_chunk_name(".3.abc.part"), None);
        assert_eq!(parse_chunk_name("-1"), None);
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let temp = tempdir().unwrap();
        let store = ChunkStore::new(temp.path()).unwrap();

        assert_eq!(store.put_chunk(HASH, 0, b"hello").await.unwrap(), ChunkOutcome::Stored);
        assert_eq!(store.put_chunk(HASH, 0, b"hello").await.unwrap(), ChunkOutcome::AlreadyPresent);
        assert_eq!(store.list_present_indices(HASH).await.unwrap(), vec![0]);
    }

    #[tokio::test]
    async fn test_length_mismatch_rewrites() {
        let temp = tempdir().unwrap();
        let store = ChunkStore::new(temp.path()).unwrap();

        store.put_chunk(HASH, 0, b"hel").await.unwrap();
        assert_eq!(store.put_chunk(HASH, 0, b"hello").await.unwrap(), ChunkOutcome::Stored);

        let chunks = store.present_chunks(HASH).await.unwrap();
        assert_eq!(std::fs::read(&chunks[0].path).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_indices_sort_numerically() {
        let temp = tempdir().unwrap();
        let store = ChunkStore::new(temp.path()).unwrap();

        for index in [10u32, 2, 0, 11, 1] {
            store.put_chunk(HASH, index, b"x").await.unwrap();
        }
        // Stray temp file from an interrupted write
        std::fs::write(store.staging_dir(HASH).unwrap().join(".3.dead.part"), b"x").unwrap();

        assert_eq!(store.list_present_indices(HASH).await.unwrap(), vec![0, 1, 2, 10, 11]);
    }

    #[tokio::test]
    async fn test_missing_session_is_empty() {
        let temp = tempdir().unwrap();
        let store = ChunkStore::new(temp.path()).unwrap();
        assert!(store.list_present_indices(HASH).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_discard_tolerates_missing_directory() {
        let temp = tempdir().unwrap();
        let store = ChunkStore::new(temp.path()).unwrap();

        store.put_chunk(HASH, 0, b"x").await.unwrap();
        store.discard(HASH).await;
        assert!(!store.staging_dir(HASH).unwrap().exists());

        store.discard(HASH).await;
    }

    #[tokio::test]
    async fn test_rejects_path_like_hash() {
        let temp = tempdir().unwrap();
        let store = ChunkStore::new(temp.path()).unwrap();
        assert!(store.put_chunk("../escape", 0, b"x").await.is_err());
    }

    #[tokio::test]
    async fn test_concurrent_writes_of_same_chunk() {
        let temp = tempdir().unwrap();
        let store = Arc::new(ChunkStore::new(temp.path()).unwrap());
        let data = vec![7u8; 64 * 1024];

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let data = data.clone();
            handles.push(tokio::spawn(async move { store.put_chunk(HASH, 3, &data).await }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let chunks = store.present_chunks(HASH).await.unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(std::fs::read(&chunks[0].path).unwrap(), data);
    }

    #[test]
    fn test_sweep_removes_only_stale_sessions() {
        let temp = tempdir().unwrap();
        let store = ChunkStore::new(temp.path()).unwrap();
        std::fs::create_dir_all(temp.path().join("fresh")).unwrap();
        std::fs::write(temp.path().join("fresh").join("0"), b"x").unwrap();

        let report = store.sweep_stale(Duration::from_secs(3600)).unwrap();
        assert!(report.removed.is_empty());
        assert_eq!(report.kept, 1);

        let report = store.sweep_stale(Duration::ZERO).unwrap();
        assert_eq!(report.removed, vec!["fresh".to_string()]);
        assert!(!temp.path().join("fresh").exists());
    }
}
