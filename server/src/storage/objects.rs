use chrono::{Datelike, Utc};
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

use crate::error::{FileManagerError, Result};

/// Final, date-partitioned home of assembled files
#[derive(Clone, Debug)]
pub struct ObjectStore {
    root: PathBuf,
}

/// A freshly allocated object location
#[derive(Debug, Clone)]
pub struct ObjectSlot {
    /// `YYYY/MM/DD/<uuid>[.ext]`, stored on the node
    pub relative: String,
    pub path: PathBuf,
}

impl ObjectStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Allocate a unique path under today's partition and create its parent
    /// directories. Nothing is written to the path itself.
    pub async fn allocate(&self, extension: Option<&str>) -> Result<ObjectSlot> {
        let today = Utc::now().date_naive();
        let file_name = match extension {
            Some(ext) if !ext.is_empty() => format!("{}.{}", Uuid::new_v4(), ext),
            _ => Uuid::new_v4().to_string(),
        };
        let relative = format!(
            "{:04}/{:02}/{:02}/{}",
            today.year(),
            today.month(),
            today.day(),
            file_name
        );

        let path = self.resolve(&relative)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        Ok(ObjectSlot { relative, path })
    }

    /// Absolute path of a stored object. Rejects anything that could step
    /// outside the objects root.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let candidate = Path::new(relative);
        let is_contained = !relative.is_empty()
            && candidate
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_contained {
            return Err(FileManagerError::InvalidInput(format!(
                "invalid storage path: {}",
                relative
            )));
        }
        Ok(self.root.join(candidate))
    }

    /// Remove an object. An object that is already gone is not an error.
    pub async fn remove(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::debug!("removed object {}", relative);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove an object, logging instead of failing
    pub async fn remove_quietly(&self, relative: &str) {
        if let Err(e) = self.remove(relative).await {
            tracing::warn!("failed to remove object {}: {}", relative, e);
        }
    }
}
