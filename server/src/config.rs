use std::path::PathBuf;

use crate::error::FileManagerError;

const STORAGE_ROOT_KEY: &str = "STORAGE_ROOT";
const STORAGE_ROOT_WINDOWS_KEY: &str = "STORAGE_ROOT_WINDOWS";
const STORAGE_ROOT_UNIX_KEY: &str = "STORAGE_ROOT_UNIX";

const DEFAULT_ALLOWED_EXTENSIONS: &str =
    "txt@md@pdf@doc@docx@xls@xlsx@ppt@pptx@csv@png@jpg@jpeg@gif@webp@svg@zip@7z@tar@gz@mp4@mp3";

#[derive(Clone, Debug)]
pub struct Config {
    pub server_name: String,
    pub database_url: String,
    /// Root under which `objects/` and `staging/` live
    pub storage_root: PathBuf,
    /// Raw allow-list, `@`/`,`/whitespace separated
    pub allowed_extensions: String,
    pub rest_port: u16,
    pub max_chunk_bytes: usize,
    pub cors_origins: String,
}

impl Config {
    pub fn from_env() -> Result<Self, FileManagerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. `from_env` is the
    /// production entry point; tests pass a map.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, FileManagerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let platform_key = if cfg!(windows) {
            STORAGE_ROOT_WINDOWS_KEY
        } else {
            STORAGE_ROOT_UNIX_KEY
        };

        let storage_root = lookup(platform_key)
            .or_else(|| lookup(STORAGE_ROOT_KEY))
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| {
                FileManagerError::Configuration(format!(
                    "storage root is not configured: set {} or {}",
                    platform_key, STORAGE_ROOT_KEY
                ))
            })?;

        Ok(Config {
            server_name: lookup("SERVER_NAME").unwrap_or_else(|| "Stowage".to_string()),
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://./data/stowage.db".to_string()),
            storage_root: PathBuf::from(storage_root.trim()),
            allowed_extensions: lookup("ALLOWED_EXTENSIONS")
                .unwrap_or_else(|| DEFAULT_ALLOWED_EXTENSIONS.to_string()),
            rest_port: parse_or(&lookup, "REST_PORT", 8080)?,
            max_chunk_bytes: parse_or(&lookup, "MAX_CHUNK_BYTES", 64 * 1024 * 1024)?,
            cors_origins: lookup("CORS_ORIGINS")
                .unwrap_or_else(|| "http://localhost:3000,http://127.0.0.1:3000".to_string()),
        })
    }

    pub fn objects_root(&self) -> PathBuf {
        self.storage_root.join("objects")
    }

    pub fn staging_root(&self) -> PathBuf {
        self.storage_root.join("staging")
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, FileManagerError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| FileManagerError::Configuration(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}
