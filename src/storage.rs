//! Key-value blob storage keyed by `/`-separated paths.

use async_trait::async_trait;
use chrono::Utc;
use directories::ProjectDirs;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::error::StorageError;

pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>>;

    async fn write(&self, path: &str, bytes: &[u8]) -> StorageResult<()>;

    async fn exists(&self, path: &str) -> bool;

    /// Paths of the files directly inside `folder`.
    async fn list(&self, folder: &str) -> StorageResult<Vec<String>>;

    async fn ensure_folder(&self, path: &str) -> StorageResult<()>;

    /// Last modification time in unix milliseconds.
    async fn modified_time(&self, path: &str) -> StorageResult<i64>;

    async fn read_to_string(&self, path: &str) -> StorageResult<String> {
        let bytes = self.read(path).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub fn join(folder: &str, name: &str) -> String {
    let folder = folder.trim_end_matches('/');
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder, name)
    }
}

/// Storage rooted at a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The platform data directory for this application.
    pub fn default_root() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", "", "flowcanvas")?;
        Some(dirs.data_dir().to_path_buf())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|part| !part.is_empty())
            .fold(self.root.clone(), |acc, part| acc.join(part))
    }
}

#[async_trait]
impl Storage for FsStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        tokio::fs::read(self.resolve(path))
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> StorageResult<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(path, e))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn exists(&self, path: &str) -> bool {
        tokio::fs::metadata(self.resolve(path))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn list(&self, folder: &str) -> StorageResult<Vec<String>> {
        let mut entries = tokio::fs::read_dir(self.resolve(folder))
            .await
            .map_err(|e| StorageError::io(folder, e))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(folder, e))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                paths.push(join(folder, &entry.file_name().to_string_lossy()));
            }
        }
        paths.sort();
        Ok(paths)
    }

    async fn ensure_folder(&self, path: &str) -> StorageResult<()> {
        tokio::fs::create_dir_all(self.resolve(path))
            .await
            .map_err(|e| StorageError::io(path, e))
    }

    async fn modified_time(&self, path: &str) -> StorageResult<i64> {
        let meta = tokio::fs::metadata(self.resolve(path))
            .await
            .map_err(|e| StorageError::io(path, e))?;
        let modified = meta.modified().map_err(|e| StorageError::io(path, e))?;
        Ok(modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0))
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    files: BTreeMap<String, (Vec<u8>, i64)>,
    folders: BTreeSet<String>,
}

/// In-process storage, for hosts without a filesystem and for tests.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a file without going through the async API.
    pub fn insert(&self, path: &str, contents: impl Into<Vec<u8>>) {
        let now = Utc::now().timestamp_millis();
        self.state
            .lock()
            .files
            .insert(path.to_string(), (contents.into(), now));
    }

    pub fn remove(&self, path: &str) -> bool {
        self.state.lock().files.remove(path).is_some()
    }

    pub fn has_folder(&self, path: &str) -> bool {
        self.state.lock().folders.contains(path.trim_end_matches('/'))
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        self.state
            .lock()
            .files
            .get(path)
            .map(|(bytes, _)| bytes.clone())
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> StorageResult<()> {
        self.insert(path, bytes);
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        self.state.lock().files.contains_key(path)
    }

    async fn list(&self, folder: &str) -> StorageResult<Vec<String>> {
        let prefix = join(folder, "");
        let state = self.state.lock();
        Ok(state
            .files
            .keys()
            .filter(|p| p.starts_with(&prefix) && !p[prefix.len()..].contains('/'))
            .cloned()
            .collect())
    }

    async fn ensure_folder(&self, path: &str) -> StorageResult<()> {
        self.state
            .lock()
            .folders
            .insert(path.trim_end_matches('/').to_string());
        Ok(())
    }

    async fn modified_time(&self, path: &str) -> StorageResult<i64> {
        self.state
            .lock()
            .files
            .get(path)
            .map(|(_, mtime)| *mtime)
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}
