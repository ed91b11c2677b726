//! Object storage holding the manual PDFs.
//!
//! [`ObjectStore`] is the seam between the ingestion pipeline and wherever
//! the PDFs live. Two backends ship with the hub:
//!
//! - [`FsObjectStore`]: a local directory, walked with `walkdir` and
//!   filtered with include globs.
//! - [`S3ObjectStore`](crate::s3::S3ObjectStore): an S3 bucket or an
//!   S3-compatible service.
//!
//! Object names are `/`-separated paths relative to the store root.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::{FsStorageConfig, StorageConfig};
use crate::s3::S3ObjectStore;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("access denied: {0}")]
    Access(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage request failed: {0}")]
    Http(String),

    #[error("storage misconfigured: {0}")]
    Config(String),
}

/// Listing entry for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub name: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Full contents of the object called `name`.
    async fn download(&self, name: &str) -> Result<Vec<u8>, StorageError>;

    /// Every object matching the store's include filters, sorted by name.
    async fn list(&self) -> Result<Vec<ObjectInfo>, StorageError>;
}

/// Build the configured storage backend.
pub fn from_config(config: &StorageConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    Ok(match config {
        StorageConfig::Filesystem(fs) => Arc::new(FsObjectStore::new(fs)?),
        StorageConfig::S3(s3) => Arc::new(S3ObjectStore::from_env(s3.clone())?),
    })
}

pub(crate) fn build_globset(patterns: &[String]) -> Result<GlobSet, StorageError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| StorageError::Config(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| StorageError::Config(e.to_string()))
}

/// Manuals stored in a local directory.
pub struct FsObjectStore {
    root: PathBuf,
    include: GlobSet,
}

impl FsObjectStore {
    pub fn new(config: &FsStorageConfig) -> Result<Self, StorageError> {
        Ok(Self {
            root: config.root.clone(),
            include: build_globset(&config.include_globs)?,
        })
    }

    /// Resolve `name` under the root, refusing anything that escapes it.
    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(name);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if name.is_empty() || escapes {
            return Err(StorageError::Access(format!(
                "'{}' is not a path inside the manual store",
                name
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn download(&self, name: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(name.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                Err(StorageError::Access(format!("{}: {}", name, e)))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn list(&self) -> Result<Vec<ObjectInfo>, StorageError> {
        if !self.root.exists() {
            return Err(StorageError::Config(format!(
                "storage root does not exist: {}",
                self.root.display()
            )));
        }

        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| StorageError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            if !self.include.is_match(&name) {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| StorageError::Io(e.into()))?;
            objects.push(ObjectInfo {
                name,
                size: metadata.len(),
                last_modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(root: &Path) -> FsObjectStore {
        FsObjectStore::new(&FsStorageConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.pdf".to_string()],
        })
        .unwrap()
    }

    #[tokio::test]
    async fn lists_only_included_files_sorted() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("axles")).unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("axles/a.pdf"), b"%PDF").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"skip").unwrap();

        let names: Vec<String> = store(dir.path())
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.name)
            .collect();
        assert_eq!(names, vec!["axles/a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path()).download("nope.pdf").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(ref n) if n == "nope.pdf"));
    }

    #[tokio::test]
    async fn parent_traversal_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let err = store(dir.path()).download("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, StorageError::Access(_)));
    }
}
