//! [`DocumentStore`] over the local filesystem. Identifiers are paths.
//!
//! Listing only fails when the root itself cannot be read. Unreadable entries
//! below it are logged and skipped, and symlinks to regular files are listed
//! like the files they point at.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::contract::{DocumentStore, StoreError};

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalStore {
    follow_links: bool,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also descend into symlinked directories. Links back to an ancestor are
    /// reported by the walk and skipped.
    pub fn with_follow_links(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }
}

#[async_trait]
impl DocumentStore for LocalStore {
    async fn list(&self, root: &str) -> Result<Vec<String>, StoreError> {
        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .follow_links(self.follow_links)
            .sort_by_file_name();
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    error!(error = %e, root, "Failed to walk directory");
                    return Err(StoreError::io(root, e.into()));
                }
                Err(e) => {
                    warn!(error = %e, path = ?e.path(), "Skipping unreadable entry");
                    continue;
                }
            };
            if entry.file_type().is_file() {
                files.push(entry.path().to_string_lossy().into_owned());
            } else if entry.path_is_symlink() {
                match tokio::fs::metadata(entry.path()).await {
                    Ok(meta) if meta.is_file() => {
                        files.push(entry.path().to_string_lossy().into_owned())
                    }
                    Ok(_) => debug!(path = %entry.path().display(), "Skipping symlink to directory"),
                    Err(e) => {
                        warn!(path = %entry.path().display(), error = %e, "Skipping dangling symlink")
                    }
                }
            }
        }
        info!(root, count = files.len(), "Listed files in directory");
        Ok(files)
    }

    async fn read(&self, id: &str) -> Result<String, StoreError> {
        let bytes = tokio::fs::read(id)
            .await
            .map_err(|e| StoreError::io(id, e))?;
        String::from_utf8(bytes).map_err(|_| StoreError::NotUtf8 {
            location: id.to_string(),
        })
    }

    async fn read_optional(&self, id: &str) -> Result<Option<String>, StoreError> {
        let err = match tokio::fs::read_to_string(id).await {
            Ok(content) => return Ok(Some(content)),
            Err(e) => e,
        };
        // A directory named like the ignore file is not an ignore file.
        if tokio::fs::metadata(id).await.is_ok_and(|meta| meta.is_dir()) {
            return Ok(None);
        }
        match err.kind() {
            ErrorKind::NotFound => Ok(None),
            ErrorKind::PermissionDenied => {
                warn!(path = id, "File not readable, treating as absent");
                Ok(None)
            }
            ErrorKind::InvalidData => Err(StoreError::NotUtf8 {
                location: id.to_string(),
            }),
            _ => Err(StoreError::io(id, err)),
        }
    }

    async fn write_markdown(&self, location: &str, body: &str) -> Result<(), StoreError> {
        if let Some(parent) = Path::new(location).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::io(parent.to_string_lossy(), e))?;
            }
        }
        tokio::fs::write(location, body)
            .await
            .map_err(|e| StoreError::io(location, e))?;
        debug!(location, bytes = body.len(), "Wrote markdown");
        Ok(())
    }
}
