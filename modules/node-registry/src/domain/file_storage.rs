//! Catalog of firmware images offered to nodes for OTA updates.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::domain::error::DomainError;

/// An uploaded firmware image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub url: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Upload directory plus an in-memory index of its files.
///
/// The index lock is held across the matching file-system call so the
/// directory and the index change together.
pub struct FileStorage {
    dir: PathBuf,
    public_prefix: String,
    files: RwLock<HashMap<String, FileRecord>>,
}

impl FileStorage {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, public_prefix: &str) -> Self {
        Self {
            dir: dir.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_owned(),
            files: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the upload directory and indexes the regular files already in it.
    ///
    /// # Errors
    /// Returns [`DomainError::Io`] when the directory cannot be created.
    pub async fn load_existing(&self) -> Result<usize, DomainError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut files = self.files.write().await;
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "could not read upload directory");
                return Ok(0);
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            let uploaded_at = meta.modified().map_or_else(|_| Utc::now(), DateTime::from);
            files.insert(name.clone(), self.record(name, uploaded_at));
        }
        info!(count = files.len(), dir = %self.dir.display(), "indexed existing firmware files");
        Ok(files.len())
    }

    /// Stores an upload under its base name, replacing any previous file.
    ///
    /// # Errors
    /// [`DomainError::InvalidInput`] for names without a usable base name,
    /// [`DomainError::Io`] when the file cannot be written.
    pub async fn save(&self, name: &str, data: Bytes) -> Result<FileRecord, DomainError> {
        let clean = sanitize_name(name)?;
        let mut files = self.files.write().await;
        tokio::fs::write(self.dir.join(&clean), &data).await?;
        let record = self.record(clean.clone(), Utc::now());
        files.insert(clean, record.clone());
        debug!(name = %record.name, size = data.len(), "stored firmware file");
        Ok(record)
    }

    /// Deletes a file from disk and from the index. Returns the removed name.
    ///
    /// # Errors
    /// [`DomainError::FileNotFound`] when the file does not exist on disk.
    pub async fn delete(&self, name: &str) -> Result<String, DomainError> {
        let clean = sanitize_name(name).map_err(|_| DomainError::FileNotFound(name.to_owned()))?;
        let path = self.dir.join(&clean);

        let mut files = self.files.write().await;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(DomainError::FileNotFound(clean));
        }
        tokio::fs::remove_file(&path).await?;
        files.remove(&clean);
        info!(name = %clean, "deleted firmware file");
        Ok(clean)
    }

    /// Renames a catalogued file, keeping its upload time.
    ///
    /// # Errors
    /// [`DomainError::InvalidInput`] for an unusable new name,
    /// [`DomainError::FileNotFound`] when `name` is not catalogued.
    pub async fn rename(&self, name: &str, new_name: &str) -> Result<FileRecord, DomainError> {
        let clean_new = sanitize_name(new_name)?;

        let mut files = self.files.write().await;
        let Some(existing) = files.get(name).cloned() else {
            return Err(DomainError::FileNotFound(name.to_owned()));
        };
        tokio::fs::rename(self.dir.join(name), self.dir.join(&clean_new)).await?;

        files.remove(name);
        let record = self.record(clean_new.clone(), existing.uploaded_at);
        files.insert(clean_new, record.clone());
        info!(from = %name, to = %record.name, "renamed firmware file");
        Ok(record)
    }

    /// All catalogued files, sorted by name.
    pub async fn list(&self) -> Vec<FileRecord> {
        let mut out: Vec<FileRecord> = self.files.read().await.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    fn record(&self, name: String, uploaded_at: DateTime<Utc>) -> FileRecord {
        FileRecord {
            url: format!("{}/{name}", self.public_prefix),
            name,
            uploaded_at,
        }
    }
}

/// Reduces a client-supplied name to its final path component.
fn sanitize_name(name: &str) -> Result<String, DomainError> {
    match Path::new(name).file_name().and_then(|n| n.to_str()) {
        Some(base) if !base.is_empty() && base != "." && base != ".." => Ok(base.to_owned()),
        _ => Err(DomainError::InvalidInput(format!("invalid file name '{name}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_name("../../etc/passwd").unwrap(), "passwd");
        assert_eq!(sanitize_name("fw.bin").unwrap(), "fw.bin");
    }

    #[test]
    fn test_sanitize_rejects_empty_and_dots() {
        for bad in ["", ".", "..", "/", "dir/.."] {
            assert!(
                matches!(sanitize_name(bad), Err(DomainError::InvalidInput(_))),
                "{bad:?} should be rejected"
            );
        }
    }
}
