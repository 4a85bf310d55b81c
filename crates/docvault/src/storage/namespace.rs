//! Filesystem handle for one user namespace
//!
//! Layout under the storage root:
//!
//! ```text
//! <root>/<namespace>/<filename>          user content (counted by quota)
//! <root>/<namespace>/.index.json         index (service metadata)
//! <root>/<namespace>/.staging-*          bytes awaiting rename
//! <root>/<namespace>/.backup-*           previous content during an overwrite
//! ```
//!
//! Every write goes to a dot-named sibling first and is renamed into place, so
//! a reader sees either the old or the new file, never a torn one.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{IndexRecord, StoredFileName, UserNamespace};

/// Path construction and atomic read/replace for a namespace
#[derive(Debug, Clone)]
pub struct NamespaceHandle {
    namespace: UserNamespace,
    dir: PathBuf,
    index_path: PathBuf,
}

impl NamespaceHandle {
    /// Create a handle; touches nothing on disk
    pub fn new(root: &Path, namespace: UserNamespace, index_file_name: &str) -> Self {
        let dir = root.join(namespace.as_str());
        let index_path = dir.join(index_file_name);
        Self {
            namespace,
            dir,
            index_path,
        }
    }

    /// Namespace this handle points at
    pub fn namespace(&self) -> &UserNamespace {
        &self.namespace
    }

    /// Namespace directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Index file path
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Path of a stored file
    pub fn file_path(&self, name: &StoredFileName) -> PathBuf {
        self.dir.join(name.as_str())
    }

    /// Create the namespace directory if absent
    pub async fn ensure_dir(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::storage(format!("Failed to create namespace '{}': {}", self.namespace, e))
        })
    }

    /// Read the index; a missing index is an empty one
    pub async fn read_index(&self) -> Result<Vec<IndexRecord>> {
        let data = match tokio::fs::read(&self.index_path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::storage(format!(
                    "Failed to read index for '{}': {}",
                    self.namespace, e
                )))
            }
        };

        // Zero-length files come from legacy writers that truncated before writing
        if data.iter().all(|b| b.is_ascii_whitespace()) {
            tracing::warn!("Index for '{}' is empty on disk, treating as no records", self.namespace);
            return Ok(Vec::new());
        }

        serde_json::from_slice(&data).map_err(|e| Error::IndexCorrupt {
            namespace: self.namespace.to_string(),
            message: e.to_string(),
        })
    }

    /// Atomically replace the index with `records`
    pub(crate) async fn replace_index(&self, records: &[IndexRecord]) -> Result<()> {
        let data = serde_json::to_vec(records).map_err(|e| {
            Error::storage(format!("Failed to encode index for '{}': {}", self.namespace, e))
        })?;
        let staging = self.staging_path(".json");

        if let Err(e) = write_synced(&staging, &data).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(Error::storage(format!(
                "Failed to write index for '{}': {}",
                self.namespace, e
            )));
        }

        if let Err(e) = tokio::fs::rename(&staging, &self.index_path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(Error::storage(format!(
                "Failed to replace index for '{}': {}",
                self.namespace, e
            )));
        }

        Ok(())
    }

    /// Regular user files directly inside the namespace, with sizes
    ///
    /// Dot-files (index, staging, backups) are service metadata and skipped.
    /// A missing namespace has no files.
    pub async fn user_files(&self) -> Result<Vec<(String, u64)>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = match entry.file_name().into_string() {
                Ok(name) => name,
                Err(_) => continue,
            };
            if is_service_file(&name) {
                continue;
            }
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            files.push((name, entry.metadata().await?.len()));
        }

        files.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(files)
    }

    /// Size of a stored file, None when absent
    pub async fn file_size(&self, name: &StoredFileName) -> Result<Option<u64>> {
        match tokio::fs::metadata(self.file_path(name)).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write bytes to a staging file next to their final location
    pub(crate) async fn stage(&self, name: &StoredFileName, bytes: &[u8]) -> Result<StagedFile> {
        self.ensure_dir().await?;

        // Only the extension survives so extension-based extractors still work
        let suffix = service_suffix(name);
        let staging = self.staging_path(&suffix);
        if let Err(e) = write_synced(&staging, bytes).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(Error::storage(format!(
                "Failed to write '{}' for '{}': {}",
                name, self.namespace, e
            )));
        }

        Ok(StagedFile {
            staging: Some(staging),
            target: self.file_path(name),
            backup_path: self.dir.join(format!(".backup-{}{}", Uuid::new_v4(), suffix)),
            size: bytes.len() as u64,
            sha256: hex::encode(Sha256::digest(bytes)),
        })
    }

    fn staging_path(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!(".staging-{}{}", Uuid::new_v4(), suffix))
    }
}

/// Longest extension carried over onto staging and backup names
const MAX_SERVICE_EXTENSION: usize = 16;

/// `.ext` for service file names, so they stay far below NAME_MAX
fn service_suffix(name: &StoredFileName) -> String {
    let ext = name.extension();
    if ext.is_empty() || ext.len() > MAX_SERVICE_EXTENSION {
        String::new()
    } else {
        format!(".{}", ext)
    }
}

/// Names the service writes inside a namespace start with '.'
pub fn is_service_file(name: &str) -> bool {
    name.starts_with('.')
}

async fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    Ok(())
}

/// Bytes written and synced to a staging file, not yet visible under their name
///
/// Dropping without [`StagedFile::commit`] deletes the staging file.
#[derive(Debug)]
pub struct StagedFile {
    staging: Option<PathBuf>,
    target: PathBuf,
    backup_path: PathBuf,
    size: u64,
    sha256: String,
}

impl StagedFile {
    /// Where the bytes currently live
    pub fn path(&self) -> &Path {
        self.staging.as_deref().unwrap_or(&self.target)
    }

    /// Byte count
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Hex SHA-256 of the bytes
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    /// Rename into place, moving any previous file aside so it can be restored
    pub async fn commit(mut self) -> Result<CommittedFile> {
        let staging = match self.staging.take() {
            Some(path) => path,
            None => return Err(Error::internal("staged file already consumed")),
        };

        let backup = match tokio::fs::rename(&self.target, &self.backup_path).await {
            Ok(()) => Some(self.backup_path.clone()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(Error::storage(format!(
                    "Failed to move previous '{}' aside: {}",
                    self.target.display(),
                    e
                )));
            }
        };

        if let Err(e) = tokio::fs::rename(&staging, &self.target).await {
            let _ = tokio::fs::remove_file(&staging).await;
            if let Some(backup) = &backup {
                if let Err(restore) = tokio::fs::rename(backup, &self.target).await {
                    tracing::error!(
                        "Failed to restore {} after commit failure: {}",
                        self.target.display(),
                        restore
                    );
                }
            }
            return Err(Error::storage(format!(
                "Failed to commit '{}': {}",
                self.target.display(),
                e
            )));
        }

        Ok(CommittedFile {
            target: self.target.clone(),
            backup,
            settled: false,
        })
    }

    /// Delete the staging file
    pub async fn discard(mut self) {
        if let Some(staging) = self.staging.take() {
            if let Err(e) = tokio::fs::remove_file(&staging).await {
                tracing::warn!("Failed to remove staging file {}: {}", staging.display(), e);
            }
        }
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Some(staging) = self.staging.take() {
            let _ = std::fs::remove_file(staging);
        }
    }
}

/// A file renamed into place whose previous content is still recoverable
///
/// Dropping without [`CommittedFile::rollback`] keeps the new content.
#[derive(Debug)]
pub struct CommittedFile {
    target: PathBuf,
    backup: Option<PathBuf>,
    settled: bool,
}

impl CommittedFile {
    /// Final path
    pub fn path(&self) -> &Path {
        &self.target
    }

    /// True when the commit replaced an existing file
    pub fn replaced_existing(&self) -> bool {
        self.backup.is_some()
    }

    /// Keep the new content and drop the backup
    pub async fn finalize(mut self) {
        self.settled = true;
        if let Some(backup) = self.backup.take() {
            if let Err(e) = tokio::fs::remove_file(&backup).await {
                tracing::warn!("Failed to remove backup {}: {}", backup.display(), e);
            }
        }
    }

    /// Restore the previous content, or remove the file if there was none
    pub async fn rollback(mut self) -> Result<()> {
        self.settled = true;
        match self.backup.take() {
            Some(backup) => tokio::fs::rename(&backup, &self.target).await?,
            None => tokio::fs::remove_file(&self.target).await?,
        }
        Ok(())
    }
}

impl Drop for CommittedFile {
    fn drop(&mut self) {
        if !self.settled {
            if let Some(backup) = self.backup.take() {
                let _ = std::fs::remove_file(backup);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(root: &Path, ns: &str) -> NamespaceHandle {
        NamespaceHandle::new(root, UserNamespace::parse(ns).unwrap(), ".index.json")
    }

    #[tokio::test]
    async fn test_missing_namespace_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ns = handle(dir.path(), "nobody");

        assert!(ns.read_index().await.unwrap().is_empty());
        assert!(ns.user_files().await.unwrap().is_empty());
        assert!(!ns.dir().exists());
    }

    #[tokio::test]
    async fn test_corrupt_index_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let ns = handle(dir.path(), "alice");
        ns.ensure_dir().await.unwrap();
        std::fs::write(ns.index_path(), b"[{\"file\": ").unwrap();

        assert!(matches!(ns.read_index().await, Err(Error::IndexCorrupt { .. })));
    }

    #[tokio::test]
    async fn test_replace_index_leaves_no_staging_files() {
        let dir = tempfile::tempdir().unwrap();
        let ns = handle(dir.path(), "alice");
        ns.ensure_dir().await.unwrap();

        let records = vec![IndexRecord::extracted("a.txt", "hello".to_string())];
        ns.replace_index(&records).await.unwrap();

        assert_eq!(ns.read_index().await.unwrap(), records);
        let names: Vec<_> = std::fs::read_dir(ns.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![".index.json".to_string()]);
    }

    #[tokio::test]
    async fn test_staged_file_invisible_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let ns = handle(dir.path(), "alice");
        let name = StoredFileName::parse("a.txt").unwrap();

        let staged = ns.stage(&name, b"hello").await.unwrap();
        assert!(staged.path().exists());
        let staged_name = staged.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(staged_name.starts_with(".staging-") && staged_name.ends_with(".txt"));
        assert!(ns.user_files().await.unwrap().is_empty());

        let committed = staged.commit().await.unwrap();
        assert!(!committed.replaced_existing());
        committed.finalize().await;

        assert_eq!(ns.user_files().await.unwrap(), vec![("a.txt".to_string(), 5)]);
    }

    #[tokio::test]
    async fn test_rollback_restores_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let ns = handle(dir.path(), "alice");
        let name = StoredFileName::parse("a.txt").unwrap();

        ns.stage(&name, b"first").await.unwrap().commit().await.unwrap().finalize().await;

        let committed = ns.stage(&name, b"second version").await.unwrap().commit().await.unwrap();
        assert!(committed.replaced_existing());
        assert_eq!(std::fs::read(ns.file_path(&name)).unwrap(), b"second version");

        committed.rollback().await.unwrap();
        assert_eq!(std::fs::read(ns.file_path(&name)).unwrap(), b"first");
        assert_eq!(ns.user_files().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_dropped_stage_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let ns = handle(dir.path(), "alice");
        let name = StoredFileName::parse("a.txt").unwrap();

        let staged = ns.stage(&name, b"bytes").await.unwrap();
        let staging_path = staged.path().to_path_buf();
        drop(staged);

        assert!(!staging_path.exists());
        assert!(!ns.file_path(&name).exists());
    }

    #[tokio::test]
    async fn test_longest_filename_survives_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let ns = handle(dir.path(), "alice");
        let long = format!("{}.txt", "a".repeat(251));
        let name = StoredFileName::parse(&long).unwrap();
        assert_eq!(name.as_str().len(), 255);

        ns.stage(&name, b"first").await.unwrap().commit().await.unwrap().finalize().await;
        let committed = ns.stage(&name, b"second").await.unwrap().commit().await.unwrap();
        assert!(committed.replaced_existing());
        committed.finalize().await;

        assert_eq!(ns.user_files().await.unwrap(), vec![(long, 6)]);
    }

    #[tokio::test]
    async fn test_long_extension_dropped_from_service_names() {
        let dir = tempfile::tempdir().unwrap();
        let ns = handle(dir.path(), "alice");
        let name = StoredFileName::parse(format!("a.{}", "x".repeat(253))).unwrap();

        let staged = ns.stage(&name, b"bytes").await.unwrap();
        let staged_name = staged.path().file_name().unwrap().to_string_lossy().into_owned();
        assert_eq!(staged_name.len(), ".staging-".len() + 36);
        staged.commit().await.unwrap().finalize().await;

        assert!(ns.file_path(&name).exists());
    }

    #[tokio::test]
    async fn test_index_write_failure_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let ns = handle(dir.path(), "alice");

        let records = vec![IndexRecord::extracted("a.txt", "hello".to_string())];
        assert!(matches!(ns.replace_index(&records).await, Err(Error::Storage(_))));
    }
}
