//! Filesystem-backed document store with one index per user namespace
//!
//! Reads never lock: files and the index are replaced by rename, so a reader
//! sees either the previous or the next version. Writes go through a
//! [`NamespaceWriter`], which holds the namespace's async mutex for its
//! lifetime.

use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::namespace::{NamespaceHandle, StagedFile};
use super::quota::{QuotaDecision, QuotaGuard};
use crate::config::{DuplicatePolicy, StorageConfig};
use crate::error::{Error, Result};
use crate::types::{IndexRecord, StoredFileInfo, StoredFileName, UserNamespace};

/// Write mutexes by namespace
type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Document store rooted at a directory of namespaces
pub struct DocumentStore {
    root: PathBuf,
    index_file_name: String,
    duplicate_policy: DuplicatePolicy,
    /// Holds an entry only while a namespace has a session or waiters
    locks: Arc<LockMap>,
}

impl DocumentStore {
    /// Open the store, creating the root directory if needed
    pub fn new(config: &StorageConfig) -> Result<Self> {
        if !config.index_file_name.starts_with('.') {
            return Err(Error::Config(format!(
                "index file name '{}' must start with '.'",
                config.index_file_name
            )));
        }

        std::fs::create_dir_all(&config.root).map_err(|e| {
            Error::storage(format!(
                "Failed to create storage root {}: {}",
                config.root.display(),
                e
            ))
        })?;

        tracing::info!("Document store at {}", config.root.display());

        Ok(Self {
            root: config.root.clone(),
            index_file_name: config.index_file_name.clone(),
            duplicate_policy: config.duplicate_policy,
            locks: Arc::new(DashMap::new()),
        })
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.len()
    }

    /// Read-only handle for a namespace
    pub fn namespace(&self, namespace: &UserNamespace) -> NamespaceHandle {
        NamespaceHandle::new(&self.root, namespace.clone(), &self.index_file_name)
    }

    /// Acquire the write session for a namespace
    ///
    /// Sessions for the same namespace are granted one at a time, in request
    /// order. Different namespaces never contend.
    pub async fn lock(&self, namespace: &UserNamespace) -> NamespaceWriter {
        // Clone the Arc out so the map shard is released before awaiting
        let mutex = self
            .locks
            .entry(namespace.as_str().to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let guard = mutex.lock_owned().await;
        tracing::debug!("Acquired write lock for '{}'", namespace);

        NamespaceWriter {
            handle: self.namespace(namespace),
            duplicate_policy: self.duplicate_policy,
            locks: Arc::clone(&self.locks),
            guard,
        }
    }

    /// Current index; empty when the namespace or index does not exist
    pub async fn load_index(&self, namespace: &UserNamespace) -> Result<Vec<IndexRecord>> {
        self.namespace(namespace).read_index().await
    }

    /// Store bytes under `filename`, replacing any previous content atomically
    pub async fn persist_file(
        &self,
        namespace: &UserNamespace,
        filename: &StoredFileName,
        bytes: &[u8],
    ) -> Result<PathBuf> {
        self.lock(namespace).await.persist_file(filename, bytes).await
    }

    /// Append one record; returns the index length afterwards
    pub async fn append_record(&self, namespace: &UserNamespace, record: IndexRecord) -> Result<usize> {
        self.lock(namespace).await.append_record(record).await
    }

    /// Files on disk joined with their index state
    pub async fn list_files(&self, namespace: &UserNamespace) -> Result<Vec<StoredFileInfo>> {
        let handle = self.namespace(namespace);
        let files = handle.user_files().await?;
        let records = handle.read_index().await?;

        let infos = files
            .into_iter()
            .map(|(filename, size)| {
                let latest = records.iter().rev().find(|r| r.filename() == filename);
                let indexed = latest.is_some();
                if !indexed {
                    tracing::warn!("'{}' in '{}' has no index record", filename, namespace);
                }
                StoredFileInfo {
                    extraction_failed: latest.map(IndexRecord::is_sentinel).unwrap_or(false),
                    orphaned: !indexed,
                    indexed,
                    size,
                    filename,
                }
            })
            .collect();

        Ok(infos)
    }
}

/// Exclusive write session for one namespace
///
/// Every mutation of a namespace's files or index is a method here, so a
/// caller cannot mutate without holding the lock. Dropping releases it.
pub struct NamespaceWriter {
    handle: NamespaceHandle,
    duplicate_policy: DuplicatePolicy,
    locks: Arc<LockMap>,
    guard: OwnedMutexGuard<()>,
}

impl Drop for NamespaceWriter {
    fn drop(&mut self) {
        // Only the map and this session reference the mutex when nobody waits
        let ours = OwnedMutexGuard::mutex(&self.guard);
        self.locks.remove_if(self.handle.namespace().as_str(), |_, mutex| {
            Arc::ptr_eq(mutex, ours) && Arc::strong_count(mutex) == 2
        });
    }
}

impl NamespaceWriter {
    /// Handle of the locked namespace
    pub fn handle(&self) -> &NamespaceHandle {
        &self.handle
    }

    /// Namespace being written
    pub fn namespace(&self) -> &UserNamespace {
        self.handle.namespace()
    }

    /// Quota decision for writing `incoming` bytes as `filename`
    ///
    /// Holding the session keeps the decision valid until the write lands.
    pub async fn check_quota(
        &self,
        filename: &StoredFileName,
        incoming: u64,
        ceiling: u64,
    ) -> Result<QuotaDecision> {
        QuotaGuard::check(&self.handle, Some(filename), incoming, ceiling)
            .await?
            .into_result(&self.handle)
    }

    /// Write bytes to a staging file; nothing is visible until commit
    pub async fn stage_file(&self, filename: &StoredFileName, bytes: &[u8]) -> Result<StagedFile> {
        self.handle.stage(filename, bytes).await
    }

    /// Stage and commit in one step
    pub async fn persist_file(&self, filename: &StoredFileName, bytes: &[u8]) -> Result<PathBuf> {
        let committed = self.stage_file(filename, bytes).await?.commit().await?;
        let path = committed.path().to_path_buf();
        committed.finalize().await;
        Ok(path)
    }

    /// Append one record and atomically rewrite the index
    ///
    /// Under [`DuplicatePolicy::Replace`] older records for the same filename
    /// are dropped first. Returns the index length afterwards.
    pub async fn append_record(&self, record: IndexRecord) -> Result<usize> {
        let mut records = self.handle.read_index().await?;

        if self.duplicate_policy == DuplicatePolicy::Replace {
            let filename = record.filename().to_string();
            let before = records.len();
            records.retain(|r| r.filename() != filename);
            if records.len() < before {
                tracing::debug!(
                    "Replaced {} record(s) for '{}' in '{}'",
                    before - records.len(),
                    filename,
                    self.namespace()
                );
            }
        }

        records.push(record);
        self.handle.replace_index(&records).await?;
        Ok(records.len())
    }

    /// Rewrite the whole index, keeping the given order
    pub async fn replace_records(&self, records: &[IndexRecord]) -> Result<()> {
        self.handle.replace_index(records).await
    }
}
