//! Ingestion pipeline: quota, persist, extract, embed, index
//!
//! One ingest holds the namespace write session from the quota check until
//! the index append, so overlapping uploads by the same user are serialized
//! and cannot jointly overshoot the quota.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::VaultConfig;
use crate::error::{Error, Result};
use crate::providers::{checked_vector, EmbeddingProvider, TextExtractor};
use crate::storage::DocumentStore;
use crate::types::{IndexRecord, IngestResponse, IngestStatus, StoredFileName, UserNamespace};

/// Result of a completed ingest
pub type IngestOutcome = IngestResponse;

/// One upload to ingest
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Owner of the file
    pub namespace: UserNamespace,
    /// Name to store the file under
    pub filename: StoredFileName,
    /// Raw bytes
    pub bytes: Vec<u8>,
}

impl IngestRequest {
    /// Create a request
    pub fn new(namespace: UserNamespace, filename: StoredFileName, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            namespace,
            filename,
            bytes: bytes.into(),
        }
    }
}

/// Stages an ingest passes through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IngestStage {
    Received,
    QuotaChecked,
    Persisted,
    Extracted,
    Embedded,
    Indexed,
    Done,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::QuotaChecked => "quota_checked",
            Self::Persisted => "persisted",
            Self::Extracted => "extracted",
            Self::Embedded => "embedded",
            Self::Indexed => "indexed",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Stage tracker for log context
struct Progress<'a> {
    namespace: &'a UserNamespace,
    filename: &'a StoredFileName,
    stage: IngestStage,
}

impl<'a> Progress<'a> {
    fn new(namespace: &'a UserNamespace, filename: &'a StoredFileName) -> Self {
        tracing::debug!("[{}] {} -> {}", namespace, filename, IngestStage::Received);
        Self {
            namespace,
            filename,
            stage: IngestStage::Received,
        }
    }

    fn advance(&mut self, stage: IngestStage) {
        self.stage = stage;
        tracing::debug!("[{}] {} -> {}", self.namespace, self.filename, stage);
    }

    fn fail(&self, err: Error) -> Error {
        tracing::warn!(
            "[{}] {} failed after {}: {}",
            self.namespace,
            self.filename,
            self.stage,
            err
        );
        err
    }
}

/// Orchestrates an upload from raw bytes to a searchable index record
pub struct IngestionPipeline {
    store: Arc<DocumentStore>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    quota_bytes: u64,
    strict_extraction: bool,
    extraction_timeout: Duration,
    embedding_timeout: Duration,
}

impl IngestionPipeline {
    /// Create a pipeline; `embedder` is optional
    pub fn new(
        store: Arc<DocumentStore>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        config: &VaultConfig,
    ) -> Self {
        Self {
            store,
            extractor,
            embedder,
            quota_bytes: config.storage.quota_bytes,
            strict_extraction: config.ingestion.strict_extraction,
            extraction_timeout: Duration::from_secs(config.ingestion.extraction_timeout_secs),
            embedding_timeout: Duration::from_secs(config.ingestion.embedding_timeout_secs),
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Run one upload through every stage
    ///
    /// Fails with `QuotaExceeded` before any byte is written, with `Storage`
    /// when persisting or indexing fails (the namespace is left as it was), and
    /// with `Extraction` only under strict extraction. Embedding failures never
    /// fail the ingest.
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let start = Instant::now();
        let IngestRequest {
            namespace,
            filename,
            bytes,
        } = request;
        let mut progress = Progress::new(&namespace, &filename);

        let writer = self.store.lock(&namespace).await;

        writer
            .check_quota(&filename, bytes.len() as u64, self.quota_bytes)
            .await
            .map_err(|e| progress.fail(e))?;
        progress.advance(IngestStage::QuotaChecked);

        let staged = writer
            .stage_file(&filename, &bytes)
            .await
            .map_err(|e| progress.fail(e))?;
        drop(bytes);
        progress.advance(IngestStage::Persisted);

        // The extractor saw the staging path; report failures under the real name
        let extracted = self.extract(&filename, staged.path()).await.map_err(|e| match e {
            Error::Extraction { message, .. } => Error::extraction(filename.as_str(), message),
            other => Error::extraction(filename.as_str(), other.to_string()),
        });
        let (mut record, extraction_error) = match extracted {
            Ok(text) => (IndexRecord::extracted(filename.as_str(), text), None),
            Err(e) if self.strict_extraction => {
                staged.discard().await;
                return Err(progress.fail(e));
            }
            Err(e) => {
                tracing::warn!("[{}] indexing sentinel for {}: {}", namespace, filename, e);
                (IndexRecord::extraction_failed(filename.as_str()), Some(e.to_string()))
            }
        };
        record = record.with_file_facts(staged.size(), staged.sha256().to_string());
        progress.advance(IngestStage::Extracted);

        if record.needs_embedding() && self.embedder.is_some() {
            match self.embed(&record.content).await {
                Ok(vector) => {
                    record.vector = Some(vector);
                    progress.advance(IngestStage::Embedded);
                }
                Err(e) => {
                    tracing::warn!("[{}] indexing {} without a vector: {}", namespace, filename, e);
                }
            }
        }

        let size = staged.size();
        let embedded = record.vector.is_some();
        let text_chars = record.content.chars().count();

        let committed = staged.commit().await.map_err(|e| progress.fail(e))?;

        let index_len = match writer.append_record(record).await {
            Ok(len) => len,
            Err(e) => {
                if let Err(rollback) = committed.rollback().await {
                    tracing::error!(
                        "[{}] failed to roll back {} after index failure: {}",
                        namespace,
                        filename,
                        rollback
                    );
                }
                return Err(progress.fail(e));
            }
        };
        committed.finalize().await;
        progress.advance(IngestStage::Indexed);
        drop(writer);

        let status = if extraction_error.is_some() {
            IngestStatus::ExtractionFailed
        } else {
            IngestStatus::Indexed
        };
        progress.advance(IngestStage::Done);

        tracing::info!(
            "[{}] ingested {} ({} bytes, {} chars, embedded: {}, index length {})",
            namespace,
            filename,
            size,
            text_chars,
            embedded,
            index_len
        );

        Ok(IngestResponse {
            filename: filename.to_string(),
            status,
            size,
            embedded,
            text_chars,
            extraction_error,
            index_len,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Compute vectors for records that have text but none yet
    ///
    /// Returns the number of records updated. Stops at the first provider
    /// failure and keeps the vectors computed so far.
    pub async fn backfill_embeddings(&self, namespace: &UserNamespace) -> Result<usize> {
        if self.embedder.is_none() {
            return Err(Error::embedding("no embedding provider configured"));
        }

        let writer = self.store.lock(namespace).await;
        let mut records = writer.handle().read_index().await?;
        let mut updated = 0;

        for record in records.iter_mut().filter(|r| r.needs_embedding()) {
            match self.embed(&record.content).await {
                Ok(vector) => {
                    record.vector = Some(vector);
                    updated += 1;
                }
                Err(e) => {
                    tracing::warn!("[{}] backfill stopped after {} record(s): {}", namespace, updated, e);
                    break;
                }
            }
        }

        if updated > 0 {
            writer.replace_records(&records).await?;
        }

        tracing::info!("[{}] backfilled {} embedding(s)", namespace, updated);
        Ok(updated)
    }

    async fn extract(&self, filename: &StoredFileName, path: &Path) -> Result<String> {
        match tokio::time::timeout(self.extraction_timeout, self.extractor.extract_text(path)).await {
            Ok(result) => result,
            Err(_) => Err(Error::extraction(
                filename.as_str(),
                format!("extraction timed out after {:?}", self.extraction_timeout),
            )),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let provider = self
            .embedder
            .as_ref()
            .ok_or_else(|| Error::embedding("no embedding provider configured"))?;

        match tokio::time::timeout(self.embedding_timeout, provider.embed(text)).await {
            Ok(Ok(vector)) => checked_vector(provider.name(), vector),
            Ok(Err(Error::EmbeddingUnavailable(msg))) => Err(Error::EmbeddingUnavailable(msg)),
            Ok(Err(e)) => Err(Error::embedding(e.to_string())),
            Err(_) => Err(Error::embedding(format!(
                "{} timed out after {:?}",
                provider.name(),
                self.embedding_timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DuplicatePolicy;
    use crate::ingestion::FileParser;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedEmbedder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::embedding("model offline"));
            }
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(!self.fail)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct NanEmbedder;

    #[async_trait]
    impl EmbeddingProvider for NanEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![f32::NAN, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "nan"
        }
    }

    struct SlowExtractor;

    #[async_trait]
    impl TextExtractor for SlowExtractor {
        async fn extract_text(&self, _path: &Path) -> Result<String> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(String::new())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn config(root: &Path) -> VaultConfig {
        let mut config = VaultConfig::default();
        config.storage.root = root.to_path_buf();
        config.storage.quota_bytes = 100;
        config
    }

    fn pipeline(
        config: &VaultConfig,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> IngestionPipeline {
        let store = Arc::new(DocumentStore::new(&config.storage).unwrap());
        IngestionPipeline::new(store, Arc::new(FileParser::new()), embedder, config)
    }

    fn request(file: &str, bytes: &[u8]) -> IngestRequest {
        IngestRequest::new(
            UserNamespace::parse("alice").unwrap(),
            StoredFileName::parse(file).unwrap(),
            bytes.to_vec(),
        )
    }

    #[tokio::test]
    async fn test_ingest_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&config(dir.path()), None);

        let outcome = pipeline.ingest(request("notes.txt", b"The quick brown fox")).await.unwrap();

        assert_eq!(outcome.status, IngestStatus::Indexed);
        assert_eq!(outcome.size, 19);
        assert_eq!(outcome.index_len, 1);
        assert!(!outcome.embedded);

        let records = pipeline.store().load_index(&UserNamespace::parse("alice").unwrap()).await.unwrap();
        assert_eq!(records[0].content, "The quick brown fox");
        assert_eq!(records[0].size, Some(19));
        assert_eq!(records[0].sha256.as_deref().map(str::len), Some(64));
    }

    #[tokio::test]
    async fn test_quota_rejection_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&config(dir.path()), None);

        pipeline.ingest(request("a.txt", &[b'a'; 60])).await.unwrap();
        let err = pipeline.ingest(request("b.txt", &[b'b'; 50])).await.unwrap_err();

        assert!(matches!(err, Error::QuotaExceeded { used: 60, incoming: 50, ceiling: 100, .. }));
        let ns_dir = dir.path().join("alice");
        assert!(!ns_dir.join("b.txt").exists());
        let names: Vec<_> = std::fs::read_dir(&ns_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {:?}", names);
    }

    #[tokio::test]
    async fn test_reupload_counts_replaced_bytes_once() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&config(dir.path()), None);

        pipeline.ingest(request("a.txt", &[b'a'; 60])).await.unwrap();
        let outcome = pipeline.ingest(request("a.txt", &[b'b'; 70])).await.unwrap();

        assert_eq!(outcome.index_len, 2);
        assert_eq!(std::fs::read(dir.path().join("alice/a.txt")).unwrap().len(), 70);
    }

    #[tokio::test]
    async fn test_extraction_failure_keeps_file_with_sentinel() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&config(dir.path()), None);

        let outcome = pipeline.ingest(request("corrupt.bin", b"\x00\x01\x02")).await.unwrap();

        assert_eq!(outcome.status, IngestStatus::ExtractionFailed);
        assert!(outcome.extraction_error.is_some());
        assert!(dir.path().join("alice/corrupt.bin").exists());
        let records = pipeline.store().load_index(&UserNamespace::parse("alice").unwrap()).await.unwrap();
        assert!(records[0].is_sentinel());
        assert!(records[0].content.is_empty());
    }

    #[tokio::test]
    async fn test_strict_extraction_discards_upload() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.ingestion.strict_extraction = true;
        let pipeline = pipeline(&config, None);

        pipeline.ingest(request("keep.txt", b"kept")).await.unwrap();
        let err = pipeline.ingest(request("corrupt.bin", b"\x00\x01")).await.unwrap_err();

        assert!(matches!(err, Error::Extraction { ref filename, .. } if filename == "corrupt.bin"));
        let names: Vec<_> = std::fs::read_dir(dir.path().join("alice"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(!names.iter().any(|n| n.contains("corrupt.bin")), "{:?}", names);
    }

    #[tokio::test]
    async fn test_extraction_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.ingestion.extraction_timeout_secs = 0;
        let store = Arc::new(DocumentStore::new(&config.storage).unwrap());
        let pipeline = IngestionPipeline::new(store, Arc::new(SlowExtractor), None, &config);

        let outcome = pipeline.ingest(request("a.txt", b"text")).await.unwrap();
        assert_eq!(outcome.status, IngestStatus::ExtractionFailed);
        assert!(outcome.extraction_error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(FixedEmbedder { calls: AtomicUsize::new(0), fail: true });
        let pipeline = pipeline(&config(dir.path()), Some(embedder.clone() as Arc<dyn EmbeddingProvider>));

        let outcome = pipeline.ingest(request("a.txt", b"hello")).await.unwrap();

        assert_eq!(outcome.status, IngestStatus::Indexed);
        assert!(!outcome.embedded);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_sentinel_not_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(FixedEmbedder { calls: AtomicUsize::new(0), fail: false });
        let pipeline = pipeline(&config(dir.path()), Some(embedder.clone() as Arc<dyn EmbeddingProvider>));

        pipeline.ingest(request("corrupt.bin", b"\x00")).await.unwrap();
        pipeline.ingest(request("a.txt", b"hello")).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_backfill_embeds_missing_vectors() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let alice = UserNamespace::parse("alice").unwrap();

        let plain = pipeline(&config, None);
        plain.ingest(request("a.txt", b"first")).await.unwrap();
        plain.ingest(request("b.bin", b"\x00")).await.unwrap();
        assert!(matches!(
            plain.backfill_embeddings(&alice).await,
            Err(Error::EmbeddingUnavailable(_))
        ));

        let embedder = Arc::new(FixedEmbedder { calls: AtomicUsize::new(0), fail: false });
        let embedding = pipeline(&config, Some(embedder as Arc<dyn EmbeddingProvider>));
        assert_eq!(embedding.backfill_embeddings(&alice).await.unwrap(), 1);
        assert_eq!(embedding.backfill_embeddings(&alice).await.unwrap(), 0);

        let records = embedding.store().load_index(&alice).await.unwrap();
        assert_eq!(records[0].vector, Some(vec![5.0, 1.0]));
        assert!(records[1].vector.is_none());
    }

    #[tokio::test]
    async fn test_replace_policy_through_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.storage.duplicate_policy = DuplicatePolicy::Replace;
        let pipeline = pipeline(&config, None);

        pipeline.ingest(request("a.txt", b"old text")).await.unwrap();
        let outcome = pipeline.ingest(request("a.txt", b"new text")).await.unwrap();

        assert_eq!(outcome.index_len, 1);
    }

    #[tokio::test]
    async fn test_non_finite_embedding_keeps_index_readable() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let alice = UserNamespace::parse("alice").unwrap();
        let pipeline = pipeline(&config, Some(Arc::new(NanEmbedder) as Arc<dyn EmbeddingProvider>));

        let first = pipeline.ingest(request("a.txt", b"hello")).await.unwrap();
        assert_eq!(first.status, IngestStatus::Indexed);
        assert!(!first.embedded);

        let second = pipeline.ingest(request("b.txt", b"world")).await.unwrap();
        assert_eq!(second.index_len, 2);

        assert_eq!(pipeline.backfill_embeddings(&alice).await.unwrap(), 0);

        let records = pipeline.store().load_index(&alice).await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.vector.is_none()));
    }

    #[tokio::test]
    async fn test_longest_valid_filename_ingests() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(&config(dir.path()), None);
        let long = format!("{}.txt", "a".repeat(251));

        let outcome = pipeline.ingest(request(&long, b"long name")).await.unwrap();
        assert_eq!(outcome.status, IngestStatus::Indexed);
        assert_eq!(outcome.filename, long);

        // Overwrite goes through the backup path as well
        let outcome = pipeline.ingest(request(&long, b"long name again")).await.unwrap();
        assert_eq!(outcome.index_len, 2);
        assert!(dir.path().join("alice").join(&long).exists());
    }
}
