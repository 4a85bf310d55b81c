//! Search over a namespace index
//!
//! All modes read the index without locking; results reflect whichever index
//! version was on disk when the read happened.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::providers::{checked_vector, EmbeddingProvider};
use crate::storage::DocumentStore;
use crate::types::{IndexRecord, SearchHit, SearchMode, SearchRequest, SearchResponse, UserNamespace};

use super::validate::{clamp_top_k, validate_query};

/// Lexical, semantic, and hybrid search for one namespace at a time
pub struct SearchEngine {
    store: Arc<DocumentStore>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    config: SearchConfig,
    embedding_timeout: Duration,
}

impl SearchEngine {
    /// Create a search engine; without an embedder every mode runs lexically
    pub fn new(
        store: Arc<DocumentStore>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
        config: SearchConfig,
        embedding_timeout: Duration,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
            embedding_timeout,
        }
    }

    /// Search configuration
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run a query against one namespace
    ///
    /// An unknown namespace or a missing index yields no results. Invalid
    /// queries fail with `Error::InvalidQuery`.
    pub async fn search(&self, namespace: &UserNamespace, request: &SearchRequest) -> Result<SearchResponse> {
        let start = Instant::now();
        let query = validate_query(&request.query, self.config.max_query_chars)?;
        let mode_requested = request.mode.unwrap_or(self.config.default_mode);

        let records = self.store.load_index(namespace).await?;

        let (mode_used, results) = match mode_requested {
            SearchMode::Lexical => (SearchMode::Lexical, self.lexical(&records, &query, request.top_k)),
            SearchMode::Semantic | SearchMode::Hybrid => match self.embed_query(&query).await {
                Ok(query_vector) => {
                    let top_k = clamp_top_k(request.top_k, self.config.default_top_k, self.config.max_top_k);
                    let results = if mode_requested == SearchMode::Semantic {
                        self.semantic(&records, &query_vector, top_k)
                    } else {
                        self.hybrid(&records, &query, &query_vector, top_k)
                    };
                    (mode_requested, results)
                }
                Err(e) => {
                    tracing::warn!(
                        "[{}] {:?} search falling back to lexical: {}",
                        namespace,
                        mode_requested,
                        e
                    );
                    (SearchMode::Lexical, self.lexical(&records, &query, request.top_k))
                }
            },
        };

        tracing::debug!(
            "[{}] '{}' ({:?}) -> {} result(s) from {} record(s)",
            namespace,
            query,
            mode_used,
            results.len(),
            records.len()
        );

        Ok(SearchResponse {
            count: results.len(),
            query,
            mode_requested,
            mode_used,
            results,
            processing_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Substring matches in index order
    fn lexical(&self, records: &[IndexRecord], query: &str, top_k: Option<usize>) -> Vec<SearchHit> {
        let query_lower = query.to_lowercase();
        let limit = top_k
            .filter(|k| *k > 0)
            .map(|k| k.min(self.config.max_top_k))
            .unwrap_or(usize::MAX);

        records
            .iter()
            .enumerate()
            .filter_map(|(position, record)| {
                let occurrences = occurrences(&record.content, &query_lower);
                (occurrences > 0).then(|| self.hit(record, position, occurrences as f32))
            })
            .take(limit)
            .collect()
    }

    /// Records ranked by cosine similarity to the query vector
    fn semantic(&self, records: &[IndexRecord], query_vector: &[f32], top_k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = records
            .iter()
            .enumerate()
            .filter_map(|(position, record)| {
                let vector = record.vector.as_deref()?;
                (vector.len() == query_vector.len())
                    .then(|| (position, cosine_similarity(query_vector, vector)))
            })
            .collect();

        sort_by_score(&mut scored);
        scored
            .into_iter()
            .take(top_k)
            .map(|(position, score)| self.hit(&records[position], position, score))
            .collect()
    }

    /// Semantic score plus a boost for lexical matches, one hit per file
    fn hybrid(
        &self,
        records: &[IndexRecord],
        query: &str,
        query_vector: &[f32],
        top_k: usize,
    ) -> Vec<SearchHit> {
        let query_lower = query.to_lowercase();

        let mut scored: Vec<(usize, f32)> = records
            .iter()
            .enumerate()
            .filter_map(|(position, record)| {
                let semantic = record
                    .vector
                    .as_deref()
                    .filter(|v| v.len() == query_vector.len())
                    .map(|v| cosine_similarity(query_vector, v));
                let lexical = occurrences(&record.content, &query_lower) > 0;

                if semantic.is_none() && !lexical {
                    return None;
                }
                let boost = if lexical { self.config.lexical_boost } else { 0.0 };
                Some((position, semantic.unwrap_or(0.0) + boost))
            })
            .collect();

        sort_by_score(&mut scored);

        // After sorting, the first hit per filename is the best (earliest on ties)
        let mut seen = HashSet::new();
        scored
            .into_iter()
            .filter(|(position, _)| seen.insert(records[*position].filename()))
            .take(top_k)
            .map(|(position, score)| self.hit(&records[position], position, score))
            .collect()
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let provider = self
            .embedder
            .as_ref()
            .ok_or_else(|| Error::embedding("no embedding provider configured"))?;

        match tokio::time::timeout(self.embedding_timeout, provider.embed(query)).await {
            Ok(Ok(vector)) => checked_vector(provider.name(), vector),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(Error::embedding(format!(
                "query embedding timed out after {:?}",
                self.embedding_timeout
            ))),
        }
    }

    fn hit(&self, record: &IndexRecord, position: usize, score: f32) -> SearchHit {
        SearchHit {
            filename: record.filename().to_string(),
            snippet: snippet(&record.content, self.config.snippet_chars),
            score,
            position,
        }
    }
}

/// Non-overlapping, case-insensitive occurrences of an already lowercased query
fn occurrences(content: &str, query_lower: &str) -> usize {
    if content.is_empty() || query_lower.is_empty() {
        return 0;
    }
    content.to_lowercase().matches(query_lower).count()
}

/// First `max_chars` grapheme clusters of `text`
pub fn snippet(text: &str, max_chars: usize) -> String {
    text.graphemes(true).take(max_chars).collect()
}

/// Cosine similarity; 0 when either vector has zero magnitude
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Descending score, ascending index position on ties
fn sort_by_score(scored: &mut [(usize, f32)]) {
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageConfig;
    use async_trait::async_trait;
    use std::path::Path;

    /// Maps texts onto fixed 2-d vectors by keyword
    struct KeywordEmbedder;

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            let text = text.to_lowercase();
            Ok(if text.contains("animal") || text.contains("fox") {
                vec![1.0, 0.0]
            } else {
                vec![0.0, 1.0]
            })
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "keyword"
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl EmbeddingProvider for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Err(Error::embedding("connection refused"))
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(false)
        }

        fn name(&self) -> &str {
            "down"
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

    fn record(file: &str, content: &str, vector: Option<Vec<f32>>) -> IndexRecord {
        let mut record = IndexRecord::extracted(file, content.to_string());
        record.vector = vector;
        record
    }

    async fn engine_with(
        root: &Path,
        records: Vec<IndexRecord>,
        embedder: Option<Arc<dyn EmbeddingProvider>>,
    ) -> SearchEngine {
        let store = Arc::new(
            DocumentStore::new(&StorageConfig {
                root: root.to_path_buf(),
                ..StorageConfig::default()
            })
            .unwrap(),
        );
        for r in records {
            store.append_record(&alice(), r).await.unwrap();
        }
        SearchEngine::new(store, embedder, SearchConfig::default(), Duration::from_secs(5))
    }

    fn alice() -> UserNamespace {
        UserNamespace::parse("alice").unwrap()
    }

    #[tokio::test]
    async fn test_lexical_case_insensitive_in_index_order() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            vec![
                record("notes.txt", "The quick brown fox", None),
                record("other.txt", "nothing here", None),
                record("more.txt", "Brown bread, brown rice", None),
            ],
            None,
        )
        .await;

        let response = engine.search(&alice(), &SearchRequest::new("BROWN")).await.unwrap();

        assert_eq!(response.mode_used, SearchMode::Lexical);
        let files: Vec<_> = response.results.iter().map(|h| h.filename.as_str()).collect();
        assert_eq!(files, vec!["notes.txt", "more.txt"]);
        assert!(response.results[0].snippet.contains("brown"));
        assert_eq!(response.results[1].score, 2.0);
        assert_eq!(response.results[1].position, 2);
    }

    #[tokio::test]
    async fn test_unknown_namespace_is_empty_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), vec![], None).await;
        let bob = UserNamespace::parse("bob").unwrap();

        for mode in [SearchMode::Lexical, SearchMode::Semantic, SearchMode::Hybrid] {
            let response = engine
                .search(&bob, &SearchRequest::new("anything").with_mode(mode))
                .await
                .unwrap();
            assert!(response.results.is_empty());
        }
    }

    #[tokio::test]
    async fn test_invalid_query_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), vec![record("a.txt", "text", None)], None).await;

        assert!(matches!(
            engine.search(&alice(), &SearchRequest::new("   ")).await,
            Err(Error::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_sentinel_never_matches() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), vec![IndexRecord::extraction_failed("corrupt.bin")], None).await;

        for q in ["corrupt", "bin", "extraction_failed", "a"] {
            let response = engine.search(&alice(), &SearchRequest::new(q)).await.unwrap();
            assert!(response.results.is_empty(), "{} matched the sentinel", q);
        }
    }

    #[tokio::test]
    async fn test_snippet_respects_graphemes() {
        let text = "e\u{301}".repeat(300);
        let s = snippet(&text, 200);
        assert_eq!(s.graphemes(true).count(), 200);
        assert_eq!(s.chars().count(), 400);
    }

    #[tokio::test]
    async fn test_semantic_without_provider_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(dir.path(), vec![record("a.txt", "fox", None)], None).await;

        let response = engine
            .search(&alice(), &SearchRequest::new("fox").with_mode(SearchMode::Semantic))
            .await
            .unwrap();
        assert_eq!(response.mode_requested, SearchMode::Semantic);
        assert_eq!(response.mode_used, SearchMode::Lexical);
        assert_eq!(response.count, 1);
    }

    #[tokio::test]
    async fn test_semantic_with_failing_provider_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            vec![record("a.txt", "fox", Some(vec![1.0, 0.0]))],
            Some(Arc::new(DownEmbedder) as Arc<dyn EmbeddingProvider>),
        )
        .await;

        let response = engine
            .search(&alice(), &SearchRequest::new("fox").with_mode(SearchMode::Hybrid))
            .await
            .unwrap();
        assert_eq!(response.mode_used, SearchMode::Lexical);
    }

    #[tokio::test]
    async fn test_non_finite_query_vector_degrades() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            vec![
                record("a.txt", "fox", Some(vec![1.0, 0.0])),
                record("b.txt", "car", Some(vec![0.0, 1.0])),
            ],
            Some(Arc::new(NanEmbedder) as Arc<dyn EmbeddingProvider>),
        )
        .await;

        let response = engine
            .search(&alice(), &SearchRequest::new("fox").with_mode(SearchMode::Semantic))
            .await
            .unwrap();
        assert_eq!(response.mode_used, SearchMode::Lexical);
        assert_eq!(response.count, 1);
        assert_eq!(response.results[0].filename, "a.txt");
    }

    #[tokio::test]
    async fn test_semantic_ranking_and_ties() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            vec![
                record("cars.txt", "engines", Some(vec![0.0, 1.0])),
                record("dogs.txt", "dogs", Some(vec![0.8, 0.6])),
                record("fox1.txt", "fox", Some(vec![1.0, 0.0])),
                record("plain.txt", "no vector", None),
                record("odd.txt", "wrong size", Some(vec![1.0, 0.0, 0.0])),
                record("fox2.txt", "fox", Some(vec![2.0, 0.0])),
            ],
            Some(Arc::new(KeywordEmbedder) as Arc<dyn EmbeddingProvider>),
        )
        .await;

        let response = engine
            .search(
                &alice(),
                &SearchRequest::new("animal").with_mode(SearchMode::Semantic).with_top_k(3),
            )
            .await
            .unwrap();

        assert_eq!(response.mode_used, SearchMode::Semantic);
        let files: Vec<_> = response.results.iter().map(|h| h.filename.as_str()).collect();
        assert_eq!(files, vec!["fox1.txt", "fox2.txt", "dogs.txt"]);
        assert!((response.results[0].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_hybrid_boosts_lexical_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            vec![
                record("animals.txt", "animals everywhere", Some(vec![1.0, 0.0])),
                record("fox.txt", "a fox", Some(vec![1.0, 0.0])),
                record("fox.txt", "a fox again", Some(vec![1.0, 0.0])),
                record("cars.txt", "fox-body mustang", Some(vec![0.0, 1.0])),
                record("notes.txt", "fox without vector", None),
            ],
            Some(Arc::new(KeywordEmbedder) as Arc<dyn EmbeddingProvider>),
        )
        .await;

        let response = engine
            .search(&alice(), &SearchRequest::new("fox").with_mode(SearchMode::Hybrid))
            .await
            .unwrap();

        let files: Vec<_> = response.results.iter().map(|h| h.filename.as_str()).collect();
        assert_eq!(files, vec!["fox.txt", "animals.txt", "cars.txt", "notes.txt"]);
        assert_eq!(response.results[0].position, 1);
        assert!((response.results[0].score - 2.0).abs() < 1e-6);
        assert!((response.results[1].score - 1.0).abs() < 1e-6);
        assert!((response.results[2].score - 1.0).abs() < 1e-6);
        assert!((response.results[3].score - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_repeated_query_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let engine = engine_with(
            dir.path(),
            vec![
                record("a.txt", "fox", Some(vec![1.0, 0.0])),
                record("b.txt", "fox", Some(vec![1.0, 0.0])),
            ],
            Some(Arc::new(KeywordEmbedder) as Arc<dyn EmbeddingProvider>),
        )
        .await;

        let request = SearchRequest::new("fox").with_mode(SearchMode::Hybrid);
        let first = engine.search(&alice(), &request).await.unwrap().results;
        let second = engine.search(&alice(), &request).await.unwrap().results;
        assert_eq!(first, second);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }
}
