use std::{sync::Arc, time::Duration};

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::text_chunk::{DocumentMeta, TextChunk},
    },
    utils::{
        embedding::{estimate_tokens, Embedder},
        retry::{with_timeout, RetryPolicy},
    },
};
use serde::Serialize;
use text_splitter::TextSplitter;
use tracing::{debug, info, instrument, warn};

const MIN_CHUNK_CHARS: usize = 500;
const MAX_CHUNK_CHARS: usize = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub document_id: String,
    pub chunks_indexed: usize,
    pub embedding_tokens: u64,
}

/// Embeds document text and stores it as searchable chunks.
pub struct ChunkIndexer {
    db: Arc<SurrealDbClient>,
    embedder: Arc<dyn Embedder>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl ChunkIndexer {
    pub fn new(db: Arc<SurrealDbClient>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            db,
            embedder,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }

    /// Bounds every embedding attempt; a timed-out attempt is retried like any transient error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Splits raw text into chunks before indexing it.
    pub async fn index_text(&self, meta: DocumentMeta, text: &str) -> Result<IndexReport, AppError> {
        self.index_document(meta, split_text(text)).await
    }

    /// Replaces every stored chunk of `meta.document_id` with `texts`, in order.
    #[instrument(skip_all, fields(document_id = %meta.document_id))]
    pub async fn index_document(
        &self,
        meta: DocumentMeta,
        texts: Vec<String>,
    ) -> Result<IndexReport, AppError> {
        if meta.document_id.trim().is_empty() {
            return Err(AppError::Validation("document_id must not be empty".into()));
        }

        let texts: Vec<String> = texts
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();
        if texts.is_empty() {
            return Err(AppError::Validation(format!(
                "document {} has no text to index",
                meta.document_id
            )));
        }

        let embedding_tokens = texts.iter().map(|t| estimate_tokens(t)).sum();
        let embeddings = self
            .retry
            .run(
                || {
                    let batch = texts.clone();
                    with_timeout(self.timeout, "chunk embedding", self.embedder.embed(batch))
                },
                |err: &AppError| {
                    let retry = err.is_transient();
                    if retry {
                        warn!(error = %err, "Embedding batch failed; retrying");
                    }
                    retry
                },
            )
            .await?;

        if embeddings.len() != texts.len() {
            return Err(AppError::Provider(format!(
                "embedder returned {} vectors for {} chunks",
                embeddings.len(),
                texts.len()
            )));
        }

        TextChunk::delete_by_document_id(&meta.document_id, &self.db).await?;

        let chunks_indexed = texts.len();
        for (position, (text, embedding)) in texts.into_iter().zip(embeddings).enumerate() {
            let chunk = TextChunk::new(&meta, position as u32, text, embedding);
            debug!(chunk_id = %chunk.id, position, "Storing chunk");
            self.db.store_item(chunk).await?;
        }

        info!(chunks_indexed, embedding_tokens, "Document indexed");
        Ok(IndexReport {
            document_id: meta.document_id,
            chunks_indexed,
            embedding_tokens,
        })
    }
}

pub fn split_text(text: &str) -> Vec<String> {
    let splitter = TextSplitter::new(MIN_CHUNK_CHARS..MAX_CHUNK_CHARS);
    splitter.chunks(text).map(str::to_string).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ContextRetriever, RetrievalRequest, RetrievalStrategy, RetrievalTuning, Retriever};
    use async_trait::async_trait;
    use common::{
        storage::vector_index::SurrealVectorIndex, utils::embedding::EmbeddingProvider,
    };
    use std::{
        sync::atomic::{AtomicU32, Ordering},
        time::Duration,
    };
    use uuid::Uuid;

    const DIM: usize = 16;

    async fn setup_db() -> Arc<SurrealDbClient> {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("indexing_ns", database)
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized(DIM).await.expect("indexes");
        Arc::new(db)
    }

    fn meta(document_id: &str) -> DocumentMeta {
        DocumentMeta {
            document_id: document_id.to_string(),
            source_name: "Hansard".to_string(),
            source_date: Some("2024-05-02".to_string()),
            ..DocumentMeta::default()
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy::default()
            .with_base_delay(Duration::from_millis(1))
            .with_jitter(false)
    }

    /// Fails a fixed number of times before delegating to the hashed embedder.
    struct FlakyEmbedder {
        failures_left: AtomicU32,
        inner: EmbeddingProvider,
    }

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(AppError::Timeout("embedding".into()));
            }
            self.inner.embed(texts).await
        }
    }

    #[tokio::test]
    async fn indexed_chunks_are_searchable() {
        let db = setup_db().await;
        let embedder: Arc<dyn Embedder> = Arc::new(EmbeddingProvider::new_hashed(DIM));
        let indexer = ChunkIndexer::new(Arc::clone(&db), Arc::clone(&embedder));

        let report = indexer
            .index_document(
                meta("debate-1"),
                vec![
                    "The housing bill passed its second reading".into(),
                    "   ".into(),
                    "Members debated rail funding".into(),
                ],
            )
            .await
            .expect("index");
        assert_eq!(report.chunks_indexed, 2);
        assert_eq!(report.embedding_tokens, 11);

        let retriever = ContextRetriever::new(
            embedder,
            Arc::new(SurrealVectorIndex::new(Arc::clone(&db))),
            RetrievalTuning::default(),
        );
        let result = retriever
            .retrieve(
                RetrievalStrategy::SingleFocus,
                RetrievalRequest::new("housing bill second reading"),
            )
            .await
            .expect("retrieve");

        assert!(!result.chunks.is_empty());
        assert_eq!(result.chunks[0].chunk.document_id, "debate-1");
        assert_eq!(result.sources().len(), 1);
    }

    #[tokio::test]
    async fn reindexing_replaces_previous_chunks() {
        let db = setup_db().await;
        let indexer = ChunkIndexer::new(
            Arc::clone(&db),
            Arc::new(EmbeddingProvider::new_hashed(DIM)),
        );

        indexer
            .index_document(meta("doc"), vec!["first".into(), "second".into()])
            .await
            .expect("index");
        indexer
            .index_document(meta("doc"), vec!["replacement".into()])
            .await
            .expect("reindex");

        let chunks = TextChunk::find_by_document_id("doc", &db)
            .await
            .expect("chunks");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "replacement");
    }

    #[tokio::test]
    async fn transient_embedding_failures_are_retried() {
        let db = setup_db().await;
        let embedder = Arc::new(FlakyEmbedder {
            failures_left: AtomicU32::new(2),
            inner: EmbeddingProvider::new_hashed(DIM),
        });
        let indexer = ChunkIndexer::new(Arc::clone(&db), embedder).with_retry(fast_retry());

        let report = indexer
            .index_document(meta("doc"), vec!["budget statement".into()])
            .await
            .expect("index after retries");
        assert_eq!(report.chunks_indexed, 1);
    }

    #[tokio::test]
    async fn retries_are_bounded() {
        let db = setup_db().await;
        let embedder = Arc::new(FlakyEmbedder {
            failures_left: AtomicU32::new(10),
            inner: EmbeddingProvider::new_hashed(DIM),
        });
        let indexer = ChunkIndexer::new(Arc::clone(&db), embedder).with_retry(fast_retry());

        let result = indexer
            .index_document(meta("doc"), vec!["budget statement".into()])
            .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert!(TextChunk::find_by_document_id("doc", &db)
            .await
            .expect("chunks")
            .is_empty());
    }

    struct StalledEmbedder;

    #[async_trait]
    impl Embedder for StalledEmbedder {
        async fn embed(&self, _texts: Vec<String>) -> Result<Vec<Vec<f32>>, AppError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stalled_embedding_times_out() {
        let db = setup_db().await;
        let indexer = ChunkIndexer::new(Arc::clone(&db), Arc::new(StalledEmbedder))
            .with_retry(fast_retry())
            .with_timeout(Duration::from_millis(20));

        let result = indexer
            .index_document(meta("doc"), vec!["budget statement".into()])
            .await;

        assert!(matches!(result, Err(AppError::Timeout(_))));
        assert!(TextChunk::find_by_document_id("doc", &db)
            .await
            .expect("chunks")
            .is_empty());
    }

    #[tokio::test]
    async fn empty_documents_are_rejected() {
        let db = setup_db().await;
        let indexer = ChunkIndexer::new(db, Arc::new(EmbeddingProvider::new_hashed(DIM)));
        let result = indexer.index_document(meta("doc"), vec![" ".into()]).await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn long_text_is_split_into_bounded_chunks() {
        let paragraph = "The committee reviewed the amendments in detail. ".repeat(120);
        let chunks = split_text(&paragraph);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= MAX_CHUNK_CHARS));
    }
}
