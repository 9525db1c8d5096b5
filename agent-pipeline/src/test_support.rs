use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::types::text_chunk::{DocumentMeta, TextChunk},
    utils::llm::{ChatMessage, Completion, LanguageModel, TokenUsage},
};
use retrieval_pipeline::{
    RetrievalRequest, RetrievalResult, RetrievalStrategy, RetrievedChunk, Retriever,
};

pub const REPLY_USAGE: TokenUsage = TokenUsage::new(100, 20);

type Handler = dyn Fn(&[ChatMessage]) -> Result<String, AppError> + Send + Sync;

/// Language model double answering from a queue or a prompt-aware handler.
pub struct ScriptedModel {
    name: String,
    queue: Mutex<VecDeque<Result<String, AppError>>>,
    handler: Option<Box<Handler>>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            queue: Mutex::new(VecDeque::new()),
            handler: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn reply(self, content: &str) -> Self {
        self.queue
            .lock()
            .expect("queue lock")
            .push_back(Ok(content.to_string()));
        self
    }

    pub fn fail(self, error: AppError) -> Self {
        self.queue.lock().expect("queue lock").push_back(Err(error));
        self
    }

    pub fn with_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> Result<String, AppError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User prompts received so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<Completion, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(last) = messages.last() {
            self.prompts
                .lock()
                .expect("prompts lock")
                .push(last.content.clone());
        }

        let queued = self.queue.lock().expect("queue lock").pop_front();
        let content = match (queued, &self.handler) {
            (Some(result), _) => result?,
            (None, Some(handler)) => handler(messages)?,
            (None, None) => {
                return Err(AppError::Provider(format!(
                    "{} has no scripted reply",
                    self.name
                )))
            }
        };
        Ok(Completion {
            content,
            usage: REPLY_USAGE,
        })
    }
}

/// Retriever double returning fixed chunks and recording the strategies it was asked for.
pub struct StaticRetriever {
    chunks: Vec<RetrievedChunk>,
    min_chunks: usize,
    fail: bool,
    pub strategies: Mutex<Vec<RetrievalStrategy>>,
    pub requests: Mutex<Vec<RetrievalRequest>>,
}

impl StaticRetriever {
    pub fn new(texts: &[(&str, &str)]) -> Self {
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(position, (document_id, text))| {
                let meta = DocumentMeta {
                    document_id: (*document_id).to_string(),
                    source_name: "Hansard".to_string(),
                    source_date: Some("2024-03-15".to_string()),
                    ..DocumentMeta::default()
                };
                RetrievedChunk {
                    chunk: TextChunk::new(&meta, position as u32, (*text).to_string(), vec![1.0]),
                    score: 0.9,
                }
            })
            .collect();
        Self {
            chunks,
            min_chunks: 1,
            fail: false,
            strategies: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_min_chunks(mut self, min_chunks: usize) -> Self {
        self.min_chunks = min_chunks;
        self
    }

    pub fn failing() -> Self {
        let mut retriever = Self::new(&[]);
        retriever.fail = true;
        retriever
    }

    pub fn calls(&self) -> usize {
        self.strategies.lock().expect("strategies lock").len()
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn retrieve(
        &self,
        strategy: RetrievalStrategy,
        request: RetrievalRequest,
    ) -> Result<RetrievalResult, AppError> {
        self.strategies
            .lock()
            .expect("strategies lock")
            .push(strategy);
        self.requests.lock().expect("requests lock").push(request);
        if self.fail {
            return Err(AppError::Provider("vector index unavailable".into()));
        }
        Ok(RetrievalResult::new(
            self.chunks.clone(),
            self.min_chunks,
            1,
            6,
        ))
    }
}
