//! Agent memory (§4.8): conversation history load, cross-thread semantic
//! recall, user-fact injection and background extraction.

mod extraction;

pub use extraction::SUPERSEDES_THRESHOLD;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::warn;

use crate::error::Result;
use crate::message::{Attachment, ChatMessage};
use crate::request::Provider;

/// Writer-task deadline; the write path never blocks `execute` on it.
const WRITE_TIMEOUT: Duration = Duration::from_secs(30);
/// Heuristic chars-per-token ratio used to trim history to a token budget.
const CHARS_PER_TOKEN: usize = 4;

/// A message scored against a query embedding.
#[derive(Debug, Clone)]
pub struct ScoredMessage {
    /// The stored message.
    pub message: ChatMessage,
    /// Originating thread id.
    pub thread_id: String,
    /// Cosine similarity to the query, in `[0, 1]`.
    pub score: f64,
}

/// A fact scored against a query embedding.
#[derive(Debug, Clone)]
pub struct ScoredFact {
    /// Stable fact id.
    pub id: String,
    /// The fact text.
    pub text: String,
    /// Cosine similarity to the query, in `[0, 1]`.
    pub score: f64,
}

/// CRUD over threads/messages, plus cosine-similarity message search.
#[async_trait]
pub trait Store: Send + Sync {
    /// Append `message` to `thread_id`.
    async fn append_message(&self, thread_id: &str, message: ChatMessage) -> Result<()>;

    /// Load up to `limit` most-recent messages for `thread_id`, oldest first.
    async fn recent_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<ChatMessage>>;

    /// Search every stored message (across all threads) by embedding
    /// similarity, returning the top `k` regardless of thread.
    async fn search_messages(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredMessage>>;
}

/// User-fact storage: upsert, similarity search, context rendering, and decay.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert or update a fact with its embedding.
    async fn upsert_fact(&self, text: &str, category: &str, embedding: &[f32]) -> Result<String>;

    /// Find the `k` facts most similar to `embedding`.
    async fn search_facts(&self, embedding: &[f32], k: usize) -> Result<Vec<ScoredFact>>;

    /// Render the facts most relevant to `query_embedding` as one context blob.
    async fn build_context(&self, query_embedding: &[f32]) -> Result<String>;

    /// Delete a fact by id.
    async fn delete_fact(&self, id: &str) -> Result<()>;

    /// Age out / prune stale facts. Triggered probabilistically on writes.
    async fn decay_old_facts(&self) -> Result<()>;
}

/// Turns text into embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a batch of texts in one call, one vector per input in order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Extracted facts the model proposed for one user turn.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractedFact {
    /// The fact text to store.
    pub fact: String,
    /// Free-form category label.
    pub category: String,
    /// If set, older facts scoring above [`SUPERSEDES_THRESHOLD`] against this
    /// text are deleted before the new fact is stored.
    #[serde(default)]
    pub supersedes: Option<String>,
}

/// Budgets and toggles [`AgentMemory`] applies to the read/write path.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// Max prior messages loaded for the active thread.
    pub max_history: usize,
    /// Token budget (chars-per-token heuristic) applied after loading history.
    pub max_tokens: Option<usize>,
    /// Minimum cosine score for a cross-thread recall hit to be kept.
    pub semantic_min_score: f64,
    /// Whether cross-thread recall runs at all.
    pub cross_thread_search: bool,
    /// Whether the user-fact extraction pipeline runs on write.
    pub user_memory: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_history: 10,
            max_tokens: None,
            semantic_min_score: 0.60,
            cross_thread_search: false,
            user_memory: false,
        }
    }
}

/// Wires a conversation [`Store`], a [`MemoryStore`] of user facts, an
/// [`EmbeddingProvider`], and the provider used for fact extraction into one
/// read/write path for [`crate::agent::llm_agent::LLMAgent`].
pub struct AgentMemory {
    store: Option<Arc<dyn Store>>,
    memory_store: Option<Arc<dyn MemoryStore>>,
    embedding: Option<Arc<dyn EmbeddingProvider>>,
    extraction_provider: Option<Arc<dyn Provider>>,
    config: MemoryConfig,
    writers: Mutex<JoinSet<()>>,
}

impl AgentMemory {
    /// Build a memory wiring from its collaborators and config.
    #[must_use]
    pub fn new(
        store: Option<Arc<dyn Store>>,
        memory_store: Option<Arc<dyn MemoryStore>>,
        embedding: Option<Arc<dyn EmbeddingProvider>>,
        extraction_provider: Option<Arc<dyn Provider>>,
        config: MemoryConfig,
    ) -> Self {
        Self {
            store,
            memory_store,
            embedding,
            extraction_provider,
            config,
            writers: Mutex::new(JoinSet::new()),
        }
    }

    /// Build the read-path context to prepend around a fresh execution: a
    /// facts-context system message (if memory+embedding are wired), trimmed
    /// prior history for `thread_id` (if a store is wired), and a cross-thread
    /// recall system message (if enabled).
    #[tracing::instrument(skip(self, user_input), fields(thread_id = %thread_id))]
    pub async fn build_read_context(
        &self,
        thread_id: &str,
        user_input: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = Vec::new();

        let query_embedding = self.embed_one(user_input).await;

        if let (Some(memory_store), Some(embedding)) = (&self.memory_store, &query_embedding) {
            match memory_store.build_context(embedding).await {
                Ok(context) if !context.is_empty() => {
                    messages.push(ChatMessage::system(context));
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to build facts context"),
            }
        }

        if let Some(store) = &self.store {
            match store.recent_messages(thread_id, self.config.max_history).await {
                Ok(history) => messages.extend(self.trim_to_token_budget(history)),
                Err(e) => warn!(error = %e, "failed to load thread history"),
            }
        }

        if self.config.cross_thread_search {
            if let (Some(store), Some(embedding)) = (&self.store, &query_embedding) {
                match store.search_messages(embedding, self.config.max_history).await {
                    Ok(hits) => {
                        let recalled = self.render_cross_thread_recall(thread_id, hits);
                        if let Some(recalled) = recalled {
                            messages.push(ChatMessage::system(recalled));
                        }
                    }
                    Err(e) => warn!(error = %e, "failed cross-thread recall search"),
                }
            }
        }

        messages
    }

    fn render_cross_thread_recall(&self, thread_id: &str, hits: Vec<ScoredMessage>) -> Option<String> {
        let relevant: Vec<ScoredMessage> = hits
            .into_iter()
            .filter(|hit| hit.thread_id != thread_id)
            .filter(|hit| hit.score >= self.config.semantic_min_score)
            .collect();
        if relevant.is_empty() {
            return None;
        }
        let mut blob = String::from("Relevant context from other conversations:\n");
        for hit in relevant {
            blob.push_str("- ");
            blob.push_str(&hit.message.content);
            blob.push('\n');
        }
        Some(blob)
    }

    fn trim_to_token_budget(&self, mut history: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let Some(max_tokens) = self.config.max_tokens else {
            return history;
        };
        let budget_chars = max_tokens.saturating_mul(CHARS_PER_TOKEN);
        let mut total: usize = history.iter().map(|m| m.content.chars().count()).sum();
        while total > budget_chars && !history.is_empty() {
            let dropped = history.remove(0);
            total = total.saturating_sub(dropped.content.chars().count());
        }
        history
    }

    /// Spawn a detached writer task persisting this turn's user/assistant
    /// messages and (if user memory is enabled) running fact extraction. Not
    /// awaited by `execute`; tracked in a `JoinSet` so [`AgentMemory::drain`]
    /// can wait for it later.
    pub async fn spawn_write(
        &self,
        thread_id: String,
        user_message: ChatMessage,
        assistant_message: ChatMessage,
        attachments: Vec<Attachment>,
    ) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let embedding = self.embedding.clone();
        let memory_store = self.memory_store.clone();
        let extraction_provider = self.extraction_provider.clone();
        let user_memory = self.config.user_memory;

        let task = async move {
            let result = tokio::time::timeout(WRITE_TIMEOUT, async {
                store.append_message(&thread_id, user_message.clone()).await?;
                let assistant_message = ChatMessage::assistant_with_attachments(assistant_message.content, attachments);
                store.append_message(&thread_id, assistant_message).await?;

                if user_memory {
                    if let (Some(memory_store), Some(embedding), Some(provider)) =
                        (&memory_store, &embedding, &extraction_provider)
                    {
                        extraction::extract_and_store(
                            provider.as_ref(),
                            memory_store.as_ref(),
                            embedding.as_ref(),
                            &user_message.content,
                        )
                        .await?;
                    }
                }
                Result::Ok(())
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "memory write failed"),
                Err(_) => warn!("memory write timed out after {WRITE_TIMEOUT:?}"),
            }
        };

        self.writers.lock().await.spawn(task);
    }

    /// Await every outstanding writer task. Call on shutdown.
    pub async fn drain(&self) {
        let mut writers = self.writers.lock().await;
        while writers.join_next().await.is_some() {}
    }

    async fn embed_one(&self, text: &str) -> Option<Vec<f32>> {
        let embedding = self.embedding.as_ref()?;
        match embedding.embed(std::slice::from_ref(&text.to_string())).await {
            Ok(mut vectors) => vectors.pop(),
            Err(e) => {
                warn!(error = %e, "failed to embed query text");
                None
            }
        }
    }
}
