use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::{self, Stream, StreamExt};

use super::messages::{latest_user_text, validate_turns};
use super::prompt::{augment_turns, general_guidance, grounded_guidance};
use crate::config::RetrievalConfig;
use crate::error::ChatError;
use crate::llm::query_rewrite::QueryRewriter;
use crate::llm::{ChatModel, ChatStream, Embedder, Reranker};
use crate::models::{ConversationTurn, RankedDocument, SourcesPayload};
use crate::search::selection::{build_source_item, context_snippets, select_top_documents};
use crate::search::VectorStore;

/// Shown to the client when generation breaks after streaming has started.
pub const APOLOGY_MESSAGE: &str = "抱歉，生成回答时出现问题。";

/// Rewrite, retrieve, rerank, select, then start generation.
///
/// Providers are injected once at startup and shared by every request; the
/// pipeline itself holds no per-request state.
pub struct ChatPipeline {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    reranker: Arc<dyn Reranker>,
    chat: Arc<dyn ChatModel>,
    rewriter: QueryRewriter,
    retrieval: RetrievalConfig,
}

/// Everything the client receives: citations up front, then the answer.
pub struct ChatReply {
    pub sources: SourcesPayload,
    pub answer: ChatStream,
}

/// One client-facing event, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    Sources(SourcesPayload),
    Delta(String),
    Apology,
    Done,
}

impl ChatEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ChatEvent::Sources(_) => "sources",
            ChatEvent::Delta(_) => "delta",
            ChatEvent::Apology => "error",
            ChatEvent::Done => "done",
        }
    }
}

impl ChatPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        reranker: Arc<dyn Reranker>,
        chat: Arc<dyn ChatModel>,
        rewriter: QueryRewriter,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            reranker,
            chat,
            rewriter,
            retrieval,
        }
    }

    pub async fn run(&self, turns: Vec<ConversationTurn>) -> Result<ChatReply, ChatError> {
        validate_turns(&turns)?;
        let question = latest_user_text(&turns).unwrap_or_default().to_string();

        // ── Step 1: Relevance + query rewrite ─────────────────
        let rewrite = self.rewriter.rewrite(&question).await;
        let rewritten_query = rewrite.query.trim().to_string();
        let search_query = if rewritten_query.is_empty() {
            question.as_str()
        } else {
            rewritten_query.as_str()
        };

        // ── Step 2: Retrieval (on-topic only) ─────────────────
        let (guidance, sources) = if rewrite.is_relevant {
            let ranked = self.retrieve(search_query).await?;
            let snippets = context_snippets(&ranked, self.retrieval.context_snippet_chars);
            let sources = ranked
                .iter()
                .map(|r| build_source_item(r, self.retrieval.source_transcript_chars))
                .collect();
            (grounded_guidance(&snippets), sources)
        } else {
            tracing::info!("Question judged off-topic, answering without retrieval");
            (general_guidance(), Vec::new())
        };

        // ── Step 3: Start generation ──────────────────────────
        let answer = self
            .chat
            .stream(augment_turns(turns, &guidance))
            .await
            .context("Failed to start answer generation")?;

        Ok(ChatReply {
            sources: SourcesPayload {
                question,
                rewritten_query,
                sources,
            },
            answer,
        })
    }

    /// Embed, search and rerank. Rerank trouble only costs ordering quality;
    /// embedding and search failures abort the request.
    async fn retrieve(&self, query: &str) -> anyhow::Result<Vec<RankedDocument>> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed search query")?;

        let candidates = self
            .store
            .search(&vector, self.retrieval.top_k)
            .await
            .context("Vector search failed")?;
        tracing::info!(candidates = candidates.len(), "Retrieved candidates");

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = candidates.iter().map(|d| d.content.clone()).collect();
        let top_n = self.retrieval.rerank_top_n.min(candidates.len());
        let entries = match self.reranker.rerank(query, &texts, top_n).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Rerank failed, falling back to vector order: {e:#}");
                Vec::new()
            }
        };
        tracing::debug!(rerank_entries = entries.len(), "Reranked candidates");

        Ok(select_top_documents(
            &candidates,
            &entries,
            self.retrieval.rerank_top_n,
        ))
    }
}

/// Logs once if the answer stream is dropped before it finished, which is
/// what a client disconnect looks like from here.
struct GenerationGuard {
    finished: bool,
}

impl GenerationGuard {
    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::info!("generation stopped");
        }
    }
}

/// `sources`, then one `delta` per chunk, then `done`. A failed or stalled
/// answer stream ends the deltas with a single apology.
pub fn into_events(reply: ChatReply, idle_timeout: Duration) -> impl Stream<Item = ChatEvent> + Send {
    let ChatReply { sources, answer } = reply;
    let guard = GenerationGuard { finished: false };

    let deltas = stream::unfold(Some((answer, guard)), move |state| async move {
        let (mut answer, mut guard) = state?;
        match tokio::time::timeout(idle_timeout, answer.next()).await {
            Ok(Some(Ok(chunk))) => Some((ChatEvent::Delta(chunk), Some((answer, guard)))),
            Ok(Some(Err(e))) => {
                tracing::error!("Answer stream failed: {e:#}");
                guard.finish();
                Some((ChatEvent::Apology, None))
            }
            Ok(None) => {
                guard.finish();
                None
            }
            Err(_) => {
                tracing::error!("Answer stream idle for {}s, giving up", idle_timeout.as_secs());
                guard.finish();
                Some((ChatEvent::Apology, None))
            }
        }
    });

    stream::once(async move { ChatEvent::Sources(sources) })
        .chain(deltas)
        .chain(stream::once(async { ChatEvent::Done }))
}
