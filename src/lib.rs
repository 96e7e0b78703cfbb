//! # Dharma RAG
//!
//! A retrieval-augmented chat backend for a Buddhist-practice assistant.
//! Questions are answered in a fixed persona, grounded in transcript
//! segments stored in Qdrant, with citations streamed ahead of the answer.
//!
//! ## Request Flow
//!
//! ```text
//!                  POST /api/chat { messages | message }
//!                               │
//!                               ▼
//!                  ┌───────────────────────┐
//!                  │  Message Preparation  │
//!                  │  roles + plain text   │
//!                  │  400 on empty input   │
//!                  └───────────┬───────────┘
//!                              │ latest user turn
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │    Query Rewrite      │
//!                  │  isRelevant + query   │
//!                  │  fails open           │
//!                  └───────────┬───────────┘
//!                              │
//!            ┌─────────────────┴─────────────────┐
//!            │ off-topic                         │ on-topic
//!            ▼                                   ▼
//!     ┌─────────────┐                ┌───────────────────────┐
//!     │ General     │                │ Embed → Qdrant top 20 │
//!     │ guidance    │                └───────────┬───────────┘
//!     │ no sources  │                            │
//!     └──────┬──────┘                            ▼
//!            │                       ┌───────────────────────┐
//!            │                       │  Rerank (optional)    │
//!            │                       │  merge + backfill     │
//!            │                       │  keep top 5           │
//!            │                       └───────────┬───────────┘
//!            │                                   │
//!            │                                   ▼
//!            │                       ┌───────────────────────┐
//!            │                       │  Grounded guidance    │
//!            │                       │  numbered snippets    │
//!            │                       └───────────┬───────────┘
//!            └─────────────────┬─────────────────┘
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │  SSE: sources, delta… │
//!                  │  error?, done         │
//!                  └───────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the server, DashScope and Qdrant
//! - [`models`] - Shared data types: turns, retrieved documents, citations
//! - [`chat::messages`] - Raw client message normalization and validation
//! - [`chat::prompt`] - Persona and grounding instructions
//! - [`chat::pipeline`] - The per-request pipeline and its SSE event sequence
//! - [`llm::query_rewrite`] - Relevance classification and retrieval query rewrite
//! - [`llm::embeddings`] - Query embeddings via DashScope
//! - [`llm::rerank`] - Batch reranking via DashScope `text-rerank`
//! - [`llm::chat_stream`] - Streaming chat completions
//! - [`search::qdrant`] - Nearest-neighbour search over the transcript collection
//! - [`search::selection`] - Rerank merge, truncation and citation projection
//! - [`api`] - Axum HTTP handlers
//! - [`state`] - Shared application state wiring the providers together

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod llm;
pub mod models;
pub mod search;
pub mod state;
