pub mod qdrant;
pub mod selection;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::RetrievedDocument;

/// Nearest-neighbour search over one fixed collection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top `limit` documents by similarity, best first, with payload.
    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<RetrievedDocument>>;
}
