//! Remote hybrid-index abstraction.
//!
//! The [`RemoteIndex`] trait defines everything the sync engine and the
//! remote query path need from the backing search service: schema
//! management, paginated metadata listing, batch upload/delete, and hybrid
//! (keyword + vector) search. Implementations must be `Send + Sync` so a
//! single instance can be shared across concurrent batch workers.

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::models::{ChunkMetadata, IndexDocument};
use crate::retry::RemoteError;

/// A search result row from the remote hybrid index, deduplicated to the
/// best-scoring chunk per document.
#[derive(Debug, Clone)]
pub struct RemoteHit {
    pub doc_path: String,
    pub title: String,
    pub description: String,
    pub section_heading: String,
    pub excerpt: String,
    pub score: f64,
}

#[async_trait]
pub trait RemoteIndex: Send + Sync {
    /// Create the index definition if missing; with `recreate`, drop any
    /// existing index (and all stored records) first.
    async fn ensure_index(&self, recreate: bool) -> Result<(), RemoteError>;

    /// One page of `{chunk_id, doc_path, content_hash}` metadata. A page
    /// shorter than `page_size` signals the end of the listing.
    async fn list_metadata(
        &self,
        page_size: usize,
        skip: usize,
    ) -> Result<Vec<ChunkMetadata>, RemoteError>;

    /// Upload a batch of full records (vectors included) as one write.
    async fn upload(&self, docs: &[IndexDocument]) -> Result<(), RemoteError>;

    /// Delete a batch of records by chunk id.
    async fn delete(&self, chunk_ids: &[String]) -> Result<(), RemoteError>;

    /// Hybrid keyword + vector search.
    async fn search(
        &self,
        query: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RemoteHit>, RemoteError>;
}

/// Collapse chunk-level hits to the best-scoring hit per document,
/// ordered by descending score and truncated to `limit`.
pub(crate) fn best_hit_per_doc(hits: Vec<RemoteHit>, limit: usize) -> Vec<RemoteHit> {
    let mut best: Vec<RemoteHit> = Vec::new();
    for hit in hits {
        match best.iter_mut().find(|h| h.doc_path == hit.doc_path) {
            Some(existing) => {
                if hit.score > existing.score {
                    *existing = hit;
                }
            }
            None => best.push(hit),
        }
    }
    best.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    best.truncate(limit);
    best
}
