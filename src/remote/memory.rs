//! In-memory [`RemoteIndex`] implementation for tests and offline use.
//!
//! Records live in a `Vec` behind an `RwLock`, ordered by first insertion,
//! which gives the metadata listing a stable pagination order. Search is
//! brute-force: keyword term counting plus cosine similarity over stored
//! vectors.

use std::sync::RwLock;

use async_trait::async_trait;

use crate::models::{ChunkMetadata, IndexDocument};
use crate::retry::RemoteError;

use super::{best_hit_per_doc, RemoteHit, RemoteIndex};

#[derive(Default)]
pub struct MemoryIndex {
    docs: RwLock<Vec<IndexDocument>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.docs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stored record by chunk id, if present.
    pub fn get(&self, chunk_id: &str) -> Option<IndexDocument> {
        self.docs
            .read()
            .unwrap()
            .iter()
            .find(|d| d.chunk_id == chunk_id)
            .cloned()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl RemoteIndex for MemoryIndex {
    async fn ensure_index(&self, recreate: bool) -> Result<(), RemoteError> {
        if recreate {
            self.docs.write().unwrap().clear();
        }
        Ok(())
    }

    async fn list_metadata(
        &self,
        page_size: usize,
        skip: usize,
    ) -> Result<Vec<ChunkMetadata>, RemoteError> {
        let docs = self.docs.read().unwrap();
        let page = docs
            .iter()
            .skip(skip)
            .take(page_size)
            .map(|d| ChunkMetadata {
                chunk_id: d.chunk_id.clone(),
                doc_path: d.doc_path.clone(),
                content_hash: d.content_hash.clone(),
            })
            .collect();
        Ok(page)
    }

    async fn upload(&self, incoming: &[IndexDocument]) -> Result<(), RemoteError> {
        let mut docs = self.docs.write().unwrap();
        for doc in incoming {
            match docs.iter_mut().find(|d| d.chunk_id == doc.chunk_id) {
                Some(existing) => *existing = doc.clone(),
                None => docs.push(doc.clone()),
            }
        }
        Ok(())
    }

    async fn delete(&self, chunk_ids: &[String]) -> Result<(), RemoteError> {
        let mut docs = self.docs.write().unwrap();
        docs.retain(|d| !chunk_ids.contains(&d.chunk_id));
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<RemoteHit>, RemoteError> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        let docs = self.docs.read().unwrap();

        let hits: Vec<RemoteHit> = docs
            .iter()
            .filter_map(|d| {
                let text = d.content.to_lowercase();
                let matches = terms.iter().filter(|t| text.contains(*t)).count();
                let sim = cosine_sim(vector, &d.content_vector) as f64;
                let score = matches as f64 + sim;
                if score <= 0.0 {
                    return None;
                }
                Some(RemoteHit {
                    doc_path: d.doc_path.clone(),
                    title: d.title.clone(),
                    description: d.description.clone(),
                    section_heading: d.section_heading.clone(),
                    excerpt: d.content.chars().take(240).collect(),
                    score,
                })
            })
            .collect();

        Ok(best_hit_per_doc(hits, limit))
    }
}
