//! Core data models shared across the chunking, indexing, and sync pipeline.

use serde::Serialize;

/// A document loaded from the corpus, identified by its extension-stripped
/// relative path. Immutable for the duration of a run.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: String,
    pub title: String,
    pub description: String,
    pub body: String,
}

/// A bounded, addressable passage of a document — the unit of retrieval.
///
/// `chunk_id` is a deterministic, URL-safe encoding of
/// `(doc_path, heading_slug, section_index, split_index)`; identical inputs
/// always produce the identical id.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_path: String,
    pub title: String,
    pub description: String,
    pub section_heading: String,
    pub content: String,
    pub char_count: usize,
}

/// A chunk paired with the sha256 fingerprint of its content, used as a
/// cheap equality proxy during sync diffing.
#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub chunk: Chunk,
    pub content_hash: String,
}

/// Identity and hash metadata for a chunk as currently stored in the remote
/// index. The only fields fetched during diffing.
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    pub chunk_id: String,
    pub doc_path: String,
    pub content_hash: String,
}

/// Full record uploaded to the remote index, vector included.
#[derive(Debug, Clone, Serialize)]
pub struct IndexDocument {
    pub chunk_id: String,
    pub doc_path: String,
    pub content_hash: String,
    pub title: String,
    pub section_heading: String,
    pub description: String,
    pub content: String,
    pub content_vector: Vec<f32>,
}
