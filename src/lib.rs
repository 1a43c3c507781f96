//! # docdex
//!
//! Documentation chunking, lexical indexing, and remote hybrid-index
//! synchronization.
//!
//! docdex keeps a remote keyword + vector index in step with a markdown
//! corpus without full re-indexing: documents are split into addressable
//! chunks with stable ids, content hashes detect what actually changed,
//! and only new or changed chunks are embedded and uploaded. An in-memory
//! TF-IDF index answers queries when no remote index is configured.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────┐   ┌─────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Corpus │──▶│ Chunker │──▶│ Sync Engine  │──▶│ Remote Index │
//! │  (md)  │   │         │   │ (hash diff)  │   │ (kw + vec)   │
//! └───┬────┘   └─────────┘   └──────┬───────┘   └──────────────┘
//!     │                            retry/throttle
//!     ▼
//! ┌─────────┐
//! │ Lexical │  (TF-IDF fallback, no network)
//! └─────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`markdown`] | Front matter, markup stripping, slugs |
//! | [`corpus`] | Corpus walking and document loading |
//! | [`chunker`] | Heading-aware chunking with overlap |
//! | [`lexical`] | In-memory TF-IDF search |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`remote`] | Remote hybrid-index client |
//! | [`retry`] | Backoff, error classification, throttle gate |
//! | [`sync`] | Content-hash diffing and batch sync |
//! | [`search`] | Search and document-retrieval commands |

pub mod chunker;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod lexical;
pub mod markdown;
pub mod models;
pub mod remote;
pub mod retry;
pub mod search;
pub mod sync;
