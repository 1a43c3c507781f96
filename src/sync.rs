//! Remote index synchronization.
//!
//! Reconciles the chunk set computed from the current corpus against the
//! remote index's stored state. Content hashes make change detection
//! cheap: a chunk whose id and hash both match the remote record is
//! provably skipped — never re-embedded, never re-uploaded — regardless of
//! corpus ordering, because chunk ids derive from path/heading/index, not
//! from position across the corpus.
//!
//! Batches are applied independently; a failure after retries aborts the
//! rest of the run but leaves earlier batches applied.

use std::collections::HashMap;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use sha2::{Digest, Sha256};

use crate::chunker::Chunker;
use crate::config::Config;
use crate::corpus;
use crate::embedding::{create_embedder, Embedder};
use crate::models::{ChunkMetadata, ChunkRecord, Document, IndexDocument};
use crate::remote::http::HttpSearchIndex;
use crate::remote::RemoteIndex;
use crate::retry::{execute, RemoteError, RetryPolicy, ThrottleGate};

/// Default vector dimensionality when the embedding config leaves it unset.
pub const DEFAULT_DIMS: usize = 1536;

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub recreate: bool,
    pub dry_run: bool,
    pub batch_size: usize,
}

/// The computed reconciliation between incoming and existing chunk state.
/// Derived per run, never stored.
#[derive(Debug, Default)]
pub struct SyncPlan {
    pub existing_count: usize,
    pub incoming_count: usize,
    pub new_count: usize,
    pub changed_count: usize,
    pub unchanged_count: usize,
    pub to_upsert: Vec<ChunkRecord>,
    pub to_delete: Vec<String>,
}

impl SyncPlan {
    pub fn is_noop(&self) -> bool {
        self.to_upsert.is_empty() && self.to_delete.is_empty()
    }
}

/// What a non-dry run actually applied.
#[derive(Debug, Default)]
pub struct ApplyStats {
    pub upserted: usize,
    pub deleted: usize,
    pub batches_applied: usize,
}

/// sha256 hex fingerprint of a chunk's content.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Chunk every document and pair each chunk with its content hash.
/// Order follows the corpus (documents sorted by path, chunks in document
/// order), which keeps upsert batches deterministic.
pub fn compute_records(chunker: &Chunker, docs: &[Document]) -> Vec<ChunkRecord> {
    let mut records = Vec::new();
    for doc in docs {
        for chunk in chunker.chunk(&doc.path, &doc.body) {
            let content_hash = content_hash(&chunk.content);
            records.push(ChunkRecord {
                chunk,
                content_hash,
            });
        }
    }
    records
}

/// Page through the remote metadata listing until a short page signals the
/// end. The short-page rule structurally guards against infinite
/// pagination on a misbehaving backend.
pub async fn fetch_existing(
    remote: &dyn RemoteIndex,
    page_size: usize,
    policy: &RetryPolicy,
    throttle: &ThrottleGate,
) -> Result<HashMap<String, ChunkMetadata>, RemoteError> {
    let mut existing = HashMap::new();
    let mut skip = 0;

    loop {
        let page = execute("list metadata", policy, Some(throttle), || {
            remote.list_metadata(page_size, skip)
        })
        .await?;
        let page_len = page.len();

        for item in page {
            existing.insert(item.chunk_id.clone(), item);
        }

        if page_len < page_size {
            break;
        }
        skip += page_size;
    }

    Ok(existing)
}

/// Set algebra over incoming vs. existing `(chunk_id, content_hash)` pairs.
pub fn diff(records: Vec<ChunkRecord>, existing: &HashMap<String, ChunkMetadata>) -> SyncPlan {
    let mut plan = SyncPlan {
        existing_count: existing.len(),
        incoming_count: records.len(),
        ..SyncPlan::default()
    };

    let incoming_ids: std::collections::HashSet<&str> =
        records.iter().map(|r| r.chunk.chunk_id.as_str()).collect();

    plan.to_delete = existing
        .keys()
        .filter(|id| !incoming_ids.contains(id.as_str()))
        .cloned()
        .collect();
    plan.to_delete.sort();

    for record in records {
        match existing.get(&record.chunk.chunk_id) {
            None => {
                plan.new_count += 1;
                plan.to_upsert.push(record);
            }
            Some(prev) if prev.content_hash != record.content_hash => {
                plan.changed_count += 1;
                plan.to_upsert.push(record);
            }
            Some(_) => plan.unchanged_count += 1,
        }
    }

    plan
}

/// Drive the plan's upsert and delete batches through the retry executor.
/// Each upsert batch is embedded with a single call before upload.
pub async fn apply(
    plan: &SyncPlan,
    remote: &dyn RemoteIndex,
    embedder: &dyn Embedder,
    batch_size: usize,
    policy: &RetryPolicy,
    throttle: &ThrottleGate,
) -> Result<ApplyStats> {
    let batch_size = batch_size.max(1);
    let mut stats = ApplyStats::default();

    for batch in plan.to_upsert.chunks(batch_size) {
        let texts: Vec<String> = batch.iter().map(|r| r.chunk.content.clone()).collect();
        let vectors = execute("embed batch", policy, Some(throttle), || {
            embedder.embed_texts(&texts)
        })
        .await
        .with_context(|| {
            format!(
                "embedding batch failed after {} applied batches",
                stats.batches_applied
            )
        })?;

        let docs: Vec<IndexDocument> = batch
            .iter()
            .zip(vectors)
            .map(|(record, vector)| IndexDocument {
                chunk_id: record.chunk.chunk_id.clone(),
                doc_path: record.chunk.doc_path.clone(),
                content_hash: record.content_hash.clone(),
                title: record.chunk.title.clone(),
                section_heading: record.chunk.section_heading.clone(),
                description: record.chunk.description.clone(),
                content: record.chunk.content.clone(),
                content_vector: vector,
            })
            .collect();

        execute("upload batch", policy, Some(throttle), || {
            remote.upload(&docs)
        })
        .await
        .with_context(|| {
            format!(
                "upload batch failed after {} applied batches",
                stats.batches_applied
            )
        })?;

        stats.upserted += docs.len();
        stats.batches_applied += 1;
        tracing::info!(
            upserted = stats.upserted,
            total = plan.to_upsert.len(),
            "upsert batch applied"
        );
    }

    for batch in plan.to_delete.chunks(batch_size) {
        execute("delete batch", policy, Some(throttle), || {
            remote.delete(batch)
        })
        .await
        .with_context(|| {
            format!(
                "delete batch failed after {} applied batches",
                stats.batches_applied
            )
        })?;
        stats.deleted += batch.len();
        stats.batches_applied += 1;
    }

    Ok(stats)
}

fn print_plan(plan: &SyncPlan) {
    println!(
        "sync plan: existing={} incoming={} new={} changed={} unchanged={} delete={}",
        plan.existing_count,
        plan.incoming_count,
        plan.new_count,
        plan.changed_count,
        plan.unchanged_count,
        plan.to_delete.len()
    );
}

/// Full sync run: chunk the corpus, diff against the remote index, and
/// apply the plan. Dry runs stop after reporting the plan.
pub async fn run_sync(config: &Config, opts: SyncOptions) -> Result<()> {
    let started = Instant::now();

    let remote_config = config
        .remote
        .as_ref()
        .ok_or_else(|| anyhow!("[remote] is not configured; sync requires a remote index"))?;

    let dims = config.embedding.dims.unwrap_or(DEFAULT_DIMS);
    let remote = HttpSearchIndex::new(remote_config, dims)?;
    let policy = config.retry.policy();
    let throttle = ThrottleGate::new(
        config.throttle.enabled,
        std::time::Duration::from_secs_f64(config.throttle.max_pause_s),
    );

    let documents = corpus::load_corpus(&config.corpus)?;
    let records = compute_records(
        &Chunker::new(config.chunking.max_chars, config.chunking.overlap_chars),
        &documents,
    );
    let doc_count = documents.len();
    let chunk_count = records.len();

    if opts.dry_run {
        // Never mutate: no index creation, no uploads. A listing 404 just
        // means the index does not exist yet.
        let existing = if opts.recreate {
            HashMap::new()
        } else {
            match fetch_existing(&remote, remote_config.page_size, &policy, &throttle).await {
                Ok(existing) => existing,
                Err(RemoteError::Status { code: 404, .. }) => {
                    tracing::warn!("remote index does not exist yet; treating as empty");
                    HashMap::new()
                }
                Err(err) => return Err(err.into()),
            }
        };
        let plan = diff(records, &existing);
        print_plan(&plan);
        println!("dry run complete in {:.1}s", started.elapsed().as_secs_f64());
        return Ok(());
    }

    // Configuration problems (missing embedding key, bad provider) must
    // surface before any remote mutation or batch work.
    let embedder = create_embedder(&config.embedding)?;

    execute("ensure index", &policy, Some(&throttle), || {
        remote.ensure_index(opts.recreate)
    })
    .await?;

    let existing = if opts.recreate {
        HashMap::new()
    } else {
        fetch_existing(&remote, remote_config.page_size, &policy, &throttle).await?
    };

    let plan = diff(records, &existing);
    print_plan(&plan);

    let stats = apply(&plan, &remote, embedder.as_ref(), opts.batch_size, &policy, &throttle).await?;

    println!(
        "sync complete: docs={} chunks={} upserted={} deleted={} index={} duration={:.1}s",
        doc_count,
        chunk_count,
        stats.upserted,
        stats.deleted,
        remote_config.index,
        started.elapsed().as_secs_f64()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::remote::memory::MemoryIndex;

    use super::*;

    /// Deterministic embedder that counts how many texts it has vectorized.
    struct FakeEmbedder {
        calls: AtomicUsize,
        texts_embedded: AtomicUsize,
    }

    impl FakeEmbedder {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                texts_embedded: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn model_name(&self) -> &str {
            "fake"
        }

        fn dims(&self) -> usize {
            2
        }

        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.texts_embedded.fetch_add(texts.len(), Ordering::SeqCst);
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }
    }

    fn doc(path: &str, body: &str) -> Document {
        Document {
            path: path.to_string(),
            title: String::new(),
            description: String::new(),
            body: body.to_string(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 2,
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(5),
            jitter_ratio: 0.0,
        }
    }

    fn gate() -> ThrottleGate {
        ThrottleGate::new(true, std::time::Duration::from_millis(50))
    }

    fn metadata(chunk_id: &str, hash: &str) -> ChunkMetadata {
        ChunkMetadata {
            chunk_id: chunk_id.to_string(),
            doc_path: String::new(),
            content_hash: hash.to_string(),
        }
    }

    fn record(chunk_id: &str, hash: &str) -> ChunkRecord {
        ChunkRecord {
            chunk: crate::models::Chunk {
                chunk_id: chunk_id.to_string(),
                doc_path: format!("docs/{}", chunk_id),
                title: String::new(),
                description: String::new(),
                section_heading: String::new(),
                content: format!("content of {}", chunk_id),
                char_count: 0,
            },
            content_hash: hash.to_string(),
        }
    }

    #[test]
    fn content_hash_is_sensitive_to_single_characters() {
        let a = content_hash("The same text.");
        let b = content_hash("The same text!");
        assert_ne!(a, b);
        assert_eq!(a, content_hash("The same text."));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn diff_classifies_new_changed_unchanged() {
        let existing: HashMap<String, ChunkMetadata> = [
            ("c1".to_string(), metadata("c1", "hashA")),
            ("c2".to_string(), metadata("c2", "hashB")),
        ]
        .into();
        let records = vec![
            record("c1", "hashA"),
            record("c2", "hashC"),
            record("c3", "hashD"),
        ];

        let plan = diff(records, &existing);
        assert_eq!(plan.unchanged_count, 1);
        assert_eq!(plan.changed_count, 1);
        assert_eq!(plan.new_count, 1);
        assert!(plan.to_delete.is_empty());
        let upsert_ids: Vec<&str> = plan
            .to_upsert
            .iter()
            .map(|r| r.chunk.chunk_id.as_str())
            .collect();
        assert_eq!(upsert_ids, vec!["c2", "c3"]);
    }

    #[test]
    fn diff_detects_deletions() {
        let existing: HashMap<String, ChunkMetadata> = [
            ("kept".to_string(), metadata("kept", "h1")),
            ("gone".to_string(), metadata("gone", "h2")),
        ]
        .into();
        let plan = diff(vec![record("kept", "h1")], &existing);
        assert_eq!(plan.to_delete, vec!["gone".to_string()]);
        assert_eq!(plan.unchanged_count, 1);
        assert!(plan.to_upsert.is_empty());
    }

    #[tokio::test]
    async fn second_sync_of_unchanged_corpus_is_a_noop() {
        let chunker = Chunker::new(200, 40);
        let docs = vec![
            doc("a/alpha", "# Alpha\n\nAlpha body text."),
            doc("b/beta", "# Beta\n\nBeta body text."),
        ];
        let remote = MemoryIndex::new();
        let embedder = FakeEmbedder::new();

        // First run: everything is new.
        let records = compute_records(&chunker, &docs);
        let existing = fetch_existing(&remote, 10, &policy(), &gate()).await.unwrap();
        let plan = diff(records, &existing);
        assert_eq!(plan.new_count, 2);
        apply(&plan, &remote, &embedder, 10, &policy(), &gate())
            .await
            .unwrap();
        let embeds_after_first = embedder.texts_embedded.load(Ordering::SeqCst);
        assert_eq!(embeds_after_first, 2);

        // Second run: identical corpus, no uploads, no embeddings.
        let records = compute_records(&chunker, &docs);
        let existing = fetch_existing(&remote, 10, &policy(), &gate()).await.unwrap();
        let plan = diff(records, &existing);
        assert!(plan.is_noop());
        assert_eq!(plan.unchanged_count, 2);
        apply(&plan, &remote, &embedder, 10, &policy(), &gate())
            .await
            .unwrap();
        assert_eq!(embedder.texts_embedded.load(Ordering::SeqCst), embeds_after_first);
    }

    #[tokio::test]
    async fn single_character_edit_reuploads_only_that_chunk() {
        let chunker = Chunker::new(200, 40);
        let original = vec![
            doc("a/alpha", "# Alpha\n\nAlpha body text."),
            doc("b/beta", "# Beta\n\nBeta body text."),
        ];
        let remote = MemoryIndex::new();
        let embedder = FakeEmbedder::new();

        let plan = diff(
            compute_records(&chunker, &original),
            &fetch_existing(&remote, 10, &policy(), &gate()).await.unwrap(),
        );
        apply(&plan, &remote, &embedder, 10, &policy(), &gate())
            .await
            .unwrap();

        let edited = vec![
            doc("a/alpha", "# Alpha\n\nAlpha body text!"),
            doc("b/beta", "# Beta\n\nBeta body text."),
        ];
        let plan = diff(
            compute_records(&chunker, &edited),
            &fetch_existing(&remote, 10, &policy(), &gate()).await.unwrap(),
        );
        assert_eq!(plan.changed_count, 1);
        assert_eq!(plan.unchanged_count, 1);
        assert_eq!(plan.new_count, 0);
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.to_upsert[0].chunk.doc_path, "a/alpha");
    }

    #[tokio::test]
    async fn corpus_order_does_not_affect_the_diff() {
        let chunker = Chunker::new(200, 40);
        let forward = vec![
            doc("a/alpha", "# Alpha\n\nAlpha body."),
            doc("b/beta", "# Beta\n\nBeta body."),
        ];
        let reversed: Vec<Document> = forward.iter().rev().cloned().collect();

        let remote = MemoryIndex::new();
        let embedder = FakeEmbedder::new();
        let plan = diff(
            compute_records(&chunker, &forward),
            &fetch_existing(&remote, 10, &policy(), &gate()).await.unwrap(),
        );
        apply(&plan, &remote, &embedder, 10, &policy(), &gate())
            .await
            .unwrap();

        let plan = diff(
            compute_records(&chunker, &reversed),
            &fetch_existing(&remote, 10, &policy(), &gate()).await.unwrap(),
        );
        assert!(plan.is_noop());
    }

    #[tokio::test]
    async fn removed_document_chunks_are_deleted() {
        let chunker = Chunker::new(200, 40);
        let remote = MemoryIndex::new();
        let embedder = FakeEmbedder::new();

        let both = vec![
            doc("keep", "# Keep\n\nStays around."),
            doc("drop", "# Drop\n\nGoes away."),
        ];
        let plan = diff(
            compute_records(&chunker, &both),
            &fetch_existing(&remote, 10, &policy(), &gate()).await.unwrap(),
        );
        apply(&plan, &remote, &embedder, 10, &policy(), &gate())
            .await
            .unwrap();
        assert_eq!(remote.len(), 2);

        let only_keep = vec![doc("keep", "# Keep\n\nStays around.")];
        let plan = diff(
            compute_records(&chunker, &only_keep),
            &fetch_existing(&remote, 10, &policy(), &gate()).await.unwrap(),
        );
        assert_eq!(plan.to_delete.len(), 1);
        let stats = apply(&plan, &remote, &embedder, 10, &policy(), &gate())
            .await
            .unwrap();
        assert_eq!(stats.deleted, 1);
        assert_eq!(remote.len(), 1);
    }

    #[tokio::test]
    async fn pagination_terminates_on_short_page() {
        let remote = MemoryIndex::new();
        let docs: Vec<IndexDocument> = (0..25)
            .map(|i| IndexDocument {
                chunk_id: format!("c{i:02}"),
                doc_path: format!("d{i:02}"),
                content_hash: format!("h{i:02}"),
                title: String::new(),
                section_heading: String::new(),
                description: String::new(),
                content: String::new(),
                content_vector: vec![],
            })
            .collect();
        remote.upload(&docs).await.unwrap();

        let existing = fetch_existing(&remote, 10, &policy(), &gate()).await.unwrap();
        assert_eq!(existing.len(), 25);

        // Page size exactly dividing the total must still terminate: the
        // final empty page is the short page.
        let existing = fetch_existing(&remote, 5, &policy(), &gate()).await.unwrap();
        assert_eq!(existing.len(), 25);
    }

    #[tokio::test]
    async fn upserts_are_batched_with_one_embed_call_each() {
        let remote = MemoryIndex::new();
        let embedder = FakeEmbedder::new();
        let records: Vec<ChunkRecord> =
            (0..5).map(|i| record(&format!("c{i}"), &format!("h{i}"))).collect();
        let plan = diff(records, &HashMap::new());
        assert_eq!(plan.new_count, 5);

        let stats = apply(&plan, &remote, &embedder, 2, &policy(), &gate())
            .await
            .unwrap();
        assert_eq!(stats.upserted, 5);
        assert_eq!(stats.batches_applied, 3);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        assert_eq!(remote.len(), 5);
    }

    #[test]
    fn recreate_treats_existing_as_empty() {
        let records = vec![record("c1", "h1"), record("c2", "h2")];
        // A recreate run never fetches existing state.
        let plan = diff(records, &HashMap::new());
        assert_eq!(plan.new_count, 2);
        assert_eq!(plan.existing_count, 0);
        assert!(plan.to_delete.is_empty());
    }

    #[tokio::test]
    async fn failed_batch_reports_applied_batch_count() {
        struct FailingUpload {
            inner: MemoryIndex,
            fail_after: usize,
            uploads: AtomicUsize,
        }

        #[async_trait]
        impl RemoteIndex for FailingUpload {
            async fn ensure_index(&self, recreate: bool) -> Result<(), RemoteError> {
                self.inner.ensure_index(recreate).await
            }
            async fn list_metadata(
                &self,
                page_size: usize,
                skip: usize,
            ) -> Result<Vec<ChunkMetadata>, RemoteError> {
                self.inner.list_metadata(page_size, skip).await
            }
            async fn upload(&self, docs: &[IndexDocument]) -> Result<(), RemoteError> {
                let n = self.uploads.fetch_add(1, Ordering::SeqCst);
                if n >= self.fail_after {
                    return Err(RemoteError::Status {
                        code: 403,
                        message: "forbidden".to_string(),
                        retry_after: None,
                    });
                }
                self.inner.upload(docs).await
            }
            async fn delete(&self, chunk_ids: &[String]) -> Result<(), RemoteError> {
                self.inner.delete(chunk_ids).await
            }
            async fn search(
                &self,
                query: &str,
                vector: &[f32],
                limit: usize,
            ) -> Result<Vec<crate::remote::RemoteHit>, RemoteError> {
                self.inner.search(query, vector, limit).await
            }
        }

        let remote = FailingUpload {
            inner: MemoryIndex::new(),
            fail_after: 1,
            uploads: AtomicUsize::new(0),
        };
        let embedder = FakeEmbedder::new();
        let records: Vec<ChunkRecord> =
            (0..4).map(|i| record(&format!("c{i}"), &format!("h{i}"))).collect();
        let plan = diff(records, &HashMap::new());

        let err = apply(&plan, &remote, &embedder, 2, &policy(), &gate())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 applied batches"));
        // The first batch stayed applied.
        assert_eq!(remote.inner.len(), 2);
    }
}
