//! Search and document-retrieval command flows.
//!
//! The lexical path is the zero-dependency fallback: the corpus is loaded
//! and indexed in memory, with no network involved. With `--remote`, the
//! query is embedded and run as a hybrid keyword + vector search against
//! the configured remote index.

use anyhow::{anyhow, bail, Result};

use crate::config::Config;
use crate::corpus;
use crate::embedding::create_embedder;
use crate::lexical::LexicalIndex;
use crate::remote::http::HttpSearchIndex;
use crate::remote::RemoteIndex;
use crate::retry::{execute, ThrottleGate};
use crate::sync::DEFAULT_DIMS;

/// Build the lexical index over the whole corpus.
pub fn build_lexical_index(config: &Config) -> Result<LexicalIndex> {
    let documents = corpus::load_corpus(&config.corpus)?;
    let mut index = LexicalIndex::new();
    for doc in &documents {
        index.add_doc(&doc.path, &doc.body);
    }
    index.build();
    Ok(index)
}

pub async fn run_search(
    config: &Config,
    query: &str,
    limit: Option<usize>,
    remote: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    let limit = limit.unwrap_or(config.lexical.limit);

    if remote {
        return run_remote_search(config, query, limit).await;
    }

    let index = build_lexical_index(config)?;
    let hits = index.search(query, limit);

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, hit.score, hit.path);
        if !hit.title.is_empty() {
            println!("    title: {}", hit.title);
        }
        if !hit.description.is_empty() {
            println!("    description: {}", hit.description);
        }
    }

    Ok(())
}

async fn run_remote_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    let remote_config = config
        .remote
        .as_ref()
        .ok_or_else(|| anyhow!("[remote] is not configured; remote search is unavailable"))?;

    let dims = config.embedding.dims.unwrap_or(DEFAULT_DIMS);
    let index = HttpSearchIndex::new(remote_config, dims)?;
    let embedder = create_embedder(&config.embedding)?;
    let policy = config.retry.policy();
    let throttle = ThrottleGate::new(
        config.throttle.enabled,
        std::time::Duration::from_secs_f64(config.throttle.max_pause_s),
    );

    let vector = execute("embed query", &policy, Some(&throttle), || {
        embedder.embed_query(query)
    })
    .await?;

    let hits = execute("remote search", &policy, Some(&throttle), || {
        index.search(query, &vector, limit)
    })
    .await?;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, hit.score, hit.doc_path);
        if !hit.title.is_empty() {
            println!("    title: {}", hit.title);
        }
        if !hit.section_heading.is_empty() {
            println!("    section: {}", hit.section_heading);
        }
        if !hit.excerpt.is_empty() {
            println!("    excerpt: \"{}\"", hit.excerpt.replace('\n', " "));
        }
    }

    Ok(())
}

/// Print a document's full content by exact or fuzzy path.
pub fn run_get(config: &Config, path: &str) -> Result<()> {
    let index = build_lexical_index(config)?;

    let resolved = index
        .find_path(path)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Document not found: {}", path))?;

    match index.content(&resolved) {
        Some(content) => {
            println!("{}", content);
            Ok(())
        }
        None => bail!("Document not found: {}", path),
    }
}
