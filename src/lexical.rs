//! In-memory TF-IDF index over whole documents.
//!
//! The zero-dependency fallback search path: no network, no embeddings.
//! Documents are tokenized once at add time; [`LexicalIndex::build`]
//! finalizes IDF statistics after the whole corpus is loaded.
//!
//! IDF uses `ln((N+1)/(df+1)) + 1`, smoothed so terms present in every
//! document still carry a small positive weight and unseen query terms
//! contribute zero.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::markdown::{extract_title, front_matter_description, strip_markup, strip_tags_and_code};

static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9]+(?:[-_][a-z0-9]+)*").unwrap());

/// Lowercase, strip tags and fenced code, then extract identifier-like
/// tokens. Single-character tokens are discarded.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    let cleaned = strip_tags_and_code(&lowered);
    TOKEN
        .find_iter(&cleaned)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.len() > 1)
        .collect()
}

/// A ranked lexical search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub path: String,
    pub title: String,
    pub description: String,
    pub score: f64,
}

struct DocEntry {
    path: String,
    title: String,
    description: String,
    content: String,
    term_counts: HashMap<String, usize>,
    token_count: usize,
}

/// TF-IDF search index over whole documents.
///
/// Usage: [`add_doc`](Self::add_doc) for every document, then
/// [`build`](Self::build) once, then any number of
/// [`search`](Self::search) calls. Single-threaded, no suspension.
#[derive(Default)]
pub struct LexicalIndex {
    docs: Vec<DocEntry>,
    doc_freq: HashMap<String, usize>,
    idf: HashMap<String, f64>,
}

impl LexicalIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Accumulate a document. Title tokens are weighted double by
    /// repetition; the body is markup-stripped before tokenization.
    pub fn add_doc(&mut self, path: &str, content: &str) {
        let title = extract_title(content).unwrap_or_default();
        let description = front_matter_description(content).unwrap_or_default();
        let plain = strip_markup(content);
        let tokens = tokenize(&format!("{} {} {} {}", title, title, description, plain));

        let mut term_counts: HashMap<String, usize> = HashMap::new();
        for token in &tokens {
            *term_counts.entry(token.clone()).or_insert(0) += 1;
        }
        for token in term_counts.keys() {
            *self.doc_freq.entry(token.clone()).or_insert(0) += 1;
        }

        self.docs.push(DocEntry {
            path: path.to_string(),
            title,
            description,
            content: content.to_string(),
            token_count: tokens.len(),
            term_counts,
        });
    }

    /// Compute IDF scores after all documents are added.
    pub fn build(&mut self) {
        let total = self.docs.len() as f64;
        self.idf = self
            .doc_freq
            .iter()
            .map(|(token, df)| {
                let idf = ((total + 1.0) / (*df as f64 + 1.0)).ln() + 1.0;
                (token.clone(), idf)
            })
            .collect();
    }

    /// Ranked search: sum of `tf * idf` per query token. Documents with a
    /// zero score are excluded; ties keep insertion order.
    pub fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() {
            return Vec::new();
        }

        let mut hits: Vec<SearchHit> = self
            .docs
            .iter()
            .filter_map(|doc| {
                let mut score = 0.0;
                for qt in &query_tokens {
                    let count = doc.term_counts.get(qt).copied().unwrap_or(0);
                    let tf = count as f64 / doc.token_count.max(1) as f64;
                    let idf = self.idf.get(qt).copied().unwrap_or(0.0);
                    score += tf * idf;
                }
                if score > 0.0 {
                    Some(SearchHit {
                        path: doc.path.clone(),
                        title: doc.title.clone(),
                        description: doc.description.clone(),
                        score,
                    })
                } else {
                    None
                }
            })
            .collect();

        // Stable sort: equal scores keep insertion order.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }

    /// Full content of a document by exact path, if indexed.
    pub fn content(&self, path: &str) -> Option<&str> {
        self.docs
            .iter()
            .find(|d| d.path == path)
            .map(|d| d.content.as_str())
    }

    /// Exact-then-fuzzy path lookup: an exact match wins; otherwise the
    /// first document whose path ends with `/{target}` (or equals the
    /// trailing segment) is returned.
    pub fn find_path(&self, path: &str) -> Option<&str> {
        let clean = path
            .trim_start_matches('/')
            .trim_end_matches(".mdx")
            .trim_end_matches(".md");
        if let Some(doc) = self.docs.iter().find(|d| d.path == clean) {
            return Some(doc.path.as_str());
        }
        let target = clean.rsplit('/').next().unwrap_or(clean);
        self.docs
            .iter()
            .find(|d| d.path.ends_with(&format!("/{}", target)) || d.path == target)
            .map(|d| d.path.as_str())
    }
}
