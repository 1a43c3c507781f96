//! Corpus loading: walk a documentation tree and produce [`Document`]s.
//!
//! Paths are corpus-relative with the file extension stripped, so
//! `guides/setup.mdx` is addressed as `guides/setup` everywhere downstream.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::markdown::{extract_title, front_matter_description, has_front_matter};
use crate::models::Document;

pub fn load_corpus(config: &CorpusConfig) -> Result<Vec<Document>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec![
        "**/.git/**".to_string(),
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
    ];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut documents = Vec::new();

    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        // Read lossily: replacement characters beat dropping the document.
        let raw = std::fs::read(path)?;
        let body = String::from_utf8_lossy(&raw).into_owned();

        let doc_path = strip_extension(&rel_str);
        let title = match extract_title(&body) {
            Some(title) => title,
            None => {
                if has_front_matter(&body) {
                    tracing::warn!(
                        path = %doc_path,
                        "front matter present but no parsable title; using path segment"
                    );
                }
                doc_path
                    .rsplit('/')
                    .next()
                    .unwrap_or(&doc_path)
                    .to_string()
            }
        };
        let description = front_matter_description(&body).unwrap_or_default();

        documents.push(Document {
            path: doc_path,
            title,
            description,
            body,
        });
    }

    // Sort for deterministic ordering across runs.
    documents.sort_by(|a, b| a.path.cmp(&b.path));

    Ok(documents)
}

/// Drop the final extension from a relative path: `a/b.mdx` → `a/b`.
fn strip_extension(rel_path: &str) -> String {
    match rel_path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => stem.to_string(),
        _ => rel_path.to_string(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
