//! Heading-aware markdown chunker.
//!
//! Splits a document into sections at heading levels 1–2, prefixes each
//! section with `"{title} > {heading}"` for retrieval context, and packs
//! sentences greedily into chunks bounded by `max_chars`. When a section
//! splits, the next chunk is seeded with the trailing `overlap_chars`
//! characters of the previous one so retrieval stays coherent across the
//! boundary.
//!
//! Chunk ids are a URL-safe, padding-stripped base64 encoding of
//! `"{doc_path}#{heading_slug}#{section_index}-{split_index}"`, so the same
//! document always yields byte-identical ids.

use std::sync::LazyLock;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use regex::Regex;

use crate::markdown::{front_matter_description, extract_title, slugify, strip_front_matter};
use crate::models::Chunk;

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^##?\s+").unwrap());
static SENTENCE_BOUNDARY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// Chunker configuration: size ceiling and overlap carryover, in characters.
///
/// `overlap_chars` should be well below `max_chars`; otherwise overlap
/// seeding degenerates to duplicating most of the prior chunk.
#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
    overlap_chars: usize,
}

impl Default for Chunker {
    fn default() -> Self {
        Self::new(4000, 400)
    }
}

impl Chunker {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chars,
            overlap_chars,
        }
    }

    /// Chunk a document. Deterministic and side-effect-free; malformed or
    /// empty input yields zero or minimal chunks, never an error.
    pub fn chunk(&self, doc_path: &str, raw_text: &str) -> Vec<Chunk> {
        let title = extract_title(raw_text)
            .unwrap_or_else(|| doc_path.rsplit('/').next().unwrap_or(doc_path).to_string());
        let description = front_matter_description(raw_text).unwrap_or_default();
        let body = strip_front_matter(raw_text);

        let mut chunks = Vec::new();
        for (section_index, (heading, section_text)) in split_by_headings(&body).iter().enumerate()
        {
            let prefixed = format!("{} > {}\n\n{}", title, heading, section_text)
                .trim()
                .to_string();
            let pieces = split_with_overlap(&prefixed, self.max_chars, self.overlap_chars);
            let heading_slug = slugify(heading);

            for (split_index, content) in pieces.into_iter().enumerate() {
                let raw_id = format!(
                    "{}#{}#{}-{}",
                    doc_path, heading_slug, section_index, split_index
                );
                let char_count = content.chars().count();
                chunks.push(Chunk {
                    chunk_id: encode_chunk_id(&raw_id),
                    doc_path: doc_path.to_string(),
                    title: title.clone(),
                    description: description.clone(),
                    section_heading: heading.clone(),
                    content,
                    char_count,
                });
            }
        }

        chunks
    }
}

/// URL-safe, padding-stripped base64 over the raw id's UTF-8 bytes.
fn encode_chunk_id(raw: &str) -> String {
    URL_SAFE_NO_PAD.encode(raw.as_bytes())
}

/// Split the body at level 1–2 headings. Text before the first heading
/// becomes an implicit "Introduction" section; each heading line is kept
/// inside its section's content. Empty sections are dropped.
fn split_by_headings(body: &str) -> Vec<(String, String)> {
    let mut sections: Vec<(String, Vec<&str>)> = Vec::new();
    let mut current_heading = "Introduction".to_string();
    let mut current_lines: Vec<&str> = Vec::new();

    for line in body.lines() {
        if HEADING.is_match(line) {
            if !current_lines.is_empty() {
                sections.push((current_heading.clone(), std::mem::take(&mut current_lines)));
            }
            let text = HEADING.replace(line, "").trim().to_string();
            current_heading = if text.is_empty() {
                "Introduction".to_string()
            } else {
                text
            };
            current_lines.push(line);
        } else {
            current_lines.push(line);
        }
    }
    if !current_lines.is_empty() {
        sections.push((current_heading, current_lines));
    }

    sections
        .into_iter()
        .filter_map(|(heading, lines)| {
            let text = lines.join("\n").trim().to_string();
            if text.is_empty() {
                None
            } else {
                Some((heading, text))
            }
        })
        .collect()
}

/// Greedily pack sentences into chunks of at most `max_chars` characters,
/// seeding each continuation chunk with the trailing `overlap` characters
/// of the one it follows. A single sentence longer than `max_chars` is
/// hard-split into fixed-size slices.
fn split_with_overlap(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();

    for sentence in split_sentences(text) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }

        let candidate = if current.is_empty() {
            sentence.to_string()
        } else {
            format!("{} {}", current, sentence)
        };
        if candidate.chars().count() <= max_chars {
            current = candidate;
            continue;
        }

        if !current.is_empty() {
            let tail = if overlap > 0 {
                tail_chars(&current, overlap).to_string()
            } else {
                String::new()
            };
            chunks.push(std::mem::take(&mut current));
            current = format!("{} {}", tail, sentence).trim().to_string();
        } else {
            // No natural break: emit fixed-size slices, keep the last open.
            let mut slices = hard_split(sentence, max_chars);
            current = slices.pop().unwrap_or_default();
            chunks.extend(slices);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split after `.`/`!`/`?` followed by whitespace, keeping the punctuation
/// and discarding the separating whitespace.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut last = 0;
    for m in SENTENCE_BOUNDARY.find_iter(text) {
        // The punctuation char is a single byte; keep it with the sentence.
        let end = m.start() + 1;
        parts.push(&text[last..end]);
        last = m.end();
    }
    parts.push(&text[last..]);
    parts
}

/// The final `n` characters of `s` (whole string if shorter).
fn tail_chars(s: &str, n: usize) -> &str {
    let count = s.chars().count();
    if count <= n {
        return s;
    }
    let start = s
        .char_indices()
        .nth(count - n)
        .map(|(i, _)| i)
        .unwrap_or(0);
    &s[start..]
}

/// Fixed-size slices of `max_chars` characters each.
fn hard_split(s: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    chars
        .chunks(max_chars.max(1))
        .map(|c| c.iter().collect())
        .collect()
}
