//! Markdown/MDX text helpers shared by the corpus loader, chunker, and
//! lexical index: front matter handling, title/description extraction,
//! markup stripping, and heading slugs.

use std::sync::LazyLock;

use regex::Regex;

static FRONT_MATTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^---\n.*?---\n").unwrap());
static FM_TITLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)^---\n.*?title:\s*"?([^"\n]+)"?\n.*?---"#).unwrap());
static FM_DESCRIPTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)^---\n.*?description:\s*"?([^"\n]+)"?\n.*?---"#).unwrap());
static FIRST_H1: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").unwrap());
static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").unwrap());
static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```.*?```").unwrap());
static LINKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\([^)]*\)").unwrap());
static MD_PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[#*_`~]").unwrap());
static NON_SLUG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9\s-]").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Whether the document opens with a `---` front matter block.
pub fn has_front_matter(content: &str) -> bool {
    FRONT_MATTER.is_match(content)
}

/// Remove a leading front matter block, if present.
pub fn strip_front_matter(content: &str) -> String {
    FRONT_MATTER.replace(content, "").into_owned()
}

/// Title from the front matter `title:` field only.
pub fn front_matter_title(content: &str) -> Option<String> {
    FM_TITLE
        .captures(content)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Description from the front matter `description:` field only.
pub fn front_matter_description(content: &str) -> Option<String> {
    FM_DESCRIPTION
        .captures(content)
        .map(|c| c[1].trim().to_string())
        .filter(|d| !d.is_empty())
}

/// First top-level `# heading` in the document.
pub fn first_heading_title(content: &str) -> Option<String> {
    FIRST_H1
        .captures(content)
        .map(|c| c[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Title extraction: front matter first, then the first `#` heading.
pub fn extract_title(content: &str) -> Option<String> {
    front_matter_title(content).or_else(|| first_heading_title(content))
}

/// Strip front matter, tags, fenced code, links, and markdown punctuation,
/// leaving plain text suitable for tokenization.
pub fn strip_markup(content: &str) -> String {
    let text = strip_front_matter(content);
    let text = TAGS.replace_all(&text, " ");
    let text = CODE_FENCE.replace_all(&text, " ");
    let text = LINKS.replace_all(&text, "$1");
    MD_PUNCT.replace_all(&text, "").into_owned()
}

/// Strip tags and fenced code blocks only (used by the tokenizer, which
/// keeps `-`/`_` joined identifiers intact).
pub fn strip_tags_and_code(content: &str) -> String {
    let text = TAGS.replace_all(content, " ");
    CODE_FENCE.replace_all(&text, " ").into_owned()
}

/// Heading slug: lowercased, non-alphanumerics stripped, whitespace
/// collapsed to hyphens. Falls back to `"section"` for empty headings.
pub fn slugify(value: &str) -> String {
    let lowered = value.to_lowercase();
    let cleaned = NON_SLUG.replace_all(lowered.trim(), "");
    let slug = WHITESPACE
        .replace_all(&cleaned, "-")
        .trim_matches('-')
        .to_string();
    if slug.is_empty() {
        "section".to_string()
    } else {
        slug
    }
}
