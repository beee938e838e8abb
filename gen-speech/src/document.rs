// Document loading and plain-text extraction

use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::Path;

/// Wrap width handed to html2text; wide enough that paragraphs stay on one line
const HTML_WRAP_WIDTH: usize = 1000;

/// Text extracted from an input file
#[derive(Debug, Clone)]
pub struct Document {
    /// Title from metadata, a heading, or the file name
    pub title: String,
    /// Plain text with paragraphs separated by blank lines
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentKind {
    Text,
    Html,
    Epub,
}

impl DocumentKind {
    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "txt" | "text" | "md" | "markdown" => Ok(Self::Text),
            "html" | "htm" | "xhtml" => Ok(Self::Html),
            "epub" => Ok(Self::Epub),
            "" => anyhow::bail!("Cannot tell the format of {} (no extension)", path.display()),
            other => anyhow::bail!("Unsupported document type: .{}", other),
        }
    }
}

/// Load a document and extract its text.
pub fn load_document(path: &Path) -> Result<Document> {
    let kind = DocumentKind::from_path(path)?;
    debug!("Loading {} as {:?}", path.display(), kind);

    match kind {
        DocumentKind::Text => {
            let bytes = fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Ok(Document {
                title: file_title(path),
                text: String::from_utf8_lossy(&bytes).into_owned(),
            })
        }
        DocumentKind::Html => {
            let bytes = fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let html = String::from_utf8_lossy(&bytes);
            Ok(Document {
                title: extract_title_from_html(&html).unwrap_or_else(|| file_title(path)),
                text: html_to_text(&html)?,
            })
        }
        DocumentKind::Epub => parse_epub(path),
    }
}

/// Extract an EPUB's text in spine order
fn parse_epub(path: &Path) -> Result<Document> {
    let mut doc =
        epub::doc::EpubDoc::new(path).map_err(|e| anyhow::anyhow!("Failed to open EPUB: {}", e))?;

    let title = doc
        .mdata("title")
        .map(|m| m.value.clone())
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| file_title(path));

    let mut sections = Vec::new();
    let spine = doc.spine.clone();

    for spine_item in spine.iter() {
        let Some((content_bytes, _mime)) = doc.get_resource(&spine_item.idref) else {
            debug!("Spine item {} has no resource", spine_item.idref);
            continue;
        };

        let html = String::from_utf8_lossy(&content_bytes);
        let plain_text = html_to_text(&html)?;

        // Cover pages and empty separators
        if plain_text.trim().is_empty() {
            continue;
        }

        sections.push(plain_text);
    }

    debug!("Extracted {} sections from {}", sections.len(), title);

    Ok(Document {
        title,
        text: sections.join("\n\n"),
    })
}

fn file_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string())
}

/// First non-empty `<title>`, `<h1>` or `<h2>` in the markup
fn extract_title_from_html(html: &str) -> Option<String> {
    let html_lower = html.to_lowercase();

    ["title", "h1", "h2"].iter().find_map(|tag| {
        let start = html_lower.find(&format!("<{}", tag))?;
        let content_start = start + html_lower[start..].find('>')? + 1;
        let end = html_lower[content_start..].find(&format!("</{}>", tag))?;

        let title = strip_html_tags(&html[content_start..content_start + end]);
        let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
        (!title.is_empty()).then_some(title)
    })
}

/// Strip HTML tags from a string
fn strip_html_tags(html: &str) -> String {
    let mut result = String::new();
    let mut in_tag = false;

    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }

    result
}

/// Convert HTML to text, one line per paragraph
fn html_to_text(html: &str) -> Result<String> {
    let text = html2text::config::plain()
        .string_from_read(html.as_bytes(), HTML_WRAP_WIDTH)
        .map_err(|e| anyhow::anyhow!("Failed to convert HTML: {}", e))?;

    Ok(join_wrapped_lines(&text))
}

/// Re-join wrapped lines, keeping blank lines as paragraph breaks
fn join_wrapped_lines(text: &str) -> String {
    let mut result = String::new();
    let mut prev_was_newline = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.is_empty() {
            if !prev_was_newline && !result.is_empty() {
                result.push_str("\n\n");
                prev_was_newline = true;
            }
            continue;
        }

        prev_was_newline = false;

        if !result.is_empty() && !result.ends_with('\n') {
            result.push(' ');
        }

        result.push_str(trimmed);
    }

    result.trim_end().to_string()
}
