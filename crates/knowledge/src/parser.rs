//! Source parsing and text extraction.

use cityhub_core::{AppError, AppResult};
use scraper::{Html, Node};
use std::fs;
use std::path::Path;

/// Content type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Markdown,
    Html,
    PlainText,
    Unknown,
}

impl ContentType {
    /// Detect content type from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("md") | Some("markdown") => Self::Markdown,
            Some("html") | Some("htm") => Self::Html,
            Some("txt") | Some("text") => Self::PlainText,
            _ => Self::Unknown,
        }
    }

    /// Detect content type from an HTTP `Content-Type` header value.
    pub fn from_mime(mime: &str) -> Self {
        let mime = mime.to_ascii_lowercase();
        if mime.contains("html") {
            Self::Html
        } else if mime.contains("markdown") {
            Self::Markdown
        } else if mime.starts_with("text/") {
            Self::PlainText
        } else {
            Self::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::PlainText => "text",
            Self::Unknown => "unknown",
        }
    }
}

/// Parse a source file and extract clean text.
pub fn parse_file(path: &Path) -> AppResult<String> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Knowledge(format!("Failed to read {:?}: {}", path, e)))?;

    parse_content(ContentType::from_path(path), &raw)
        .map_err(|e| AppError::Knowledge(format!("{:?}: {}", path, e)))
}

/// Extract clean text from already-loaded content.
pub fn parse_content(content_type: ContentType, raw: &str) -> AppResult<String> {
    let cleaned = match content_type {
        ContentType::Markdown => clean_markdown(raw),
        ContentType::Html => html_to_text(raw),
        ContentType::PlainText => raw.trim().to_string(),
        ContentType::Unknown => {
            if !is_likely_text(raw) {
                return Err(AppError::Knowledge("Binary content not supported".to_string()));
            }
            if looks_like_html(raw) {
                html_to_text(raw)
            } else {
                raw.trim().to_string()
            }
        }
    };

    Ok(cleaned)
}

/// Strip markdown headers, rules and code fences.
fn clean_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for line in text.lines() {
        let trimmed = line.trim_start_matches('#').trim();

        if trimmed.starts_with("---") || trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            continue;
        }

        if !trimmed.is_empty() {
            result.push_str(trimmed);
            result.push('\n');
        }
    }

    result.trim().to_string()
}

/// Extract the visible text of an HTML document, one block per line.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut lines: Vec<String> = Vec::new();

    for node in document.tree.nodes() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            matches!(
                ancestor.value(),
                Node::Element(el) if matches!(el.name(), "script" | "style" | "noscript" | "head" | "template")
            )
        });
        if hidden {
            continue;
        }

        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            lines.push(collapsed);
        }
    }

    lines.join("\n")
}

fn looks_like_html(text: &str) -> bool {
    let head = text.trim_start().get(..256).unwrap_or(text).to_ascii_lowercase();
    head.starts_with("<!doctype html") || head.contains("<html")
}

fn is_likely_text(data: &str) -> bool {
    !data.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_detection() {
        assert_eq!(
            ContentType::from_path(Path::new("permits.md")),
            ContentType::Markdown
        );
        assert_eq!(
            ContentType::from_path(Path::new("page.htm")),
            ContentType::Html
        );
        assert_eq!(
            ContentType::from_path(Path::new("notes.txt")),
            ContentType::PlainText
        );
        assert_eq!(
            ContentType::from_mime("text/html; charset=utf-8"),
            ContentType::Html
        );
        assert_eq!(ContentType::from_mime("text/plain"), ContentType::PlainText);
    }

    #[test]
    fn test_clean_markdown() {
        let input = "# Parking\n\nPermits cost $150.\n\n```\nignored fence\n```\n\nRenew yearly";
        let output = clean_markdown(input);
        assert!(output.starts_with("Parking"));
        assert!(output.contains("Permits cost $150."));
        assert!(output.contains("Renew yearly"));
        assert!(!output.contains("```"));
    }

    #[test]
    fn test_html_to_text_skips_scripts_and_head() {
        let input = r#"<html><head><title>SF311</title><style>p { color: red }</style></head>
            <body><h1>Street  cleaning</h1><script>track()</script>
            <p>Move your car by <b>8am</b>.</p></body></html>"#;
        let output = html_to_text(input);

        assert!(output.contains("Street cleaning"));
        assert!(output.contains("Move your car by"));
        assert!(output.contains("8am"));
        assert!(!output.contains("track()"));
        assert!(!output.contains("color: red"));
        assert!(!output.contains("SF311"));
    }

    #[test]
    fn test_unknown_content_sniffs_html() {
        let output =
            parse_content(ContentType::Unknown, "<!DOCTYPE html><p>Library hours</p>").unwrap();
        assert_eq!(output, "Library hours");
    }

    #[test]
    fn test_binary_content_rejected() {
        assert!(parse_content(ContentType::Unknown, "abc\0def").is_err());
    }
}
