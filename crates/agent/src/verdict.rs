//! Strict verdicts returned at every model boundary.
//!
//! Model replies are parsed into these enums; a reply that cannot be parsed
//! is an error, never a silent negative.

use serde::{Deserialize, Serialize};

/// Which evidence source a question is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    LocalIndex,
    WebSearch,
}

impl Route {
    /// Map a router label to a route (case-insensitive).
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "vectorstore" | "local" => Some(Self::LocalIndex),
            "websearch" | "web" => Some(Self::WebSearch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relevance {
    Relevant,
    NotRelevant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grounding {
    Grounded,
    NotGrounded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Adequacy {
    Adequate,
    Inadequate,
}

impl From<bool> for Relevance {
    fn from(yes: bool) -> Self {
        if yes {
            Self::Relevant
        } else {
            Self::NotRelevant
        }
    }
}

impl From<bool> for Grounding {
    fn from(yes: bool) -> Self {
        if yes {
            Self::Grounded
        } else {
            Self::NotGrounded
        }
    }
}

impl From<bool> for Adequacy {
    fn from(yes: bool) -> Self {
        if yes {
            Self::Adequate
        } else {
            Self::Inadequate
        }
    }
}

/// Parse a grader reply: `{"binary_score": "yes"|"no"}`, optionally inside a
/// Markdown code fence, or a bare `yes`/`no`.
pub fn parse_binary_score(reply: &str) -> Option<bool> {
    let label = extract_label(reply, "binary_score")?;
    match label.to_ascii_lowercase().as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}

/// Parse a router reply: `{"datasource": "vectorstore"|"websearch"}` or a
/// bare label.
pub fn parse_route(reply: &str) -> Option<Route> {
    Route::from_label(&extract_label(reply, "datasource")?)
}

fn extract_label(reply: &str, field: &str) -> Option<String> {
    let body = strip_code_fence(reply.trim());

    if body.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        return value
            .get(field)
            .and_then(|v| v.as_str())
            .map(|s| s.trim().to_string());
    }

    let bare = body.trim_matches(|c: char| c == '"' || c == '\'' || c == '.' || c.is_whitespace());
    if bare.is_empty() || bare.contains(char::is_whitespace) {
        return None;
    }
    Some(bare.to_string())
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string (e.g. "json") on the opening line.
    let rest = rest.split_once('\n').map(|(_, body)| body).unwrap_or("");
    rest.trim_end().trim_end_matches("```").trim()
}
