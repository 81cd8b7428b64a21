//! Pipeline state threaded through a single run.

use serde::{Deserialize, Serialize};

/// Which backend produced a passage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    LocalIndex,
    WebSearch,
}

/// A unit of retrieved text used to support an answer.
///
/// Passages have no identity beyond their content and are never deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidencePassage {
    pub content: String,
    pub provenance: Provenance,
}

impl EvidencePassage {
    pub fn local(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            provenance: Provenance::LocalIndex,
        }
    }

    pub fn web(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            provenance: Provenance::WebSearch,
        }
    }
}

/// Outcome of relevance filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebSearchFlag {
    NotDetermined,
    No,
    Yes,
}

/// The mutable record owned by one run.
#[derive(Debug, Clone)]
pub struct PipelineState {
    question: String,
    pub evidence: Vec<EvidencePassage>,
    pub needs_web_search: WebSearchFlag,
    pub answer: Option<String>,
}

impl PipelineState {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            evidence: Vec::new(),
            needs_web_search: WebSearchFlag::NotDetermined,
            answer: None,
        }
    }

    /// The question as asked. Set once, never rewritten.
    pub fn question(&self) -> &str {
        &self.question
    }
}

/// Join passages into a single context block for prompts.
pub fn render_evidence(evidence: &[EvidencePassage]) -> String {
    evidence
        .iter()
        .map(|p| p.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}
