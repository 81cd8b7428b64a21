//! Contracts for everything the pipeline delegates.
//!
//! The orchestrator only sees these traits, so production adapters (LLM,
//! knowledge base, web search) and scripted test doubles are interchangeable.
//! Implementations must be safe to share between concurrent runs.

use crate::state::EvidencePassage;
use crate::verdict::{Adequacy, Grounding, Relevance, Route};
use async_trait::async_trait;
use cityhub_core::AppResult;

/// Picks the evidence source for a question.
#[async_trait]
pub trait QuestionRouter: Send + Sync {
    async fn route(&self, question: &str) -> AppResult<Route>;
}

/// Judges whether one passage is relevant to the question.
#[async_trait]
pub trait RelevanceGrader: Send + Sync {
    async fn grade(&self, question: &str, passage: &EvidencePassage) -> AppResult<Relevance>;
}

/// Writes an answer from the question and the evidence.
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate(&self, question: &str, evidence: &[EvidencePassage]) -> AppResult<String>;
}

/// Judges whether an answer is supported by the evidence.
#[async_trait]
pub trait GroundednessValidator: Send + Sync {
    async fn is_grounded(&self, evidence: &[EvidencePassage], answer: &str)
        -> AppResult<Grounding>;
}

/// Judges whether an answer resolves the question.
#[async_trait]
pub trait AdequacyValidator: Send + Sync {
    async fn is_adequate(&self, question: &str, answer: &str) -> AppResult<Adequacy>;
}

/// Semantic lookup in the local index: up to `k` passage texts, most similar first.
#[async_trait]
pub trait LocalIndex: Send + Sync {
    async fn lookup(&self, query: &str, k: usize) -> AppResult<Vec<String>>;
}

/// Web search: up to `count` result snippets.
#[async_trait]
pub trait WebSearchBackend: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> AppResult<Vec<String>>;
}
