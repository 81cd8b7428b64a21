//! Self-correcting question answering for city services.
//!
//! A question is routed to the local knowledge base or to web search, the
//! retrieved evidence is filtered for relevance, and the generated answer is
//! checked for groundedness and adequacy before it is returned. Failed checks
//! loop back to regeneration or escalate to web search, bounded by a step
//! budget.
//!
//! # Example
//! ```no_run
//! use cityhub_agent::build_pipeline;
//! use cityhub_core::AppConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::load()?;
//! let pipeline = build_pipeline(&config)?;
//! let answer = pipeline
//!     .run_pipeline("How do I apply for the slow street program?", 8)
//!     .await?;
//! println!("{}", answer);
//! # Ok(())
//! # }
//! ```

pub mod collaborators;
pub mod error;
pub mod factory;
pub mod llm;
pub mod local;
pub mod machine;
pub mod orchestrator;
pub mod search;
pub mod sources;
pub mod state;
pub mod verdict;

pub use collaborators::{
    AdequacyValidator, AnswerGenerator, GroundednessValidator, LocalIndex, QuestionRouter,
    RelevanceGrader, WebSearchBackend,
};
pub use error::PipelineError;
pub use factory::build_pipeline;
pub use llm::ModelCollaborators;
pub use local::KnowledgeIndex;
pub use machine::{transition, Event, Stage};
pub use orchestrator::{Pipeline, PipelineBuilder, RunReport, DEFAULT_STEP_BUDGET};
pub use search::BraveSearch;
pub use sources::EvidenceSources;
pub use state::{EvidencePassage, PipelineState, Provenance, WebSearchFlag};
pub use verdict::{Adequacy, Grounding, Relevance, Route};

/// Reply given to the asker whenever a run fails.
pub const APOLOGY: &str = "Sorry, I don't know. Please try rephrasing the question.";
