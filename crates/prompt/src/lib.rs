//! Prompt system for CityHub.
//!
//! This crate provides structured prompt management with:
//! - YAML-based prompt definitions, built in and overridable per workspace
//! - Handlebars template rendering

pub mod builder;
pub mod loader;
pub mod types;

// Re-export main types
pub use builder::build_prompt;
pub use loader::{
    list_prompts, load_builtin_prompt, load_prompt, ANSWER_PROMPT, GENERATE_PROMPT,
    GROUNDING_PROMPT, RELEVANCE_PROMPT, ROUTE_PROMPT,
};
pub use types::{BuiltPrompt, OutputFormat, PromptDefinition, PromptOutput};
