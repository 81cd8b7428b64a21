//! Prompt loader for YAML prompt definitions.
//!
//! Every prompt the pipeline needs ships inside the binary. A workspace can
//! replace any of them by dropping `<id>.yml` into `.cityhub/prompts/`.

use crate::types::PromptDefinition;
use cityhub_core::{AppError, AppResult};
use std::path::{Path, PathBuf};

pub const ROUTE_PROMPT: &str = "cityhub.route";
pub const RELEVANCE_PROMPT: &str = "cityhub.grade.relevance";
pub const GENERATE_PROMPT: &str = "cityhub.generate";
pub const GROUNDING_PROMPT: &str = "cityhub.grade.grounding";
pub const ANSWER_PROMPT: &str = "cityhub.grade.answer";

const BUILTIN_PROMPTS: [(&str, &str); 5] = [
    (ROUTE_PROMPT, include_str!("../prompts/cityhub.route.yml")),
    (
        RELEVANCE_PROMPT,
        include_str!("../prompts/cityhub.grade.relevance.yml"),
    ),
    (GENERATE_PROMPT, include_str!("../prompts/cityhub.generate.yml")),
    (
        GROUNDING_PROMPT,
        include_str!("../prompts/cityhub.grade.grounding.yml"),
    ),
    (ANSWER_PROMPT, include_str!("../prompts/cityhub.grade.answer.yml")),
];

/// Load a prompt definition by ID.
///
/// Looks for `<id>.yml` in the workspace's `.cityhub/prompts/` directory
/// first and falls back to the built-in definition.
///
/// # Arguments
/// * `workspace_path` - Root workspace directory containing `.cityhub/`
/// * `prompt_id` - Prompt identifier (e.g., "cityhub.route")
///
/// # Example
/// ```no_run
/// use cityhub_prompt::load_prompt;
/// use std::path::Path;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let prompt = load_prompt(Path::new("."), "cityhub.route")?;
/// println!("Loaded prompt: {}", prompt.title);
/// # Ok(())
/// # }
/// ```
pub fn load_prompt(workspace_path: &Path, prompt_id: &str) -> AppResult<PromptDefinition> {
    let prompt_file = prompts_dir(workspace_path).join(format!("{}.yml", prompt_id));

    let definition = if prompt_file.exists() {
        tracing::debug!("Loading prompt override from: {:?}", prompt_file);

        let contents = std::fs::read_to_string(&prompt_file).map_err(|e| {
            AppError::Prompt(format!(
                "Failed to read prompt file {:?}: {}",
                prompt_file, e
            ))
        })?;

        parse_prompt(&contents, &prompt_file.display().to_string())?
    } else {
        load_builtin_prompt(prompt_id)?
    };

    if definition.id != prompt_id {
        return Err(AppError::Prompt(format!(
            "Prompt file for '{}' declares id '{}'",
            prompt_id, definition.id
        )));
    }

    tracing::debug!("Loaded prompt: {} ({})", definition.id, definition.title);

    Ok(definition)
}

/// Load one of the prompts compiled into the binary.
pub fn load_builtin_prompt(prompt_id: &str) -> AppResult<PromptDefinition> {
    let (_, contents) = BUILTIN_PROMPTS
        .iter()
        .find(|(id, _)| *id == prompt_id)
        .ok_or_else(|| AppError::Prompt(format!("Unknown prompt: {}", prompt_id)))?;

    parse_prompt(contents, prompt_id)
}

/// List all available prompt IDs: built-ins plus workspace overrides.
pub fn list_prompts(workspace_path: &Path) -> AppResult<Vec<String>> {
    let mut prompt_ids: Vec<String> = BUILTIN_PROMPTS
        .iter()
        .map(|(id, _)| id.to_string())
        .collect();

    let dir = prompts_dir(workspace_path);
    if dir.exists() {
        for entry in walkdir::WalkDir::new(&dir)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("yml") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    if !prompt_ids.iter().any(|id| id == stem) {
                        prompt_ids.push(stem.to_string());
                    }
                }
            }
        }
    }

    Ok(prompt_ids)
}

fn prompts_dir(workspace_path: &Path) -> PathBuf {
    workspace_path.join(".cityhub").join("prompts")
}

fn parse_prompt(contents: &str, origin: &str) -> AppResult<PromptDefinition> {
    let definition: PromptDefinition = serde_yaml::from_str(contents).map_err(|e| {
        AppError::Prompt(format!("Failed to parse prompt YAML {}: {}", origin, e))
    })?;

    validate_prompt(&definition)?;
    Ok(definition)
}

/// Validate a prompt definition.
fn validate_prompt(def: &PromptDefinition) -> AppResult<()> {
    if def.id.is_empty() {
        return Err(AppError::Prompt("Prompt ID cannot be empty".to_string()));
    }

    if def.title.is_empty() {
        return Err(AppError::Prompt("Prompt title cannot be empty".to_string()));
    }

    if def.template.is_empty() {
        return Err(AppError::Prompt(
            "Prompt template cannot be empty".to_string(),
        ));
    }

    if !def.api_version.contains('.') {
        return Err(AppError::Prompt(format!(
            "Invalid apiVersion format: {}. Expected format: 'x.y'",
            def.api_version
        )));
    }

    Ok(())
}
