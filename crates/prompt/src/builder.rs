//! Prompt builder for rendering templates.

use crate::types::{BuiltPrompt, PromptDefinition};
use cityhub_core::{AppError, AppResult};
use handlebars::Handlebars;
use std::collections::HashMap;

/// Build a prompt from a definition and input variables.
///
/// Both the system and the user template are rendered with Handlebars in
/// strict mode, so a variable the template references but the caller did
/// not supply is an error rather than an empty string.
///
/// # Example
/// ```no_run
/// use cityhub_prompt::{build_prompt, load_builtin_prompt};
/// use std::collections::HashMap;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let def = load_builtin_prompt("cityhub.route")?;
/// let mut vars = HashMap::new();
/// vars.insert("question".to_string(), "How do I get a parking permit?".to_string());
///
/// let built = build_prompt(&def, vars)?;
/// println!("User prompt: {}", built.user);
/// # Ok(())
/// # }
/// ```
pub fn build_prompt(
    definition: &PromptDefinition,
    variables: HashMap<String, String>,
) -> AppResult<BuiltPrompt> {
    tracing::debug!("Building prompt: {}", definition.id);

    let handlebars = registry(definition)?;

    let system = match definition.system {
        Some(_) => Some(render(&handlebars, "system", &variables)?),
        None => None,
    };
    let user = render(&handlebars, "user", &variables)?;

    Ok(BuiltPrompt {
        prompt_id: definition.id.clone(),
        system,
        user,
        json_output: definition.wants_json(),
    })
}

fn registry(definition: &PromptDefinition) -> AppResult<Handlebars<'static>> {
    let mut handlebars = Handlebars::new();

    // Prompts are plain text, not HTML
    handlebars.register_escape_fn(handlebars::no_escape);
    handlebars.set_strict_mode(true);

    if let Some(ref system) = definition.system {
        handlebars
            .register_template_string("system", system)
            .map_err(|e| {
                AppError::Prompt(format!(
                    "Failed to register system template for {}: {}",
                    definition.id, e
                ))
            })?;
    }

    handlebars
        .register_template_string("user", &definition.template)
        .map_err(|e| {
            AppError::Prompt(format!(
                "Failed to register template for {}: {}",
                definition.id, e
            ))
        })?;

    Ok(handlebars)
}

fn render(
    handlebars: &Handlebars<'_>,
    name: &str,
    variables: &HashMap<String, String>,
) -> AppResult<String> {
    handlebars
        .render(name, variables)
        .map_err(|e| AppError::Prompt(format!("Failed to render template: {}", e)))
}
