//! Prompt definitions and rendered prompts.

use serde::{Deserialize, Serialize};

/// A prompt file (`prompts/<id>.yml`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptDefinition {
    /// Must match the file name
    pub id: String,

    pub title: String,

    pub api_version: String,

    #[serde(default)]
    pub created_by: String,

    /// Handlebars template for the system message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Handlebars template for the user message
    pub template: String,

    pub output: PromptOutput,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptOutput {
    pub format: OutputFormat,
}

/// How the model is expected to reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[serde(alias = "TEXT", alias = "Text")]
    Text,
    /// One JSON object, used by the yes/no graders
    #[serde(alias = "JSON", alias = "Json")]
    Json,
}

impl PromptDefinition {
    pub fn wants_json(&self) -> bool {
        self.output.format == OutputFormat::Json
    }
}

/// A prompt with every variable substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltPrompt {
    pub prompt_id: String,
    pub system: Option<String>,
    pub user: String,
    pub json_output: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_definition_deserialization() {
        let yaml = r#"
id: test.prompt
title: Test Prompt
apiVersion: "1.0"
createdBy: test
system: "You are a grader"
template: "{{question}}"
output:
  format: JSON
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(def.id, "test.prompt");
        assert_eq!(def.api_version, "1.0");
        assert_eq!(def.system.as_deref(), Some("You are a grader"));
        assert!(def.wants_json());
    }

    #[test]
    fn test_system_and_author_are_optional() {
        let yaml = r#"
id: test.prompt
title: Test Prompt
apiVersion: "1.0"
template: "{{question}}"
output:
  format: text
"#;

        let def: PromptDefinition = serde_yaml::from_str(yaml).unwrap();
        assert!(def.system.is_none());
        assert!(def.created_by.is_empty());
        assert!(!def.wants_json());
    }

    #[test]
    fn test_unknown_output_format_is_rejected() {
        let yaml = r#"
id: test.prompt
title: Test Prompt
apiVersion: "1.0"
template: "{{question}}"
output:
  format: xml
"#;

        assert!(serde_yaml::from_str::<PromptDefinition>(yaml).is_err());
    }
}
