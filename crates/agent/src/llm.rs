//! LLM-backed router, grader, generator and validators.
//!
//! Each collaborator renders its prompt definition, calls the configured
//! client and parses the reply into a strict verdict.

use crate::collaborators::{
    AdequacyValidator, AnswerGenerator, GroundednessValidator, QuestionRouter, RelevanceGrader,
};
use crate::state::{render_evidence, EvidencePassage};
use crate::verdict::{parse_binary_score, parse_route, Adequacy, Grounding, Relevance, Route};
use async_trait::async_trait;
use cityhub_core::{AppError, AppResult};
use cityhub_llm::{LlmClient, LlmRequest};
use cityhub_prompt::{
    build_prompt, load_prompt, PromptDefinition, ANSWER_PROMPT, GENERATE_PROMPT,
    GROUNDING_PROMPT, RELEVANCE_PROMPT, ROUTE_PROMPT,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const PROMPT_IDS: [&str; 5] = [
    ROUTE_PROMPT,
    RELEVANCE_PROMPT,
    GENERATE_PROMPT,
    GROUNDING_PROMPT,
    ANSWER_PROMPT,
];

/// One model client serving every model-backed pipeline role.
#[derive(Clone)]
pub struct ModelCollaborators {
    client: Arc<dyn LlmClient>,
    model: String,
    prompts: Arc<HashMap<&'static str, PromptDefinition>>,
}

impl ModelCollaborators {
    /// Load all pipeline prompts, honouring workspace overrides.
    pub fn new(
        client: Arc<dyn LlmClient>,
        model: impl Into<String>,
        workspace: &Path,
    ) -> AppResult<Self> {
        let mut prompts = HashMap::new();
        for id in PROMPT_IDS {
            prompts.insert(id, load_prompt(workspace, id)?);
        }

        Ok(Self {
            client,
            model: model.into(),
            prompts: Arc::new(prompts),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn ask(&self, prompt_id: &str, variables: &[(&str, &str)]) -> AppResult<String> {
        let definition = self
            .prompts
            .get(prompt_id)
            .ok_or_else(|| AppError::Prompt(format!("Prompt not loaded: {}", prompt_id)))?;

        let vars = variables
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>();
        let built = build_prompt(definition, vars)?;

        // Deterministic sampling for every role.
        let mut request = LlmRequest::new(built.user, &self.model).with_temperature(0.0);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }
        if built.json_output {
            request = request.with_json_output();
        }

        tracing::debug!(prompt = prompt_id, "Calling {}", self.client.provider_name());
        let response = self.client.complete(&request).await?;
        tracing::debug!(
            prompt = prompt_id,
            tokens = response.usage.total(),
            "Model replied"
        );
        if response.truncated {
            tracing::warn!(prompt = prompt_id, "Model reply hit the token limit");
        }
        Ok(response.content)
    }

    async fn ask_binary(&self, prompt_id: &str, variables: &[(&str, &str)]) -> AppResult<bool> {
        let reply = self.ask(prompt_id, variables).await?;
        parse_binary_score(&reply).ok_or_else(|| {
            AppError::Llm(format!(
                "{} reply has no yes/no binary_score: {}",
                prompt_id,
                truncate(&reply)
            ))
        })
    }
}

fn truncate(reply: &str) -> String {
    const LIMIT: usize = 120;
    match reply.char_indices().nth(LIMIT) {
        Some((end, _)) => format!("{}...", &reply[..end]),
        None => reply.to_string(),
    }
}

#[async_trait]
impl QuestionRouter for ModelCollaborators {
    async fn route(&self, question: &str) -> AppResult<Route> {
        let reply = self.ask(ROUTE_PROMPT, &[("question", question)]).await?;
        parse_route(&reply).ok_or_else(|| {
            AppError::Llm(format!("Router reply has no datasource: {}", truncate(&reply)))
        })
    }
}

#[async_trait]
impl RelevanceGrader for ModelCollaborators {
    async fn grade(&self, question: &str, passage: &EvidencePassage) -> AppResult<Relevance> {
        self.ask_binary(
            RELEVANCE_PROMPT,
            &[("document", &passage.content), ("question", question)],
        )
        .await
        .map(Relevance::from)
    }
}

#[async_trait]
impl AnswerGenerator for ModelCollaborators {
    async fn generate(&self, question: &str, evidence: &[EvidencePassage]) -> AppResult<String> {
        let context = render_evidence(evidence);
        let answer = self
            .ask(GENERATE_PROMPT, &[("question", question), ("context", &context)])
            .await?;
        Ok(answer.trim().to_string())
    }
}

#[async_trait]
impl GroundednessValidator for ModelCollaborators {
    async fn is_grounded(
        &self,
        evidence: &[EvidencePassage],
        answer: &str,
    ) -> AppResult<Grounding> {
        let documents = render_evidence(evidence);
        self.ask_binary(
            GROUNDING_PROMPT,
            &[("documents", &documents), ("generation", answer)],
        )
        .await
        .map(Grounding::from)
    }
}

#[async_trait]
impl AdequacyValidator for ModelCollaborators {
    async fn is_adequate(&self, question: &str, answer: &str) -> AppResult<Adequacy> {
        self.ask_binary(ANSWER_PROMPT, &[("question", question), ("generation", answer)])
            .await
            .map(Adequacy::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cityhub_llm::{LlmResponse, LlmUsage};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Returns canned replies and records every request.
    struct ScriptedClient {
        reply: String,
        requests: Mutex<Vec<LlmRequest>>,
    }

    impl ScriptedClient {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        fn provider_name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.requests.lock().unwrap().push(request.clone());
            Ok(LlmResponse {
                content: self.reply.clone(),
                model: request.model.clone(),
                usage: LlmUsage::new(10, 2),
                truncated: false,
            })
        }
    }

    fn collaborators(client: Arc<ScriptedClient>) -> (ModelCollaborators, TempDir) {
        let dir = TempDir::new().unwrap();
        let models = ModelCollaborators::new(client, "llama3.2", dir.path()).unwrap();
        (models, dir)
    }

    #[tokio::test]
    async fn test_router_parses_datasource() {
        let client = ScriptedClient::new(r#"{"datasource": "vectorstore"}"#);
        let (models, _dir) = collaborators(client.clone());

        let route = models.route("How do I get a parking permit?").await.unwrap();

        assert_eq!(route, Route::LocalIndex);
        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].prompt, "How do I get a parking permit?");
        assert!(requests[0].wants_json());
        assert_eq!(requests[0].temperature, Some(0.0));
        assert!(requests[0].system.as_deref().unwrap().contains("vectorstore"));
    }

    #[tokio::test]
    async fn test_router_rejects_unknown_label() {
        let client = ScriptedClient::new(r#"{"datasource": "database"}"#);
        let (models, _dir) = collaborators(client);

        assert!(matches!(
            models.route("anything").await,
            Err(AppError::Llm(_))
        ));
    }

    #[tokio::test]
    async fn test_grader_sends_passage_and_question() {
        let client = ScriptedClient::new(r#"{"binary_score": "no"}"#);
        let (models, _dir) = collaborators(client.clone());

        let grade = models
            .grade(
                "When is street cleaning?",
                &EvidencePassage::local("Street cleaning runs Tuesdays."),
            )
            .await
            .unwrap();

        assert_eq!(grade, Relevance::NotRelevant);
        let prompt = client.requests.lock().unwrap()[0].prompt.clone();
        assert!(prompt.contains("Street cleaning runs Tuesdays."));
        assert!(prompt.contains("When is street cleaning?"));
    }

    #[tokio::test]
    async fn test_unparseable_verdict_is_an_error() {
        let client = ScriptedClient::new("I am not sure.");
        let (models, _dir) = collaborators(client);

        let err = models
            .is_adequate("question", "answer")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("binary_score"));
    }

    #[tokio::test]
    async fn test_generator_uses_all_evidence_as_text() {
        let client = ScriptedClient::new("  Apply online at sfmta.com.\n");
        let (models, _dir) = collaborators(client.clone());
        let evidence = vec![
            EvidencePassage::local("Apply online."),
            EvidencePassage::web("sfmta.com has the form"),
        ];

        let answer = models.generate("How to apply?", &evidence).await.unwrap();

        assert_eq!(answer, "Apply online at sfmta.com.");
        let request = client.requests.lock().unwrap()[0].clone();
        assert!(!request.wants_json());
        assert!(request.prompt.contains("Apply online.\n\nsfmta.com has the form"));
    }

    #[tokio::test]
    async fn test_grounding_validator() {
        let client = ScriptedClient::new("```json\n{\"binary_score\": \"yes\"}\n```");
        let (models, _dir) = collaborators(client);

        let verdict = models
            .is_grounded(&[EvidencePassage::local("fact")], "claim")
            .await
            .unwrap();
        assert_eq!(verdict, Grounding::Grounded);
    }

    #[test]
    fn test_truncate_long_reply() {
        let long = "x".repeat(300);
        assert_eq!(truncate(&long).len(), 123);
        assert_eq!(truncate("short"), "short");
    }
}
