//! Pipeline assembly from application configuration.

use crate::llm::ModelCollaborators;
use crate::local::KnowledgeIndex;
use crate::orchestrator::Pipeline;
use crate::search::BraveSearch;
use crate::sources::EvidenceSources;
use cityhub_core::{AppConfig, AppError, AppResult};
use cityhub_llm::create_client;
use std::sync::Arc;
use std::time::Duration;

/// Build the production pipeline: the configured LLM provider for every
/// model role, the configured knowledge base as local index and Brave Search
/// as web backend.
///
/// # Errors
/// Returns error if the provider cannot be created, a prompt fails to load,
/// or no web search key is available.
pub fn build_pipeline(config: &AppConfig) -> AppResult<Pipeline> {
    let provider_config = config.get_provider_config(&config.provider);
    let endpoint = provider_config.and_then(|pc| pc.endpoint.as_deref());
    let call_timeout = config.pipeline.call_timeout_secs.map(Duration::from_secs);
    let http_timeout = provider_config
        .and_then(|pc| pc.timeout)
        .map(Duration::from_secs)
        .or(call_timeout);

    let api_key = config.resolve_api_key(&config.provider);
    let client = create_client(&config.provider, endpoint, api_key.as_deref(), http_timeout)
        .map_err(AppError::Config)?;

    tracing::info!(
        provider = client.provider_name(),
        model = %config.model,
        "Pipeline model configured"
    );

    let models = Arc::new(ModelCollaborators::new(
        client,
        config.model.clone(),
        &config.workspace,
    )?);

    let search_key = config.search.resolve_api_key().ok_or_else(|| {
        AppError::Config(format!(
            "Web search needs an API key in {}",
            config.search.api_key_env
        ))
    })?;
    let search = BraveSearch::new(&config.search.endpoint, search_key, http_timeout)?;

    let local = KnowledgeIndex::new(&config.workspace, &config.pipeline.knowledge_base);
    let sources = EvidenceSources::new(Arc::new(local), Arc::new(search))
        .with_top_k(config.pipeline.top_k)
        .with_web_results(config.search.count);

    Pipeline::builder()
        .router(models.clone())
        .sources(sources)
        .grader(models.clone())
        .generator(models.clone())
        .grounding(models.clone())
        .adequacy(models)
        .step_budget(config.pipeline.step_budget)
        .call_timeout(call_timeout)
        .parallel_grading(config.pipeline.parallel_grading)
        .build()
}

impl Pipeline {
    /// See [`build_pipeline`].
    pub fn from_config(config: &AppConfig) -> AppResult<Self> {
        build_pipeline(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(workspace: &std::path::Path, search_key: Option<&str>) -> AppConfig {
        let mut config = AppConfig {
            workspace: workspace.to_path_buf(),
            ..Default::default()
        };
        config.search.api_key = search_key.map(str::to_string);
        config.search.api_key_env = "CITYHUB_TEST_BRAVE_KEY_UNSET".to_string();
        config.pipeline.step_budget = 6;
        config
    }

    #[test]
    fn test_build_pipeline_with_ollama() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::from_config(&config(temp.path(), Some("token"))).unwrap();

        assert_eq!(pipeline.step_budget(), 6);
    }

    #[test]
    fn test_missing_search_key_is_config_error() {
        let temp = TempDir::new().unwrap();

        let result = build_pipeline(&config(temp.path(), None));

        assert!(
            matches!(result, Err(AppError::Config(ref msg)) if msg.contains("CITYHUB_TEST_BRAVE_KEY_UNSET"))
        );
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let temp = TempDir::new().unwrap();
        let mut config = config(temp.path(), Some("token"));
        config.provider = "carrier-pigeon".to_string();

        assert!(matches!(build_pipeline(&config), Err(AppError::Config(_))));
    }
}
