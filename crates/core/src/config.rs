//! Layered configuration for CityHub.
//!
//! Precedence, lowest first: built-in defaults, `.cityhub/config.yaml` (or
//! the file named by `--config`), environment variables, command-line flags.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers the LLM factory knows how to build.
pub const KNOWN_PROVIDERS: [&str; 3] = ["ollama", "openai", "groq"];

/// Resolved settings shared by every command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Workspace root; state lives under `.cityhub/`
    pub workspace: PathBuf,

    /// Active LLM provider
    pub provider: String,

    /// Model used for every pipeline role
    pub model: String,

    /// Explicit key from `CITYHUB_API_KEY`, beats per-provider variables
    #[serde(skip)]
    pub api_key: Option<String>,

    /// Per-provider blocks from `llm.providers`
    pub providers: HashMap<String, ProviderConfig>,

    pub logging: LogSettings,
    pub pipeline: PipelineConfig,
    pub search: SearchConfig,
    pub server: ServerConfig,
}

/// One entry of `llm.providers`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub model: String,

    /// Variable holding the key; hosted providers only
    #[serde(default)]
    pub api_key_env: Option<String>,

    #[serde(default)]
    pub endpoint: Option<String>,

    /// HTTP timeout in seconds
    #[serde(default)]
    pub timeout: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Filter directive; `RUST_LOG` syntax
    pub level: Option<String>,
    pub color: bool,
    /// One JSON object per line
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: None,
            color: true,
            json: false,
        }
    }
}

/// Answering pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Maximum number of state transitions per run
    pub step_budget: u32,

    /// Passages retrieved from the local index
    pub top_k: usize,

    /// Knowledge base backing local retrieval
    pub knowledge_base: String,

    /// Timeout applied to every collaborator call
    pub call_timeout_secs: Option<u64>,

    /// Grade local passages concurrently
    pub parallel_grading: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step_budget: 8,
            top_k: 3,
            knowledge_base: "sf-city-services".to_string(),
            call_timeout_secs: None,
            parallel_grading: false,
        }
    }
}

/// Brave Search settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchConfig {
    /// Subscription token set in code; never read from the file
    #[serde(skip)]
    pub api_key: Option<String>,
    /// Variable holding the subscription token
    pub api_key_env: String,
    pub endpoint: String,
    /// Results requested per search
    pub count: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: "BRAVE_API_KEY".to_string(),
            endpoint: "https://api.search.brave.com/res/v1/web/search".to_string(),
            count: 3,
        }
    }
}

impl SearchConfig {
    /// The explicit key, else the configured variable when it is non-empty.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| env_var(&self.api_key_env))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9100,
            allowed_origins: vec!["http://localhost:3000".to_string()],
        }
    }
}

/// Layout of `config.yaml`. Every section is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigFile {
    workspace: Option<PathBuf>,
    llm: Option<LlmSection>,
    logging: Option<LogSettings>,
    pipeline: Option<PipelineConfig>,
    search: Option<SearchConfig>,
    server: Option<ServerConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LlmSection {
    active_provider: String,
    #[serde(default)]
    providers: HashMap<String, ProviderConfig>,
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub workspace: Option<PathBuf>,
    pub config_file: Option<PathBuf>,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub log_level: Option<String>,
    /// Forces `debug` unless a level was given
    pub verbose: bool,
    pub no_color: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            provider: "ollama".to_string(),
            model: "llama3.2".to_string(),
            api_key: None,
            providers: HashMap::new(),
            logging: LogSettings::default(),
            pipeline: PipelineConfig::default(),
            search: SearchConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load without command-line overrides.
    ///
    /// # Example
    /// ```no_run
    /// use cityhub_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(&Overrides::default())
    }

    /// Resolve every layer.
    ///
    /// Environment variables read here: `CITYHUB_WORKSPACE`, `CITYHUB_CONFIG`,
    /// `CITYHUB_PROVIDER`, `CITYHUB_MODEL`, `CITYHUB_API_KEY`,
    /// `CITYHUB_STEP_BUDGET`, `RUST_LOG` and `NO_COLOR`.
    pub fn load_with(overrides: &Overrides) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = overrides
            .workspace
            .clone()
            .or_else(|| env_var("CITYHUB_WORKSPACE").map(PathBuf::from))
        {
            config.workspace = workspace;
        }
        if !config.workspace.is_dir() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {}",
                config.workspace.display()
            )));
        }

        let explicit_file = overrides
            .config_file
            .clone()
            .or_else(|| env_var("CITYHUB_CONFIG").map(PathBuf::from));
        match explicit_file {
            Some(path) => config.apply_file(&path)?,
            None => {
                let path = config.cityhub_dir().join("config.yaml");
                if path.is_file() {
                    config.apply_file(&path)?;
                }
            }
        }

        config.apply_env()?;
        config.apply_overrides(overrides);
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> AppResult<()> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        self.apply_yaml(&raw).map_err(|e| {
            AppError::Config(format!("Invalid config file {}: {}", path.display(), e))
        })?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Ok(())
    }

    fn apply_yaml(&mut self, raw: &str) -> Result<(), serde_yaml::Error> {
        let file: ConfigFile = serde_yaml::from_str(raw)?;

        if let Some(workspace) = file.workspace {
            self.workspace = workspace;
        }
        if let Some(llm) = file.llm {
            if let Some(active) = llm.providers.get(&llm.active_provider) {
                self.model = active.model.clone();
            }
            self.provider = llm.active_provider;
            self.providers = llm.providers;
        }
        if let Some(logging) = file.logging {
            self.logging = logging;
        }
        if let Some(pipeline) = file.pipeline {
            self.pipeline = pipeline;
        }
        if let Some(search) = file.search {
            self.search = search;
        }
        if let Some(server) = file.server {
            self.server = server;
        }
        Ok(())
    }

    fn apply_env(&mut self) -> AppResult<()> {
        if let Some(provider) = env_var("CITYHUB_PROVIDER") {
            self.switch_provider(provider);
        }
        if let Some(model) = env_var("CITYHUB_MODEL") {
            self.model = model;
        }
        if let Some(budget) = env_var("CITYHUB_STEP_BUDGET") {
            self.pipeline.step_budget = budget.parse().map_err(|e| {
                AppError::Config(format!("Invalid CITYHUB_STEP_BUDGET '{}': {}", budget, e))
            })?;
        }
        self.api_key = env_var("CITYHUB_API_KEY");
        if self.logging.level.is_none() {
            self.logging.level = env_var("RUST_LOG");
        }
        if std::env::var_os("NO_COLOR").is_some() {
            self.logging.color = false;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(ref provider) = overrides.provider {
            self.switch_provider(provider.clone());
        }
        if let Some(ref model) = overrides.model {
            self.model = model.clone();
        }
        if let Some(ref level) = overrides.log_level {
            self.logging.level = Some(level.clone());
        } else if overrides.verbose {
            self.logging.level = Some("debug".to_string());
        }
        if overrides.no_color {
            self.logging.color = false;
        }
    }

    /// Change provider, taking its configured model when it has one.
    fn switch_provider(&mut self, provider: String) {
        if let Some(pc) = self.providers.get(&provider) {
            self.model = pc.model.clone();
        }
        self.provider = provider;
    }

    pub fn cityhub_dir(&self) -> PathBuf {
        self.workspace.join(".cityhub")
    }

    pub fn ensure_cityhub_dir(&self) -> AppResult<()> {
        let dir = self.cityhub_dir();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AppError::Config(format!("Cannot create {}: {}", dir.display(), e))
        })
    }

    pub fn get_provider_config(&self, provider: &str) -> Option<&ProviderConfig> {
        self.providers.get(provider)
    }

    /// API key for `provider`: `CITYHUB_API_KEY`, then the provider's
    /// `apiKeyEnv`, then the conventional variable for hosted providers.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            return Some(key.clone());
        }

        let configured = self
            .get_provider_config(provider)
            .and_then(|pc| pc.api_key_env.as_deref());
        let fallback = match provider {
            "groq" => Some("GROQ_API_KEY"),
            "openai" => Some("OPENAI_API_KEY"),
            _ => None,
        };
        configured.or(fallback).and_then(env_var)
    }

    /// Reject settings no command can run with.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider.as_str();

        if !KNOWN_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }
        if provider != "ollama" && self.resolve_api_key(provider).is_none() {
            return Err(AppError::Config(format!(
                "No API key found for provider '{}'",
                provider
            )));
        }
        if self.pipeline.step_budget == 0 {
            return Err(AppError::Config(
                "pipeline.stepBudget must be a positive integer".to_string(),
            ));
        }
        if self.pipeline.top_k == 0 {
            return Err(AppError::Config(
                "pipeline.topK must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}

/// Non-empty value of an environment variable.
fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}
