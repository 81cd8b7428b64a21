//! CityHub CLI
//!
//! Main entry point for the cityhub command-line tool.
//! Answers city-service questions with a self-correcting RAG pipeline.

mod commands;

use clap::{Parser, Subcommand};
use commands::{AskCommand, KnowledgeCommand, ServeCommand};
use cityhub_core::config::{AppConfig, Overrides};
use cityhub_core::{logging, AppResult};
use std::path::PathBuf;

/// CityHub - answers about city services, grounded in local documents and the web
#[derive(Parser, Debug)]
#[command(name = "cityhub")]
#[command(about = "Self-correcting question answering for city services", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to workspace directory (default: current directory)
    #[arg(short, long, global = true, env = "CITYHUB_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "CITYHUB_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// LLM provider (ollama, openai, groq)
    #[arg(short, long, global = true, env = "CITYHUB_PROVIDER")]
    provider: Option<String>,

    /// Model identifier
    #[arg(short, long, global = true, env = "CITYHUB_MODEL")]
    model: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a question
    Ask(AskCommand),

    /// Knowledge base management (local index)
    Knowledge(KnowledgeCommand),

    /// Serve the question endpoint over HTTP
    Serve(ServeCommand),
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    let config = AppConfig::load_with(&Overrides {
        workspace: cli.workspace,
        config_file: cli.config,
        provider: cli.provider,
        model: cli.model,
        log_level: cli.log_level,
        verbose: cli.verbose,
        no_color: cli.no_color,
    })?;

    // The server logs JSON lines unless told otherwise
    let json_logs = config.logging.json || matches!(cli.command, Commands::Serve(_));
    logging::init_logging(config.logging.level.as_deref(), !config.logging.color, json_logs)?;

    tracing::info!("CityHub CLI starting");
    tracing::debug!("Workspace: {:?}", config.workspace);
    tracing::debug!("Provider: {}", config.provider);
    tracing::debug!("Model: {}", config.model);

    config.ensure_cityhub_dir()?;

    let command_name = match &cli.command {
        Commands::Ask(_) => "ask",
        Commands::Knowledge(_) => "knowledge",
        Commands::Serve(_) => "serve",
    };
    let _span = tracing::info_span!("command", name = command_name).entered();

    let result = match cli.command {
        Commands::Ask(cmd) => cmd.execute(&config).await,
        Commands::Knowledge(cmd) => cmd.execute(&config).await,
        Commands::Serve(cmd) => cmd.execute(&config).await,
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!("Command failed: {}", e),
    }

    result
}
