//! Ask command handler.
//!
//! Runs one question through the answering pipeline.

use clap::Args;
use cityhub_agent::{build_pipeline, APOLOGY};
use cityhub_core::{config::AppConfig, AppError, AppResult};
use std::path::PathBuf;

/// Answer a question
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub question: Option<String>,

    /// Read the question from a file
    #[arg(short, long, conflicts_with = "question")]
    pub file: Option<PathBuf>,

    /// Maximum number of pipeline steps (default from config)
    #[arg(long)]
    pub step_budget: Option<u32>,

    /// Output the answer with evidence and trace as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");

        let question = self
            .get_question()?
            .ok_or_else(|| AppError::Config("No question provided".to_string()))?;

        config.validate()?;
        let pipeline = build_pipeline(config)?;
        let budget = self.step_budget.unwrap_or(config.pipeline.step_budget);

        match pipeline.run_with_budget(&question, budget).await {
            Ok(report) => {
                if self.json {
                    let json = serde_json::to_string_pretty(&report)
                        .map_err(|e| AppError::Serialization(e.to_string()))?;
                    println!("{}", json);
                } else {
                    println!("{}", report.answer);
                }
                tracing::debug!(steps = report.steps, "Answered in {} steps", report.steps);
                Ok(())
            }
            Err(err) => {
                if self.json {
                    let output = serde_json::json!({
                        "answer": APOLOGY,
                        "error": { "kind": err.kind(), "message": err.to_string() },
                    });
                    let json = serde_json::to_string_pretty(&output)
                        .map_err(|e| AppError::Serialization(e.to_string()))?;
                    println!("{}", json);
                } else {
                    println!("{}", APOLOGY);
                }
                Err(err.into())
            }
        }
    }

    fn get_question(&self) -> AppResult<Option<String>> {
        if let Some(ref question) = self.question {
            return Ok(Some(question.clone()));
        }
        match self.file {
            Some(ref path) => Ok(Some(std::fs::read_to_string(path)?.trim().to_string())),
            None => Ok(None),
        }
    }
}
