//! Serve command handler.
//!
//! Exposes the pipeline as `POST /askcityhub` for the web chat client.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use cityhub_agent::{build_pipeline, Pipeline, PipelineError, APOLOGY};
use cityhub_core::{config::AppConfig, AppError, AppResult};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

/// Serve the question endpoint over HTTP
#[derive(Args, Debug)]
pub struct ServeCommand {
    /// Address to bind (default from config)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (default from config)
    #[arg(long)]
    pub port: Option<u16>,
}

impl ServeCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        config.validate()?;
        let pipeline = Arc::new(build_pipeline(config)?);
        let app = router(pipeline, &config.server.allowed_origins)?;

        let host = self.host.as_deref().unwrap_or(&config.server.host);
        let port = self.port.unwrap_or(config.server.port);
        let addr = format!("{}:{}", host, port);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        tracing::info!("Listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}

#[derive(Clone)]
struct ServerState {
    pipeline: Arc<Pipeline>,
}

/// Body of every non-200 reply.
#[derive(Debug, Serialize)]
struct ErrorBody {
    description: &'static str,
    message: &'static str,
    detail: String,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Build the HTTP router with CORS for `allowed_origins`.
pub fn router(pipeline: Arc<Pipeline>, allowed_origins: &[String]) -> AppResult<Router> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| AppError::Config(format!("Invalid CORS origin '{}': {}", origin, e)))
        })
        .collect::<AppResult<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Ok(Router::new()
        .route("/askcityhub", post(ask_cityhub))
        .route("/health", get(health))
        .with_state(ServerState { pipeline })
        .layer(cors))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy" })
}

async fn ask_cityhub(
    State(state): State<ServerState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let question = match payload {
        Ok(Json(body)) => match body.get("question") {
            Some(Value::String(question)) => question.clone(),
            _ => return failure(StatusCode::BAD_REQUEST, "the `question` should be string"),
        },
        Err(rejection) => return failure(StatusCode::BAD_REQUEST, &rejection.body_text()),
    };

    tracing::info!(question = %question, "Received question");

    match state.pipeline.run(&question).await {
        Ok(report) => {
            tracing::info!(steps = report.steps, "Answered question");
            (StatusCode::OK, Json(report.answer)).into_response()
        }
        Err(err) => {
            let status = status_for(&err);
            match err {
                PipelineError::InvalidQuestion(ref reason) => failure(status, reason),
                _ => failure(status, err.kind()),
            }
        }
    }
}

fn status_for(err: &PipelineError) -> StatusCode {
    match err {
        PipelineError::InvalidQuestion(_) => StatusCode::BAD_REQUEST,
        err if err.is_dependency_failure() => StatusCode::FAILED_DEPENDENCY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn failure(status: StatusCode, detail: &str) -> Response {
    let description = match status {
        StatusCode::BAD_REQUEST => "bad request",
        StatusCode::FAILED_DEPENDENCY => "dependency error",
        _ => "internal error",
    };
    tracing::warn!(status = status.as_u16(), detail, "Request failed");

    let body = ErrorBody {
        description,
        message: APOLOGY,
        detail: detail.to_string(),
    };
    (status, Json(body)).into_response()
}
