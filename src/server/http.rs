//! HTTP host for promptrelay
//!
//! Every authenticated route runs the full admission check (ban, token,
//! rate limit) before the request body is parsed. Prompt bodies are
//! validated and wrapped before the CLI sees them, and CLI output is
//! sanitized before it leaves the process.

use anyhow::Result;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::config::Config;
use crate::relay::{CliRunner, PromptRunner};
use crate::security::{
    GuardError, GuardStatus, PromptPayload, RULESET_VERSION, ResponsePayload, SecurityContext,
    ceil_secs,
};

pub struct Server {
    config: Config,
    security: Arc<SecurityContext>,
    runner: Arc<dyn PromptRunner>,
}

struct AppState {
    config: Config,
    security: Arc<SecurityContext>,
    runner: Arc<dyn PromptRunner>,
}

impl Server {
    /// Build the security context (loading or creating the token) and the
    /// CLI runner from `config`.
    pub fn new(config: &Config) -> Result<Self> {
        let security = SecurityContext::new(&config.guard, &config.paths.data_dir)?;
        let runner = CliRunner::from_config(&config.relay);
        Ok(Self::with_parts(
            config,
            Arc::new(security),
            Arc::new(runner),
        ))
    }

    pub fn with_parts(
        config: &Config,
        security: Arc<SecurityContext>,
        runner: Arc<dyn PromptRunner>,
    ) -> Self {
        Self {
            config: config.clone(),
            security,
            runner,
        }
    }

    pub fn router(&self) -> Router {
        let state = Arc::new(AppState {
            config: self.config.clone(),
            security: self.security.clone(),
            runner: self.runner.clone(),
        });
        router(state)
    }

    pub async fn run(&self) -> Result<()> {
        let addr: SocketAddr =
            format!("{}:{}", self.config.server.bind, self.config.server.port).parse()?;

        if !addr.ip().is_loopback() {
            warn!(
                "Binding to non-loopback address {}; the relay is reachable from the network",
                addr.ip()
            );
        }

        let tokens = self.security.tokens();
        if let Some(path) = tokens.path() {
            info!(
                "Bearer token {} stored at {}",
                tokens.fingerprint(),
                path.display()
            );
        }
        info!("Relaying prompts to `{}`", self.config.relay.command);
        info!("Starting HTTP server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(status))
        .route("/api/prompt", post(execute_prompt))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Error response type
#[derive(Debug)]
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
    retry_after: Option<u64>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
}

impl AppError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            retry_after: None,
        }
    }
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        let status = match err {
            GuardError::Banned { .. } => StatusCode::FORBIDDEN,
            GuardError::Unauthorized => StatusCode::UNAUTHORIZED,
            GuardError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GuardError::Policy(_) | GuardError::Integrity => StatusCode::BAD_REQUEST,
            GuardError::Crypto(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
            retry_after: err.retry_after().map(ceil_secs),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.code,
            message: &self.message,
        };
        let mut response = (self.status, Json(body)).into_response();
        if let Some(secs) = self.retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Token from `Authorization: Bearer <token>`, if present.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

async fn health_check() -> &'static str {
    "OK"
}

#[derive(Serialize)]
struct StatusResponse {
    version: String,
    relay_command: String,
    ruleset_version: u32,
    guard: GuardStatus,
}

async fn status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<StatusResponse>, AppError> {
    state.security.admit(bearer_token(&headers))?;

    Ok(Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        relay_command: state.config.relay.command.clone(),
        ruleset_version: RULESET_VERSION,
        guard: state.security.status(),
    }))
}

#[derive(Debug, Deserialize)]
struct PromptRequest {
    prompt: PromptPayload,
}

#[derive(Debug, Serialize)]
struct PromptResponse {
    output: ResponsePayload,
}

async fn execute_prompt(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PromptResponse>, AppError> {
    execute_prompt_impl(&state, &headers, &body).await.map(Json)
}

async fn execute_prompt_impl(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<PromptResponse, AppError> {
    // Admission runs before the body is parsed so unauthenticated
    // callers learn nothing about the expected request shape.
    state.security.admit(bearer_token(headers))?;

    let request: PromptRequest = serde_json::from_slice(body).map_err(|e| {
        AppError::new(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            format!("Invalid request body: {}", e),
        )
    })?;

    let opened = state.security.open_prompt(&request.prompt)?;

    let output = match state.runner.run(&opened.wrapped).await {
        Ok(output) => output,
        Err(e) => {
            // Failure text can echo CLI output, so it is sanitized too.
            let message = state.security.response_guard().sanitize(&e.to_string());
            warn!("Relay command failed: {}", message);
            return Err(AppError::new(
                StatusCode::BAD_GATEWAY,
                "relay_failed",
                message,
            ));
        }
    };

    let output = state.security.seal_response(&output, opened.encrypted)?;
    Ok(PromptResponse { output })
}
