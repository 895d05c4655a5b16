//! Answer HTTP server.
//!
//! Turns a question plus the chunks a prior search returned into a model
//! answer. Each request is independent; the only shared state is the
//! immutable configuration, the prompt builder, and the completion provider
//! handle injected at startup.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/answer` | Build a prompt and return `{ answer, usage }` |
//! | `POST` | `/answer/stream` | Same input, answer streamed as server-sent events |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Request Body
//!
//! ```json
//! {
//!   "question": "What were the Q1 takeaways?",
//!   "fileChunks": [{ "filename": "q1.md", "text": "..." }],
//!   "promptFormat": "optional instruction block"
//! }
//! ```
//!
//! # Error Contract
//!
//! ```json
//! { "error": "fileChunks must be an array" }
//! ```
//!
//! Validation failures are `400` and name the offending field. Provider
//! failures are logged in full and answered with a generic `500`. Any method
//! other than `POST` on the answer routes is `405`.
//!
//! # Stream Events
//!
//! `event: delta` with `{"text": "..."}`, then exactly one of
//! `event: done` with `{"usage": n}` or `event: error` with
//! `{"error": "Something went wrong"}`.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{future, Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::completion::{CompletionProvider, CompletionRequest, OpenAiClient, StreamEvent};
use crate::config::Config;
use crate::error::ValidationError;
use crate::models::{Answer, FileChunk};
use crate::prompt::PromptBuilder;

/// Message returned for any downstream failure.
pub const GENERIC_ERROR: &str = "Something went wrong";

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    prompts: Arc<PromptBuilder>,
    provider: Arc<dyn CompletionProvider>,
}

impl AppState {
    pub fn new(config: &Config, provider: Arc<dyn CompletionProvider>) -> Self {
        let prompts = PromptBuilder::new(
            config.prompt.max_files_chars,
            config.prompt.format.clone(),
        );
        Self {
            config: Arc::new(config.clone()),
            prompts: Arc::new(prompts),
            provider,
        }
    }
}

/// Build the router with all routes and layers.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/answer",
            post(handle_answer).fallback(handle_method_not_allowed),
        )
        .route(
            "/answer/stream",
            post(handle_answer_stream).fallback(handle_method_not_allowed),
        )
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Starts the answer server with the OpenAI provider.
///
/// Reads `OPENAI_API_KEY` once; a missing key is a startup error. Binds to
/// `[server].bind` and runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let provider = OpenAiClient::from_env(config)?;
    tracing::info!(endpoint = provider.endpoint(), model = %config.completion.model, "completion provider configured");
    run_server_with_provider(config, Arc::new(provider)).await
}

/// Starts the answer server with an explicitly constructed provider.
pub async fn run_server_with_provider(
    config: &Config,
    provider: Arc<dyn CompletionProvider>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("Answer server listening on http://{}", listener.local_addr()?);
    serve(listener, AppState::new(config, provider)).await
}

/// Serve on an already-bound listener.
pub async fn serve(listener: tokio::net::TcpListener, state: AppState) -> anyhow::Result<()> {
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

/// JSON error response body.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Constructs a 400 Bad Request error.
fn bad_request(err: ValidationError) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        message: err.to_string(),
    }
}

/// Constructs the generic 500 error.
fn internal_error() -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        message: GENERIC_ERROR.to_string(),
    }
}

async fn handle_method_not_allowed() -> AppError {
    AppError {
        status: StatusCode::METHOD_NOT_ALLOWED,
        message: "Method not allowed".to_string(),
    }
}

// ============ Request validation ============

/// A request body that passed validation.
#[derive(Debug, PartialEq)]
pub struct ValidatedAnswer {
    pub question: String,
    pub file_chunks: Vec<FileChunk>,
    pub prompt_format: Option<String>,
}

/// Check the raw JSON body field by field.
///
/// `fileChunks` is checked before `question`, so a body missing both
/// reports `fileChunks`.
pub fn validate_answer_request(body: &Value) -> Result<ValidatedAnswer, ValidationError> {
    let chunks = body
        .get("fileChunks")
        .and_then(Value::as_array)
        .ok_or(ValidationError::FileChunks)?;

    let file_chunks = chunks
        .iter()
        .map(|c| serde_json::from_value::<FileChunk>(c.clone()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ValidationError::FileChunks)?;

    let question = body
        .get("question")
        .and_then(Value::as_str)
        .filter(|q| !q.is_empty())
        .ok_or(ValidationError::Question)?;

    let prompt_format = match body.get("promptFormat") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err(ValidationError::PromptFormat),
    };

    Ok(ValidatedAnswer {
        question: question.to_string(),
        file_chunks,
        prompt_format,
    })
}

fn extract(body: Result<Json<Value>, JsonRejection>) -> Result<ValidatedAnswer, AppError> {
    let Json(body) = body.map_err(|e| {
        tracing::debug!(error = %e, "rejected answer body");
        bad_request(ValidationError::NotJson)
    })?;
    validate_answer_request(&body).map_err(bad_request)
}

impl AppState {
    fn completion_request(&self, req: &ValidatedAnswer, stream: bool) -> CompletionRequest {
        let prompt = self
            .prompts
            .build(&req.question, &req.file_chunks, req.prompt_format.as_deref());
        let mut request = CompletionRequest::new(prompt);
        if stream {
            request.model = Some(self.config.stream_model().to_string());
        }
        request
    }
}

// ============ POST /answer ============

/// Handler for `POST /answer`.
async fn handle_answer(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Answer>, AppError> {
    let req = extract(body)?;
    let request = state.completion_request(&req, false);

    let completion = state.provider.complete(request).await.map_err(|e| {
        tracing::error!(provider = state.provider.name(), error = %e, "completion failed");
        internal_error()
    })?;

    tracing::info!(
        chunks = req.file_chunks.len(),
        usage = completion.usage,
        "answered question"
    );

    Ok(Json(Answer {
        text: completion.text,
        usage: completion.usage,
    }))
}

// ============ POST /answer/stream ============

/// Handler for `POST /answer/stream`.
///
/// Validation and provider-connection failures are reported as ordinary
/// JSON errors; once the event stream has started, a failure becomes a
/// final `error` event. A client disconnect drops the provider stream.
async fn handle_answer_stream(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let req = extract(body)?;
    let request = state.completion_request(&req, true);
    let provider = state.provider.name().to_string();

    let upstream = state.provider.complete_stream(request).await.map_err(|e| {
        tracing::error!(provider = %provider, error = %e, "completion stream failed to start");
        internal_error()
    })?;

    // Nothing follows the first `done` or `error` event.
    let events = upstream.scan(false, move |finished, item| {
        if *finished {
            return future::ready(None);
        }
        let event = match item {
            Ok(StreamEvent::Delta(text)) => Event::default()
                .event("delta")
                .data(json!({ "text": text }).to_string()),
            Ok(StreamEvent::Done { usage }) => {
                *finished = true;
                tracing::info!(usage = ?usage, "streamed answer complete");
                Event::default()
                    .event("done")
                    .data(json!({ "usage": usage }).to_string())
            }
            Err(e) => {
                *finished = true;
                tracing::error!(provider = %provider, error = %e, "completion stream failed");
                Event::default()
                    .event("error")
                    .data(json!({ "error": GENERIC_ERROR }).to_string())
            }
        };
        future::ready(Some(Ok::<_, Infallible>(event)))
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: String,
    /// The crate version from `Cargo.toml`.
    version: String,
}

/// Handler for `GET /health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
