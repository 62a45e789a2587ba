//! HTTP server for the answering pipeline.
//!
//! Exposes the chat, thread, and knowledge-reload operations as a JSON
//! API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (model ids, chunk count) |
//! | `POST` | `/chat` | Answer a message, appending to a thread |
//! | `POST` | `/thread` | Create an empty thread |
//! | `GET`  | `/thread/{id}` | Fetch a thread's messages |
//! | `POST` | `/knowledge/reload` | Rebuild the knowledge index |
//! | `GET`  | `/debug/sim` | Raw and normalized scores for a query |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Thread not found: 7" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401),
//! `not_found` (404), `internal` (500).
//!
//! # Authentication
//!
//! When `server.require_api_key` is set, every endpoint except
//! `/health` requires the configured shared secret in the `X-API-KEY`
//! header. Otherwise the API is unauthenticated.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser chat
//! widgets can call the API cross-origin.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::ingest;
use crate::llm::{Embedder, Generator};
use crate::models::{ChatMessage, SourceRef};
use crate::retrieve::{self, ConfidenceGate, Decision};
use crate::store::KnowledgeStore;
use crate::synth;
use crate::threads::ConversationStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<KnowledgeStore>,
    pub threads: Arc<ConversationStore>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
}

/// Starts the HTTP server. Runs until the process is terminated.
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let bind_addr = state.config.server.bind.clone();

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    println!("rag-bridge listening on http://{bind_addr}");

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Route table, separated from [`run_server`] so tests can drive the
/// handlers without binding a socket.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handle_health))
        .route("/chat", post(handle_chat))
        .route("/thread", post(handle_create_thread))
        .route("/thread/{id}", get(handle_get_thread))
        .route("/knowledge/reload", post(handle_reload))
        .route("/debug/sim", get(handle_debug_sim))
        .with_state(state)
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn unauthorized(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::UNAUTHORIZED,
        code: "unauthorized".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

fn internal(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: message.into(),
    }
}

/// Map pipeline errors to HTTP responses by message, so thread lookups
/// can signal 404 without a dedicated error type.
fn classify_error(err: anyhow::Error) -> AppError {
    let msg = err.to_string();
    if msg.contains("not found") {
        not_found(msg)
    } else {
        internal(msg)
    }
}

/// Enforce the shared-secret header when the config requires it.
fn guard_api_key(config: &Config, headers: &HeaderMap) -> Result<(), AppError> {
    if !config.server.require_api_key {
        return Ok(());
    }
    let expected = config.server.api_key.as_deref().unwrap_or_default();
    let supplied = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if supplied == expected {
        Ok(())
    } else {
        Err(unauthorized("Invalid API key"))
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    model: String,
    embed_model: String,
    chunks: usize,
    version: String,
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        model: state.generator.model_name().to_string(),
        embed_model: state.embedder.model_name().to_string(),
        chunks: state.store.len(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /chat ============

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
    thread_id: Option<i64>,
}

#[derive(Serialize)]
struct ChatResponse {
    thread_id: i64,
    response: String,
    elapsed_ms: u64,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sources: Option<Vec<SourceRef>>,
}

async fn handle_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    guard_api_key(&state.config, &headers)?;

    if req.message.trim().is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let start = Instant::now();

    // Resolve the thread and record the user turn before any model
    // calls, so the ordering invariant holds even on degraded paths.
    let thread_id = state
        .threads
        .create_or_get(req.thread_id)
        .map_err(classify_error)?;
    state
        .threads
        .append(thread_id, ChatMessage::user(req.message.clone()))
        .map_err(classify_error)?;

    // Retrieval failure is recovered locally: empty results flow into
    // the gate and come out as Fallback.
    let ranked = match state.embedder.embed(&req.message).await {
        Ok(vector) => retrieve::retrieve(&state.store, &vector, state.config.retrieval.top_k),
        Err(e) => {
            eprintln!("[KB RETRIEVAL ERROR] {e:#}");
            Vec::new()
        }
    };

    let gate = ConfidenceGate::new(
        state.config.retrieval.confidence_threshold,
        state.config.retrieval.max_sources,
    );

    let (response, sources) = match gate.decide(ranked) {
        Decision::Grounded(grounded) => {
            let answer = synth::synthesize(state.generator.as_ref(), &req.message, &grounded).await;
            let sources = synth::source_refs(&grounded);
            (answer, Some(sources))
        }
        Decision::Fallback => (state.config.retrieval.fallback_message.clone(), None),
    };

    state
        .threads
        .append(thread_id, ChatMessage::bot(response.clone()))
        .map_err(classify_error)?;
    let messages = state.threads.messages(thread_id).map_err(classify_error)?;

    Ok(Json(ChatResponse {
        thread_id,
        response,
        elapsed_ms: start.elapsed().as_millis() as u64,
        messages,
        sources,
    }))
}

// ============ POST /thread ============

#[derive(Serialize)]
struct CreateThreadResponse {
    id: i64,
}

async fn handle_create_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CreateThreadResponse>, AppError> {
    guard_api_key(&state.config, &headers)?;
    Ok(Json(CreateThreadResponse {
        id: state.threads.create(),
    }))
}

// ============ GET /thread/{id} ============

#[derive(Serialize)]
struct ThreadMessagesResponse {
    messages: Vec<ChatMessage>,
}

async fn handle_get_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<ThreadMessagesResponse>, AppError> {
    guard_api_key(&state.config, &headers)?;
    let messages = state.threads.messages(id).map_err(classify_error)?;
    Ok(Json(ThreadMessagesResponse { messages }))
}

// ============ POST /knowledge/reload ============

#[derive(Deserialize)]
struct ReloadParams {
    csv_path: Option<String>,
}

#[derive(Serialize)]
struct ReloadResponse {
    status: String,
    count: usize,
}

async fn handle_reload(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ReloadParams>,
) -> Result<Json<ReloadResponse>, AppError> {
    guard_api_key(&state.config, &headers)?;

    let csv_path = params.csv_path.map(std::path::PathBuf::from);
    let count = ingest::run_ingest(
        &state.config,
        state.embedder.as_ref(),
        &state.store,
        csv_path.as_deref(),
        true,
    )
    .await
    .map_err(|e| {
        // No CSV anywhere is a caller/config problem, not a server fault.
        let msg = e.to_string();
        if msg.contains("No FAQ CSV configured") {
            bad_request(msg)
        } else {
            classify_error(e)
        }
    })?;

    Ok(Json(ReloadResponse {
        status: "reloaded".to_string(),
        count,
    }))
}

// ============ GET /debug/sim ============

#[derive(Deserialize)]
struct DebugSimParams {
    q: String,
}

#[derive(Serialize)]
struct DebugSimEntry {
    content: String,
    raw_score: f64,
    similarity: f64,
}

#[derive(Serialize)]
struct DebugSimResponse {
    query: String,
    results: Vec<DebugSimEntry>,
}

async fn handle_debug_sim(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<DebugSimParams>,
) -> Result<Json<DebugSimResponse>, AppError> {
    guard_api_key(&state.config, &headers)?;

    if params.q.trim().is_empty() {
        return Err(bad_request("q must not be empty"));
    }

    let vector = state
        .embedder
        .embed(&params.q)
        .await
        .map_err(classify_error)?;

    let results = state
        .store
        .query(&vector, 5)
        .into_iter()
        .map(|(chunk, raw)| DebugSimEntry {
            content: chunk.content.chars().take(160).collect(),
            raw_score: raw,
            similarity: retrieve::score_to_similarity(raw),
        })
        .collect();

    Ok(Json(DebugSimResponse {
        query: params.q,
        results,
    }))
}
